//! Optimal polygon approximation via dynamic programming.
//!
//! Given a closed lattice path, finds the polygon with the fewest vertices
//! whose edges stay within half a pixel of the path, then moves each
//! vertex to the sub-pixel position that best fits its two edges.
//!
//! ## Algorithm
//!
//! 1. **Prefix sums** (`calc_sums`): O(1) line-fit statistics for any
//!    sub-range of the path.
//! 2. **Longest straight subpath** (`calc_lon`): for each point, the
//!    farthest point reachable by a straight line staying within ±0.5 of
//!    every point in between (constraint propagation).
//! 3. **DP optimal polygon** (`best_polygon`): minimize the summed
//!    line-fit penalty over all polygons with the minimum number of edges.
//! 4. **Vertex refinement** (`adjust_vertices`): shift each vertex to the
//!    point minimizing squared distance to its two fitted edge lines,
//!    constrained to the ±0.5 box around the lattice corner.

use std::ops::{Add, Sub};

use kurbo::{Point, Vec2};

use super::decompose::Path;
use crate::geom::{cyclic, floordiv, pmod, sign, xprod, IPoint};

/// Prefix-sum accumulator for O(1) line-fit statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sums {
    pub x: f64,
    pub y: f64,
    pub xy: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Add for Sums {
    type Output = Sums;

    fn add(self, o: Sums) -> Sums {
        Sums {
            x: self.x + o.x,
            y: self.y + o.y,
            xy: self.xy + o.xy,
            x2: self.x2 + o.x2,
            y2: self.y2 + o.y2,
        }
    }
}

impl Sub for Sums {
    type Output = Sums;

    fn sub(self, o: Sums) -> Sums {
        Sums {
            x: self.x - o.x,
            y: self.y - o.y,
            xy: self.xy - o.xy,
            x2: self.x2 - o.x2,
            y2: self.y2 - o.y2,
        }
    }
}

/// Optimal polygon derived from a lattice path.
#[derive(Debug, Clone)]
pub struct Polygon {
    /// Sub-pixel vertices, oriented so outer boundaries and holes wind in
    /// opposite directions.
    pub vertices: Vec<Point>,
    /// +1 for outer, -1 for hole.
    pub sign: i8,
}

/// Compute the refined optimal polygon of a path.
pub fn optimal_polygon(path: &Path) -> Polygon {
    let pt = &path.points;
    let mut vertices = if pt.len() < 4 {
        pt.iter().map(|&(x, y)| Point::new(x as f64, y as f64)).collect()
    } else {
        let sums = calc_sums(pt);
        let lon = calc_lon(pt);
        let po = best_polygon(pt, &lon, &sums);
        adjust_vertices(pt, &po, &sums)
    };
    if path.sign < 0 {
        vertices.reverse();
    }
    Polygon {
        vertices,
        sign: path.sign,
    }
}

// ── Prefix sums ──────────────────────────────────────────

/// `sums[i]` accumulates the first `i` points, relative to `pt[0]`.
pub(crate) fn calc_sums(pt: &[IPoint]) -> Vec<Sums> {
    let (x0, y0) = pt[0];
    let mut sums = Vec::with_capacity(pt.len() + 1);
    sums.push(Sums::default());
    for &(px, py) in pt {
        let x = (px - x0) as f64;
        let y = (py - y0) as f64;
        let prev = sums[sums.len() - 1];
        sums.push(
            prev + Sums {
                x,
                y,
                xy: x * y,
                x2: x * x,
                y2: y * y,
            },
        );
    }
    sums
}

/// Sums over the cyclic range `i..=j` where `i < n` and `j` may run up to
/// `2n`. Returns the sums and the number of points covered.
fn range_sums(sums: &[Sums], i: usize, j: usize) -> (Sums, f64) {
    let n = sums.len() - 1;
    let (j, r) = if j >= n { (j - n, 1) } else { (j, 0) };
    let mut s = sums[j + 1] - sums[i];
    if r == 1 {
        s = s + sums[n];
    }
    (s, (j + 1 + r * n - i) as f64)
}

// ── Longest straight subpath ─────────────────────────────

/// For each point `i`, the farthest point reachable by a straight line
/// that stays within half a pixel of every point in between.
///
/// Walks forward from `i` maintaining two constraint vectors that bound
/// the corridor of admissible directions. The walk stops when the path
/// has moved in all four cardinal directions, or when a point falls
/// outside the corridor; the exact exit index is then interpolated on the
/// last step.
///
/// ```text
///   (dx, dy) → (3 + 3*dx + dy) / 2
///   (-1,  0) → 0   West
///   ( 0, -1) → 1   North
///   ( 0,  1) → 2   South
///   ( 1,  0) → 3   East
/// ```
pub(crate) fn calc_lon(pt: &[IPoint]) -> Vec<usize> {
    let n = pt.len();
    let dir_index = |dx: i32, dy: i32| ((3 + 3 * dx + dy) / 2) as usize;

    // nc[i]: next index after i whose point differs from pt[i] on both axes.
    let mut nc = vec![0usize; n];
    let mut k = 0usize;
    for i in (0..n).rev() {
        if pt[i].0 != pt[k].0 && pt[i].1 != pt[k].1 {
            k = i + 1;
        }
        nc[i] = k;
    }

    let mut pivk = vec![0usize; n];
    for i in (0..n).rev() {
        let mut ct = [0u32; 4];
        let i1 = (i + 1) % n;
        ct[dir_index(pt[i1].0 - pt[i].0, pt[i1].1 - pt[i].1)] += 1;

        let mut constraint: [IPoint; 2] = [(0, 0), (0, 0)];
        let mut k = nc[i];
        let mut k1 = i;
        let mut found = false;

        loop {
            ct[dir_index(sign(pt[k].0 - pt[k1].0), sign(pt[k].1 - pt[k1].1))] += 1;
            if ct.iter().all(|&c| c > 0) {
                pivk[i] = k1;
                found = true;
                break;
            }

            let cur = (pt[k].0 - pt[i].0, pt[k].1 - pt[i].1);
            if xprod(constraint[0], cur) < 0 || xprod(constraint[1], cur) > 0 {
                break;
            }

            if cur.0.abs() > 1 || cur.1.abs() > 1 {
                let off = (
                    cur.0 + if cur.1 >= 0 && (cur.1 > 0 || cur.0 < 0) { 1 } else { -1 },
                    cur.1 + if cur.0 <= 0 && (cur.0 < 0 || cur.1 < 0) { 1 } else { -1 },
                );
                if xprod(constraint[0], off) >= 0 {
                    constraint[0] = off;
                }
                let off = (
                    cur.0 + if cur.1 <= 0 && (cur.1 < 0 || cur.0 < 0) { 1 } else { -1 },
                    cur.1 + if cur.0 >= 0 && (cur.0 > 0 || cur.1 < 0) { 1 } else { -1 },
                );
                if xprod(constraint[1], off) <= 0 {
                    constraint[1] = off;
                }
            }

            k1 = k;
            k = nc[k1];
            if !cyclic(k, i, k1) {
                break;
            }
        }

        if !found {
            // Interpolate where the line leaves the corridor on the last step.
            let dk = (sign(pt[k].0 - pt[k1].0), sign(pt[k].1 - pt[k1].1));
            let cur = (pt[k1].0 - pt[i].0, pt[k1].1 - pt[i].1);
            let a = xprod(constraint[0], cur);
            let b = xprod(constraint[0], dk);
            let c = xprod(constraint[1], cur);
            let d = xprod(constraint[1], dk);

            const INFTY: i64 = 10_000_000;
            let mut j = INFTY;
            if b < 0 {
                j = floordiv(a, -b);
            }
            if d > 0 {
                j = j.min(floordiv(-c, d));
            }
            pivk[i] = pmod(k1 as i64 + j, n);
        }
    }

    // Make lon monotone: lon[i] is the furthest pivot over all j >= i.
    let mut lon = vec![0usize; n];
    let mut j = pivk[n - 1];
    lon[n - 1] = j;
    for i in (0..n - 1).rev() {
        if cyclic(i + 1, pivk[i], j) {
            j = pivk[i];
        }
        lon[i] = j;
    }
    let mut i = n - 1;
    while cyclic((i + 1) % n, j, lon[i]) {
        lon[i] = j;
        if i == 0 {
            break;
        }
        i -= 1;
    }
    lon
}

// ── Dynamic programming optimal polygon ──────────────────

/// Penalty for approximating the path from `i` to `j` by one straight edge:
/// RMS distance of the covered points from the line through `pt[i]` and
/// `pt[j]`, scaled by the edge length. `j` may be `>= n` to wrap.
fn penalty3(pt: &[IPoint], sums: &[Sums], i: usize, j: usize) -> f64 {
    let n = pt.len();
    let (s, k) = range_sums(sums, i, j);
    let j = j % n;
    let (x0, y0) = pt[0];

    let px = (pt[i].0 + pt[j].0) as f64 / 2.0 - x0 as f64;
    let py = (pt[i].1 + pt[j].1) as f64 / 2.0 - y0 as f64;
    let ey = (pt[j].0 - pt[i].0) as f64;
    let ex = -(pt[j].1 - pt[i].1) as f64;

    let a = (s.x2 - 2.0 * s.x * px) / k + px * px;
    let b = (s.xy - s.x * py - s.y * px) / k + px * py;
    let c = (s.y2 - 2.0 * s.y * py) / k + py * py;

    let v = ex * ex * a + 2.0 * ex * ey * b + ey * ey * c;
    v.max(0.0).sqrt()
}

/// Indices of the polygon vertices with the fewest edges and, among
/// those, the least total penalty.
pub(crate) fn best_polygon(pt: &[IPoint], lon: &[usize], sums: &[Sums]) -> Vec<usize> {
    let n = pt.len();

    // clip0[i]: farthest index reachable from i by one edge.
    let mut clip0 = vec![0usize; n];
    for i in 0..n {
        let mut c = pmod(lon[pmod(i as i64 - 1, n)] as i64 - 1, n);
        if c == i {
            c = (i + 1) % n;
        }
        clip0[i] = if c < i { n } else { c };
    }

    // clip1[j]: earliest index from which j is reachable.
    let mut clip1 = vec![0usize; n + 1];
    let mut j = 1;
    for (i, &c) in clip0.iter().enumerate() {
        while j <= c {
            clip1[j] = i;
            j += 1;
        }
    }

    // seg0[j]: greedy forward walk, the earliest index reachable in j edges.
    let mut seg0 = Vec::new();
    let mut i = 0;
    while i < n {
        seg0.push(i);
        i = clip0[i];
    }
    seg0.push(n);
    let m = seg0.len() - 1;

    // seg1[j]: greedy backward walk, the latest index from which n is
    // reachable in m - j edges.
    let mut seg1 = vec![0usize; m + 1];
    let mut i = n;
    for j in (1..=m).rev() {
        seg1[j] = i;
        i = clip1[i];
    }

    let mut pen = vec![0.0f64; n + 1];
    let mut prev = vec![0usize; n + 1];
    for j in 1..=m {
        for i in seg1[j]..=seg0[j] {
            let mut best = -1.0;
            for k in (clip1[i]..=seg0[j - 1]).rev() {
                let this = penalty3(pt, sums, k, i) + pen[k];
                if best < 0.0 || this < best {
                    prev[i] = k;
                    best = this;
                }
            }
            pen[i] = best;
        }
    }

    let mut po = vec![0usize; m];
    let mut i = n;
    for slot in po.iter_mut().rev() {
        i = prev[i];
        *slot = i;
    }
    po
}

// ── Vertex adjustment ────────────────────────────────────

/// Symmetric 3×3 quadratic form: `[x, y, 1] · Q · [x, y, 1]ᵀ` is the
/// squared distance of (x, y) from a line (or a sum of such).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Quad(pub [[f64; 3]; 3]);

impl Quad {
    /// Form for the line through `ctr` along `dir`; zero if `dir` is zero.
    fn from_line(ctr: Point, dir: Vec2) -> Quad {
        let d = dir.hypot2();
        if d == 0.0 {
            return Quad::default();
        }
        let v0 = dir.y;
        let v1 = -dir.x;
        Quad::outer([v0, v1, -v1 * ctr.y - v0 * ctr.x], d)
    }

    /// `v · vᵀ / d`.
    fn outer(v: [f64; 3], d: f64) -> Quad {
        let mut q = [[0.0; 3]; 3];
        for (l, row) in q.iter_mut().enumerate() {
            for (k, cell) in row.iter_mut().enumerate() {
                *cell = v[l] * v[k] / d;
            }
        }
        Quad(q)
    }

    fn det2(&self) -> f64 {
        let q = &self.0;
        q[0][0] * q[1][1] - q[0][1] * q[1][0]
    }

    /// Evaluate at (x, y).
    pub fn eval(&self, p: Point) -> f64 {
        let v = [p.x, p.y, 1.0];
        let mut sum = 0.0;
        for l in 0..3 {
            for k in 0..3 {
                sum += v[l] * self.0[l][k] * v[k];
            }
        }
        sum
    }
}

impl Add for Quad {
    type Output = Quad;

    fn add(self, o: Quad) -> Quad {
        let mut q = self.0;
        for (row, orow) in q.iter_mut().zip(o.0) {
            for (cell, ocell) in row.iter_mut().zip(orow) {
                *cell += ocell;
            }
        }
        Quad(q)
    }
}

/// Centroid and principal direction of the path from `i` to `j` (which may
/// be past `n`), relative to `pt[0]`. The direction is zero when the
/// scatter matrix is degenerate.
fn point_slope(sums: &[Sums], i: usize, j: usize) -> (Point, Vec2) {
    let n = sums.len() - 1;
    let mut j = j;
    let mut r = 0;
    while j >= n {
        j -= n;
        r += 1;
    }
    let mut s = sums[j + 1] - sums[i];
    for _ in 0..r {
        s = s + sums[n];
    }
    let k = (j + 1 + r * n - i) as f64;

    let ctr = Point::new(s.x / k, s.y / k);

    let mut a = (s.x2 - s.x * s.x / k) / k;
    let b = (s.xy - s.x * s.y / k) / k;
    let mut c = (s.y2 - s.y * s.y / k) / k;

    // Larger eigenvalue of [[a, b], [b, c]].
    let lambda2 = (a + c + ((a - c) * (a - c) + 4.0 * b * b).sqrt()) / 2.0;
    a -= lambda2;
    c -= lambda2;

    let dir = if a.abs() >= c.abs() {
        let l = (a * a + b * b).sqrt();
        if l != 0.0 {
            Vec2::new(-b / l, a / l)
        } else {
            Vec2::ZERO
        }
    } else {
        let l = (c * c + b * b).sqrt();
        if l != 0.0 {
            Vec2::new(-c / l, b / l)
        } else {
            Vec2::ZERO
        }
    };
    (ctr, dir)
}

/// Limit on synthetic constraints added to a singular form.
const MAX_REGULARIZE: usize = 4;

/// Refine each polygon vertex to the best sub-pixel position within ±0.5
/// of its lattice corner.
pub(crate) fn adjust_vertices(pt: &[IPoint], po: &[usize], sums: &[Sums]) -> Vec<Point> {
    let n = pt.len();
    let m = po.len();
    if m == 0 {
        return Vec::new();
    }
    let origin = Vec2::new(pt[0].0 as f64, pt[0].1 as f64);

    // One fitted line per polygon edge.
    let q: Vec<Quad> = (0..m)
        .map(|i| {
            let next = po[(i + 1) % m];
            let j = pmod(next as i64 - po[i] as i64, n) + po[i];
            let (ctr, dir) = point_slope(sums, po[i], j);
            Quad::from_line(ctr, dir)
        })
        .collect();

    (0..m)
        .map(|i| {
            let corner = pt[po[i]];
            let s = Point::new(corner.0 as f64, corner.1 as f64) - origin;
            let mut quad = q[(i + m - 1) % m] + q[i];

            // A singular form has a line of minima; pin it with a line
            // through the lattice corner.
            for _ in 0..MAX_REGULARIZE {
                if quad.det2() != 0.0 {
                    break;
                }
                let qq = &quad.0;
                let (v0, v1) = if qq[0][0] > qq[1][1] {
                    (-qq[0][1], qq[0][0])
                } else if qq[1][1] != 0.0 {
                    (-qq[1][1], qq[1][0])
                } else {
                    (1.0, 0.0)
                };
                let d = v0 * v0 + v1 * v1;
                quad = quad + Quad::outer([v0, v1, -v1 * s.y - v0 * s.x], d);
            }

            optimize_vertex(&quad, s) + origin
        })
        .collect()
}

/// Minimize `quad` over the ±0.5 box around `s`.
fn optimize_vertex(quad: &Quad, s: Point) -> Point {
    let q = &quad.0;
    let det = quad.det2();
    if det != 0.0 {
        let w = Point::new(
            (-q[0][2] * q[1][1] + q[1][2] * q[0][1]) / det,
            (q[0][2] * q[1][0] - q[1][2] * q[0][0]) / det,
        );
        if (w.x - s.x).abs() <= 0.5 && (w.y - s.y).abs() <= 0.5 {
            return w;
        }
    }

    let mut best = s;
    let mut min = quad.eval(s);
    let mut consider = |w: Point| {
        let v = quad.eval(w);
        if v < min {
            min = v;
            best = w;
        }
    };

    // Minimum along each box edge.
    if q[0][0] != 0.0 {
        for dy in [-0.5, 0.5] {
            let y = s.y + dy;
            let x = -(q[0][1] * y + q[0][2]) / q[0][0];
            if (x - s.x).abs() <= 0.5 {
                consider(Point::new(x, y));
            }
        }
    }
    if q[1][1] != 0.0 {
        for dx in [-0.5, 0.5] {
            let x = s.x + dx;
            let y = -(q[1][0] * x + q[1][2]) / q[1][1];
            if (y - s.y).abs() <= 0.5 {
                consider(Point::new(x, y));
            }
        }
    }
    // Half-integer grid over the box.
    for dx in [-0.5, 0.0, 0.5] {
        for dy in [-0.5, 0.0, 0.5] {
            consider(Point::new(s.x + dx, s.y + dy));
        }
    }
    best
}
