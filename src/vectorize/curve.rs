//! Corner detection and Bezier curve generation from an optimal polygon.
//!
//! `smooth` classifies every polygon vertex as a corner or a curve by how
//! far it sticks out from the chord of its neighbours, and places cubic
//! control points accordingly. `opti_curve` then merges runs of curve
//! segments into single cubics wherever the merged curve stays within
//! tolerance of the original.

use kurbo::{BezPath, Point, Shape};

use super::polygon::Polygon;
use crate::geom::{bezier, cprod, ddenom, dpara, fsign, interval, iprod, iprod1, tangent};

/// cos(179°): merged runs may not turn through more than this.
const COS179: f64 = -0.999847695156;

/// Control-point clamp range for curve vertices.
const MIN_ALPHA: f64 = 0.55;
const MAX_ALPHA: f64 = 1.0;

/// Weight relating a segment's alpha to the area it adds.
const AREA_RATIO: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Cubic Bezier through `c[0]`, `c[1]` to `c[2]`.
    Curve,
    /// Straight lines to `c[1]` (the vertex), then to `c[2]`.
    Corner,
}

/// One segment of a closed curve. It starts where the previous segment's
/// `c[2]` ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub tag: Tag,
    pub c: [Point; 3],
    pub vertex: Point,
    /// Control-point placement, clamped for curves.
    pub alpha: f64,
    /// Unclamped corner sharpness.
    pub alpha0: f64,
    pub beta: f64,
}

/// A closed sequence of segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub segments: Vec<Segment>,
    /// +1 for outer, -1 for hole.
    pub sign: i8,
}

impl Curve {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Entry point of the first segment, the end of the last one.
    pub fn start(&self) -> Option<Point> {
        self.segments.last().map(|s| s.c[2])
    }

    /// The curve as a closed kurbo path.
    pub fn to_bezpath(&self) -> BezPath {
        let mut path = BezPath::new();
        let Some(start) = self.start() else {
            return path;
        };
        path.move_to(start);
        for seg in &self.segments {
            match seg.tag {
                Tag::Curve => path.curve_to(seg.c[0], seg.c[1], seg.c[2]),
                Tag::Corner => {
                    path.line_to(seg.c[1]);
                    path.line_to(seg.c[2]);
                }
            }
        }
        path.close_path();
        path
    }

    /// Exact signed area enclosed by the curve, control points included.
    ///
    /// In image coordinates (y down) positive = clockwise on screen.
    pub fn signed_area(&self) -> f64 {
        self.to_bezpath().area()
    }
}

// ── Smoothing ────────────────────────────────────────────

/// Tag each polygon vertex and place its control points.
///
/// A vertex whose sharpness reaches `alpha_max` becomes a corner; every
/// other vertex becomes a cubic between the midpoints of its two edges.
pub fn smooth(poly: &Polygon, alpha_max: f64) -> Curve {
    let v = &poly.vertices;
    let m = v.len();

    let segments = (0..m)
        .map(|j| {
            let i = (j + m - 1) % m;
            let k = (j + 1) % m;
            let mid = interval(0.5, v[k], v[j]);

            let denom = ddenom(v[i], v[k]);
            let alpha = if denom != 0.0 {
                let dd = (dpara(v[i], v[j], v[k]) / denom).abs();
                let a = if dd > 1.0 { 1.0 - 1.0 / dd } else { 0.0 };
                a / 0.75
            } else {
                4.0 / 3.0
            };

            if alpha >= alpha_max {
                Segment {
                    tag: Tag::Corner,
                    c: [v[j], v[j], mid],
                    vertex: v[j],
                    alpha,
                    alpha0: alpha,
                    beta: 0.5,
                }
            } else {
                let clamped = alpha.clamp(MIN_ALPHA, MAX_ALPHA);
                let lambda = 0.5 + 0.5 * clamped;
                Segment {
                    tag: Tag::Curve,
                    c: [interval(lambda, v[i], v[j]), interval(lambda, v[k], v[j]), mid],
                    vertex: v[j],
                    alpha: clamped,
                    alpha0: alpha,
                    beta: 0.5,
                }
            }
        })
        .collect();

    Curve {
        segments,
        sign: poly.sign,
    }
}

// ── Curve optimization ───────────────────────────────────

/// A candidate merge of the segments between two vertices.
#[derive(Debug, Clone, Copy)]
struct Opti {
    pen: f64,
    c: [Point; 2],
    t: f64,
    s: f64,
    alpha: f64,
}

/// Merge runs of curve segments into single cubics.
///
/// Dynamic programming over segment boundaries: `len[j]` is the fewest
/// segments covering `0..j`, `pen[j]` the least penalty at that count.
pub fn opti_curve(curve: &Curve, tolerance: f64) -> Curve {
    let m = curve.len();
    if m == 0 {
        return curve.clone();
    }
    let seg = &curve.segments;
    let vertex = |k: usize| seg[k].vertex;
    let end = |k: usize| seg[k].c[2];

    // Convexity of each vertex; 0 marks corners, which never merge.
    let convc: Vec<f64> = (0..m)
        .map(|i| match seg[i].tag {
            Tag::Curve => fsign(dpara(vertex((i + m - 1) % m), vertex(i), vertex((i + 1) % m))),
            Tag::Corner => 0.0,
        })
        .collect();

    // Cumulative area enclosed by the segments, relative to vertex 0.
    let mut areac = vec![0.0; m + 1];
    let mut area = 0.0;
    let p0 = vertex(0);
    for i in 0..m {
        let i1 = (i + 1) % m;
        if seg[i1].tag == Tag::Curve {
            let alpha = seg[i1].alpha;
            area += AREA_RATIO * alpha * (4.0 - alpha) * dpara(end(i), vertex(i1), end(i1)) / 2.0;
            area += dpara(p0, end(i), end(i1)) / 2.0;
        }
        areac[i + 1] = area;
    }

    let mut prev = vec![0usize; m + 1];
    let mut pen = vec![0.0f64; m + 1];
    let mut len = vec![0usize; m + 1];
    let mut opt: Vec<Option<Opti>> = vec![None; m + 1];

    for j in 1..=m {
        prev[j] = j - 1;
        pen[j] = pen[j - 1];
        len[j] = len[j - 1] + 1;

        for i in (0..j.saturating_sub(1)).rev() {
            let Some(o) = opti_penalty(curve, i, j % m, tolerance, &convc, &areac) else {
                break;
            };
            if len[j] > len[i] + 1 || (len[j] == len[i] + 1 && pen[j] > pen[i] + o.pen) {
                prev[j] = i;
                pen[j] = pen[i] + o.pen;
                len[j] = len[i] + 1;
                opt[j] = Some(o);
            }
        }
    }

    let om = len[m];
    let mut out = Vec::with_capacity(om);
    let mut s = Vec::with_capacity(om);
    let mut t = Vec::with_capacity(om);
    let mut j = m;
    while j > 0 {
        let jm = j % m;
        match (prev[j] == j - 1, opt[j]) {
            (false, Some(o)) => {
                out.push(Segment {
                    tag: Tag::Curve,
                    c: [o.c[0], o.c[1], end(jm)],
                    vertex: interval(o.s, end(jm), vertex(jm)),
                    alpha: o.alpha,
                    alpha0: o.alpha,
                    beta: 0.5,
                });
                s.push(o.s);
                t.push(o.t);
            }
            _ => {
                out.push(seg[jm]);
                s.push(1.0);
                t.push(1.0);
            }
        }
        j = prev[j];
    }
    out.reverse();
    s.reverse();
    t.reverse();

    let n = out.len();
    for i in 0..n {
        out[i].beta = s[i] / (s[i] + t[(i + 1) % n]);
    }

    Curve {
        segments: out,
        sign: curve.sign,
    }
}

/// Try to replace segments `i+1..=j` (cyclically) by one cubic from the
/// end of segment `i` to the end of segment `j`. `None` if the merge
/// changes convexity, turns too far, or strays beyond `tolerance`.
fn opti_penalty(curve: &Curve, i: usize, j: usize, tolerance: f64, convc: &[f64], areac: &[f64]) -> Option<Opti> {
    let m = curve.len();
    let seg = &curve.segments;
    let vertex = |k: usize| seg[k].vertex;
    let end = |k: usize| seg[k].c[2];

    if i == j {
        return None;
    }

    let i1 = (i + 1) % m;
    let conv = convc[i1];
    if conv == 0.0 {
        return None;
    }

    // Same convexity throughout, and less than half a turn overall.
    let d = vertex(i).distance(vertex(i1));
    let mut k = i1;
    while k != j {
        let k1 = (k + 1) % m;
        let k2 = (k + 2) % m;
        if convc[k1] != conv {
            return None;
        }
        if fsign(cprod(vertex(i), vertex(i1), vertex(k1), vertex(k2))) != conv {
            return None;
        }
        if iprod1(vertex(i), vertex(i1), vertex(k1), vertex(k2)) < d * vertex(k1).distance(vertex(k2)) * COS179 {
            return None;
        }
        k = k1;
    }

    let p0 = end(i);
    let p1 = vertex(i1);
    let p2 = vertex(j);
    let p3 = end(j);

    // Area the merged curve has to enclose.
    let mut area = areac[j] - areac[i];
    area -= dpara(vertex(0), end(i), end(j)) / 2.0;
    if i >= j {
        area += areac[m];
    }

    // Intersect the tangent lines at p0 and p3 to frame the new control
    // points, then size them to match the area.
    let a1 = dpara(p0, p1, p2);
    let a2 = dpara(p0, p1, p3);
    let a3 = dpara(p0, p2, p3);
    let a4 = a1 + a3 - a2;
    if a2 == a1 {
        return None;
    }

    let t = a3 / (a3 - a4);
    let s = a2 / (a2 - a1);
    let frame = a2 * t / 2.0;
    if frame == 0.0 {
        return None;
    }

    let r = area / frame;
    let alpha = 2.0 - (4.0 - r / AREA_RATIO).sqrt();
    if !alpha.is_finite() {
        return None;
    }

    let c = [interval(t * alpha, p0, p1), interval(s * alpha, p3, p2)];
    let (p1, p2) = (c[0], c[1]);
    let mut pen = 0.0;

    // Every polygon edge must have a parallel tangent close to it.
    let mut k = i1;
    while k != j {
        let k1 = (k + 1) % m;
        let tt = tangent(p0, p1, p2, p3, vertex(k), vertex(k1))?;
        let pt = bezier(tt, p0, p1, p2, p3);
        let d = vertex(k).distance(vertex(k1));
        if d == 0.0 {
            return None;
        }
        let d1 = dpara(vertex(k), vertex(k1), pt) / d;
        if d1.abs() > tolerance {
            return None;
        }
        if iprod(vertex(k), vertex(k1), pt) < 0.0 || iprod(vertex(k1), vertex(k), pt) < 0.0 {
            return None;
        }
        pen += d1 * d1;
        k = k1;
    }

    // The merged curve must not cut inside the segments it replaces.
    let mut k = i;
    while k != j {
        let k1 = (k + 1) % m;
        let tt = tangent(p0, p1, p2, p3, end(k), end(k1))?;
        let pt = bezier(tt, p0, p1, p2, p3);
        let d = end(k).distance(end(k1));
        if d == 0.0 {
            return None;
        }
        let mut d1 = dpara(end(k), end(k1), pt) / d;
        let mut d2 = dpara(end(k), end(k1), vertex(k1)) / d * 0.75 * seg[k1].alpha;
        if d2 < 0.0 {
            d1 = -d1;
            d2 = -d2;
        }
        if d1 < d2 - tolerance {
            return None;
        }
        if d1 < d2 {
            pen += (d1 - d2) * (d1 - d2);
        }
        k = k1;
    }

    Some(Opti { pen, c, t, s, alpha })
}
