//! Shared geometry utilities.
//!
//! Lattice points produced by the tracer are `(i32, i32)` pixel corners;
//! everything after vertex adjustment uses real-valued `kurbo::Point`s.

use kurbo::{CubicBez, ParamCurve};

pub use kurbo::Point;

/// A point on the pixel-corner lattice.
pub type IPoint = (i32, i32);

// ── Integer helpers ──────────────────────────────────────

/// Integer cross product.
pub fn xprod(a: IPoint, b: IPoint) -> i64 {
    a.0 as i64 * b.1 as i64 - a.1 as i64 * b.0 as i64
}

/// Sign function: -1, 0, or 1.
pub fn sign(x: i32) -> i32 {
    x.signum()
}

/// Sign function for f64 (0 stays 0).
pub fn fsign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Proper modulo: result always in `0..n`.
pub fn pmod(a: i64, n: usize) -> usize {
    a.rem_euclid(n as i64) as usize
}

/// Floor division (rounds toward negative infinity). `b` must be positive.
pub fn floordiv(a: i64, b: i64) -> i64 {
    if a >= 0 {
        a / b
    } else {
        -1 - (-1 - a) / b
    }
}

/// Is `b` in the cyclic half-open interval `[a, c)`?
pub fn cyclic(a: usize, b: usize, c: usize) -> bool {
    if a <= c {
        a <= b && b < c
    } else {
        a <= b || b < c
    }
}

// ── Real-valued products ─────────────────────────────────

/// Cross product of (p1 - p0) and (p2 - p0): twice the signed triangle area.
pub fn dpara(p0: Point, p1: Point, p2: Point) -> f64 {
    (p1 - p0).cross(p2 - p0)
}

/// Cross product of (p1 - p0) and (p3 - p2).
pub fn cprod(p0: Point, p1: Point, p2: Point, p3: Point) -> f64 {
    (p1 - p0).cross(p3 - p2)
}

/// Inner product of (p1 - p0) and (p2 - p0).
pub fn iprod(p0: Point, p1: Point, p2: Point) -> f64 {
    (p1 - p0).dot(p2 - p0)
}

/// Inner product of (p1 - p0) and (p3 - p2).
pub fn iprod1(p0: Point, p1: Point, p2: Point, p3: Point) -> f64 {
    (p1 - p0).dot(p3 - p2)
}

/// Direction from p0 to p2 rotated 90 degrees and snapped to the
/// L-infinity unit square.
fn dorth_infty(p0: Point, p2: Point) -> (f64, f64) {
    (-fsign(p2.y - p0.y), fsign(p2.x - p0.x))
}

/// Denominator for the corner-sharpness ratio of the triple (p0, _, p2).
pub fn ddenom(p0: Point, p2: Point) -> f64 {
    let (rx, ry) = dorth_infty(p0, p2);
    ry * (p2.x - p0.x) - rx * (p2.y - p0.y)
}

/// Point at fraction `lambda` of the way from `a` to `b`.
pub fn interval(lambda: f64, a: Point, b: Point) -> Point {
    a.lerp(b, lambda)
}

/// Evaluate a cubic Bezier at `t`.
pub fn bezier(t: f64, p0: Point, p1: Point, p2: Point, p3: Point) -> Point {
    CubicBez::new(p0, p1, p2, p3).eval(t)
}

/// Parameter `t` in [0, 1] at which the cubic (p0..p3) has a tangent
/// parallel to the segment q0→q1, or `None` if there is none.
pub fn tangent(p0: Point, p1: Point, p2: Point, p3: Point, q0: Point, q1: Point) -> Option<f64> {
    let a0 = cprod(p0, p1, q0, q1);
    let b0 = cprod(p1, p2, q0, q1);
    let c0 = cprod(p2, p3, q0, q1);

    let a = a0 - 2.0 * b0 + c0;
    let b = -2.0 * a0 + 2.0 * b0;
    let c = a0;

    let d = b * b - 4.0 * a * c;
    if a == 0.0 || d < 0.0 {
        return None;
    }

    let s = d.sqrt();
    let r1 = (-b + s) / (2.0 * a);
    let r2 = (-b - s) / (2.0 * a);
    if (0.0..=1.0).contains(&r1) {
        Some(r1)
    } else if (0.0..=1.0).contains(&r2) {
        Some(r2)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modulo_and_floor_division_round_down() {
        assert_eq!(pmod(-1, 5), 4);
        assert_eq!(pmod(7, 5), 2);
        assert_eq!(floordiv(-3, 2), -2);
        assert_eq!(floordiv(3, 2), 1);
        assert_eq!(floordiv(-4, 2), -2);
    }

    #[test]
    fn cyclic_interval_wraps() {
        assert!(cyclic(2, 3, 5));
        assert!(!cyclic(2, 5, 5));
        assert!(cyclic(5, 0, 2));
        assert!(cyclic(5, 6, 2));
        assert!(!cyclic(5, 3, 2));
    }

    #[test]
    fn tangent_finds_parallel_direction() {
        // Lopsided arch: y'(t) = 2(1-t)^2 - 2t(1-t) - t^2 vanishes at 1 - 1/sqrt(3).
        let p0 = Point::new(0.0, 0.0);
        let p1 = Point::new(0.0, 2.0);
        let p2 = Point::new(3.0, 1.0);
        let p3 = Point::new(3.0, 0.0);
        let t = tangent(p0, p1, p2, p3, Point::new(0.0, 5.0), Point::new(1.0, 5.0)).unwrap();
        assert!((t - (1.0 - 1.0 / 3f64.sqrt())).abs() < 1e-12);

        // A symmetric arch degenerates to a linear equation and is rejected.
        let q2 = Point::new(2.0, 2.0);
        let q3 = Point::new(2.0, 0.0);
        assert_eq!(tangent(p0, p1, q2, q3, Point::new(0.0, 5.0), Point::new(1.0, 5.0)), None);
    }

    #[test]
    fn ddenom_uses_snapped_normal() {
        let d = ddenom(Point::new(0.0, 0.0), Point::new(3.0, 1.0));
        // r = (-1, 1): 1 * 3 - (-1) * 1
        assert_eq!(d, 4.0);
    }
}
