//! SVG output: path data, `<path>` tags and whole documents.
//!
//! Numbers are printed with three decimals, dropping a `.000` tail, so
//! lattice-aligned output stays compact (`M 3 4 L 3 10 ...`).

use std::fmt::Write;

use crate::vectorize::curve::{Curve, Tag};

/// Format a coordinate with at most three decimals.
pub fn fixed(v: f64) -> String {
    let s = format!("{v:.3}").replacen(".000", "", 1);
    if s == "-0" {
        "0".to_string()
    } else {
        s
    }
}

/// Path data for one closed curve, absolute commands only.
///
/// Curves become `C x y, x y, x y`; corners become `L x y x y` (the
/// vertex, then the next edge midpoint).
pub fn render_curve(curve: &Curve) -> String {
    let Some(start) = curve.start() else {
        return String::new();
    };
    let mut d = String::new();
    // Writing to a String cannot fail.
    let _ = write!(d, "M {} {} ", fixed(start.x), fixed(start.y));
    for seg in &curve.segments {
        let [c0, c1, c2] = seg.c;
        let _ = match seg.tag {
            Tag::Curve => write!(
                d,
                "C {} {}, {} {}, {} {} ",
                fixed(c0.x),
                fixed(c0.y),
                fixed(c1.x),
                fixed(c1.y),
                fixed(c2.x),
                fixed(c2.y)
            ),
            Tag::Corner => write!(
                d,
                "L {} {} {} {} ",
                fixed(c1.x),
                fixed(c1.y),
                fixed(c2.x),
                fixed(c2.y)
            ),
        };
    }
    d
}

/// Path data of several curves joined into one string.
pub fn render_curves(curves: &[Curve]) -> String {
    curves.iter().map(render_curve).collect()
}

/// A `<path>` element filled even-odd so holes stay open.
pub fn path_tag(d: &str, fill: &str, opacity: Option<f64>) -> String {
    match opacity {
        Some(o) => format!(
            r#"<path d="{d}" style="fill-rule:evenodd" fill="{fill}" fill-opacity="{o:.3}"/>"#
        ),
        None => format!(r#"<path d="{d}" style="fill-rule:evenodd" fill="{fill}"/>"#),
    }
}

/// A complete SVG document of the given pixel size wrapping `body`.
pub fn svg_document(width: usize, height: usize, background: Option<&str>, body: &str) -> String {
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" version="1.1">"#
    );
    if let Some(bg) = background {
        let _ = writeln!(svg, r#"<rect x="0" y="0" width="100%" height="100%" fill="{bg}"/>"#);
    }
    svg.push_str(body);
    if !body.is_empty() && !body.ends_with('\n') {
        svg.push('\n');
    }
    svg.push_str("</svg>\n");
    svg
}
