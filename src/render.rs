//! Raster verification of traced curves.
//!
//! Re-rasterizes curves with tiny-skia at source resolution (even-odd, no
//! anti-aliasing) and compares the covered pixels against the binary
//! bitmap they were traced from.

use std::path::Path;

use kurbo::{BezPath, PathEl};
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, PremultipliedColorU8, Transform};

use crate::bitmap::Bitmap;
use crate::error::{TraceError, TraceResult};
use crate::vectorize::curve::Curve;

/// Pixel agreement between a trace and its source bitmap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterComparison {
    /// Intersection over union of covered pixels. 1.0 when both are empty.
    pub iou: f64,
    pub overlap_px: u64,
    pub traced_px: u64,
    pub source_px: u64,
}

/// Convert a kurbo `BezPath` to a `tiny_skia::Path`.
fn kurbo_to_tinyskia(bezpath: &BezPath) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    for el in bezpath.elements() {
        match *el {
            PathEl::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => pb.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(c, p) => pb.quad_to(c.x as f32, c.y as f32, p.x as f32, p.y as f32),
            PathEl::CurveTo(c1, c2, p) => pb.cubic_to(
                c1.x as f32,
                c1.y as f32,
                c2.x as f32,
                c2.y as f32,
                p.x as f32,
                p.y as f32,
            ),
            PathEl::ClosePath => pb.close(),
        }
    }
    pb.finish()
}

/// Coverage mask of `curves` on a `width`×`height` grid.
///
/// All curves go into one path so the even-odd rule cuts holes.
pub fn rasterize(curves: &[Curve], width: usize, height: usize) -> Vec<bool> {
    let mut mask = vec![false; width * height];
    let Some(mut pixmap) = Pixmap::new(width as u32, height as u32) else {
        return mask;
    };
    pixmap.fill(Color::WHITE);

    let mut combined = BezPath::new();
    for curve in curves {
        for el in curve.to_bezpath().elements() {
            combined.push(*el);
        }
    }
    let mut paint = Paint::default();
    paint.set_color(Color::BLACK);
    paint.anti_alias = false;
    if let Some(path) = kurbo_to_tinyskia(&combined) {
        pixmap.fill_path(&path, &paint, FillRule::EvenOdd, Transform::identity(), None);
    }

    for (covered, px) in mask.iter_mut().zip(pixmap.pixels()) {
        *covered = px.red() < 128;
    }
    mask
}

/// Compare a trace with the binary bitmap it came from.
pub fn raster_compare(curves: &[Curve], binary: &Bitmap) -> RasterComparison {
    let traced = rasterize(curves, binary.width(), binary.height());
    let (mut overlap_px, mut traced_px, mut source_px) = (0u64, 0u64, 0u64);
    for (&t, &s) in traced.iter().zip(binary.data()) {
        let s = s != 0;
        traced_px += u64::from(t);
        source_px += u64::from(s);
        overlap_px += u64::from(t && s);
    }
    let union = traced_px + source_px - overlap_px;
    let iou = if union == 0 {
        1.0
    } else {
        overlap_px as f64 / union as f64
    };
    RasterComparison {
        iou,
        overlap_px,
        traced_px,
        source_px,
    }
}

/// Write a diff image: green where both agree, red where only the trace
/// covers, blue where only the source does.
pub fn write_diff_png(curves: &[Curve], binary: &Bitmap, output: &Path) -> TraceResult<()> {
    let (w, h) = (binary.width(), binary.height());
    let traced = rasterize(curves, w, h);
    let Some(mut diff) = Pixmap::new(w as u32, h as u32) else {
        return Err(TraceError::Io(std::io::Error::other("cannot write an empty diff image")));
    };
    diff.fill(Color::WHITE);

    let both = PremultipliedColorU8::from_rgba(0, 128, 0, 255);
    let traced_only = PremultipliedColorU8::from_rgba(255, 0, 0, 255);
    let source_only = PremultipliedColorU8::from_rgba(0, 0, 255, 255);
    for ((px, &t), &s) in diff.pixels_mut().iter_mut().zip(&traced).zip(binary.data()) {
        let color = match (t, s != 0) {
            (true, true) => both,
            (true, false) => traced_only,
            (false, true) => source_only,
            (false, false) => continue,
        };
        if let Some(color) = color {
            *px = color;
        }
    }
    diff.save_png(output)
        .map_err(|e| TraceError::Io(std::io::Error::other(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TracingConfig;
    use crate::vectorize::{self, CancelToken};

    fn trace(bm: &Bitmap, config: &TracingConfig) -> Vec<Curve> {
        vectorize::trace(bm, config, &CancelToken::new()).unwrap()
    }

    fn rect(w: usize, h: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> Bitmap {
        let mut bm = Bitmap::new(w, h);
        for y in y0..y1 {
            for x in x0..x1 {
                bm.set(x as i32, y as i32, 1);
            }
        }
        bm
    }

    #[test]
    fn sharp_rectangle_matches_exactly() {
        let bm = rect(24, 20, 4, 4, 18, 14);
        let curves = trace(&bm, &TracingConfig::default());
        let cmp = raster_compare(&curves, &bm);
        assert_eq!(cmp.source_px, 140);
        assert_eq!(cmp.traced_px, 140);
        assert_eq!(cmp.iou, 1.0);
    }

    #[test]
    fn holes_stay_uncovered() {
        let mut bm = rect(30, 30, 3, 3, 27, 27);
        for y in 10..20 {
            for x in 10..20 {
                bm.set(x, y, 0);
            }
        }
        let curves = trace(&bm, &TracingConfig::default());
        let mask = rasterize(&curves, 30, 30);
        assert!(!mask[15 * 30 + 15]);
        assert!(mask[5 * 30 + 5]);
        assert!(raster_compare(&curves, &bm).iou > 0.97);
    }

    #[test]
    fn disc_traces_closely() {
        let mut bm = Bitmap::new(40, 40);
        for y in 0..40 {
            for x in 0..40 {
                let (dx, dy) = (x as f64 - 19.5, y as f64 - 19.5);
                if dx * dx + dy * dy < 225.0 {
                    bm.set(x, y, 1);
                }
            }
        }
        let curves = trace(&bm, &TracingConfig::default());
        let cmp = raster_compare(&curves, &bm);
        assert!(cmp.iou > 0.95, "{cmp:?}");
    }

    #[test]
    fn empty_inputs_agree() {
        let bm = Bitmap::new(8, 8);
        let cmp = raster_compare(&[], &bm);
        assert_eq!(cmp.iou, 1.0);
        assert_eq!(raster_compare(&[], &Bitmap::new(0, 0)).traced_px, 0);
    }
}
