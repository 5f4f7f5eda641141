//! Vectorization pipeline: binary bitmap → closed Bezier curves.
//!
//! 1. Boundary extraction on the pixel-corner grid
//! 2. Optimal polygon approximation (DP) and sub-pixel vertex refinement
//! 3. Alpha-based corner detection and control-point placement
//! 4. Optional merging of smooth runs into fewer cubics

pub mod curve;
pub mod decompose;
pub mod polygon;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use crate::bitmap::Bitmap;
use crate::config::TracingConfig;
use crate::error::{TraceError, TraceResult};

use curve::Curve;
use decompose::Path;

/// Cooperative cancellation flag, checked before each level and each path.
///
/// Clones share the flag, so a token handed to a facade can be cancelled
/// from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once `cancel` has been called.
    pub fn check(&self) -> TraceResult<()> {
        if self.is_cancelled() {
            Err(TraceError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Trace every boundary of a binary bitmap into a curve.
///
/// Curves come back in discovery order. Curve optimization is the
/// expensive part, so paths are processed in parallel.
pub fn trace(binary: &Bitmap, config: &TracingConfig, cancel: &CancelToken) -> TraceResult<Vec<Curve>> {
    cancel.check()?;
    let paths = decompose::decompose(binary, config.turn_policy, config.turd_size);

    let curves = paths
        .par_iter()
        .map(|path| {
            cancel.check()?;
            Ok(path_to_curve(path, config))
        })
        .collect::<TraceResult<Vec<_>>>()?;

    debug!(
        "traced {} paths into {} segments",
        curves.len(),
        curves.iter().map(Curve::len).sum::<usize>()
    );
    Ok(curves)
}

/// Polygon, smoothing and (optionally) curve merging for one path.
pub fn path_to_curve(path: &Path, config: &TracingConfig) -> Curve {
    let poly = polygon::optimal_polygon(path);
    let smoothed = curve::smooth(&poly, config.alpha_max);
    if config.opt_curve {
        curve::opti_curve(&smoothed, config.opt_tolerance)
    } else {
        smoothed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_bitmap(size: usize, margin: usize) -> Bitmap {
        let mut bm = Bitmap::new(size, size);
        for y in margin..size - margin {
            for x in margin..size - margin {
                bm.set(x as i32, y as i32, 1);
            }
        }
        bm
    }

    #[test]
    fn square_traces_to_one_closed_curve() {
        let bm = square_bitmap(12, 3);
        let curves = trace(&bm, &TracingConfig::default(), &CancelToken::new()).unwrap();
        assert_eq!(curves.len(), 1);
        assert!((curves[0].signed_area().abs() - 36.0).abs() < 4.0);
    }

    #[test]
    fn holes_wind_against_outer_boundaries() {
        let mut bm = square_bitmap(20, 2);
        for y in 7..13 {
            for x in 7..13 {
                bm.set(x, y, 0);
            }
        }
        let curves = trace(&bm, &TracingConfig::default(), &CancelToken::new()).unwrap();
        assert_eq!(curves.len(), 2);
        assert_eq!((curves[0].sign, curves[1].sign), (1, -1));
        let (a, b) = (curves[0].signed_area(), curves[1].signed_area());
        assert!(a * b < 0.0, "outer {a}, hole {b}");
    }

    #[test]
    fn cancelled_token_stops_tracing() {
        let token = CancelToken::new();
        let shared = token.clone();
        shared.cancel();
        assert!(token.is_cancelled());
        let err = trace(&square_bitmap(8, 2), &TracingConfig::default(), &token).unwrap_err();
        assert!(matches!(err, TraceError::Cancelled));
    }

    #[test]
    fn opt_curve_never_adds_segments() {
        let mut bm = Bitmap::new(30, 30);
        for y in 0..30 {
            for x in 0..30 {
                let (dx, dy) = (x as f64 - 14.5, y as f64 - 14.5);
                if dx * dx + dy * dy < 144.0 {
                    bm.set(x, y, 1);
                }
            }
        }
        let plain = TracingConfig {
            opt_curve: false,
            ..TracingConfig::default()
        };
        let token = CancelToken::new();
        let raw = trace(&bm, &plain, &token).unwrap();
        let opt = trace(&bm, &TracingConfig::default(), &token).unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(opt.len(), 1);
        assert!(opt[0].len() <= raw[0].len());
    }
}
