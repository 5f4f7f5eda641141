//! img2svg: raster image → SVG path outlines.
//!
//! Traces the boundaries of a thresholded image into closed cubic Bezier
//! curves (Potrace-style polygon optimization and curve merging), or stacks
//! several such traces into semi-transparent gray layers that approximate
//! the original tones (posterization).
//!
//! # Example
//!
//! ```no_run
//! use img2svg::{Potrace, TracingConfig};
//!
//! let img = image::open("drawing.png").unwrap().into_rgba8();
//! let mut potrace = Potrace::new(TracingConfig::default())?;
//! potrace.load_image(&img)?;
//! let svg = potrace.get_svg()?;
//! # Ok::<(), img2svg::TraceError>(())
//! ```

#![forbid(unsafe_code)]

pub mod bitmap;
pub mod config;
pub mod error;
pub mod geom;
pub mod histogram;
pub mod posterize;
pub mod potrace;
pub mod render;
pub mod svg;
pub mod vectorize;

// Re-export kurbo so downstream users get the same version used by
// `Curve::to_bezpath`.
pub use kurbo;

pub use bitmap::Bitmap;
pub use config::{
    Color, FillStrategy, GeometryKey, RangeDistribution, Steps, Threshold, TracingConfig, TurnPolicy,
};
pub use error::{TraceError, TraceResult};
pub use histogram::Histogram;
pub use posterize::{ColorStop, PathData, Posterizer};
pub use potrace::Potrace;
pub use vectorize::curve::Curve;
pub use vectorize::CancelToken;

/// Posterized layers of one image plus what a host needs to place them.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedPaths {
    pub width: usize,
    pub height: usize,
    /// Layers are light shapes on a dark background.
    pub dark: bool,
    pub paths: Vec<PathData>,
}

/// Posterize an RGBA buffer into layered path data.
pub fn as_paths(rgba: &[u8], width: usize, height: usize, config: &TracingConfig) -> TraceResult<ProcessedPaths> {
    let mut posterizer = Posterizer::new(config.clone())?;
    posterizer.load_rgba(rgba, width, height)?;
    Ok(ProcessedPaths {
        width,
        height,
        dark: !config.black_on_white,
        paths: posterizer.as_curves()?,
    })
}

/// Trace an RGBA buffer into a single `<path>` element.
pub fn as_path_element(rgba: &[u8], width: usize, height: usize, config: &TracingConfig) -> TraceResult<String> {
    let mut potrace = Potrace::new(config.clone())?;
    potrace.load_rgba(rgba, width, height)?;
    potrace.get_path_tag(None)
}

/// Posterize an RGBA buffer into one `<path>` element per layer.
pub fn as_path_elements(
    rgba: &[u8],
    width: usize,
    height: usize,
    config: &TracingConfig,
) -> TraceResult<Vec<String>> {
    let mut posterizer = Posterizer::new(config.clone())?;
    posterizer.load_rgba(rgba, width, height)?;
    posterizer.path_tags()
}
