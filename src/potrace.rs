//! Single-threshold tracing facade.
//!
//! Holds the luminance map of one loaded image and the curves traced from
//! it. Traced geometry is cached under a `GeometryKey`, so changing a
//! cosmetic option (fill color, background) reuses the cached curves while
//! any geometry-affecting change retraces on the next output call.

use image::RgbaImage;
use log::{debug, trace};

use crate::bitmap::Bitmap;
use crate::config::{GeometryKey, Threshold, TracingConfig};
use crate::error::{TraceError, TraceResult};
use crate::svg;
use crate::vectorize::{self, curve::Curve, CancelToken};

/// Threshold used when automatic selection finds no usable cut.
pub const FALLBACK_THRESHOLD: u8 = 128;

#[derive(Debug, Clone, Default)]
pub struct Potrace {
    config: TracingConfig,
    luminance: Option<Bitmap>,
    cache: Option<(GeometryKey, Vec<Curve>)>,
    cancel: CancelToken,
}

impl Potrace {
    /// Facade with a validated configuration and no image.
    pub fn new(config: TracingConfig) -> TraceResult<Self> {
        config.validate()?;
        Ok(Potrace {
            config,
            ..Self::default()
        })
    }

    /// Attach a cancellation token checked during tracing.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &TracingConfig {
        &self.config
    }

    /// Apply one string-keyed option. On error the configuration is left
    /// unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> TraceResult<()> {
        let mut next = self.config.clone();
        next.set(key, value)?;
        self.set_config(next)
    }

    /// Replace the whole configuration.
    pub fn set_config(&mut self, config: TracingConfig) -> TraceResult<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    // ── Loading ──────────────────────────────────────────

    /// Load a row-major RGBA buffer, replacing any previous image.
    pub fn load_rgba(&mut self, rgba: &[u8], width: usize, height: usize) -> TraceResult<()> {
        let pixels = width as u64 * height as u64;
        if let Some(limit) = self.config.max_pixels {
            if pixels > limit {
                return Err(TraceError::ImageTooLarge { pixels, limit });
            }
        }
        let luminance = Bitmap::from_rgba(rgba, width, height)?;
        debug!("loaded {width}x{height} image");
        self.luminance = Some(luminance);
        self.cache = None;
        Ok(())
    }

    /// Load a decoded image.
    pub fn load_image(&mut self, img: &RgbaImage) -> TraceResult<()> {
        self.load_rgba(img.as_raw(), img.width() as usize, img.height() as usize)
    }

    pub fn is_loaded(&self) -> bool {
        self.luminance.is_some()
    }

    /// Luminance map of the loaded image.
    pub fn luminance(&self) -> TraceResult<&Bitmap> {
        self.luminance.as_ref().ok_or(TraceError::NotLoaded)
    }

    pub fn width(&self) -> TraceResult<usize> {
        Ok(self.luminance()?.width())
    }

    pub fn height(&self) -> TraceResult<usize> {
        Ok(self.luminance()?.height())
    }

    // ── Tracing ──────────────────────────────────────────

    /// The threshold in effect: the configured level, or the histogram's
    /// Otsu cut (128 if the histogram has none).
    pub fn threshold(&self) -> TraceResult<u8> {
        match self.config.threshold {
            Threshold::Level(t) => Ok(t),
            Threshold::Auto => Ok(self
                .luminance()?
                .histogram()
                .auto_threshold(0..=u8::MAX)
                .unwrap_or(FALLBACK_THRESHOLD)),
        }
    }

    /// Binary map traced at the current threshold.
    pub fn binary(&self) -> TraceResult<Bitmap> {
        let threshold = self.threshold()?;
        Ok(self.luminance()?.threshold(threshold as f64, self.config.black_on_white))
    }

    /// Whether curves for the current configuration are cached.
    pub fn is_processed(&self) -> bool {
        let Ok(threshold) = self.threshold() else {
            return false;
        };
        let key = self.config.geometry_key(threshold as f64);
        matches!(&self.cache, Some((k, _)) if *k == key)
    }

    /// Curves at the current threshold, traced on first use.
    pub fn curves(&mut self) -> TraceResult<&[Curve]> {
        let threshold = self.threshold()?;
        self.trace_at(threshold)
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Curves at an explicit threshold, sharing the geometry cache.
    pub(crate) fn trace_at(&mut self, threshold: u8) -> TraceResult<&[Curve]> {
        let key = self.config.geometry_key(threshold as f64);
        let cached = matches!(&self.cache, Some((k, _)) if *k == key);
        if cached {
            trace!("geometry cache hit at threshold {threshold}");
        } else {
            let binary = self.luminance()?.threshold(threshold as f64, self.config.black_on_white);
            let curves = vectorize::trace(&binary, &self.config, &self.cancel)?;
            debug!("threshold {threshold}: {} curves", curves.len());
            self.cache = Some((key, curves));
        }
        Ok(self.cache.as_ref().map(|(_, c)| c.as_slice()).unwrap_or_default())
    }

    // ── Output ───────────────────────────────────────────

    /// Bare path data of all curves.
    pub fn get_path_data(&mut self) -> TraceResult<String> {
        Ok(svg::render_curves(self.curves()?))
    }

    /// One `<path>` element. `fill` overrides the configured color.
    pub fn get_path_tag(&mut self, fill: Option<&str>) -> TraceResult<String> {
        let fill = fill
            .unwrap_or_else(|| self.config.color.resolve(self.config.black_on_white))
            .to_string();
        let d = self.get_path_data()?;
        Ok(svg::path_tag(&d, &fill, None))
    }

    /// Complete SVG document at the image's pixel size.
    pub fn get_svg(&mut self) -> TraceResult<String> {
        let (width, height) = (self.width()?, self.height()?);
        let tag = self.get_path_tag(None)?;
        Ok(svg::svg_document(width, height, self.config.background.as_deref(), &tag))
    }
}
