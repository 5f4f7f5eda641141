//! Posterization: a stack of flat gray layers approximating an image.
//!
//! Each layer is a single-threshold trace. Its tone comes from the
//! histogram slice between its threshold and the next one, and its opacity
//! is the share of still unrevealed tone it adds, so the layers painted in
//! order composite to the intended grays.

use image::RgbaImage;
use log::debug;

use crate::config::{FillStrategy, RangeDistribution, Steps, Threshold, TracingConfig};
use crate::error::TraceResult;
use crate::histogram::Histogram;
use crate::potrace::{Potrace, FALLBACK_THRESHOLD};
use crate::svg;
use crate::vectorize::CancelToken;

const RGB_MAX: f64 = 255.0;
/// Above this many levels on the traced side, `steps: auto` uses 4 layers.
const BRIGHTNESS_STEPS_LIMIT: usize = 200;
/// Stacks of at least this many layers get one extra near-saturated stop.
const EXTRA_STOP_MIN_RANGES: usize = 10;
/// Width (in levels) of the extra stop's target band.
const LEVEL_STEP: f64 = 25.0;
/// Fraction of a range kept free between neighboring layer tones.
const STEP_SCALE: f64 = 0.1;

/// One layer: its trace threshold and its tone as a 0..=1 intensity
/// (1 = fully saturated toward the traced side).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub value: u8,
    pub intensity: f64,
}

/// Path data of one emitted layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PathData {
    pub d: String,
    /// Rounded to three decimals.
    pub fill_opacity: f64,
}

/// A traced, non-empty layer.
#[derive(Debug, Clone)]
struct Layer {
    stop: ColorStop,
    opacity: f64,
    d: String,
}

#[derive(Debug, Clone, Default)]
pub struct Posterizer {
    potrace: Potrace,
}

impl Posterizer {
    pub fn new(config: TracingConfig) -> TraceResult<Self> {
        Ok(Posterizer {
            potrace: Potrace::new(config)?,
        })
    }

    /// Attach a cancellation token, checked before every layer.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.potrace = self.potrace.with_cancel_token(cancel);
        self
    }

    pub fn config(&self) -> &TracingConfig {
        self.potrace.config()
    }

    pub fn set(&mut self, key: &str, value: &str) -> TraceResult<()> {
        self.potrace.set(key, value)
    }

    pub fn set_config(&mut self, config: TracingConfig) -> TraceResult<()> {
        self.potrace.set_config(config)
    }

    pub fn load_rgba(&mut self, rgba: &[u8], width: usize, height: usize) -> TraceResult<()> {
        self.potrace.load_rgba(rgba, width, height)
    }

    pub fn load_image(&mut self, img: &RgbaImage) -> TraceResult<()> {
        self.potrace.load_image(img)
    }

    pub fn width(&self) -> TraceResult<usize> {
        self.potrace.width()
    }

    pub fn height(&self) -> TraceResult<usize> {
        self.potrace.height()
    }

    fn histogram(&self) -> TraceResult<&Histogram> {
        Ok(self.potrace.luminance()?.histogram())
    }

    fn black_on_white(&self) -> bool {
        self.config().black_on_white
    }

    // ── Ranges ───────────────────────────────────────────

    /// Main threshold: the configured level, or the upper (dark-on-light)
    /// or lower (light-on-dark) cut of a two-cut thresholding.
    pub fn threshold(&self) -> TraceResult<u8> {
        match self.config().threshold {
            Threshold::Level(t) => Ok(t),
            Threshold::Auto => {
                let cuts = self.histogram()?.multilevel_thresholding(2, 0..=u8::MAX);
                let cut = if self.black_on_white() {
                    cuts.get(1)
                } else {
                    cuts.first()
                };
                Ok(cut.copied().unwrap_or(FALLBACK_THRESHOLD))
            }
        }
    }

    /// Number of layers for count-based steps.
    fn step_count(&self, threshold: u8) -> usize {
        let colors = self.traced_levels(threshold);
        match &self.config().steps {
            Steps::Levels(levels) => levels.len(),
            Steps::Auto if self.config().threshold == Threshold::Auto => 4,
            Steps::Auto if colors > BRIGHTNESS_STEPS_LIMIT => 4,
            Steps::Auto => 3,
            Steps::Count(n) => colors.min((*n as usize).max(2)),
        }
    }

    /// Levels between the saturated end and the main threshold.
    fn traced_levels(&self, threshold: u8) -> usize {
        if self.black_on_white() {
            threshold as usize
        } else {
            (u8::MAX - threshold) as usize
        }
    }

    /// Layer thresholds with their tones, largest region first.
    pub fn ranges(&self) -> TraceResult<Vec<ColorStop>> {
        let threshold = self.threshold()?;
        let stops = match &self.config().steps {
            Steps::Levels(levels) => self.explicit_stops(levels, threshold),
            _ => {
                let count = self.step_count(threshold);
                match self.config().range_distribution {
                    RangeDistribution::Auto => self.auto_stops(count, threshold)?,
                    RangeDistribution::Equal => self.equal_stops(count, threshold),
                }
            }
        };
        let mut ranges = self.color_intensities(&stops, threshold)?;
        if ranges.len() >= EXTRA_STOP_MIN_RANGES {
            self.add_extra_stop(&mut ranges)?;
        }
        Ok(ranges)
    }

    /// Deduplicated explicit levels, sorted from the largest traced region
    /// to the smallest. The main threshold leads when every level traces
    /// less than it does.
    fn explicit_stops(&self, levels: &[u8], threshold: u8) -> Vec<u8> {
        let mut stops: Vec<u8> = Vec::with_capacity(levels.len() + 1);
        for &level in levels {
            if !stops.contains(&level) {
                stops.push(level);
            }
        }
        if stops.is_empty() {
            stops.push(threshold);
        }
        if self.black_on_white() {
            stops.sort_unstable_by(|a, b| b.cmp(a));
            if stops[0] < threshold {
                stops.insert(0, threshold);
            }
        } else {
            stops.sort_unstable();
            if stops[0] > threshold {
                stops.insert(0, threshold);
            }
        }
        stops
    }

    /// Stops placed by multilevel thresholding.
    fn auto_stops(&self, count: usize, threshold: u8) -> TraceResult<Vec<u8>> {
        let histogram = self.histogram()?;
        let bow = self.black_on_white();
        let mut stops = if self.config().threshold == Threshold::Auto {
            histogram.multilevel_thresholding(count, 0..=u8::MAX)
        } else if bow {
            let mut stops = histogram.multilevel_thresholding(count.saturating_sub(1), 0..=threshold);
            stops.push(threshold);
            stops
        } else {
            let mut stops = vec![threshold];
            stops.extend(histogram.multilevel_thresholding(count.saturating_sub(1), threshold..=u8::MAX));
            stops
        };
        stops.dedup();
        if bow {
            stops.reverse();
        }
        Ok(stops)
    }

    /// Stops splitting the traced side of the main threshold evenly.
    fn equal_stops(&self, count: usize, threshold: u8) -> Vec<u8> {
        if count == 0 {
            return Vec::new();
        }
        let bow = self.black_on_white();
        let colors = self.traced_levels(threshold) as f64;
        let step = colors / count as f64;
        let mut stops: Vec<u8> = (0..count)
            .rev()
            .map(|i| {
                let t = colors.min((i + 1) as f64 * step);
                // Rounded toward the traced side so the binarization matches
                // the fractional cut.
                if bow {
                    t.floor() as u8
                } else {
                    (RGB_MAX - t).ceil() as u8
                }
            })
            .collect();
        stops.dedup();
        stops
    }

    /// Tone of every stop from the histogram slice it covers.
    fn color_intensities(&self, stops: &[u8], threshold: u8) -> TraceResult<Vec<ColorStop>> {
        let histogram = self.histogram()?;
        let bow = self.black_on_white();
        let full_range = self.traced_levels(threshold) as f64;
        let n = stops.len();

        Ok(stops
            .iter()
            .enumerate()
            .map(|(index, &value)| {
                let next = match stops.get(index + 1) {
                    Some(&next) => next as i32,
                    None if bow => -1,
                    None => 256,
                };
                let (start, end) = if bow {
                    (next + 1, value as i32)
                } else {
                    (value as i32, next - 1)
                };
                let factor = if n > 1 {
                    index as f64 / (n - 1) as f64
                } else {
                    0.0
                };
                let intensity = self.slice_intensity(histogram, start, end, index, factor, full_range);
                ColorStop { value, intensity }
            })
            .collect())
    }

    fn slice_intensity(
        &self,
        histogram: &Histogram,
        start: i32,
        end: i32,
        index: usize,
        factor: f64,
        full_range: f64,
    ) -> f64 {
        if start > end || start < 0 || end > u8::MAX as i32 {
            return 0.0;
        }
        let range = start as u8..=end as u8;
        let stats = histogram.stats(range.clone());
        if stats.pixels == 0 {
            return 0.0;
        }
        let bow = self.black_on_white();
        let interval = (end - start) as f64;

        let color = match self.config().fill_strategy {
            FillStrategy::Spread => {
                // Saturated end of the range, moving inward with the layer index.
                let (edge, dir) = if bow { (start, 1.0) } else { (end, -1.0) };
                Some(edge as f64 + dir * interval * (full_range / RGB_MAX).max(0.5) * factor)
            }
            FillStrategy::Dominant => histogram
                .dominant_color(range, (end - start).clamp(1, 5) as u8)
                .map(f64::from),
            FillStrategy::Mean => Some(stats.levels.mean),
            FillStrategy::Median => Some(stats.levels.median),
        };
        let Some(mut color) = color else {
            return 0.0;
        };

        if index != 0 {
            let nudge = (interval * STEP_SCALE).round();
            color = if bow {
                color.max(start as f64).min(end as f64 - nudge)
            } else {
                color.max(start as f64 + nudge).min(end as f64)
            };
        }
        intensity_of(color, bow)
    }

    /// Append a stop inside the last (most saturated) range when that range
    /// is wide and not already fully saturated.
    fn add_extra_stop(&self, ranges: &mut Vec<ColorStop>) -> TraceResult<()> {
        let Some(last) = ranges.last().copied() else {
            return Ok(());
        };
        let bow = self.black_on_white();
        let (from, to) = if bow {
            (0, last.value)
        } else {
            (last.value, u8::MAX)
        };
        if f64::from(to - from) <= LEVEL_STEP || last.intensity == 1.0 {
            return Ok(());
        }

        let histogram = self.histogram()?;
        let levels = histogram.stats(from..=to).levels;
        if levels.mean.is_nan() {
            return Ok(());
        }
        // Distances from the saturated end.
        let mean = if bow { levels.mean } else { RGB_MAX - levels.mean };
        let distance = if mean + levels.std_dev <= LEVEL_STEP {
            mean + levels.std_dev
        } else if mean - levels.std_dev <= LEVEL_STEP {
            mean - levels.std_dev
        } else {
            LEVEL_STEP
        };
        let distance = distance.clamp(0.0, RGB_MAX).round() as u8;

        let value = if bow { distance } else { u8::MAX - distance };
        let stats = if bow {
            histogram.stats(0..=value)
        } else {
            histogram.stats(value..=u8::MAX)
        };
        let color = stats.levels.mean;
        let intensity = if color.is_nan() {
            0.0
        } else {
            intensity_of(color, bow)
        };
        debug!("extra color stop at {value} (intensity {intensity:.3})");
        ranges.push(ColorStop { value, intensity });
        Ok(())
    }

    // ── Layers ───────────────────────────────────────────

    fn layers(&mut self) -> TraceResult<Vec<Layer>> {
        let ranges = self.ranges()?;
        let mut revealed = 0.0;
        let mut layers = Vec::with_capacity(ranges.len());

        for stop in ranges {
            self.potrace.cancel_token().check()?;
            if stop.intensity == 0.0 {
                continue;
            }
            let opacity = layer_opacity(revealed, stop.intensity);
            revealed += (1.0 - revealed) * opacity;
            if opacity == 0.0 {
                continue;
            }
            let d = svg::render_curves(self.potrace.trace_at(stop.value)?);
            if d.is_empty() {
                debug!("layer at {} is empty", stop.value);
                continue;
            }
            debug!("layer at {}: opacity {opacity:.3}", stop.value);
            layers.push(Layer { stop, opacity, d });
        }
        Ok(layers)
    }

    /// Path data and opacity of every visible layer, painted in order.
    pub fn as_curves(&mut self) -> TraceResult<Vec<PathData>> {
        Ok(self
            .layers()?
            .into_iter()
            .map(|layer| PathData {
                d: layer.d,
                fill_opacity: layer.opacity,
            })
            .collect())
    }

    /// One `<path>` tag per visible layer, filled with the layer's gray.
    pub fn path_tags(&mut self) -> TraceResult<Vec<String>> {
        let bow = self.black_on_white();
        Ok(self
            .layers()?
            .iter()
            .map(|layer| {
                let c = layer_gray(layer.stop.intensity, bow);
                svg::path_tag(&layer.d, &format!("rgb({c}, {c}, {c})"), Some(layer.opacity))
            })
            .collect())
    }

    /// Layered SVG document at the image's pixel size.
    pub fn get_svg(&mut self) -> TraceResult<String> {
        let (width, height) = (self.width()?, self.height()?);
        let tags = self.path_tags()?;
        let mut body = tags.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        Ok(svg::svg_document(width, height, self.config().background.as_deref(), &body))
    }
}

/// Level → 0..=1 saturation toward the traced side.
fn intensity_of(color: f64, black_on_white: bool) -> f64 {
    if black_on_white {
        (RGB_MAX - color) / RGB_MAX
    } else {
        color / RGB_MAX
    }
}

/// Opacity that brings a stack already showing `revealed` of full tone up
/// to `intensity`, rounded to three decimals.
fn layer_opacity(revealed: f64, intensity: f64) -> f64 {
    let raw = if revealed == 0.0 || intensity == 1.0 {
        intensity
    } else {
        (revealed - intensity) / (revealed - 1.0)
    };
    ((raw * 1000.0).round() / 1000.0).clamp(0.0, 1.0)
}

/// Gray level of a layer's fill.
fn layer_gray(intensity: f64, black_on_white: bool) -> u8 {
    let edge = if black_on_white { RGB_MAX } else { 0.0 };
    (edge - RGB_MAX * intensity).abs().round().clamp(0.0, RGB_MAX) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Horizontal gray ramp: column `x` has level `x`.
    fn gradient() -> (Vec<u8>, usize, usize) {
        let (w, h) = (256, 2);
        let mut rgba = Vec::with_capacity(w * h * 4);
        for _ in 0..h {
            for x in 0..w {
                rgba.extend_from_slice(&[x as u8, x as u8, x as u8, 255]);
            }
        }
        (rgba, w, h)
    }

    fn posterizer(config: TracingConfig) -> Posterizer {
        let (rgba, w, h) = gradient();
        let mut p = Posterizer::new(config).unwrap();
        p.load_rgba(&rgba, w, h).unwrap();
        p
    }

    fn values(p: &Posterizer) -> Vec<u8> {
        p.ranges().unwrap().iter().map(|s| s.value).collect()
    }

    #[test]
    fn gradient_gives_one_layer_per_step() {
        let mut p = posterizer(TracingConfig {
            steps: Steps::Count(4),
            ..TracingConfig::default()
        });
        let curves = p.as_curves().unwrap();
        assert_eq!(curves.len(), 4);
        for c in &curves {
            assert!((0.0..=1.0).contains(&c.fill_opacity));
            assert!(!c.d.is_empty());
        }
        let mut opacities: Vec<u64> = curves.iter().map(|c| (c.fill_opacity * 1000.0) as u64).collect();
        opacities.dedup();
        assert_eq!(opacities.len(), 4, "{curves:?}");
    }

    #[test]
    fn stop_intensities_grow_toward_the_dark_end() {
        let p = posterizer(TracingConfig {
            steps: Steps::Count(4),
            ..TracingConfig::default()
        });
        let ranges = p.ranges().unwrap();
        assert!(ranges.windows(2).all(|w| w[0].value > w[1].value));
        assert!(ranges.windows(2).all(|w| w[0].intensity < w[1].intensity), "{ranges:?}");
    }

    #[test]
    fn explicit_levels_are_deduplicated_and_sorted() {
        let mut config = TracingConfig {
            threshold: Threshold::Level(128),
            steps: Steps::Levels(vec![50, 200, 50]),
            ..TracingConfig::default()
        };
        assert_eq!(values(&posterizer(config.clone())), vec![200, 50]);

        config.steps = Steps::Levels(vec![50, 100]);
        assert_eq!(values(&posterizer(config.clone())), vec![128, 100, 50]);

        config.steps = Steps::Levels(Vec::new());
        assert_eq!(values(&posterizer(config.clone())), vec![128]);

        config.black_on_white = false;
        config.steps = Steps::Levels(vec![200, 150]);
        assert_eq!(values(&posterizer(config)), vec![128, 150, 200]);
    }

    #[test]
    fn equal_distribution_splits_the_traced_side() {
        let mut config = TracingConfig {
            threshold: Threshold::Level(200),
            steps: Steps::Count(4),
            range_distribution: RangeDistribution::Equal,
            ..TracingConfig::default()
        };
        assert_eq!(values(&posterizer(config.clone())), vec![200, 150, 100, 50]);

        config.threshold = Threshold::Level(55);
        config.black_on_white = false;
        assert_eq!(values(&posterizer(config)), vec![55, 105, 155, 205]);
    }

    #[test]
    fn step_count_follows_threshold() {
        let mut config = TracingConfig {
            threshold: Threshold::Level(128),
            steps: Steps::Auto,
            range_distribution: RangeDistribution::Equal,
            ..TracingConfig::default()
        };
        assert_eq!(values(&posterizer(config.clone())).len(), 3);
        config.threshold = Threshold::Level(250);
        assert_eq!(values(&posterizer(config.clone())).len(), 4);
        config.steps = Steps::Count(1);
        assert_eq!(values(&posterizer(config.clone())).len(), 2);
        config.threshold = Threshold::Level(1);
        config.steps = Steps::Count(8);
        assert_eq!(values(&posterizer(config)).len(), 1);
    }

    #[test]
    fn long_stacks_get_an_extra_dark_stop() {
        let levels: Vec<u8> = (0..10).map(|i| 255 - 25 * i).collect();
        let p = posterizer(TracingConfig {
            threshold: Threshold::Level(250),
            steps: Steps::Levels(levels),
            ..TracingConfig::default()
        });
        let ranges = p.ranges().unwrap();
        assert_eq!(ranges.len(), 11);
        let extra = ranges[10];
        // mean 15 + std dev ~8.94 of levels 0..=30
        assert_eq!(extra.value, 24);
        assert!((extra.intensity - (255.0 - 12.0) / 255.0).abs() < 1e-9);
    }

    #[test]
    fn opacity_fills_the_remaining_tone() {
        assert_eq!(layer_opacity(0.0, 0.3), 0.3);
        assert_eq!(layer_opacity(0.3, 0.5), 0.286);
        assert_eq!(layer_opacity(0.5, 1.0), 1.0);
        // Already darker than the requested tone.
        assert_eq!(layer_opacity(0.6, 0.4), 0.0);
        assert_eq!(layer_opacity(1.0, 0.4), 1.0);
    }

    #[test]
    fn layer_fill_is_gray_of_intensity() {
        assert_eq!(layer_gray(1.0, true), 0);
        assert_eq!(layer_gray(0.0, true), 255);
        assert_eq!(layer_gray(1.0, false), 255);
        assert_eq!(layer_gray(0.5, true), 128);
    }

    #[test]
    fn path_tags_carry_gray_fill_and_opacity() {
        let mut p = posterizer(TracingConfig {
            steps: Steps::Count(3),
            ..TracingConfig::default()
        });
        let tags = p.path_tags().unwrap();
        assert!(!tags.is_empty());
        for tag in &tags {
            assert!(tag.contains(r#"fill="rgb("#), "{tag}");
            assert!(tag.contains("fill-opacity="), "{tag}");
        }
        let svg = p.get_svg().unwrap();
        assert_eq!(svg.matches("<path ").count(), tags.len());
    }

    #[test]
    fn white_image_has_no_layers() {
        let mut p = Posterizer::default();
        p.load_rgba(&[255; 4 * 16], 4, 4).unwrap();
        assert!(p.as_curves().unwrap().is_empty());
    }

    #[test]
    fn cancelled_posterizer_stops() {
        let token = CancelToken::new();
        let (rgba, w, h) = gradient();
        let mut p = Posterizer::default().with_cancel_token(token.clone());
        p.load_rgba(&rgba, w, h).unwrap();
        token.cancel();
        assert!(matches!(p.as_curves(), Err(crate::error::TraceError::Cancelled)));
    }
}
