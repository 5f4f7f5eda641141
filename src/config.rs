//! Tracing and posterization options.
//!
//! Every option has a public camelCase name (the one host wrappers and the
//! CLI speak) and a typed field here. String input goes through the
//! `FromStr` impls so that a rejected value always names its field.

use std::fmt;
use std::str::FromStr;

use crate::error::{TraceError, TraceResult};

/// All tracing parameters in one struct.
#[derive(Debug, Clone, PartialEq)]
pub struct TracingConfig {
    // -- Tracer --
    /// How to resolve ambiguous diagonal steps while following a boundary.
    pub turn_policy: TurnPolicy,
    /// Boundaries enclosing this many pixels or fewer are dropped as speckles.
    pub turd_size: u32,

    // -- Curve stage --
    /// Corner threshold. Vertices with alpha >= this become sharp corners.
    /// 0 = polygon only, 4/3 = no corners at all.
    pub alpha_max: f64,
    /// Merge runs of smooth segments into fewer Bezier curves.
    pub opt_curve: bool,
    /// Maximum deviation (pixels) a merged curve may introduce.
    pub opt_tolerance: f64,

    // -- Bitmap stage --
    /// Luminance cut between foreground and background.
    pub threshold: Threshold,
    /// Trace dark shapes on a light background (true) or the reverse.
    pub black_on_white: bool,

    // -- Posterization --
    /// Number of layers, or explicit layer thresholds.
    pub steps: Steps,
    /// How each layer's tone is picked from its histogram range.
    pub fill_strategy: FillStrategy,
    /// How layer thresholds are spread when only a count is given.
    pub range_distribution: RangeDistribution,

    // -- Output (cosmetic, never affects geometry) --
    /// Fill color of the single-layer output.
    pub color: Color,
    /// Background color of a full SVG document. `None` = transparent.
    pub background: Option<String>,

    // -- Resource bounds --
    /// Refuse to load images with more pixels than this.
    pub max_pixels: Option<u64>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            turn_policy: TurnPolicy::Minority,
            turd_size: 2,
            alpha_max: 1.0,
            opt_curve: true,
            opt_tolerance: 0.2,
            threshold: Threshold::Auto,
            black_on_white: true,
            steps: Steps::Auto,
            fill_strategy: FillStrategy::Dominant,
            range_distribution: RangeDistribution::Auto,
            color: Color::Auto,
            background: None,
            max_pixels: None,
        }
    }
}

impl TracingConfig {
    /// Apply one string-keyed option. Keys may be camelCase (`turnPolicy`)
    /// or snake_case (`turn_policy`).
    pub fn set(&mut self, key: &str, value: &str) -> TraceResult<()> {
        let value = value.trim();
        match key {
            "turnPolicy" | "turn_policy" => self.turn_policy = value.parse()?,
            "turdSize" | "turd_size" => {
                self.turd_size = value.parse().map_err(|_| TraceError::InvalidOption {
                    field: "turdSize",
                    value: value.to_string(),
                    allowed: "an integer >= 0",
                })?;
            }
            "alphaMax" | "alpha_max" => {
                self.alpha_max = parse_non_negative("alphaMax", value)?;
            }
            "optCurve" | "opt_curve" => self.opt_curve = parse_bool("optCurve", value)?,
            "optTolerance" | "opt_tolerance" => {
                self.opt_tolerance = parse_non_negative("optTolerance", value)?;
            }
            "threshold" => self.threshold = value.parse()?,
            "blackOnWhite" | "black_on_white" => {
                self.black_on_white = parse_bool("blackOnWhite", value)?;
            }
            "steps" => self.steps = value.parse()?,
            "fillStrategy" | "fill_strategy" => self.fill_strategy = value.parse()?,
            "rangeDistribution" | "range_distribution" => {
                self.range_distribution = value.parse()?;
            }
            "color" => self.color = value.parse()?,
            "background" => {
                self.background = match value {
                    "" | "transparent" => None,
                    css => Some(css.to_string()),
                };
            }
            "maxPixels" | "max_pixels" => {
                self.max_pixels = match value {
                    "" | "none" => None,
                    n => Some(n.parse().map_err(|_| TraceError::InvalidOption {
                        field: "maxPixels",
                        value: n.to_string(),
                        allowed: "a positive integer or 'none'",
                    })?),
                };
            }
            other => return Err(TraceError::UnknownOption(other.to_string())),
        }
        Ok(())
    }

    /// Check numeric fields that the type system does not constrain.
    pub fn validate(&self) -> TraceResult<()> {
        if !(self.alpha_max.is_finite() && self.alpha_max >= 0.0) {
            return Err(TraceError::InvalidOption {
                field: "alphaMax",
                value: self.alpha_max.to_string(),
                allowed: "a number >= 0",
            });
        }
        if !(self.opt_tolerance.is_finite() && self.opt_tolerance >= 0.0) {
            return Err(TraceError::InvalidOption {
                field: "optTolerance",
                value: self.opt_tolerance.to_string(),
                allowed: "a number >= 0",
            });
        }
        if self.steps == Steps::Count(0) {
            return Err(TraceError::InvalidOption {
                field: "steps",
                value: "0".to_string(),
                allowed: STEPS_ALLOWED,
            });
        }
        Ok(())
    }

    /// Key of every parameter that changes traced geometry at `threshold`.
    /// Color and background are deliberately absent.
    pub fn geometry_key(&self, threshold: f64) -> GeometryKey {
        GeometryKey {
            threshold: threshold.to_bits(),
            turn_policy: self.turn_policy,
            turd_size: self.turd_size,
            alpha_max: self.alpha_max.to_bits(),
            opt_curve: self.opt_curve,
            opt_tolerance: self.opt_tolerance.to_bits(),
            black_on_white: self.black_on_white,
        }
    }
}

/// Identity of one traced geometry. Floats are stored as their bit
/// patterns so the key can be hashed and compared exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryKey {
    threshold: u64,
    turn_policy: TurnPolicy,
    turd_size: u32,
    alpha_max: u64,
    opt_curve: bool,
    opt_tolerance: u64,
    black_on_white: bool,
}

// ── Option enums ─────────────────────────────────────────

/// Rule for an ambiguous step: the pixel ahead-right is set while the one
/// ahead-left is clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnPolicy {
    /// Prefer to connect foreground (turn right on outer boundaries).
    Black,
    /// Prefer to connect background (turn right on holes).
    White,
    Left,
    Right,
    /// Side with the locally less common color.
    Minority,
    /// Side with the locally more common color.
    Majority,
}

const TURN_POLICY_ALLOWED: &str = "'black', 'white', 'left', 'right', 'minority', 'majority'";

impl FromStr for TurnPolicy {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "black" => Ok(Self::Black),
            "white" => Ok(Self::White),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "minority" => Ok(Self::Minority),
            "majority" => Ok(Self::Majority),
            other => Err(TraceError::InvalidOption {
                field: "turnPolicy",
                value: other.to_string(),
                allowed: TURN_POLICY_ALLOWED,
            }),
        }
    }
}

impl fmt::Display for TurnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Black => "black",
            Self::White => "white",
            Self::Left => "left",
            Self::Right => "right",
            Self::Minority => "minority",
            Self::Majority => "majority",
        })
    }
}

/// Luminance threshold for binarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Threshold {
    /// Pick the cut from the image histogram.
    Auto,
    /// Fixed level 0..=255.
    Level(u8),
}

impl FromStr for Threshold {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" || s == "-1" {
            return Ok(Self::Auto);
        }
        s.parse::<u8>()
            .map(Self::Level)
            .map_err(|_| TraceError::InvalidOption {
                field: "threshold",
                value: s.to_string(),
                allowed: "'auto' or an integer in range 0..255",
            })
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Level(t) => write!(f, "{t}"),
        }
    }
}

/// Posterization layer count or explicit thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Steps {
    Auto,
    /// Number of layers, 1..=255.
    Count(u8),
    /// Explicit thresholds, one per layer.
    Levels(Vec<u8>),
}

const STEPS_ALLOWED: &str = "'auto', an integer in range 1..255, or a list of levels like [50,120,200]";

impl FromStr for Steps {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || TraceError::InvalidOption {
            field: "steps",
            value: s.to_string(),
            allowed: STEPS_ALLOWED,
        };
        if s == "auto" || s == "-1" {
            return Ok(Self::Auto);
        }
        let is_list = s.starts_with('[') || s.contains(',');
        if !is_list {
            return match s.parse::<u8>() {
                Ok(n) if n >= 1 => Ok(Self::Count(n)),
                _ => Err(bad()),
            };
        }
        let inner = s.trim_start_matches('[').trim_end_matches(']');
        let mut levels = Vec::new();
        for item in inner.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let level: i64 = item.parse().map_err(|_| bad())?;
            // Out-of-range levels are ignored, matching how hosts pass raw arrays.
            if let Ok(level) = u8::try_from(level) {
                levels.push(level);
            }
        }
        Ok(Self::Levels(levels))
    }
}

impl fmt::Display for Steps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Count(n) => write!(f, "{n}"),
            Self::Levels(levels) => {
                let items: Vec<String> = levels.iter().map(|l| l.to_string()).collect();
                write!(f, "[{}]", items.join(","))
            }
        }
    }
}

/// How a posterization layer's tone is derived from its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FillStrategy {
    /// Linear interpolation across the layer stack.
    Spread,
    /// Most frequent level in the range.
    Dominant,
    Median,
    Mean,
}

impl FromStr for FillStrategy {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spread" => Ok(Self::Spread),
            "dominant" => Ok(Self::Dominant),
            "median" => Ok(Self::Median),
            "mean" => Ok(Self::Mean),
            other => Err(TraceError::InvalidOption {
                field: "fillStrategy",
                value: other.to_string(),
                allowed: "'spread', 'dominant', 'median', 'mean'",
            }),
        }
    }
}

impl fmt::Display for FillStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Spread => "spread",
            Self::Dominant => "dominant",
            Self::Median => "median",
            Self::Mean => "mean",
        })
    }
}

/// Layer threshold placement when `steps` is a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeDistribution {
    /// Multilevel Otsu thresholding over the histogram.
    Auto,
    /// Equal-width slices up to the main threshold.
    Equal,
}

impl FromStr for RangeDistribution {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "equal" => Ok(Self::Equal),
            other => Err(TraceError::InvalidOption {
                field: "rangeDistribution",
                value: other.to_string(),
                allowed: "'auto', 'equal'",
            }),
        }
    }
}

impl fmt::Display for RangeDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Equal => "equal",
        })
    }
}

/// Fill color of single-layer output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Color {
    /// Black when tracing dark-on-light, white otherwise.
    Auto,
    /// Any CSS color string.
    Css(String),
}

impl Color {
    /// Resolve `Auto` against the tracing direction.
    pub fn resolve(&self, black_on_white: bool) -> &str {
        match self {
            Self::Auto if black_on_white => "black",
            Self::Auto => "white",
            Self::Css(css) => css,
        }
    }
}

impl FromStr for Color {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "" => Err(TraceError::InvalidOption {
                field: "color",
                value: String::new(),
                allowed: "'auto' or a CSS color",
            }),
            css => Ok(Self::Css(css.to_string())),
        }
    }
}

// ── Parsing helpers ──────────────────────────────────────

fn parse_bool(field: &'static str, value: &str) -> TraceResult<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(TraceError::InvalidOption {
            field,
            value: other.to_string(),
            allowed: "true, false",
        }),
    }
}

fn parse_non_negative(field: &'static str, value: &str) -> TraceResult<f64> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(TraceError::InvalidOption {
            field,
            value: value.to_string(),
            allowed: "a number >= 0",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = TracingConfig::default();
        assert_eq!(c.turn_policy, TurnPolicy::Minority);
        assert_eq!(c.turd_size, 2);
        assert_eq!(c.alpha_max, 1.0);
        assert!(c.opt_curve);
        assert_eq!(c.opt_tolerance, 0.2);
        assert_eq!(c.threshold, Threshold::Auto);
        assert!(c.black_on_white);
        assert_eq!(c.steps, Steps::Auto);
        assert_eq!(c.fill_strategy, FillStrategy::Dominant);
        assert_eq!(c.range_distribution, RangeDistribution::Auto);
        assert_eq!(c.color, Color::Auto);
        assert_eq!(c.background, None);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejected_values_name_their_field() {
        let mut c = TracingConfig::default();
        let err = c.set("turnPolicy", "invalid").unwrap_err().to_string();
        assert!(err.contains("turnPolicy"), "{err}");
        assert!(err.contains("minority"), "{err}");

        for bad in ["300", "-2", "12.5", "high"] {
            let err = c.set("threshold", bad).unwrap_err().to_string();
            assert!(err.contains("threshold"), "{err}");
        }

        let err = c.set("optCurve", "yes").unwrap_err().to_string();
        assert!(err.contains("optCurve"), "{err}");

        let err = c.set("steps", "0").unwrap_err().to_string();
        assert!(err.contains("steps"), "{err}");

        // A failed set leaves the config untouched.
        assert_eq!(c, TracingConfig::default());
    }

    #[test]
    fn string_options_round_trip_into_fields() {
        let mut c = TracingConfig::default();
        c.set("turn_policy", "majority").unwrap();
        c.set("turdSize", "10").unwrap();
        c.set("threshold", "128").unwrap();
        c.set("blackOnWhite", "false").unwrap();
        c.set("steps", "[200, 100, 999, 50]").unwrap();
        c.set("fillStrategy", "spread").unwrap();
        c.set("rangeDistribution", "equal").unwrap();
        c.set("color", "#ff0000").unwrap();
        c.set("background", "transparent").unwrap();
        assert_eq!(c.turn_policy, TurnPolicy::Majority);
        assert_eq!(c.turd_size, 10);
        assert_eq!(c.threshold, Threshold::Level(128));
        assert!(!c.black_on_white);
        assert_eq!(c.steps, Steps::Levels(vec![200, 100, 50]));
        assert_eq!(c.fill_strategy, FillStrategy::Spread);
        assert_eq!(c.range_distribution, RangeDistribution::Equal);
        assert_eq!(c.color.resolve(false), "#ff0000");
        assert_eq!(c.background, None);
        assert!(matches!(c.set("bogus", "1"), Err(TraceError::UnknownOption(_))));
    }

    #[test]
    fn geometry_key_ignores_cosmetic_options() {
        let a = TracingConfig::default();
        let mut b = a.clone();
        b.color = Color::Css("red".into());
        b.background = Some("white".into());
        assert_eq!(a.geometry_key(128.0), b.geometry_key(128.0));

        b.turd_size = 5;
        assert_ne!(a.geometry_key(128.0), b.geometry_key(128.0));
        assert_ne!(a.geometry_key(128.0), a.geometry_key(127.0));
    }

    #[test]
    fn auto_color_follows_tracing_direction() {
        assert_eq!(Color::Auto.resolve(true), "black");
        assert_eq!(Color::Auto.resolve(false), "white");
    }
}
