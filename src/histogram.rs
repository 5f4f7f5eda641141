//! 256-bucket level histogram.
//!
//! Range statistics, dominant-level lookup, and multilevel Otsu
//! thresholding. Counters are `u64` regardless of image size, so no
//! bucket can overflow. Derived data (ascending-count order, per-range
//! stats, the between-class variance table) is computed on first use and
//! owned by the instance; `insert` drops it.

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::ops::RangeInclusive;

use crate::bitmap::{luminance, Bitmap};
use crate::error::{TraceError, TraceResult};

/// Number of levels.
pub const LEVELS: usize = 256;

/// Which value of an RGBA pixel a histogram counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red,
    Green,
    Blue,
    /// Perceptual luma of the color channels (alpha ignored).
    Luminance,
}

/// Statistics of the pixel levels in a range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelStats {
    /// NaN when the range holds no pixels.
    pub mean: f64,
    /// Smallest level at which half the pixels have been counted.
    /// NaN when the range holds no pixels.
    pub median: f64,
    /// Population standard deviation. NaN when the range holds no pixels.
    pub std_dev: f64,
    /// Levels with at least one pixel.
    pub unique: usize,
}

/// Statistics of the per-level pixel counts in a range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelsPerLevel {
    /// Pixels divided by the number of levels in the range.
    pub mean: f64,
    /// Pixels divided by the number of populated levels; 0 when none are.
    pub median: f64,
    pub peak: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub levels: LevelStats,
    pub pixels_per_level: PixelsPerLevel,
    pub pixels: u64,
}

#[derive(Debug, Clone)]
pub struct Histogram {
    data: [u64; LEVELS],
    pixels: u64,
    sorted: OnceCell<Vec<u8>>,
    stats: RefCell<HashMap<(u8, u8), Stats>>,
    variance: OnceCell<Vec<f64>>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    /// Empty histogram.
    pub fn new() -> Self {
        Histogram {
            data: [0; LEVELS],
            pixels: 0,
            sorted: OnceCell::new(),
            stats: RefCell::new(HashMap::new()),
            variance: OnceCell::new(),
        }
    }

    /// Count the cell values of a bitmap.
    pub fn from_bitmap(bm: &Bitmap) -> Self {
        let mut h = Self::new();
        for &v in bm.data() {
            h.data[v as usize] += 1;
        }
        h.pixels = bm.size() as u64;
        h
    }

    /// Count one channel of a row-major RGBA buffer.
    pub fn from_rgba(rgba: &[u8], width: usize, height: usize, channel: Channel) -> TraceResult<Self> {
        let expected = width * height * 4;
        if rgba.len() != expected {
            return Err(TraceError::BufferSize {
                expected,
                found: rgba.len(),
            });
        }
        let mut h = Self::new();
        for px in rgba.chunks_exact(4) {
            let level = match channel {
                Channel::Red => px[0],
                Channel::Green => px[1],
                Channel::Blue => px[2],
                Channel::Luminance => luminance(px[0] as f64, px[1] as f64, px[2] as f64),
            };
            h.data[level as usize] += 1;
        }
        h.pixels = (width * height) as u64;
        Ok(h)
    }

    /// Add one pixel at `level`, invalidating derived data.
    pub fn insert(&mut self, level: u8) {
        self.data[level as usize] += 1;
        self.pixels += 1;
        self.sorted = OnceCell::new();
        self.stats.get_mut().clear();
        self.variance = OnceCell::new();
    }

    /// Pixels at `level`.
    pub fn count(&self, level: u8) -> u64 {
        self.data[level as usize]
    }

    /// Total pixels.
    pub fn pixels(&self) -> u64 {
        self.pixels
    }

    /// All levels ordered by ascending pixel count (ties by level).
    pub fn sorted_levels(&self) -> &[u8] {
        self.sorted.get_or_init(|| {
            let mut levels: Vec<u8> = (0..=u8::MAX).collect();
            levels.sort_by_key(|&l| self.data[l as usize]);
            levels
        })
    }

    // ── Range statistics ─────────────────────────────────

    /// Statistics over an inclusive level range. An empty range (start >
    /// end) or one with no pixels yields zero counts and NaN level stats.
    pub fn stats(&self, range: RangeInclusive<u8>) -> Stats {
        let key = (*range.start(), *range.end());
        if let Some(stats) = self.stats.borrow().get(&key) {
            return *stats;
        }
        let stats = self.compute_stats(range);
        self.stats.borrow_mut().insert(key, stats);
        stats
    }

    fn compute_stats(&self, range: RangeInclusive<u8>) -> Stats {
        if range.is_empty() {
            return Stats {
                levels: LevelStats {
                    mean: f64::NAN,
                    median: f64::NAN,
                    std_dev: f64::NAN,
                    unique: 0,
                },
                pixels_per_level: PixelsPerLevel {
                    mean: 0.0,
                    median: 0.0,
                    peak: 0,
                },
                pixels: 0,
            };
        }
        let (min, max) = (*range.start() as usize, *range.end() as usize);
        let bucket = &self.data[min..=max];

        let pixels: u64 = bucket.iter().sum();
        let weighted: u64 = (min..=max).map(|l| l as u64 * self.data[l]).sum();
        let unique = bucket.iter().filter(|&&c| c > 0).count();
        let peak = bucket.iter().copied().max().unwrap_or(0);

        let mean = weighted as f64 / pixels as f64;
        let variance = (min..=max)
            .map(|l| {
                let d = l as f64 - mean;
                d * d * self.data[l] as f64
            })
            .sum::<f64>()
            / pixels as f64;

        let median = if pixels == 0 {
            f64::NAN
        } else {
            let half = pixels.div_ceil(2);
            let mut seen = 0;
            let mut median = max;
            for l in min..=max {
                seen += self.data[l];
                if seen >= half {
                    median = l;
                    break;
                }
            }
            median as f64
        };

        Stats {
            levels: LevelStats {
                mean,
                median,
                std_dev: variance.sqrt(),
                unique,
            },
            pixels_per_level: PixelsPerLevel {
                mean: pixels as f64 / (max - min + 1) as f64,
                median: if unique == 0 {
                    0.0
                } else {
                    pixels as f64 / unique as f64
                },
                peak,
            },
            pixels,
        }
    }

    /// Level in `range` with the most pixels inside a `±tolerance/2`
    /// window around it. Ties go to the level with more pixels of its own,
    /// then to the lower level. `None` if the window sums are all zero.
    pub fn dominant_color(&self, range: RangeInclusive<u8>, tolerance: u8) -> Option<u8> {
        if range.is_empty() {
            return None;
        }
        let (min, max) = (*range.start(), *range.end());
        if min == max {
            return (self.data[min as usize] > 0).then_some(min);
        }
        let half = (tolerance.max(1) / 2) as i32;

        let mut best: Option<(u8, u64)> = None;
        for level in min..=max {
            let pooled: u64 = (-half..=half)
                .filter_map(|d| u8::try_from(level as i32 + d).ok())
                .map(|l| self.data[l as usize])
                .sum();
            let better = match best {
                None => true,
                Some((best_level, best_pooled)) => {
                    pooled > best_pooled
                        || (pooled == best_pooled
                            && self.data[level as usize] > self.data[best_level as usize])
                }
            };
            if better {
                best = Some((level, pooled));
            }
        }
        best.filter(|&(_, pooled)| pooled > 0).map(|(level, _)| level)
    }

    // ── Multilevel thresholding ──────────────────────────

    /// Between-class variance table: `H(i, j) = S(i, j)^2 / P(i, j)` where
    /// `P` is the probability mass and `S` the first moment of levels
    /// `i..=j`. Only `i <= j` entries are meaningful.
    fn variance_table(&self) -> &[f64] {
        self.variance.get_or_init(|| {
            let total = self.pixels.max(1) as f64;
            let mut count = [0u64; LEVELS + 1];
            let mut moment = [0u64; LEVELS + 1];
            for l in 0..LEVELS {
                count[l + 1] = count[l] + self.data[l];
                moment[l + 1] = moment[l] + l as u64 * self.data[l];
            }
            let mut h = vec![0.0; LEVELS * LEVELS];
            for i in 0..LEVELS {
                for j in i..LEVELS {
                    let c = count[j + 1] - count[i];
                    if c == 0 {
                        continue;
                    }
                    let p = c as f64 / total;
                    let s = (moment[j + 1] - moment[i]) as f64 / total;
                    h[i * LEVELS + j] = s * s / p;
                }
            }
            h
        })
    }

    /// Up to `amount` cut levels `c1 < c2 < ...` splitting `range` into
    /// classes `[min+1..=c1], [c1+1..=c2], ..., [ck+1..=max]` with maximal
    /// summed between-class variance. The range minimum itself belongs to
    /// no class, so it is never a cut.
    ///
    /// `amount` is capped at `max - min - 2`; returns an empty vector when
    /// the cap leaves nothing to place or no placement has positive
    /// variance. Among equally good placements every cut but the last is
    /// as high as possible and the last one as low as possible.
    pub fn multilevel_thresholding(&self, amount: usize, range: RangeInclusive<u8>) -> Vec<u8> {
        if range.is_empty() {
            return Vec::new();
        }
        let (min, max) = (*range.start() as usize, *range.end() as usize);
        let amount = amount.min((max - min).saturating_sub(2));
        if amount < 1 {
            return Vec::new();
        }

        let table = self.variance_table();
        let h = |i: usize, j: usize| table[i * LEVELS + j];

        // best[r][s]: optimal variance of levels s+1..=max split by r cuts,
        // each cut c covering c <= max - r - 1. best[0][s] is the last class.
        let mut best = vec![vec![f64::NEG_INFINITY; LEVELS]; amount + 1];
        for s in min..max {
            best[0][s] = h(s + 1, max);
        }
        for r in 1..=amount {
            for s in min..max - r {
                let top = (s + 1..max - r)
                    .map(|c| h(s + 1, c) + best[r - 1][c])
                    .fold(f64::NEG_INFINITY, f64::max);
                best[r][s] = top;
            }
        }

        let target = best[amount][min];
        if target <= 0.0 {
            return Vec::new();
        }
        let eps = 1e-9 * target.abs().max(1.0);

        // Walk the table back from the front, keeping a cut only when the
        // rest of the levels can still reach the optimum.
        let mut cuts = Vec::with_capacity(amount);
        let mut start = min;
        let mut want = target;
        for r in (1..=amount).rev() {
            let reaches = |&c: &usize| h(start + 1, c) + best[r - 1][c] >= want - eps;
            let mut candidates = start + 1..max - r;
            let cut = if r == 1 {
                candidates.find(reaches)
            } else {
                candidates.rev().find(reaches)
            };
            let Some(cut) = cut else {
                return Vec::new();
            };
            want -= h(start + 1, cut);
            cuts.push(cut as u8);
            start = cut;
        }
        cuts
    }

    /// Single Otsu cut over `range`, if any.
    pub fn auto_threshold(&self, range: RangeInclusive<u8>) -> Option<u8> {
        self.multilevel_thresholding(1, range).first().copied()
    }
}
