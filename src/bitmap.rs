//! Luminance and binary bitmaps.
//!
//! A `Bitmap` is a flat width×height grid of small integers: 0..=255 for
//! the luminance map built from an RGBA buffer, 0/1 for the binary maps the
//! tracer consumes. Reads outside the grid return 0, so the tracer can treat
//! the image as surrounded by infinite background.

use std::cell::OnceCell;
use std::path::Path;

use image::{ImageReader, RgbaImage};

use crate::error::{TraceError, TraceResult};
use crate::histogram::Histogram;

const RGBA: usize = 4;

#[derive(Debug, Clone)]
pub struct Bitmap {
    width: usize,
    height: usize,
    data: Vec<u8>,
    histogram: OnceCell<Histogram>,
}

impl Bitmap {
    /// All-zero bitmap.
    pub fn new(width: usize, height: usize) -> Self {
        Self::from_data(width, height, vec![0; width * height])
    }

    fn from_data(width: usize, height: usize, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Bitmap {
            width,
            height,
            data,
            histogram: OnceCell::new(),
        }
    }

    /// Luminance map of a row-major RGBA buffer.
    ///
    /// Alpha is composited over white first, so transparent pixels read as
    /// background: `c' = 255 + (c - 255) * a / 255`.
    pub fn from_rgba(rgba: &[u8], width: usize, height: usize) -> TraceResult<Self> {
        let expected = width * height * RGBA;
        if rgba.len() != expected {
            return Err(TraceError::BufferSize {
                expected,
                found: rgba.len(),
            });
        }
        let data = rgba
            .chunks_exact(RGBA)
            .map(|px| {
                let opacity = px[3] as f64 / 255.0;
                let over_white = |c: u8| 255.0 + (c as f64 - 255.0) * opacity;
                luminance(over_white(px[0]), over_white(px[1]), over_white(px[2]))
            })
            .collect();
        Ok(Self::from_data(width, height, data))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of cells.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Flat index of (x, y), or `None` outside the grid.
    pub fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    /// Value at (x, y); 0 outside the grid.
    pub fn get(&self, x: i32, y: i32) -> u8 {
        self.index(x, y).map_or(0, |i| self.data[i])
    }

    /// Is the cell at (x, y) non-zero?
    pub fn is_set(&self, x: i32, y: i32) -> bool {
        self.get(x, y) != 0
    }

    /// Write a cell. Out-of-grid writes are ignored.
    pub fn set(&mut self, x: i32, y: i32, value: u8) {
        if let Some(i) = self.index(x, y) {
            self.data[i] = value;
            self.histogram = OnceCell::new();
        }
    }

    /// Toggle a binary cell between 0 and 1.
    pub(crate) fn flip(&mut self, x: i32, y: i32) {
        if let Some(i) = self.index(x, y) {
            self.data[i] = u8::from(self.data[i] == 0);
        }
    }

    /// Same-size bitmap with every cell mapped through `transform`.
    pub fn copy(&self, transform: impl Fn(u8) -> u8) -> Bitmap {
        let data = self.data.iter().map(|&v| transform(v)).collect();
        Self::from_data(self.width, self.height, data)
    }

    /// Binary map: 1 where the pixel belongs to the traced foreground.
    ///
    /// Dark-on-light keeps levels `<= threshold`; light-on-dark keeps
    /// levels `>= threshold`.
    pub fn threshold(&self, threshold: f64, black_on_white: bool) -> Bitmap {
        self.copy(|lum| {
            let lum = lum as f64;
            let background = if black_on_white {
                lum > threshold
            } else {
                lum < threshold
            };
            u8::from(!background)
        })
    }

    /// Histogram of the cell values, computed once.
    pub fn histogram(&self) -> &Histogram {
        self.histogram.get_or_init(|| Histogram::from_bitmap(self))
    }

    /// Number of non-zero cells.
    pub fn count_set(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}

/// Perceptual luma of an RGB triple, rounded to a level.
pub fn luminance(r: f64, g: f64, b: f64) -> u8 {
    (0.2126 * r + 0.7153 * g + 0.0721 * b).round().clamp(0.0, 255.0) as u8
}

/// Decode an image file to RGBA.
pub fn open_rgba(path: &Path) -> TraceResult<RgbaImage> {
    let img = ImageReader::open(path)
        .map_err(|e| TraceError::ImageLoad(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| TraceError::ImageLoad(e.to_string()))?
        .decode()
        .map_err(|e| TraceError::ImageLoad(e.to_string()))?;
    Ok(img.into_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_reads_are_background() {
        let mut bm = Bitmap::new(3, 2);
        bm.set(2, 1, 1);
        assert_eq!(bm.get(2, 1), 1);
        assert_eq!(bm.get(-1, 0), 0);
        assert_eq!(bm.get(3, 1), 0);
        assert_eq!(bm.get(0, 2), 0);
        assert_eq!(bm.index(2, 1), Some(5));
        assert_eq!(bm.index(3, 0), None);
    }

    #[test]
    fn alpha_composites_over_white() {
        // Opaque black, transparent black, opaque white, half-transparent black.
        let rgba = [0, 0, 0, 255, 0, 0, 0, 0, 255, 255, 255, 255, 0, 0, 0, 128];
        let bm = Bitmap::from_rgba(&rgba, 4, 1).unwrap();
        assert_eq!(bm.data(), &[0, 255, 255, 127]);
    }

    #[test]
    fn luminance_weights_sum_to_white() {
        assert_eq!(luminance(255.0, 255.0, 255.0), 255);
        assert_eq!(luminance(255.0, 0.0, 0.0), 54);
        assert_eq!(luminance(0.0, 255.0, 0.0), 182);
    }

    #[test]
    fn rejects_short_buffer() {
        let err = Bitmap::from_rgba(&[0; 7], 2, 1).unwrap_err();
        assert!(matches!(err, TraceError::BufferSize { expected: 8, found: 7 }));
    }

    #[test]
    fn threshold_direction() {
        let bm = Bitmap::from_data(4, 1, vec![0, 100, 128, 255]);
        assert_eq!(bm.threshold(128.0, true).data(), &[1, 1, 1, 0]);
        assert_eq!(bm.threshold(128.0, false).data(), &[0, 0, 1, 1]);
    }

    #[test]
    fn histogram_is_memoized_and_counts_cells() {
        let bm = Bitmap::from_data(2, 2, vec![7, 7, 9, 0]);
        let h = bm.histogram();
        assert_eq!(h.count(7), 2);
        assert_eq!(h.pixels(), 4);
        assert!(std::ptr::eq(h, bm.histogram()));
    }
}
