//! Correlation-coefficient scoring.
//!
//! Score of a template `t` at offset `(x, y)` of image `I`:
//!
//! ```text
//!            Σ (t - mean t)(I - mean I)
//! r = ---------------------------------------
//!     sqrt(Σ (t - mean t)²) · sqrt(Σ (I - mean I)²)
//! ```
//!
//! The template is stored zero-mean, so the numerator reduces to a plain dot
//! product with the window. Window sums come from integral images.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::definitions::{Position, Score};
use imageproc::suppress::local_maxima;
use rayon::prelude::*;

/// Correlation map, one score per template offset.
pub type ScoreMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Total window variance under which a window counts as flat.
const FLAT_VARIANCE: f64 = 1.0;

/// A grayscale image prepared for repeated window statistics.
pub struct SearchImage {
    width: u32,
    height: u32,
    pixels: Vec<f32>,
    sum: Vec<f64>,
    sq_sum: Vec<f64>,
}

impl SearchImage {
    pub fn from_gray(img: &GrayImage) -> Self {
        let pixels = img.as_raw().iter().map(|&p| p as f32).collect();
        Self::from_values(img.width(), img.height(), pixels)
    }

    fn from_values(width: u32, height: u32, pixels: Vec<f32>) -> Self {
        let (w, h) = (width as usize, height as usize);
        let stride = w + 1;
        let mut sum = vec![0.0f64; stride * (h + 1)];
        let mut sq_sum = vec![0.0f64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = pixels[y * w + x] as f64;
                row += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row;
                sq_sum[(y + 1) * stride + x + 1] = sq_sum[y * stride + x + 1] + row_sq;
            }
        }
        Self {
            width,
            height,
            pixels,
            sum,
            sq_sum,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Box-averages `factor`×`factor` blocks. Trailing partial blocks are dropped.
    pub fn downsample(&self, factor: u32) -> Self {
        if factor <= 1 {
            return Self::from_values(self.width, self.height, self.pixels.clone());
        }
        let (w, h) = (self.width / factor, self.height / factor);
        let f = factor as usize;
        let area = (f * f) as f64;
        let mut pixels = Vec::with_capacity(w as usize * h as usize);
        for y in 0..h as usize {
            for x in 0..w as usize {
                let (block, _) = self.window_sums(x * f, y * f, f, f);
                pixels.push((block / area) as f32);
            }
        }
        Self::from_values(w, h, pixels)
    }

    /// Sum and sum of squares over a window.
    fn window_sums(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let stride = self.width as usize + 1;
        let at = |table: &[f64], cx: usize, cy: usize| table[cy * stride + cx];
        let rect = |table: &[f64]| {
            at(table, x + w, y + h) - at(table, x, y + h) - at(table, x + w, y) + at(table, x, y)
        };
        (rect(&self.sum), rect(&self.sq_sum))
    }
}

/// A zero-mean template with its norm.
pub struct PreparedTemplate {
    width: u32,
    height: u32,
    values: Vec<f32>,
    norm: f64,
}

impl PreparedTemplate {
    /// `None` for a template without contrast.
    pub fn new(img: &SearchImage) -> Option<Self> {
        let n = img.pixels.len();
        if n == 0 {
            return None;
        }
        let mean = img.pixels.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
        let values: Vec<f32> = img.pixels.iter().map(|&v| (v as f64 - mean) as f32).collect();
        let energy: f64 = values.iter().map(|&v| v as f64 * v as f64).sum();
        if energy < FLAT_VARIANCE {
            return None;
        }
        Some(Self {
            width: img.width,
            height: img.height,
            values,
            norm: energy.sqrt(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Correlation at one offset. The template must fit at `(x, y)`.
pub fn score_at(image: &SearchImage, template: &PreparedTemplate, x: u32, y: u32) -> f32 {
    let (tw, th) = (template.width as usize, template.height as usize);
    let (x, y) = (x as usize, y as usize);
    let n = (tw * th) as f64;
    let (sum, sq_sum) = image.window_sums(x, y, tw, th);
    let variance = sq_sum - sum * sum / n;
    if variance < FLAT_VARIANCE {
        return 0.0;
    }

    let iw = image.width as usize;
    let mut dot = 0.0f64;
    for row in 0..th {
        let img_row = &image.pixels[(y + row) * iw + x..(y + row) * iw + x + tw];
        let tpl_row = &template.values[row * tw..(row + 1) * tw];
        let partial: f32 = img_row.iter().zip(tpl_row).map(|(a, b)| a * b).sum();
        dot += partial as f64;
    }
    (dot / (template.norm * variance.sqrt())) as f32
}

/// Scores every offset, rows in parallel. `None` when the template does not fit.
pub fn correlate(image: &SearchImage, template: &PreparedTemplate) -> Option<ScoreMap> {
    if template.width > image.width || template.height > image.height {
        return None;
    }
    let out_w = image.width - template.width + 1;
    let out_h = image.height - template.height + 1;
    let mut map = ScoreMap::new(out_w, out_h);
    map.par_chunks_mut(out_w as usize)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, value) in row.iter_mut().enumerate() {
                *value = score_at(image, template, x as u32, y as u32);
            }
        });
    Some(map)
}

/// One offset of a [`ScoreMap`] with its score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

impl Position for Peak {
    fn x(&self) -> u32 {
        self.x
    }

    fn y(&self) -> u32 {
        self.y
    }
}

impl Score for Peak {
    fn score(&self) -> f32 {
        self.score
    }
}

/// Every offset scoring at least `threshold`, in row order.
pub fn above(map: &ScoreMap, threshold: f32) -> Vec<Peak> {
    map.enumerate_pixels()
        .filter(|(_, _, p)| p[0] >= threshold)
        .map(|(x, y, p)| Peak { x, y, score: p[0] })
        .collect()
}

/// Offsets scoring at least `threshold` that are 3×3 local maxima, best first.
pub fn local_peaks(map: &ScoreMap, threshold: f32) -> Vec<Peak> {
    let mut peaks = local_maxima(&above(map, threshold), 1);
    peaks.sort_by(|a, b| b.score.total_cmp(&a.score));
    peaks
}

/// True when any score is NaN or infinite.
pub fn has_non_finite(map: &ScoreMap) -> bool {
    map.iter().any(|v| !v.is_finite())
}
