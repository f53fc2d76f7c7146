//! Pixel comparison of two decoded images.
//!
//! The scanner only depends on the [`Comparator`] trait. [`PixelDiff`] is the
//! stock implementation: a per-pixel perceptual distance in YIQ space, where
//! `threshold` (0..=1) scales the largest tolerated distance. Two images are
//! equal when no pixel exceeds it.

use image::{DynamicImage, RgbaImage};
use rayon::prelude::*;
use serde::Serialize;
use std::borrow::Cow;

/// Largest possible YIQ distance between two pixels (black vs white).
const MAX_YIQ_DELTA: f64 = 35215.0;
const DIFF_COLOR: [u8; 4] = [255, 0, 0, 255];
const FADE_ALPHA: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiffOptions {
    pub threshold: f64,
    pub produce_diff_image: bool,
}

impl DiffOptions {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            produce_diff_image: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub equal: bool,
    pub differing_pixels: u64,
    pub total_pixels: u64,
    pub diff_image: Option<RgbaImage>,
}

impl ComparisonOutcome {
    /// Fraction of pixels judged different, 0.0 for empty images.
    pub fn diff_ratio(&self) -> f64 {
        if self.total_pixels == 0 {
            0.0
        } else {
            self.differing_pixels as f64 / self.total_pixels as f64
        }
    }
}

pub trait Comparator {
    fn compare(&self, a: &DynamicImage, b: &DynamicImage, options: &DiffOptions)
    -> ComparisonOutcome;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PixelDiff;

impl Comparator for PixelDiff {
    fn compare(
        &self,
        a: &DynamicImage,
        b: &DynamicImage,
        options: &DiffOptions,
    ) -> ComparisonOutcome {
        let (width, height) = (a.width(), a.height());
        let total_pixels = u64::from(width) * u64::from(height);

        if (width, height) != (b.width(), b.height()) {
            let larger = u64::from(b.width()) * u64::from(b.height());
            return ComparisonOutcome {
                equal: false,
                differing_pixels: total_pixels.max(larger),
                total_pixels: total_pixels.max(larger),
                diff_image: None,
            };
        }
        if total_pixels == 0 {
            return ComparisonOutcome {
                equal: true,
                differing_pixels: 0,
                total_pixels,
                diff_image: options.produce_diff_image.then(|| RgbaImage::new(width, height)),
            };
        }

        let a = as_rgba(a);
        let b = as_rgba(b);
        let max_delta = MAX_YIQ_DELTA * options.threshold * options.threshold;
        let row_len = width as usize * 4;
        let rows_a = a.as_raw().par_chunks(row_len);
        let rows_b = b.as_raw().par_chunks(row_len);

        let (differing_pixels, diff_image) = if options.produce_diff_image {
            let mut diff = RgbaImage::new(width, height);
            let out: &mut [u8] = &mut diff;
            let count: u64 = out
                .par_chunks_mut(row_len)
                .zip(rows_a.zip(rows_b))
                .map(|(out_row, (row_a, row_b))| draw_row(out_row, row_a, row_b, max_delta))
                .sum();
            (count, Some(diff))
        } else {
            let count: u64 = rows_a
                .zip(rows_b)
                .map(|(row_a, row_b)| count_row(row_a, row_b, max_delta))
                .sum();
            (count, None)
        };

        ComparisonOutcome {
            equal: differing_pixels == 0,
            differing_pixels,
            total_pixels,
            diff_image,
        }
    }
}

fn as_rgba(image: &DynamicImage) -> Cow<'_, RgbaImage> {
    match image {
        DynamicImage::ImageRgba8(buffer) => Cow::Borrowed(buffer),
        other => Cow::Owned(other.to_rgba8()),
    }
}

fn count_row(row_a: &[u8], row_b: &[u8], max_delta: f64) -> u64 {
    row_a
        .chunks_exact(4)
        .zip(row_b.chunks_exact(4))
        .filter(|(pa, pb)| color_delta(pa, pb) > max_delta)
        .count() as u64
}

fn draw_row(out: &mut [u8], row_a: &[u8], row_b: &[u8], max_delta: f64) -> u64 {
    let mut count = 0;
    for ((px, pa), pb) in out
        .chunks_exact_mut(4)
        .zip(row_a.chunks_exact(4))
        .zip(row_b.chunks_exact(4))
    {
        if color_delta(pa, pb) > max_delta {
            px.copy_from_slice(&DIFF_COLOR);
            count += 1;
        } else {
            let gray = blend(yiq(pa).0, FADE_ALPHA).clamp(0.0, 255.0) as u8;
            px.copy_from_slice(&[gray, gray, gray, 255]);
        }
    }
    count
}

/// Blend a channel with a white background.
fn blend(channel: f64, alpha: f64) -> f64 {
    255.0 + (channel - 255.0) * alpha
}

fn yiq(px: &[u8]) -> (f64, f64, f64) {
    let alpha = f64::from(px[3]) / 255.0;
    let r = blend(f64::from(px[0]), alpha);
    let g = blend(f64::from(px[1]), alpha);
    let b = blend(f64::from(px[2]), alpha);

    let y = r * 0.29889531 + g * 0.58662247 + b * 0.11448223;
    let i = r * 0.59597799 - g * 0.27417610 - b * 0.32180189;
    let q = r * 0.21147017 - g * 0.52261711 + b * 0.31114694;
    (y, i, q)
}

fn color_delta(pa: &[u8], pb: &[u8]) -> f64 {
    if pa == pb {
        return 0.0;
    }
    let (y1, i1, q1) = yiq(pa);
    let (y2, i2, q2) = yiq(pb);
    let (dy, di, dq) = (y1 - y2, i1 - i2, q1 - q2);
    0.5053 * dy * dy + 0.299 * di * di + 0.1957 * dq * dq
}
