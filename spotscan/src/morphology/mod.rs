//! Flat grey-level morphology with symmetric structuring elements.
//!
//! Erosion and dilation decompose the element into horizontal runs. Every
//! distinct run half-width gets one running min/max pass over the rows
//! (van Herk / Gil-Werman, three comparisons per pixel regardless of width),
//! and the resulting planes are folded vertically at the row offsets that use
//! that width. Image borders use half-sample symmetric extension.

#[cfg(test)]
mod tests;

use common::Buffer2;
use common::buffer2::reflect_index;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::config::{BackgroundConfig, ElementShape};

const ROWS_PER_CHUNK: usize = 8;

/// Square-bounded, point-symmetric flat structuring element.
///
/// Stored as one horizontal half-width per row offset `dy ∈ [-radius, radius]`;
/// every row is a centred run `[-half_width, half_width]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    radius: usize,
    half_widths: Vec<usize>,
}

impl StructuringElement {
    pub fn new(shape: ElementShape, size: usize) -> Self {
        match shape {
            ElementShape::Ellipse => Self::ellipse(size),
            ElementShape::Rect => Self::rect(size),
        }
    }

    pub fn from_config(config: &BackgroundConfig) -> Self {
        Self::new(config.element_shape, config.element_size)
    }

    /// Digital disk inscribed in a `size × size` square. Row `dy` spans
    /// `round(sqrt(r² - dy²))` pixels either side of the centre.
    pub fn ellipse(size: usize) -> Self {
        assert!(size % 2 == 1, "Element size must be odd");
        let radius = size / 2;
        let r = radius as f32;
        let half_widths = (0..size)
            .map(|i| {
                let dy = i as f32 - r;
                (r * r - dy * dy).max(0.0).sqrt().round() as usize
            })
            .collect();
        Self {
            radius,
            half_widths,
        }
    }

    pub fn rect(size: usize) -> Self {
        assert!(size % 2 == 1, "Element size must be odd");
        let radius = size / 2;
        Self {
            radius,
            half_widths: vec![radius; size],
        }
    }

    /// Row offsets grouped by shared half-width, widths ascending.
    fn runs(&self) -> Vec<(usize, SmallVec<[isize; 4]>)> {
        let mut runs: Vec<(usize, SmallVec<[isize; 4]>)> = Vec::new();
        for (i, &w) in self.half_widths.iter().enumerate() {
            let dy = i as isize - self.radius as isize;
            match runs.iter_mut().find(|(width, _)| *width == w) {
                Some((_, offsets)) => offsets.push(dy),
                None => runs.push((w, smallvec::smallvec![dy])),
            }
        }
        runs.sort_by_key(|(w, _)| *w);
        runs
    }
}

#[derive(Debug, Clone, Copy)]
enum Extreme {
    Min,
    Max,
}

impl Extreme {
    #[inline]
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            Extreme::Min => a.min(b),
            Extreme::Max => a.max(b),
        }
    }

    #[inline]
    fn identity(self) -> f32 {
        match self {
            Extreme::Min => f32::INFINITY,
            Extreme::Max => f32::NEG_INFINITY,
        }
    }
}

pub fn erode(image: &Buffer2<f32>, element: &StructuringElement) -> Buffer2<f32> {
    rank_filter(image, element, Extreme::Min)
}

pub fn dilate(image: &Buffer2<f32>, element: &StructuringElement) -> Buffer2<f32> {
    rank_filter(image, element, Extreme::Max)
}

/// Erosion followed by dilation. Never exceeds the input.
pub fn open(image: &Buffer2<f32>, element: &StructuringElement) -> Buffer2<f32> {
    dilate(&erode(image, element), element)
}

/// Dilation followed by erosion. Never falls below the input.
pub fn close(image: &Buffer2<f32>, element: &StructuringElement) -> Buffer2<f32> {
    erode(&dilate(image, element), element)
}

/// `image - open(image)`: bright features smaller than the element.
pub fn white_tophat(image: &Buffer2<f32>, element: &StructuringElement) -> Buffer2<f32> {
    let mut out = open(image, element);
    out.pixels_mut()
        .par_iter_mut()
        .zip(image.pixels().par_iter())
        .for_each(|(o, &v)| *o = v - *o);
    out
}

/// `close(image) - image`: dark features smaller than the element.
pub fn black_tophat(image: &Buffer2<f32>, element: &StructuringElement) -> Buffer2<f32> {
    let mut out = close(image, element);
    out.pixels_mut()
        .par_iter_mut()
        .zip(image.pixels().par_iter())
        .for_each(|(o, &v)| *o -= v);
    out
}

fn rank_filter(image: &Buffer2<f32>, element: &StructuringElement, op: Extreme) -> Buffer2<f32> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let mut output = Buffer2::new_filled(width, height, op.identity());
    for (half_width, offsets) in element.runs() {
        let horizontal = running_extreme_rows(image, half_width, op);
        fold_rows(&mut output, &horizontal, &offsets, op);
    }
    output
}

/// Horizontal running min/max of window `2 * half_width + 1` over every row.
fn running_extreme_rows(image: &Buffer2<f32>, half_width: usize, op: Extreme) -> Buffer2<f32> {
    let width = image.width();
    if half_width == 0 {
        return image.clone();
    }

    let mut output = Buffer2::new_default(width, image.height());
    output
        .pixels_mut()
        .par_chunks_mut(width * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, out_chunk)| {
            let padded_len = width + 2 * half_width;
            let mut padded = vec![0.0f32; padded_len];
            let mut prefix = vec![0.0f32; padded_len];
            let mut suffix = vec![0.0f32; padded_len];

            for (local_y, out_row) in out_chunk.chunks_exact_mut(width).enumerate() {
                let y = chunk_idx * ROWS_PER_CHUNK + local_y;
                let row = image.row(y);
                for (j, p) in padded.iter_mut().enumerate() {
                    *p = row[reflect_index(j as isize - half_width as isize, width)];
                }
                van_herk(&padded, &mut prefix, &mut suffix, out_row, 2 * half_width + 1, op);
            }
        });
    output
}

/// Sliding-window extreme over `padded`, writing `output.len()` windows of
/// length `window`.
fn van_herk(
    padded: &[f32],
    prefix: &mut [f32],
    suffix: &mut [f32],
    output: &mut [f32],
    window: usize,
    op: Extreme,
) {
    let n = padded.len();
    for start in (0..n).step_by(window) {
        let end = (start + window).min(n);

        prefix[start] = padded[start];
        for i in start + 1..end {
            prefix[i] = op.apply(prefix[i - 1], padded[i]);
        }

        suffix[end - 1] = padded[end - 1];
        for i in (start..end - 1).rev() {
            suffix[i] = op.apply(suffix[i + 1], padded[i]);
        }
    }

    for (i, out) in output.iter_mut().enumerate() {
        *out = op.apply(suffix[i], prefix[i + window - 1]);
    }
}

/// `output[y] = op(output[y], horizontal[reflect(y + dy)])` for every offset.
fn fold_rows(output: &mut Buffer2<f32>, horizontal: &Buffer2<f32>, offsets: &[isize], op: Extreme) {
    let (width, height) = horizontal.dimensions();
    output
        .pixels_mut()
        .par_chunks_mut(width * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, out_chunk)| {
            for (local_y, out_row) in out_chunk.chunks_exact_mut(width).enumerate() {
                let y = (chunk_idx * ROWS_PER_CHUNK + local_y) as isize;
                for &dy in offsets {
                    let src = horizontal.row(reflect_index(y + dy, height));
                    for (o, &v) in out_row.iter_mut().zip(src) {
                        *o = op.apply(*o, v);
                    }
                }
            }
        });
}
