//! Multiscale Laplacian-of-Gaussian spot detection.
//!
//! For every rung of the scale ladder the image is smoothed, passed through
//! the 3×3 Laplacian and scaled by `-σ²`. The per-pixel maximum over scales
//! (the projection) is max-filtered; pixels that equal their 3×3 neighbourhood
//! maximum and clear the threshold become candidates, tagged with the lowest
//! scale whose response produced that maximum.


use common::Buffer2;
use common::buffer2::reflect_index;
use rayon::prelude::*;

use crate::convolution::{gaussian_kernel_1d, log_response};
use crate::error::Result;
use crate::image::Image;
use crate::scale::{ScaleLadder, ScaleLevel};

const ROWS_PER_CHUNK: usize = 8;

/// Local maximum before overlap pruning. `scale` indexes the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateSpot {
    pub x: usize,
    pub y: usize,
    pub scale: usize,
}

/// Per-scale LoG responses and their pixelwise maximum.
#[derive(Debug, Clone)]
pub struct ScaleSpace {
    pub responses: Vec<Buffer2<f32>>,
    pub projection: Buffer2<f32>,
}

/// Detector with its Gaussian kernel bank built once from the ladder.
#[derive(Debug, Clone)]
pub struct SpotDetector {
    levels: Vec<ScaleLevel>,
    kernels: Vec<Vec<f32>>,
    threshold: f32,
    luminance_weights: [f32; 3],
}

impl SpotDetector {
    pub fn new(ladder: &ScaleLadder, threshold: f32, luminance_weights: [f32; 3]) -> Self {
        let levels = ladder.levels().to_vec();
        let kernels = levels
            .iter()
            .map(|l| gaussian_kernel_1d(l.radius, l.sigma))
            .collect();
        Self {
            levels,
            kernels,
            threshold,
            luminance_weights,
        }
    }

    /// Computes every scale's response. Scales run in parallel; each one is
    /// row-parallel internally.
    pub fn scale_space(&self, image: &Buffer2<f32>) -> ScaleSpace {
        let responses: Vec<Buffer2<f32>> = self
            .levels
            .par_iter()
            .zip(self.kernels.par_iter())
            .map(|(level, kernel)| log_response(image, kernel, level.sigma))
            .collect();

        let mut projection = responses[0].clone();
        for response in &responses[1..] {
            for (p, &v) in projection.iter_mut().zip(response.iter()) {
                *p = p.max(v);
            }
        }

        ScaleSpace {
            responses,
            projection,
        }
    }

    /// Candidates of a single-plane image in row-major order.
    pub fn detect(&self, image: &Buffer2<f32>) -> Vec<CandidateSpot> {
        let space = self.scale_space(image);
        let candidates = self.trace(&space);
        tracing::debug!(
            scales = self.levels.len(),
            candidates = candidates.len(),
            "LoG detection complete"
        );
        candidates
    }

    /// Reduces colour input to luminance, then detects.
    pub fn detect_image(&self, image: &Image) -> Result<Vec<CandidateSpot>> {
        let plane = image.luminance(self.luminance_weights)?;
        Ok(self.detect(&plane))
    }

    /// Thresholded max-filter of the projection, traced back to the lowest
    /// scale index whose response equals the filtered value. Pixels that are
    /// not their neighbourhood's maximum match no scale and are skipped.
    pub fn trace(&self, space: &ScaleSpace) -> Vec<CandidateSpot> {
        let mut filtered = maximum_filter_3x3(&space.projection);
        for v in filtered.iter_mut() {
            if *v < self.threshold {
                *v = 0.0;
            }
        }

        let width = filtered.width();
        let mut candidates = Vec::new();
        for (i, &peak) in filtered.iter().enumerate() {
            if peak == 0.0 {
                continue;
            }
            if let Some(scale) = space.responses.iter().position(|r| r.pixels()[i] == peak) {
                candidates.push(CandidateSpot {
                    x: i % width,
                    y: i / width,
                    scale,
                });
            }
        }
        candidates
    }
}

/// 3×3 maximum filter with reflect borders.
pub fn maximum_filter_3x3(image: &Buffer2<f32>) -> Buffer2<f32> {
    let (width, height) = image.dimensions();
    let mut output = Buffer2::new_default(width, height);
    if width == 0 || height == 0 {
        return output;
    }

    output
        .pixels_mut()
        .par_chunks_mut(width * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, out_chunk)| {
            for (local_y, out_row) in out_chunk.chunks_exact_mut(width).enumerate() {
                let y = (chunk_idx * ROWS_PER_CHUNK + local_y) as isize;
                let rows = [
                    image.row(reflect_index(y - 1, height)),
                    image.row(y as usize),
                    image.row(reflect_index(y + 1, height)),
                ];
                for (x, out) in out_row.iter_mut().enumerate() {
                    let left = reflect_index(x as isize - 1, width);
                    let right = reflect_index(x as isize + 1, width);
                    let mut m = f32::NEG_INFINITY;
                    for row in rows {
                        m = m.max(row[left]).max(row[x]).max(row[right]);
                    }
                    *out = m;
                }
            }
        });
    output
}
