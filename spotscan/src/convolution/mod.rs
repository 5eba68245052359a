//! Separable Gaussian smoothing and the discrete Laplacian.
//!
//! Rows are convolved first, then columns. Both passes run in parallel over
//! chunks of rows and extend the image by half-sample symmetric reflection.

#[cfg(test)]
mod tests;

use common::Buffer2;
use common::buffer2::reflect_index;
use rayon::prelude::*;

/// Rows per parallel work item. Keeps each thread on its own span of memory.
const ROWS_PER_CHUNK: usize = 8;

/// 1D Gaussian kernel with `2 * radius + 1` taps.
///
/// Taps are `exp(-x² / 2σ²) / (√(2π)·σ)`: the continuous density sampled at
/// integer offsets, not renormalized to a unit sum. At the default
/// truncations the sum is within a fraction of a percent of 1.
pub fn gaussian_kernel_1d(radius: usize, sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "Sigma must be positive");

    let norm = 1.0 / ((2.0 * std::f32::consts::PI).sqrt() * sigma);
    let two_sigma_sq = 2.0 * sigma * sigma;
    (0..2 * radius + 1)
        .map(|i| {
            let x = i as f32 - radius as f32;
            norm * (-x * x / two_sigma_sq).exp()
        })
        .collect()
}

/// Convolves `image` with `kernel` along rows and then along columns.
///
/// `kernel` must have odd length; it is applied centred.
pub fn convolve_separable(image: &Buffer2<f32>, kernel: &[f32]) -> Buffer2<f32> {
    assert!(kernel.len() % 2 == 1, "Kernel length must be odd");

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let mut temp = Buffer2::new_default(width, height);
    convolve_rows_parallel(image, &mut temp, kernel);

    let mut output = Buffer2::new_default(width, height);
    convolve_cols_parallel(&temp, &mut output, kernel);
    output
}

fn convolve_rows_parallel(input: &Buffer2<f32>, output: &mut Buffer2<f32>, kernel: &[f32]) {
    let width = input.width();
    output
        .pixels_mut()
        .par_chunks_mut(width * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, out_chunk)| {
            for (local_y, out_row) in out_chunk.chunks_exact_mut(width).enumerate() {
                let y = chunk_idx * ROWS_PER_CHUNK + local_y;
                convolve_row(input.row(y), out_row, kernel);
            }
        });
}

/// Convolve a single row. The interior avoids the reflection lookup.
#[inline]
fn convolve_row(input: &[f32], output: &mut [f32], kernel: &[f32]) {
    let width = input.len();
    let radius = kernel.len() / 2;

    for (x, out) in output.iter_mut().enumerate() {
        let mut sum = 0.0f32;
        if x >= radius && x + radius < width {
            let window = &input[x - radius..=x + radius];
            for (&v, &k) in window.iter().zip(kernel) {
                sum += v * k;
            }
        } else {
            for (k, &kval) in kernel.iter().enumerate() {
                let sx = x as isize + k as isize - radius as isize;
                sum += input[reflect_index(sx, width)] * kval;
            }
        }
        *out = sum;
    }
}

fn convolve_cols_parallel(input: &Buffer2<f32>, output: &mut Buffer2<f32>, kernel: &[f32]) {
    let (width, height) = input.dimensions();
    let radius = kernel.len() / 2;

    output
        .pixels_mut()
        .par_chunks_mut(width * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, out_chunk)| {
            for (local_y, out_row) in out_chunk.chunks_exact_mut(width).enumerate() {
                let y = chunk_idx * ROWS_PER_CHUNK + local_y;
                out_row.fill(0.0);
                for (k, &kval) in kernel.iter().enumerate() {
                    let sy = reflect_index(y as isize + k as isize - radius as isize, height);
                    for (o, &v) in out_row.iter_mut().zip(input.row(sy)) {
                        *o += v * kval;
                    }
                }
            }
        });
}

/// 3×3 Laplacian `[[0, 1, 0], [1, -4, 1], [0, 1, 0]]` with reflect borders.
pub fn laplacian_3x3(image: &Buffer2<f32>) -> Buffer2<f32> {
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
                let y = chunk_idx * ROWS_PER_CHUNK + local_y;
                let up = image.row(reflect_index(y as isize - 1, height));
                let row = image.row(y);
                let down = image.row(reflect_index(y as isize + 1, height));
                for (x, out) in out_row.iter_mut().enumerate() {
                    let left = row[reflect_index(x as isize - 1, width)];
                    let right = row[reflect_index(x as isize + 1, width)];
                    *out = up[x] + down[x] + left + right - 4.0 * row[x];
                }
            }
        });
    output
}

/// Scale-normalized LoG response: `-σ² · ∇²(G_σ * image)`.
///
/// Positive at the centre of bright blobs.
pub fn log_response(image: &Buffer2<f32>, kernel: &[f32], sigma: f32) -> Buffer2<f32> {
    let mut response = laplacian_3x3(&convolve_separable(image, kernel));
    let scale = -(sigma * sigma);
    response.pixels_mut().par_iter_mut().for_each(|v| *v *= scale);
    response
}
