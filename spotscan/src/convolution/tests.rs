//! Tests for separable convolution and the Laplacian.

use super::*;
use crate::testing::{gaussian, noise};

fn convolve_brute_force(image: &Buffer2<f32>, kernel: &[f32]) -> Buffer2<f32> {
    let r = (kernel.len() / 2) as isize;
    let (width, height) = image.dimensions();
    Buffer2::from_fn(width, height, |x, y| {
        let mut sum = 0.0f32;
        for (j, &ky) in kernel.iter().enumerate() {
            for (i, &kx) in kernel.iter().enumerate() {
                let sx = x as isize + i as isize - r;
                let sy = y as isize + j as isize - r;
                sum += image[(reflect_index(sx, width), reflect_index(sy, height))] * kx * ky;
            }
        }
        sum
    })
}

// ============================================================================
// Kernel generation tests
// ============================================================================

#[test]
fn test_gaussian_kernel_length_and_symmetry() {
    let kernel = gaussian_kernel_1d(8, 2.0);
    assert_eq!(kernel.len(), 17);
    for i in 0..kernel.len() / 2 {
        assert!((kernel[i] - kernel[kernel.len() - 1 - i]).abs() < 1e-7);
    }
    let center = kernel.len() / 2;
    assert!(kernel.iter().all(|&v| v <= kernel[center]));
}

#[test]
fn test_gaussian_kernel_analytic_normalization() {
    let sigma = 1.5;
    let kernel = gaussian_kernel_1d(6, sigma);
    let expected_peak = 1.0 / ((2.0 * std::f32::consts::PI).sqrt() * sigma);
    assert!((kernel[6] - expected_peak).abs() < 1e-6);

    for (radius, sigma) in [(4, 1.0), (6, 1.5), (8, 2.0), (10, 2.5)] {
        let sum: f32 = gaussian_kernel_1d(radius, sigma).iter().sum();
        assert!((sum - 1.0).abs() < 1e-3, "sum {sum} for sigma {sigma}");
    }
}

#[test]
#[should_panic(expected = "Sigma must be positive")]
fn test_gaussian_kernel_zero_sigma_panics() {
    gaussian_kernel_1d(3, 0.0);
}

// ============================================================================
// Convolution tests
// ============================================================================

#[test]
fn test_separable_matches_brute_force() {
    let image = noise(41, 19, 5, 200.0);
    let kernel = gaussian_kernel_1d(4, 1.0);
    let fast = convolve_separable(&image, &kernel);
    let slow = convolve_brute_force(&image, &kernel);
    for (a, b) in fast.iter().zip(slow.iter()) {
        assert!((a - b).abs() < 1e-3, "{a} vs {b}");
    }
}

#[test]
fn test_kernel_wider_than_image() {
    let image = noise(6, 5, 9, 10.0);
    let kernel = gaussian_kernel_1d(10, 2.5);
    let fast = convolve_separable(&image, &kernel);
    let slow = convolve_brute_force(&image, &kernel);
    for (a, b) in fast.iter().zip(slow.iter()) {
        assert!((a - b).abs() < 1e-3);
    }
}

#[test]
fn test_convolution_of_flat_image_scales_by_kernel_sum() {
    let image = Buffer2::new_filled(30, 30, 10.0f32);
    let kernel = gaussian_kernel_1d(8, 2.0);
    let sum: f32 = kernel.iter().sum();
    let out = convolve_separable(&image, &kernel);
    for &v in out.iter() {
        assert!((v - 10.0 * sum * sum).abs() < 1e-3);
    }
}

// ============================================================================
// Laplacian tests
// ============================================================================

#[test]
fn test_laplacian_of_flat_is_zero() {
    let image = Buffer2::new_filled(9, 7, 3.0f32);
    assert!(laplacian_3x3(&image).iter().all(|&v| v == 0.0));
}

#[test]
fn test_laplacian_of_impulse() {
    let mut image = Buffer2::new_default(5, 5);
    image[(2, 2)] = 1.0f32;
    let lap = laplacian_3x3(&image);
    assert_eq!(lap[(2, 2)], -4.0);
    assert_eq!(lap[(1, 2)], 1.0);
    assert_eq!(lap[(2, 3)], 1.0);
    assert_eq!(lap[(1, 1)], 0.0);
}

#[test]
fn test_laplacian_reflects_at_border() {
    let mut image = Buffer2::new_default(4, 4);
    image[(0, 0)] = 1.0f32;
    let lap = laplacian_3x3(&image);
    // Reflected neighbours at x = -1 and y = -1 are the pixel itself.
    assert_eq!(lap[(0, 0)], -2.0);
}

#[test]
fn test_log_response_peaks_at_blob_centre() {
    let image = gaussian(40, 40, 20.0, 20.0, 2.0, 100.0, 0.0);
    let kernel = gaussian_kernel_1d(8, 2.0);
    let response = log_response(&image, &kernel, 2.0);

    let center = response[(20, 20)];
    assert!(center > 12.0, "center response {center}");
    assert!(response.iter().all(|&v| v <= center));
}
