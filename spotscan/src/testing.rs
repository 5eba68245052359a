//! Synthetic images for stage tests.

use common::Buffer2;

/// Gaussian spot of peak `amplitude` centred at `(cx, cy)` over a constant
/// background.
pub fn gaussian(
    width: usize,
    height: usize,
    cx: f32,
    cy: f32,
    sigma: f32,
    amplitude: f32,
    background: f32,
) -> Buffer2<f32> {
    let two_sigma_sq = 2.0 * sigma * sigma;
    Buffer2::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        background + amplitude * (-(dx * dx + dy * dy) / two_sigma_sq).exp()
    })
}

/// Adds a Gaussian spot onto an existing plane.
pub fn add_gaussian(plane: &mut Buffer2<f32>, cx: f32, cy: f32, sigma: f32, amplitude: f32) {
    let two_sigma_sq = 2.0 * sigma * sigma;
    let width = plane.width();
    for (i, v) in plane.pixels_mut().iter_mut().enumerate() {
        let dx = (i % width) as f32 - cx;
        let dy = (i / width) as f32 - cy;
        *v += amplitude * (-(dx * dx + dy * dy) / two_sigma_sq).exp();
    }
}

/// Deterministic pseudo-random plane in `[0, scale)`.
pub fn noise(width: usize, height: usize, seed: u64, scale: f32) -> Buffer2<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    Buffer2::from_fn(width, height, |_, _| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 40) as f32 / (1u64 << 24) as f32) * scale
    })
}
