//! Validity mask derived from the raw (non-linearized) frame.

use common::Buffer2;

use crate::image::Image;
use crate::prune::PrunedSpot;

/// Per-pixel validity. A pixel is valid iff its channel sum is nonzero, so
/// regions blacked out on the instrument side drop every spot they contain.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityMask {
    valid: Buffer2<bool>,
}

impl ValidityMask {
    pub fn from_image(source: &Image) -> Self {
        Self {
            valid: source.channel_sum().map(|&v| v != 0.0),
        }
    }

    /// Out-of-extent coordinates are invalid.
    #[inline]
    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        x < self.valid.width() && y < self.valid.height() && self.valid[(x, y)]
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Keeps spots whose centre pixel is valid, preserving order.
    pub fn filter(&self, spots: &[PrunedSpot]) -> Vec<PrunedSpot> {
        let kept: Vec<PrunedSpot> = spots
            .iter()
            .filter(|s| self.is_valid(s.x, s.y))
            .copied()
            .collect();
        tracing::debug!(
            before = spots.len(),
            after = kept.len(),
            "Applied validity mask"
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spot(x: usize, y: usize) -> PrunedSpot {
        PrunedSpot { x, y, sigma: 2.0 }
    }

    #[test]
    fn zero_sum_pixels_are_invalid() {
        let mut r = Buffer2::new_filled(4, 4, 10.0f32);
        let g = Buffer2::new_default(4, 4);
        let b = Buffer2::new_default(4, 4);
        r[(1, 2)] = 0.0;
        let mask = ValidityMask::from_image(&Image::from_channels(vec![r, g, b]).unwrap());

        assert!(!mask.is_valid(1, 2));
        assert!(mask.is_valid(2, 1));
        assert_eq!(mask.valid_count(), 15);
    }

    #[test]
    fn filter_removes_masked_and_out_of_bounds() {
        let mut plane = Buffer2::new_filled(10, 10, 1.0f32);
        plane[(3, 3)] = 0.0;
        let mask = ValidityMask::from_image(&Image::gray(plane));

        let spots = [spot(3, 3), spot(4, 4), spot(12, 1), spot(0, 9)];
        let kept = mask.filter(&spots);
        assert_eq!(kept, vec![spot(4, 4), spot(0, 9)]);
    }

    #[test]
    fn fully_invalid_mask_yields_nothing() {
        let mask = ValidityMask::from_image(&Image::gray(Buffer2::new_default(8, 8)));
        assert_eq!(mask.valid_count(), 0);
        assert!(mask.filter(&[spot(1, 1), spot(5, 5)]).is_empty());
        assert!(mask.filter(&[]).is_empty());
    }
}
