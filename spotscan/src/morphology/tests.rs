//! Tests for flat grey-level morphology.

use super::*;
use crate::testing::{gaussian, noise};

impl StructuringElement {
    fn contains(&self, dx: isize, dy: isize) -> bool {
        let r = self.radius as isize;
        if dy < -r || dy > r {
            return false;
        }
        dx.unsigned_abs() <= self.half_widths[(dy + r) as usize]
    }

    fn area(&self) -> usize {
        self.half_widths.iter().map(|w| 2 * w + 1).sum()
    }
}

fn brute_force(image: &Buffer2<f32>, element: &StructuringElement, op: Extreme) -> Buffer2<f32> {
    let r = element.radius as isize;
    let (width, height) = image.dimensions();
    Buffer2::from_fn(width, height, |x, y| {
        let mut acc = op.identity();
        for dy in -r..=r {
            for dx in -r..=r {
                if element.contains(dx, dy) {
                    let sx = reflect_index(x as isize + dx, width);
                    let sy = reflect_index(y as isize + dy, height);
                    acc = op.apply(acc, image[(sx, sy)]);
                }
            }
        }
        acc
    })
}

// ============================================================================
// Structuring element
// ============================================================================

#[test]
fn test_ellipse_17_half_widths() {
    let element = StructuringElement::ellipse(17);
    assert_eq!(element.radius, 8);
    assert_eq!(
        element.half_widths,
        &[0, 4, 5, 6, 7, 7, 8, 8, 8, 8, 8, 7, 7, 6, 5, 4, 0]
    );
}

#[test]
fn test_ellipse_3_is_cross() {
    let element = StructuringElement::ellipse(3);
    assert!(element.contains(0, 0));
    assert!(element.contains(1, 0));
    assert!(element.contains(0, -1));
    assert!(!element.contains(1, 1));
    assert_eq!(element.area(), 5);
}

#[test]
fn test_rect_covers_square() {
    let element = StructuringElement::rect(5);
    assert_eq!(element.area(), 25);
    assert!(element.contains(-2, 2));
    assert!(!element.contains(3, 0));
}

#[test]
#[should_panic(expected = "Element size must be odd")]
fn test_even_size_panics() {
    StructuringElement::ellipse(4);
}

#[test]
fn test_runs_group_symmetric_rows() {
    let element = StructuringElement::ellipse(5);
    let runs = element.runs();
    let total: usize = runs.iter().map(|(_, offsets)| offsets.len()).sum();
    assert_eq!(total, 5);
    for (w, offsets) in &runs {
        for &dy in offsets {
            assert_eq!(element.half_widths[(dy + 2) as usize], *w);
        }
    }
}

// ============================================================================
// Erosion / dilation
// ============================================================================

#[test]
fn test_erode_dilate_match_brute_force() {
    let image = noise(37, 23, 7, 100.0);
    for element in [
        StructuringElement::ellipse(7),
        StructuringElement::rect(5),
        StructuringElement::ellipse(17),
    ] {
        assert_eq!(erode(&image, &element), brute_force(&image, &element, Extreme::Min));
        assert_eq!(dilate(&image, &element), brute_force(&image, &element, Extreme::Max));
    }
}

#[test]
fn test_element_larger_than_image() {
    let image = noise(5, 3, 11, 10.0);
    let element = StructuringElement::ellipse(17);
    assert_eq!(erode(&image, &element), brute_force(&image, &element, Extreme::Min));
}

#[test]
fn test_empty_image_passes_through() {
    let image: Buffer2<f32> = Buffer2::new_default(0, 0);
    let element = StructuringElement::ellipse(3);
    assert_eq!(erode(&image, &element).dimensions(), (0, 0));
}

// ============================================================================
// Tophats
// ============================================================================

#[test]
fn test_open_close_bracket_input() {
    let image = noise(30, 30, 3, 50.0);
    let element = StructuringElement::ellipse(5);
    let opened = open(&image, &element);
    let closed = close(&image, &element);
    for i in 0..image.len() {
        assert!(opened.pixels()[i] <= image.pixels()[i]);
        assert!(closed.pixels()[i] >= image.pixels()[i]);
    }
}

#[test]
fn test_tophats_of_flat_image_are_zero() {
    let image = Buffer2::new_filled(20, 20, 42.0f32);
    let element = StructuringElement::ellipse(17);
    assert!(white_tophat(&image, &element).iter().all(|&v| v == 0.0));
    assert!(black_tophat(&image, &element).iter().all(|&v| v == 0.0));
}

#[test]
fn test_white_tophat_removes_ramp_keeps_spot() {
    let width = 64;
    let mut image = gaussian(width, width, 32.0, 32.0, 2.0, 100.0, 0.0);
    for (i, v) in image.pixels_mut().iter_mut().enumerate() {
        *v += (i % width) as f32 * 0.5;
    }
    let element = StructuringElement::ellipse(17);
    let th = white_tophat(&image, &element);

    let peak = th[(32, 32)];
    assert!((peak - 100.0).abs() < 5.0, "peak {peak}");
    assert!(th[(5, 5)].abs() < 1e-3);
    assert!(th.iter().all(|&v| v >= 0.0));
}

#[test]
fn test_black_tophat_finds_dark_pit() {
    let mut image = Buffer2::new_filled(40, 40, 200.0f32);
    image[(20, 20)] = 50.0;
    let element = StructuringElement::ellipse(17);
    let bth = black_tophat(&image, &element);
    assert_eq!(bth[(20, 20)], 150.0);
    assert_eq!(bth[(0, 0)], 0.0);
}
