//! Spot overlay for visual inspection of a tile.

use common::Buffer2;

use crate::config::VisualizationConfig;
use crate::features::SpotBox;
use crate::image::Image;
use crate::prune::PrunedSpot;

/// Contrast-boosted RGB copy of `background_removed` with a one-pixel box
/// outline around every spot.
///
/// Input is expected on the `[0, 255]` scale; output is on `[0, 1]` and may
/// exceed 1 where the boost saturates. Writers clamp.
pub fn highlight_spots(
    background_removed: &Image,
    spots: &[PrunedSpot],
    config: &VisualizationConfig,
) -> Image {
    let gain = config.contrast_boost / 255.0;
    let mut out = background_removed.to_rgb().map_samples(|v| v * gain);

    let (width, height) = out.dimensions();
    for spot in spots {
        let half = spot.sigma as usize + config.box_extension;
        let Some(bbox) = SpotBox::around(spot.x, spot.y, half, width, height) else {
            continue;
        };
        for (c, &color) in config.box_color.iter().enumerate() {
            draw_box(out.channel_mut(c), &bbox, color);
        }
    }
    out
}

fn draw_box(plane: &mut Buffer2<f32>, bbox: &SpotBox, color: f32) {
    for x in bbox.x_min..=bbox.x_max {
        plane[(x, bbox.y_min)] = color;
        plane[(x, bbox.y_max)] = color;
    }
    for y in bbox.y_min..=bbox.y_max {
        plane[(bbox.x_min, y)] = color;
        plane[(bbox.x_max, y)] = color;
    }
}
