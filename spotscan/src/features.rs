//! Per-spot photometric and sharpness features.

use common::Buffer2;
use serde::Serialize;

use crate::config::FeatureConfig;
use crate::convolution::laplacian_3x3;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::pipeline::TileId;
use crate::prune::PrunedSpot;

/// CSV header, in column order.
pub const COLUMNS: [&str; 16] = [
    "FOV_row",
    "FOV_col",
    "x",
    "y",
    "r",
    "R",
    "G",
    "B",
    "R_max",
    "G_max",
    "B_max",
    "lap_total",
    "lap_max",
    "numPixels",
    "numSaturatedPixels",
    "idx",
];

/// One row of the per-tile spot table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpotRecord {
    #[serde(rename = "FOV_row")]
    pub fov_row: usize,
    #[serde(rename = "FOV_col")]
    pub fov_col: usize,
    pub x: usize,
    pub y: usize,
    /// Spot sigma truncated toward zero.
    pub r: usize,
    #[serde(rename = "R")]
    pub red: f64,
    #[serde(rename = "G")]
    pub green: f64,
    #[serde(rename = "B")]
    pub blue: f64,
    #[serde(rename = "R_max")]
    pub red_max: f32,
    #[serde(rename = "G_max")]
    pub green_max: f32,
    #[serde(rename = "B_max")]
    pub blue_max: f32,
    pub lap_total: f64,
    pub lap_max: f32,
    #[serde(rename = "numPixels")]
    pub num_pixels: usize,
    #[serde(rename = "numSaturatedPixels")]
    pub num_saturated_pixels: usize,
    /// Position within the tile's record list.
    pub idx: usize,
}

/// Inclusive pixel box around a spot, clipped to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpotBox {
    pub x_min: usize,
    pub y_min: usize,
    pub x_max: usize,
    pub y_max: usize,
}

impl SpotBox {
    /// Box of half-width `half` centred on `(x, y)`. `None` if the centre
    /// lies outside a `width × height` image.
    pub fn around(x: usize, y: usize, half: usize, width: usize, height: usize) -> Option<Self> {
        if x >= width || y >= height {
            return None;
        }
        Some(Self {
            x_min: x.saturating_sub(half),
            y_min: y.saturating_sub(half),
            x_max: (x + half).min(width - 1),
            y_max: (y + half).min(height - 1),
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.x_max - self.x_min + 1
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.y_max - self.y_min + 1
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    fn crop(&self, plane: &Buffer2<f32>) -> Buffer2<f32> {
        plane.crop(self.x_min, self.y_min, self.x_max + 1, self.y_max + 1)
    }
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    extension: usize,
    saturation_threshold: f32,
}

impl FeatureExtractor {
    pub fn new(config: &FeatureConfig) -> Self {
        Self {
            extension: config.extension,
            saturation_threshold: config.saturation_threshold,
        }
    }

    /// Builds one record per spot.
    ///
    /// Sums, maxima and the Laplacian come from `background_removed`; the
    /// saturation count comes from `raw`. Both must share the same extent.
    pub fn extract(
        &self,
        tile: TileId,
        background_removed: &Image,
        raw: &Image,
        spots: &[PrunedSpot],
    ) -> Result<Vec<SpotRecord>> {
        if raw.dimensions() != background_removed.dimensions() {
            return Err(Error::DimensionMismatch {
                what: "raw fluorescence",
                expected: background_removed.dimensions(),
                actual: raw.dimensions(),
            });
        }
        let rgb = match background_removed.channel_count() {
            1 => [0, 0, 0],
            3 => [0, 1, 2],
            actual => {
                return Err(Error::ChannelCount {
                    expected: "1 or 3",
                    actual,
                });
            }
        };

        let (width, height) = background_removed.dimensions();
        let mut records = Vec::with_capacity(spots.len());

        for spot in spots {
            let r = spot.sigma as usize;
            let Some(bbox) = SpotBox::around(spot.x, spot.y, r + self.extension, width, height)
            else {
                tracing::warn!(x = spot.x, y = spot.y, %tile, "Spot centre outside image, skipped");
                continue;
            };

            let crops: Vec<Buffer2<f32>> = background_removed
                .channels()
                .iter()
                .map(|c| bbox.crop(c))
                .collect();
            let sums: Vec<f64> = crops
                .iter()
                .map(|c| c.iter().map(|&v| v as f64).sum())
                .collect();
            let maxes: Vec<f32> = crops
                .iter()
                .map(|c| c.iter().copied().fold(f32::NEG_INFINITY, f32::max))
                .collect();

            let mut combined = Buffer2::new_default(bbox.width(), bbox.height());
            for crop in &crops {
                for (o, &v) in combined.iter_mut().zip(crop.iter()) {
                    *o += v;
                }
            }
            let lap = laplacian_3x3(&combined);
            let lap_total = lap.iter().map(|&v| v.abs() as f64).sum();
            let lap_max = lap.iter().map(|v| v.abs()).fold(0.0f32, f32::max);

            let num_saturated_pixels = raw
                .channels()
                .iter()
                .map(|c| {
                    bbox.crop(c)
                        .iter()
                        .filter(|&&v| v > self.saturation_threshold)
                        .count()
                })
                .sum();

            records.push(SpotRecord {
                fov_row: tile.row,
                fov_col: tile.col,
                x: spot.x,
                y: spot.y,
                r,
                red: sums[rgb[0]],
                green: sums[rgb[1]],
                blue: sums[rgb[2]],
                red_max: maxes[rgb[0]],
                green_max: maxes[rgb[1]],
                blue_max: maxes[rgb[2]],
                lap_total,
                lap_max,
                num_pixels: bbox.area(),
                num_saturated_pixels,
                idx: records.len(),
            });
        }

        Ok(records)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(&FeatureConfig::default())
    }
}
