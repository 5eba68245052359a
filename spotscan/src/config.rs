//! Configuration types for the spot pipeline.
//!
//! Every constant the stages use lives here. A [`Config`] is built once
//! (from defaults or a YAML/JSON file), validated, and then threaded through
//! [`TilePipeline`](crate::TilePipeline) by reference.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Crop
// ============================================================================

/// Rectangular window cut from each raw frame before processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropWindow {
    pub x_start: usize,
    pub y_start: usize,
    pub width: usize,
    pub height: usize,
}

impl Default for CropWindow {
    /// Centre window of a 3280×2464 sensor frame, shifted 150 px left.
    fn default() -> Self {
        Self {
            x_start: 776,
            y_start: 518,
            width: 1428,
            height: 1428,
        }
    }
}

// ============================================================================
// Background
// ============================================================================

/// Shape of the flat structuring element used by the tophat transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementShape {
    /// Digital disk inscribed in the `size × size` square.
    #[default]
    Ellipse,
    /// Full `size × size` square.
    Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub element_shape: ElementShape,
    /// Side length of the structuring element. Must be odd.
    pub element_size: usize,
    /// Value the black-tophat brightfield result is subtracted from.
    pub max_intensity: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            element_shape: ElementShape::Ellipse,
            element_size: 17,
            max_intensity: 255.0,
        }
    }
}

// ============================================================================
// Detection
// ============================================================================

/// One rung of the detection scale ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// Gaussian kernel half-length; the kernel has `2 * radius + 1` taps.
    pub radius: usize,
    pub sigma: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub scales: Vec<ScaleConfig>,
    /// Minimum scale-normalized LoG response for a local maximum to count.
    pub threshold: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            scales: vec![
                ScaleConfig {
                    radius: 4,
                    sigma: 1.0,
                },
                ScaleConfig {
                    radius: 6,
                    sigma: 1.5,
                },
                ScaleConfig {
                    radius: 8,
                    sigma: 2.0,
                },
                ScaleConfig {
                    radius: 10,
                    sigma: 2.5,
                },
            ],
            threshold: 12.0,
        }
    }
}

// ============================================================================
// Pruning
// ============================================================================

/// Where the pruner takes the sigma for each candidate's scale index.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PruneSigmas {
    /// Use the detection ladder's own sigmas.
    #[default]
    Shared,
    /// Independent, linearly spaced ladder over `[min_sigma, max_sigma]`.
    Linspace {
        min_sigma: f32,
        max_sigma: f32,
        count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruningConfig {
    pub sigmas: PruneSigmas,
    /// Two blobs overlap when their distance is below
    /// `overlap * (sigma_a + sigma_b)`.
    pub overlap: f32,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            sigmas: PruneSigmas::Shared,
            overlap: 0.5,
        }
    }
}

// ============================================================================
// Features
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Extra pixels added to the spot radius on each side of the box.
    pub extension: usize,
    /// Raw samples strictly above this value count as saturated.
    pub saturation_threshold: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            extension: 1,
            saturation_threshold: 254.0,
        }
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizationConfig {
    pub contrast_boost: f32,
    pub box_extension: usize,
    /// Box colour as RGB in `[0, 1]`.
    pub box_color: [f32; 3],
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            contrast_boost: 1.6,
            box_extension: 2,
            box_color: [0.6, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Also write cropped, mask, background-removed images and the raw
    /// and pruned coordinate lists.
    pub save_intermediate: bool,
    pub visualization: VisualizationConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_intermediate: true,
            visualization: VisualizationConfig::default(),
        }
    }
}

// ============================================================================
// Config
// ============================================================================

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `None` processes whole frames.
    pub crop: Option<CropWindow>,
    /// R, G, B weights used wherever a colour image is reduced to one plane.
    pub luminance_weights: [f32; 3],
    pub background: BackgroundConfig,
    pub detection: DetectionConfig,
    pub pruning: PruningConfig,
    pub features: FeatureConfig,
    pub output: OutputConfig,
}

/// Rec. 601 luma weights in planar channel order. Planar R carries the blue
/// coefficient so candidate sets stay comparable with existing scans, whose
/// luminance was taken over BGR-ordered planes.
pub const LUMINANCE_WEIGHTS: [f32; 3] = [0.114, 0.587, 0.299];

impl Default for Config {
    fn default() -> Self {
        Self {
            crop: Some(CropWindow::default()),
            luminance_weights: LUMINANCE_WEIGHTS,
            background: BackgroundConfig::default(),
            detection: DetectionConfig::default(),
            pruning: PruningConfig::default(),
            features: FeatureConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Loads a YAML or JSON config, picked by file extension, and validates it.
    /// Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config_err = |reason: String| Error::ConfigLoad {
            path: path.to_path_buf(),
            reason,
        };

        let format = common::FileFormat::from_path(path).map_err(|e| config_err(e.to_string()))?;
        let text = std::fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
        let config: Config =
            common::deserialize(&text, format).map_err(|e| config_err(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, msg: impl FnOnce() -> String) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(Error::InvalidConfig(msg()))
            }
        }

        if let Some(crop) = &self.crop {
            check(crop.width > 0 && crop.height > 0, || {
                format!("crop window must be non-empty, got {}x{}", crop.width, crop.height)
            })?;
        }

        let weight_sum: f32 = self.luminance_weights.iter().sum();
        check(
            self.luminance_weights.iter().all(|w| *w >= 0.0) && weight_sum > 0.0,
            || {
                format!(
                    "luminance_weights must be non-negative with a positive sum, got {:?}",
                    self.luminance_weights
                )
            },
        )?;

        let bg = &self.background;
        check(bg.element_size % 2 == 1, || {
            format!("element_size must be odd, got {}", bg.element_size)
        })?;

        let det = &self.detection;
        check(!det.scales.is_empty(), || {
            "detection.scales must not be empty".to_string()
        })?;
        for (i, scale) in det.scales.iter().enumerate() {
            check(scale.sigma > 0.0, || {
                format!("scale {} sigma must be positive, got {}", i, scale.sigma)
            })?;
            check(scale.radius > 0, || format!("scale {} radius must be positive", i))?;
        }

        let prune = &self.pruning;
        check(prune.overlap >= 0.0, || {
            format!("pruning.overlap must be non-negative, got {}", prune.overlap)
        })?;
        if let PruneSigmas::Linspace {
            min_sigma,
            max_sigma,
            count,
        } = prune.sigmas
        {
            check(count > 0, || "pruning.sigmas.count must be positive".to_string())?;
            check(min_sigma > 0.0 && max_sigma >= min_sigma, || {
                format!(
                    "pruning sigma range must satisfy 0 < min <= max, got [{}, {}]",
                    min_sigma, max_sigma
                )
            })?;
        }

        let vis = &self.output.visualization;
        check(vis.contrast_boost > 0.0, || {
            format!("contrast_boost must be positive, got {}", vis.contrast_boost)
        })?;

        Ok(())
    }
}
