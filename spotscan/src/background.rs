//! Morphological background removal for brightfield and fluorescence frames.

use common::Buffer2;

use crate::config::{BackgroundConfig, LUMINANCE_WEIGHTS};
use crate::error::Result;
use crate::image::Image;
use crate::morphology::{self, StructuringElement};

/// Removes smooth illumination background with tophat transforms.
#[derive(Debug, Clone)]
pub struct BackgroundRemover {
    element: StructuringElement,
    max_intensity: f32,
    luminance_weights: [f32; 3],
}

impl BackgroundRemover {
    pub fn new(config: &BackgroundConfig, luminance_weights: [f32; 3]) -> Self {
        Self {
            element: StructuringElement::from_config(config),
            max_intensity: config.max_intensity,
            luminance_weights,
        }
    }

    /// Brightfield: `max_intensity - black_tophat(luminance)`.
    ///
    /// Dark absorbing structures come out as dips below `max_intensity` on an
    /// otherwise flat field.
    pub fn remove_brightfield(&self, image: &Image) -> Result<Buffer2<f32>> {
        let luminance = image.luminance(self.luminance_weights)?;
        let mut out = morphology::black_tophat(&luminance, &self.element);
        for v in out.iter_mut() {
            *v = self.max_intensity - *v;
        }
        Ok(out)
    }

    /// Fluorescence: white tophat of every channel independently.
    pub fn remove_fluorescence(&self, image: &Image) -> Image {
        image.map_channels(|plane| morphology::white_tophat(plane, &self.element))
    }
}

impl Default for BackgroundRemover {
    fn default() -> Self {
        Self::new(&BackgroundConfig::default(), LUMINANCE_WEIGHTS)
    }
}
