//! Tile file naming, raster loading, cropping and sRGB linearization.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::CropWindow;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::pipeline::{TileId, TileInput};

/// Which acquisition channel a tile file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileKind {
    Fluorescent,
    Brightfield,
}

impl TileKind {
    pub fn suffix(self) -> &'static str {
        match self {
            TileKind::Fluorescent => "fluorescent",
            TileKind::Brightfield => "bf",
        }
    }
}

/// `_{row:04}_{col:04}_{kind}.{ext}`
pub fn tile_file_name(id: TileId, kind: TileKind, ext: &str) -> String {
    format!("_{}_{}.{}", id, kind.suffix(), ext)
}

/// Inverse sRGB transfer function on `[0, 1]`.
#[inline]
pub fn srgb_to_linear(v: f32) -> f32 {
    if v < 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// Decodes a raster into an RGB image on the `[0, 1]` scale.
pub fn load_rgb(path: &Path) -> Result<Image> {
    let decoded = image::open(path)
        .map_err(|source| Error::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();
    let (width, height) = (decoded.width() as usize, decoded.height() as usize);
    let samples: Vec<f32> = decoded.as_raw().iter().map(|&v| v as f32 / 255.0).collect();
    Ok(Image::from_interleaved(width, height, 3, &samples))
}

/// Cuts `window` out of `image`, clipped to the image. `None` keeps the
/// whole frame.
pub fn crop_image(image: &Image, window: Option<&CropWindow>) -> Result<Image> {
    let Some(window) = window else {
        return Ok(image.clone());
    };
    let (width, height) = image.dimensions();
    let x0 = window.x_start.min(width);
    let y0 = window.y_start.min(height);
    let x1 = (window.x_start + window.width).min(width);
    let y1 = (window.y_start + window.height).min(height);
    if x0 == x1 || y0 == y1 {
        return Err(Error::InvalidConfig(format!(
            "crop window {:?} does not overlap a {}x{} frame",
            window, width, height
        )));
    }
    if (x1 - x0, y1 - y0) != (window.width, window.height) {
        tracing::warn!(?window, width, height, "Crop window clipped to frame");
    }
    Ok(image.crop(x0, y0, x1, y1))
}

/// Reads tile rasters from an input directory and prepares pipeline input.
#[derive(Debug, Clone)]
pub struct TileLoader {
    input_dir: PathBuf,
    crop: Option<CropWindow>,
    extension: String,
}

impl TileLoader {
    pub fn new(input_dir: impl Into<PathBuf>, crop: Option<CropWindow>) -> Self {
        Self {
            input_dir: input_dir.into(),
            crop,
            extension: "jpeg".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn path(&self, id: TileId, kind: TileKind) -> PathBuf {
        self.input_dir.join(tile_file_name(id, kind, &self.extension))
    }

    /// Loads one tile. Both the fluorescence and the brightfield frame are
    /// required; a missing frame fails the tile with [`Error::ImageLoad`].
    pub fn load(&self, id: TileId) -> Result<TileInput> {
        let started = Instant::now();
        let raw = crop_image(
            &load_rgb(&self.path(id, TileKind::Fluorescent))?,
            self.crop.as_ref(),
        )?;
        let bf = crop_image(
            &load_rgb(&self.path(id, TileKind::Brightfield))?,
            self.crop.as_ref(),
        )?;
        tracing::debug!(
            tile = %id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Loaded tile frames"
        );

        Ok(TileInput {
            id,
            fluorescence: raw.map_samples(|v| srgb_to_linear(v) * 255.0),
            brightfield: Some(bf.map_samples(|v| srgb_to_linear(v) * 255.0)),
            mask_source: raw.map_samples(|v| v * 255.0),
        })
    }
}
