//! Per-tile artifact writer.
//!
//! Every file goes through [`common::file_utils::atomic_write`], so an
//! interrupted run never leaves a truncated artifact behind. The spot table is
//! written last and doubles as the tile's completion marker.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use common::Buffer2;
use common::file_utils::{atomic_write, atomic_write_bytes};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};

use crate::config::OutputConfig;
use crate::detection::CandidateSpot;
use crate::error::{Error, Result};
use crate::features::{COLUMNS, SpotRecord};
use crate::image::Image;
use crate::pipeline::{TileId, TileInput, TileOutput};
use crate::prune::PrunedSpot;
use crate::visualize::highlight_spots;

pub const CROPPED_DIR: &str = "cropped";
pub const MASK_DIR: &str = "mask";
pub const BACKGROUND_REMOVED_DIR: &str = "BGremoved";
pub const CANDIDATES_DIR: &str = "tmp";
pub const PRUNED_DIR: &str = "spotCoordinates_raw";
pub const FINAL_DIR: &str = "spotCoordinates_final";
pub const VISUALIZATION_DIR: &str = "visualization";
pub const SPOT_DATA_DIR: &str = "spot_data";

const ALL_DIRS: [&str; 8] = [
    CROPPED_DIR,
    MASK_DIR,
    BACKGROUND_REMOVED_DIR,
    CANDIDATES_DIR,
    PRUNED_DIR,
    FINAL_DIR,
    VISUALIZATION_DIR,
    SPOT_DATA_DIR,
];

/// Writes tile artifacts under one output root.
#[derive(Debug, Clone)]
pub struct TileSink {
    root: PathBuf,
    config: OutputConfig,
}

impl TileSink {
    pub fn new(root: impl Into<PathBuf>, config: OutputConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates every output directory up front.
    pub fn create_dirs(&self) -> Result<()> {
        for dir in ALL_DIRS {
            let path = self.root.join(dir);
            std::fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
        }
        Ok(())
    }

    pub fn spot_data_path(&self, id: TileId) -> PathBuf {
        self.root.join(SPOT_DATA_DIR).join(format!("{}.csv", id))
    }

    /// A tile is complete once its spot table exists.
    pub fn is_complete(&self, id: TileId) -> bool {
        self.spot_data_path(id).is_file()
    }

    pub fn write(&self, input: &TileInput, output: &TileOutput) -> Result<()> {
        let id = output.id;
        let stem = format!("_{}", id);

        if self.config.save_intermediate {
            let cropped = self.root.join(CROPPED_DIR);
            write_png(
                &cropped.join(format!("{stem}_fluorescent.png")),
                &input.fluorescence,
                1.0,
            )?;
            if let Some(bf) = &input.brightfield {
                write_png(&cropped.join(format!("{stem}_bf.png")), bf, 1.0)?;
            }
            write_png(
                &self.root.join(MASK_DIR).join(format!("{stem}_fluorescent.png")),
                &input.mask_source,
                1.0,
            )?;

            let removed = self.root.join(BACKGROUND_REMOVED_DIR);
            write_png(
                &removed.join(format!("{stem}_fluorescent.png")),
                &output.fluorescence_removed,
                1.0,
            )?;
            if let Some(bf) = &output.brightfield_removed {
                write_gray_png(&removed.join(format!("{stem}_bf.png")), bf, 1.0)?;
            }

            write_text(
                &self.root.join(CANDIDATES_DIR).join(format!("{stem}.txt")),
                &candidates_text(&output.candidates),
            )?;
            write_text(
                &self.root.join(PRUNED_DIR).join(format!("{stem}.txt")),
                &spots_text(&output.pruned),
            )?;
            write_text(
                &self.root.join(FINAL_DIR).join(format!("{stem}.txt")),
                &spots_text(&output.spots),
            )?;
        }

        let overlay = highlight_spots(
            &output.fluorescence_removed,
            &output.spots,
            &self.config.visualization,
        );
        write_png(
            &self.root.join(VISUALIZATION_DIR).join(format!("{stem}.png")),
            &overlay,
            255.0,
        )?;

        write_records(&self.spot_data_path(id), &output.records)?;
        tracing::debug!(tile = %id, root = %self.root.display(), "Wrote tile artifacts");
        Ok(())
    }
}

/// One `x y scale` line per candidate; the scale index is written 1-based.
pub fn candidates_text(candidates: &[CandidateSpot]) -> String {
    let mut text = String::with_capacity(candidates.len() * 16);
    for c in candidates {
        let _ = writeln!(text, "{} {} {}", c.x, c.y, c.scale + 1);
    }
    text
}

/// One `x y sigma` line per spot.
pub fn spots_text(spots: &[PrunedSpot]) -> String {
    let mut text = String::with_capacity(spots.len() * 16);
    for s in spots {
        let _ = writeln!(text, "{} {} {}", s.x, s.y, s.sigma);
    }
    text
}

/// Serializes records with the fixed header, even when there are none.
pub fn records_csv(records: &[SpotRecord]) -> std::result::Result<Vec<u8>, csv::Error> {
    let mut buf = Vec::new();
    {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&mut buf);
        wtr.write_record(COLUMNS)?;
        for record in records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
    }
    Ok(buf)
}

fn write_records(path: &Path, records: &[SpotRecord]) -> Result<()> {
    let bytes = records_csv(records).map_err(|source| Error::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write_bytes(path, &bytes).map_err(|e| Error::io(path, e))
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    atomic_write_bytes(path, text.as_bytes()).map_err(|e| Error::io(path, e))
}

#[inline]
fn to_u8(v: f32, scale: f32) -> u8 {
    (v * scale).round().clamp(0.0, 255.0) as u8
}

/// Writes `image * scale` as an 8-bit PNG. Grayscale stays single-channel.
fn write_png(path: &Path, image: &Image, scale: f32) -> Result<()> {
    if image.channel_count() == 1 {
        return write_gray_png(path, image.channel(0), scale);
    }
    let [r, g, b] = image.channels() else {
        return Err(Error::ChannelCount {
            expected: "1 or 3",
            actual: image.channel_count(),
        });
    };
    let (width, height) = image.dimensions();
    let mut raw = Vec::with_capacity(width * height * 3);
    for i in 0..width * height {
        raw.push(to_u8(r.pixels()[i], scale));
        raw.push(to_u8(g.pixels()[i], scale));
        raw.push(to_u8(b.pixels()[i], scale));
    }
    let encoded = RgbImage::from_raw(width as u32, height as u32, raw)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| buffer_size_error(path))?;
    encode_png(path, &encoded)
}

fn write_gray_png(path: &Path, plane: &Buffer2<f32>, scale: f32) -> Result<()> {
    let (width, height) = plane.dimensions();
    let raw = plane.iter().map(|&v| to_u8(v, scale)).collect();
    let encoded = GrayImage::from_raw(width as u32, height as u32, raw)
        .map(DynamicImage::ImageLuma8)
        .ok_or_else(|| buffer_size_error(path))?;
    encode_png(path, &encoded)
}

fn encode_png(path: &Path, image: &DynamicImage) -> Result<()> {
    atomic_write(path, |w| {
        image
            .write_to(&mut *w, ImageFormat::Png)
            .map_err(io::Error::other)?;
        w.flush()
    })
    .map_err(|e| Error::io(path, e))
}

fn buffer_size_error(path: &Path) -> Error {
    Error::io(
        path,
        io::Error::new(io::ErrorKind::InvalidData, "pixel buffer does not match extent"),
    )
}
