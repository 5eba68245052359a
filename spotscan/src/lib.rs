//! Spotscan - fluorescent spot detection for tiled microscope scans.
//!
//! Each field-of-view tile runs through the same chain of stages:
//! - Background removal with morphological tophats
//! - Multiscale Laplacian-of-Gaussian spot detection
//! - Overlap pruning across scales
//! - Validity-mask filtering
//! - Per-spot photometric feature extraction
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use spotscan::{Config, TileId, TileLoader, TilePipeline};
//!
//! let config = Config::default();
//! let loader = TileLoader::new("data", config.crop);
//! let pipeline = TilePipeline::new(config)?;
//!
//! let input = loader.load(TileId::new(0, 1))?;
//! let output = pipeline.process(&input)?;
//! println!("Found {} spots", output.records.len());
//! ```

pub mod background;
pub mod config;
pub mod convolution;
pub mod detection;
mod error;
pub mod features;
pub mod image;
pub mod mask;
pub mod morphology;
pub mod pipeline;
pub mod prune;
pub mod runner;
pub mod scale;
pub mod sink;
pub mod tile_io;
pub mod visualize;

#[cfg(test)]
pub mod testing;

// ============================================================================
// Core types
// ============================================================================

pub use config::Config;
pub use error::{Error, Result};
pub use crate::image::Image;
pub use scale::{ScaleLadder, ScaleLevel};

// ============================================================================
// Stages
// ============================================================================

pub use background::BackgroundRemover;
pub use detection::{CandidateSpot, ScaleSpace, SpotDetector};
pub use features::{FeatureExtractor, SpotRecord};
pub use mask::ValidityMask;
pub use morphology::StructuringElement;
pub use prune::{BlobPruner, PrunedSpot};

// ============================================================================
// Tiles and runs
// ============================================================================

pub use pipeline::{StageTimings, TileDiagnostics, TileId, TileInput, TileOutput, TilePipeline};
pub use runner::{GridRunner, RunSummary, TileRange};
pub use sink::TileSink;
pub use tile_io::{TileKind, TileLoader};
