use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::TileId;

/// Errors produced by the spot pipeline and its file collaborators.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to load image '{path}': {source}")]
    ImageLoad {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write CSV '{path}': {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Failed to read config '{path}': {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Expected {expected} channels, got {actual}")]
    ChannelCount { expected: &'static str, actual: usize },

    #[error("Dimension mismatch for {what}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Candidate at ({x}, {y}) has scale index {scale} outside a ladder of {len}")]
    UnknownScale {
        x: usize,
        y: usize,
        scale: usize,
        len: usize,
    },

    #[error("Tile {tile} failed: {source}")]
    Tile {
        tile: TileId,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn for_tile(self, tile: TileId) -> Self {
        match self {
            Self::Tile { .. } => self,
            other => Self::Tile {
                tile,
                source: Box::new(other),
            },
        }
    }
}
