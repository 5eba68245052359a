//! Per-tile pipeline: background removal through feature extraction.

use std::fmt;
use std::time::{Duration, Instant};

use common::Buffer2;

use crate::background::BackgroundRemover;
use crate::config::Config;
use crate::detection::{CandidateSpot, SpotDetector};
use crate::error::{Error, Result};
use crate::features::{FeatureExtractor, SpotRecord};
use crate::image::Image;
use crate::mask::ValidityMask;
use crate::prune::{BlobPruner, PrunedSpot};
use crate::scale::ScaleLadder;

/// Field-of-view position in the scan grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub row: usize,
    pub col: usize,
}

impl TileId {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}_{:04}", self.row, self.col)
    }
}

/// Everything one tile run reads.
#[derive(Debug, Clone)]
pub struct TileInput {
    pub id: TileId,
    /// Linearized fluorescence on the `[0, 255]` scale.
    pub fluorescence: Image,
    /// Brightfield frame. [`TileLoader`](crate::TileLoader) always fills it;
    /// in-memory callers may process fluorescence alone.
    pub brightfield: Option<Image>,
    /// Non-linearized fluorescence the validity mask is derived from.
    pub mask_source: Image,
}

/// Stage counts for one tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileDiagnostics {
    pub candidates: usize,
    pub pruned: usize,
    pub masked_out: usize,
    pub records: usize,
    pub valid_pixels: usize,
}

/// Wall time spent in each stage of one tile run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub background: Duration,
    pub detection: Duration,
    pub pruning: Duration,
    pub masking: Duration,
    pub features: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.background + self.detection + self.pruning + self.masking + self.features
    }
}

/// Runs `stage`, records its wall time into `slot` and emits a debug event.
fn timed<T>(tile: TileId, name: &'static str, slot: &mut Duration, stage: impl FnOnce() -> T) -> T {
    let started = Instant::now();
    let value = stage();
    *slot = started.elapsed();
    tracing::debug!(
        %tile,
        stage = name,
        elapsed_ms = slot.as_secs_f64() * 1000.0,
        "Stage finished"
    );
    value
}

/// Everything one tile run produces.
#[derive(Debug, Clone)]
pub struct TileOutput {
    pub id: TileId,
    pub brightfield_removed: Option<Buffer2<f32>>,
    pub fluorescence_removed: Image,
    pub candidates: Vec<CandidateSpot>,
    pub pruned: Vec<PrunedSpot>,
    /// Pruned spots that survived the validity mask.
    pub spots: Vec<PrunedSpot>,
    pub records: Vec<SpotRecord>,
    pub diagnostics: TileDiagnostics,
    pub timings: StageTimings,
}

/// Stage chain built once from a validated [`Config`] and shared by every
/// tile. Processing is a pure function of the input.
#[derive(Debug, Clone)]
pub struct TilePipeline {
    remover: BackgroundRemover,
    detector: SpotDetector,
    pruner: BlobPruner,
    extractor: FeatureExtractor,
}

impl TilePipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let ladder = ScaleLadder::from_config(&config.detection)?;

        Ok(Self {
            remover: BackgroundRemover::new(&config.background, config.luminance_weights),
            detector: SpotDetector::new(
                &ladder,
                config.detection.threshold,
                config.luminance_weights,
            ),
            pruner: BlobPruner::from_config(&ladder, &config.pruning),
            extractor: FeatureExtractor::new(&config.features),
        })
    }

    pub fn process(&self, input: &TileInput) -> Result<TileOutput> {
        self.process_inner(input).map_err(|e| e.for_tile(input.id))
    }

    fn process_inner(&self, input: &TileInput) -> Result<TileOutput> {
        let dims = input.fluorescence.dimensions();
        check_extent("mask source", dims, input.mask_source.dimensions())?;
        if let Some(bf) = &input.brightfield {
            check_extent("brightfield", dims, bf.dimensions())?;
        }

        let id = input.id;
        let mut timings = StageTimings::default();

        let (fluorescence_removed, brightfield_removed) =
            timed(id, "background", &mut timings.background, || {
                rayon::join(
                    || self.remover.remove_fluorescence(&input.fluorescence),
                    || {
                        input
                            .brightfield
                            .as_ref()
                            .map(|bf| self.remover.remove_brightfield(bf))
                            .transpose()
                    },
                )
            });
        let brightfield_removed = brightfield_removed?;

        let candidates = timed(id, "detection", &mut timings.detection, || {
            self.detector.detect_image(&fluorescence_removed)
        })?;
        let pruned = timed(id, "pruning", &mut timings.pruning, || {
            self.pruner.prune(&candidates)
        })?;

        let (mask, spots) = timed(id, "masking", &mut timings.masking, || {
            let mask = ValidityMask::from_image(&input.mask_source);
            let spots = mask.filter(&pruned);
            (mask, spots)
        });

        let records = timed(id, "features", &mut timings.features, || {
            self.extractor
                .extract(id, &fluorescence_removed, &input.fluorescence, &spots)
        })?;

        let diagnostics = TileDiagnostics {
            candidates: candidates.len(),
            pruned: pruned.len(),
            masked_out: pruned.len() - spots.len(),
            records: records.len(),
            valid_pixels: mask.valid_count(),
        };
        tracing::info!(
            tile = %id,
            candidates = diagnostics.candidates,
            pruned = diagnostics.pruned,
            spots = diagnostics.records,
            elapsed_ms = timings.total().as_secs_f64() * 1000.0,
            "Processed tile"
        );

        Ok(TileOutput {
            id,
            brightfield_removed,
            fluorescence_removed,
            candidates,
            pruned,
            spots,
            records,
            diagnostics,
            timings,
        })
    }
}

fn check_extent(what: &'static str, expected: (usize, usize), actual: (usize, usize)) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::DimensionMismatch {
            what,
            expected,
            actual,
        })
    }
}
