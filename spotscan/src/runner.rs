//! Runs the pipeline over a rectangular range of scan tiles.

use std::sync::atomic::AtomicBool;

use common::parallel::par_map_limited_until;

use crate::error::Result;
use crate::pipeline::{TileDiagnostics, TileId, TilePipeline};
use crate::sink::TileSink;
use crate::tile_io::TileLoader;

/// Inclusive row and column bounds of the tiles to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl TileRange {
    pub fn new(rows: (usize, usize), cols: (usize, usize)) -> Self {
        Self {
            row_start: rows.0,
            row_end: rows.1,
            col_start: cols.0,
            col_end: cols.1,
        }
    }

    /// Tiles in row-major order. Empty if either range is inverted.
    pub fn tiles(&self) -> Vec<TileId> {
        (self.row_start..=self.row_end)
            .flat_map(|row| (self.col_start..=self.col_end).map(move |col| TileId::new(row, col)))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    /// Tiles never started because the run was cancelled.
    pub cancelled: usize,
    pub failed: Vec<(TileId, String)>,
    pub spots: usize,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled == 0
    }
}

#[derive(Debug)]
enum TileOutcome {
    Done(TileDiagnostics),
    Skipped,
    Failed(String),
}

/// Loads, processes and writes tiles on a bounded pool.
///
/// A failing tile is logged and recorded in the summary; the remaining tiles
/// still run.
#[derive(Debug)]
pub struct GridRunner {
    loader: TileLoader,
    pipeline: TilePipeline,
    sink: TileSink,
    max_concurrent: usize,
    skip_completed: bool,
}

impl GridRunner {
    pub fn new(loader: TileLoader, pipeline: TilePipeline, sink: TileSink) -> Self {
        Self {
            loader,
            pipeline,
            sink,
            max_concurrent: rayon::current_num_threads().max(1),
            skip_completed: false,
        }
    }

    /// Tiles held in memory at once. Zero is treated as one.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Skip tiles whose spot table already exists.
    pub fn with_skip_completed(mut self, skip: bool) -> Self {
        self.skip_completed = skip;
        self
    }

    /// Loads, processes and writes one tile.
    pub fn run_tile(&self, id: TileId) -> Result<TileDiagnostics> {
        let input = self.loader.load(id).map_err(|e| e.for_tile(id))?;
        let output = self.pipeline.process(&input)?;
        self.sink
            .write(&input, &output)
            .map_err(|e| e.for_tile(id))?;
        Ok(output.diagnostics)
    }

    /// Processes `range`, checking `stop` before each batch of tiles.
    pub fn run(&self, range: &TileRange, stop: &AtomicBool) -> Result<RunSummary> {
        self.sink.create_dirs()?;

        let tiles = range.tiles();
        tracing::info!(
            tiles = tiles.len(),
            max_concurrent = self.max_concurrent,
            output = %self.sink.root().display(),
            "Starting run"
        );

        let outcomes = par_map_limited_until(&tiles, self.max_concurrent, stop, |&id| {
            if self.skip_completed && self.sink.is_complete(id) {
                tracing::debug!(tile = %id, "Already complete, skipped");
                return (id, TileOutcome::Skipped);
            }
            match self.run_tile(id) {
                Ok(diagnostics) => (id, TileOutcome::Done(diagnostics)),
                Err(e) => {
                    tracing::error!(tile = %id, error = %e, "Tile failed");
                    (id, TileOutcome::Failed(e.to_string()))
                }
            }
        });

        let mut summary = RunSummary {
            cancelled: tiles.len() - outcomes.len(),
            ..RunSummary::default()
        };
        for (id, outcome) in outcomes {
            match outcome {
                TileOutcome::Done(diagnostics) => {
                    summary.processed += 1;
                    summary.spots += diagnostics.records;
                }
                TileOutcome::Skipped => summary.skipped += 1,
                TileOutcome::Failed(message) => summary.failed.push((id, message)),
            }
        }

        if summary.cancelled > 0 {
            tracing::warn!(cancelled = summary.cancelled, "Run cancelled");
        }
        tracing::info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            spots = summary.spots,
            "Run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::config::{Config, OutputConfig};
    use crate::tile_io::{TileKind, tile_file_name};
    use image::{Rgb, RgbImage};

    fn write_tile(dir: &std::path::Path, id: TileId) {
        let mut raster = RgbImage::from_pixel(40, 40, Rgb([20, 20, 20]));
        raster.put_pixel(20, 20, Rgb([250, 250, 250]));
        raster
            .save(dir.join(tile_file_name(id, TileKind::Fluorescent, "png")))
            .unwrap();
        RgbImage::from_pixel(40, 40, Rgb([200, 200, 200]))
            .save(dir.join(tile_file_name(id, TileKind::Brightfield, "png")))
            .unwrap();
    }

    fn runner(input: &std::path::Path, output: &std::path::Path) -> GridRunner {
        common::log_setup::init_test_logging();
        let config = Config {
            crop: None,
            ..Config::default()
        };
        GridRunner::new(
            TileLoader::new(input, None).with_extension("png"),
            TilePipeline::new(config).unwrap(),
            TileSink::new(output, OutputConfig::default()),
        )
        .with_max_concurrent(2)
    }

    #[test]
    fn range_is_row_major_and_inclusive() {
        let tiles = TileRange::new((1, 2), (0, 1)).tiles();
        assert_eq!(
            tiles,
            vec![
                TileId::new(1, 0),
                TileId::new(1, 1),
                TileId::new(2, 0),
                TileId::new(2, 1)
            ]
        );
        assert!(TileRange::new((3, 2), (0, 0)).tiles().is_empty());
    }

    #[test]
    fn missing_tile_fails_alone() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_tile(input.path(), TileId::new(0, 0));

        let summary = runner(input.path(), output.path())
            .run(&TileRange::new((0, 0), (0, 1)), &AtomicBool::new(false))
            .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, TileId::new(0, 1));
        assert!(output.path().join("spot_data/0000_0000.csv").is_file());
        assert!(!output.path().join("spot_data/0000_0001.csv").exists());
    }

    #[test]
    fn tile_without_brightfield_fails_alone() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_tile(input.path(), TileId::new(0, 0));
        write_tile(input.path(), TileId::new(0, 1));
        std::fs::remove_file(
            input
                .path()
                .join(tile_file_name(TileId::new(0, 1), TileKind::Brightfield, "png")),
        )
        .unwrap();

        let summary = runner(input.path(), output.path())
            .run(&TileRange::new((0, 0), (0, 1)), &AtomicBool::new(false))
            .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, TileId::new(0, 1));
        assert!(summary.failed[0].1.contains("_bf.png"));
        assert!(!output.path().join("spot_data/0000_0001.csv").exists());
    }

    #[test]
    fn completed_tiles_are_skipped() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_tile(input.path(), TileId::new(0, 0));
        let range = TileRange::new((0, 0), (0, 0));
        let stop = AtomicBool::new(false);

        let first = runner(input.path(), output.path()).run(&range, &stop).unwrap();
        assert_eq!(first.processed, 1);

        let second = runner(input.path(), output.path())
            .with_skip_completed(true)
            .run(&range, &stop)
            .unwrap();
        assert_eq!((second.processed, second.skipped), (0, 1));
        assert!(second.is_success());
    }

    #[test]
    fn stop_flag_cancels_before_start() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let stop = AtomicBool::new(false);
        stop.store(true, Ordering::SeqCst);

        let summary = runner(input.path(), output.path())
            .run(&TileRange::new((0, 1), (0, 1)), &stop)
            .unwrap();
        assert_eq!(summary.cancelled, 4);
        assert_eq!(summary.processed, 0);
        assert!(!summary.is_success());
    }
}
