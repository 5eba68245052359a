//! `spotscan` command line.
//!
//! ```text
//! spotscan run --input data --output out --rows 0:3 --cols 0:5 --config scan.yaml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use spotscan::{Config, GridRunner, TileLoader, TilePipeline, TileRange, TileSink};

#[derive(Parser, Debug)]
#[command(
    name = "spotscan",
    version,
    about = "Fluorescent spot detection for tiled microscope scans"
)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Directory for rolling log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a rectangular range of tiles
    Run(RunArgs),
    /// Print the effective configuration as YAML
    ShowConfig {
        /// YAML or JSON config file; defaults are used when omitted
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// YAML or JSON config file; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding `_{row}_{col}_fluorescent.jpeg` tiles
    #[arg(short, long)]
    input: PathBuf,

    /// Output root; per-artifact directories are created below it
    #[arg(short, long)]
    output: PathBuf,

    /// Inclusive tile row range, `start:end` or a single row
    #[arg(long, default_value = "0:0", value_parser = parse_range)]
    rows: (usize, usize),

    /// Inclusive tile column range, `start:end` or a single column
    #[arg(long, default_value = "0:0", value_parser = parse_range)]
    cols: (usize, usize),

    /// Tile file extension
    #[arg(long, default_value = "jpeg")]
    extension: String,

    /// Tiles processed at once (defaults to the rayon pool width)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Skip tiles whose spot table already exists
    #[arg(long)]
    skip_completed: bool,

    /// Process whole frames instead of the configured crop window
    #[arg(long)]
    no_crop: bool,

    /// Only write the visualization and spot table
    #[arg(long)]
    no_intermediate: bool,

    /// Stop starting new tiles once this file appears
    #[arg(long)]
    stop_file: Option<PathBuf>,
}

fn parse_range(s: &str) -> std::result::Result<(usize, usize), String> {
    let parse = |v: &str| {
        v.trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid tile index '{}': {}", v, e))
    };
    match s.split_once(':') {
        Some((start, end)) => {
            let (start, end) = (parse(start)?, parse(end)?);
            if start > end {
                return Err(format!("range start {} is after end {}", start, end));
            }
            Ok((start, end))
        }
        None => parse(s).map(|v| (v, v)),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Polls for `path` and raises `stop` once it exists.
fn watch_stop_file(path: PathBuf, stop: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        while !stop.load(Ordering::SeqCst) {
            if path.exists() {
                tracing::warn!(path = %path.display(), "Stop file found, finishing started tiles");
                stop.store(true, Ordering::SeqCst);
                break;
            }
            std::thread::sleep(Duration::from_millis(500));
        }
    });
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if args.no_crop {
        config.crop = None;
    }
    if args.no_intermediate {
        config.output.save_intermediate = false;
    }

    let loader = TileLoader::new(&args.input, config.crop).with_extension(&args.extension);
    let sink = TileSink::new(&args.output, config.output.clone());
    let pipeline = TilePipeline::new(config).context("Invalid pipeline configuration")?;

    let mut runner = GridRunner::new(loader, pipeline, sink).with_skip_completed(args.skip_completed);
    if let Some(jobs) = args.jobs {
        runner = runner.with_max_concurrent(jobs);
    }

    let stop = Arc::new(AtomicBool::new(false));
    if let Some(path) = args.stop_file {
        watch_stop_file(path, Arc::clone(&stop));
    }

    let range = TileRange::new(args.rows, args.cols);
    let started = Instant::now();
    let summary = runner
        .run(&range, &stop)
        .with_context(|| format!("Failed to prepare output {}", args.output.display()))?;
    stop.store(true, Ordering::SeqCst);

    tracing::info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Processed {} tiles, {} spots",
        summary.processed,
        summary.spots
    );
    for (tile, message) in &summary.failed {
        tracing::error!(%tile, "{}", message);
    }

    if !summary.is_success() {
        if !summary.failed.is_empty() {
            bail!("{} of {} tiles failed", summary.failed.len(), range.tiles().len());
        }
        tracing::warn!("Run stopped, {} tiles not started", summary.cancelled);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    common::log_setup::setup_logging(&cli.log_level, &cli.log_dir, "spotscan")?;

    match cli.command {
        Command::Run(args) => run(args),
        Command::ShowConfig { config } => {
            let config = load_config(config.as_ref())?;
            let text = common::serialize(&config, common::FileFormat::Yaml)
                .context("Failed to serialize config")?;
            println!("{}", text);
            Ok(())
        }
    }
}
