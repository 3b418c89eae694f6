//! dust-watch CLI — one-shot detection and the unattended monitor loop.

mod collab;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use dust_watch_core::{detect, detect_with_stages, init_with_level, ThresholdPolicy};
use dust_watch_monitor::{FrameWriter, Monitor, MonitorConfig, SystemClock};

use collab::{load_frame, FileFrameSource, FlagFileActuator, PngFrameWriter};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "dust-watch")]
#[command(about = "Detect airborne/settled dust coverage in camera frames and drive an alarm")]
#[command(version)]
struct Cli {
    /// Log at debug level.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the detection pipeline once on an image and print a JSON summary.
    Detect(DetectArgs),

    /// Run the monitor loop until terminated.
    Watch(WatchArgs),
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Path to a JSON config file (monitor config; only the pipeline section
    /// is used here).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rescale factor applied before detection.
    #[arg(long)]
    scale: Option<f32>,

    /// Select the threshold automatically (Otsu) instead of the configured
    /// fixed value.
    #[arg(long)]
    otsu: bool,

    /// Write every pipeline stage as a PNG into this directory.
    #[arg(long)]
    dump_stages: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct WatchArgs {
    /// Image path re-read on every scan (kept fresh by the capture process).
    #[arg(long)]
    image: PathBuf,

    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Flag file observed as the manual reset input; touching it silences an
    /// active alarm.
    #[arg(long)]
    reset_file: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> CliResult<MonitorConfig> {
    match path {
        Some(path) => Ok(collab::load_config(path)?),
        None => Ok(MonitorConfig::default()),
    }
}

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let mut config = load_config(args.config.as_deref())?;
    if args.otsu {
        config.pipeline.threshold = ThresholdPolicy::Otsu;
    }

    let frame = load_frame(&args.image, args.scale)?;

    let result = if args.dump_stages.is_some() {
        detect_with_stages(&frame, &config.pipeline)?
    } else {
        detect(&frame, &config.pipeline)?
    };

    if let Some(dir) = &args.dump_stages {
        fs::create_dir_all(dir)
            .map_err(|e| format!("failed to create {}: {e}", dir.display()))?;
        let mut writer = PngFrameWriter;
        for (index, (name, stage)) in result.stages.iter().enumerate() {
            writer.write(stage, &dir.join(format!("{index:02}_{name}.png")))?;
        }
    }

    let summary = serde_json::json!({
        "image": args.image.display().to_string(),
        "coverage_ratio": result.coverage_ratio,
        "coverage_percent": result.coverage_ratio * 100.0,
        "applied_threshold": result.applied_threshold,
        "threshold_policy": match config.pipeline.threshold {
            ThresholdPolicy::Fixed(_) => "fixed",
            ThresholdPolicy::Otsu => "otsu",
        },
        "stages": result.stages.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_watch(args: &WatchArgs) -> CliResult<()> {
    let config = load_config(args.config.as_deref())?;
    if let Some(dir) = &config.snapshot_dir {
        fs::create_dir_all(dir)
            .map_err(|e| format!("failed to create {}: {e}", dir.display()))?;
    }

    let source = FileFrameSource::new(args.image.clone());
    let actuator = FlagFileActuator::new(args.reset_file.clone());
    let mut monitor = Monitor::new(config, source, actuator, PngFrameWriter, SystemClock)?;
    monitor.run()
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    init_with_level(level)?;

    match &cli.command {
        Commands::Detect(args) => run_detect(args),
        Commands::Watch(args) => run_watch(args),
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
