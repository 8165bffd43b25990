//! clipscan – analyze one recorded incident clip and write its report.
//!
//!   $ clipscan --event-id 1772321990476 --clip clip.mp4 --out out.json \
//!              --model fomo.onnx --frames 8 --threshold 0.2
//!
//! Exit codes: 0 report written with `status: ok`, 1 report written with
//! `status: error`, 2 usage error (nothing written), 3 report could not be
//! written.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};
use clipscan_detect::{FomoConfig, Layout, TractFomo};
use clipscan_report::{write_report, AnalysisConfig, ClipAnalyzer, IncidentReport};
use clipscan_source::{open_clip, ChannelOrder};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

const EXIT_RUN_FAILED: u8 = 1;
const EXIT_WRITE_FAILED: u8 = 3;

// ================ CLI ================== //

#[derive(Parser, Debug)]
#[command(author, version, about = "Offline incident clip analysis", long_about = None)]
struct CliArgs {
    /// Opaque incident identifier copied into the report
    #[arg(long = "event-id", alias = "event_id")]
    event_id: String,

    /// Clip to analyze: a container file or a directory of frames
    #[arg(long, alias = "mp4")]
    clip: PathBuf,

    /// Where the JSON report is written
    #[arg(long)]
    out: PathBuf,

    /// ONNX detector (FOMO-style class grid output)
    #[arg(long)]
    model: PathBuf,

    /// JSON file with analysis tunables; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of evenly spaced frames to analyze [default: 5]
    #[arg(long)]
    frames: Option<usize>,

    /// Minimum confidence for a detection to be kept [default: 0.5]
    #[arg(long)]
    threshold: Option<f32>,

    /// Upper bound on detections listed in the report [default: 25]
    #[arg(long)]
    max_detections: Option<usize>,

    /// Name reported in the `model` field
    #[arg(long)]
    model_name: Option<String>,

    /// Class names for model classes 1.. (class 0 is background)
    #[arg(long, value_delimiter = ',', default_value = "person,car")]
    labels: Vec<String>,

    #[arg(long, default_value_t = 160)]
    input_width: u32,

    #[arg(long, default_value_t = 160)]
    input_height: u32,

    /// Channel order the model was trained on
    #[arg(long, default_value = "rgb")]
    channel_order: ChannelOrder,

    /// Tensor layout of the model input and output
    #[arg(long, default_value = "nhwc")]
    layout: Layout,

    /// Grid cells below this score count as background
    #[arg(long, default_value_t = 0.1)]
    min_cell_score: f32,

    /// -v debug, -vv trace (RUST_LOG wins when set)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

/// Config file (if any) with CLI overrides applied, validated.
fn build_config(args: &CliArgs) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };

    if let Some(frames) = args.frames {
        config.sample_frames = frames;
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(max) = args.max_detections {
        config.max_detections = max;
    }
    if let Some(name) = &args.model_name {
        config.model_name = name.clone();
    }

    config.validate()?;
    Ok(config)
}

fn fomo_config(args: &CliArgs) -> FomoConfig {
    FomoConfig {
        width: args.input_width,
        height: args.input_height,
        order: args.channel_order,
        layout: args.layout,
        labels: args.labels.clone(),
        min_score: args.min_cell_score,
    }
}

fn load_detector(args: &CliArgs) -> Result<TractFomo> {
    TractFomo::new(&args.model, fomo_config(args))
        .with_context(|| format!("failed to load model {}", args.model.display()))
}

fn run(args: &CliArgs, config: AnalysisConfig) -> IncidentReport {
    let started = Instant::now();
    let failed = |message: String| {
        error!("event {}: {}", args.event_id, message);
        IncidentReport::failed(&args.event_id, &config, message, started.elapsed().as_millis() as u64)
    };

    let detector = match load_detector(args) {
        Ok(detector) => detector,
        Err(e) => return failed(format!("{e:#}")),
    };
    match ClipAnalyzer::new(config.clone(), detector) {
        Ok(mut analyzer) => analyzer.analyze_since(started, &args.event_id, &args.clip, open_clip),
        Err(e) => failed(e.to_string()),
    }
}

fn main() -> ExitCode {
    // Usage errors exit with code 2 before anything is processed.
    let args = CliArgs::parse();
    init_logging(args.verbose);

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => CliArgs::command().error(ErrorKind::ValueValidation, format!("{e:#}")).exit(),
    };

    let report = run(&args, config);

    if let Err(e) = write_report(&report, &args.out) {
        error!("{e}");
        return ExitCode::from(EXIT_WRITE_FAILED);
    }
    info!(
        "event {}: status={:?} frames_analyzed={} latency_ms={} -> {}",
        report.event_id,
        report.status,
        report.frames_analyzed,
        report.latency_ms,
        args.out.display()
    );

    if report.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_RUN_FAILED)
    }
}
