//! vbtracker-standalone - run the LED tracker against a live camera
//!
//! Opens the configured capture device, registers one sensor per marker table
//! entry and prints every pose the tracker reports until the device fails, the
//! tracker finishes, the frame limit is hit or Ctrl-C is pressed.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vbtracker_standalone::track::SlotIdentifierFactory;
use vbtracker_standalone::{
    open_device, sink_for, ChannelOrder, GeometryTable, HarnessConfig, OutputFormat, Overrides,
    Session, SessionOptions, StubEngine,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file.
    #[arg(long, env = "VBTRACKER_CONFIG")]
    config: Option<PathBuf>,
    /// Capture device: index, device path, stub://WxH or image:PATH.
    #[arg(long)]
    device: Option<String>,
    /// Channel index passed to the device on retrieve.
    #[arg(long)]
    channel: Option<u32>,
    /// Focal length in pixels (fx = fy).
    #[arg(long)]
    focal_length: Option<f64>,
    /// Channel order of the captured color frames (rgb or bgr).
    #[arg(long)]
    channel_order: Option<ChannelOrder>,
    /// Marker geometry table (JSON). Defaults to the built-in two-sensor table.
    #[arg(long)]
    geometry: Option<PathBuf>,
    /// Stop after this many processed frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Pose output format (text or json).
    #[arg(long)]
    format: Option<OutputFormat>,
    /// Always exit with status 0.
    #[arg(long)]
    legacy_exit_status: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let overrides = Overrides {
        device: args.device,
        channel: args.channel,
        focal_length_px: args.focal_length,
        channel_order: args.channel_order,
        geometry_path: args.geometry,
        max_frames: args.max_frames,
        output: args.format,
        legacy_exit_status: args.legacy_exit_status,
    };
    let cfg = HarnessConfig::load_with(args.config.as_deref(), overrides)?;
    log::debug!("configuration: {:?}", cfg);

    let geometry = match &cfg.geometry_path {
        Some(path) => GeometryTable::from_json_file(path)?,
        None => GeometryTable::reference(),
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("opening capture device {}", cfg.device);
    let source = open_device(&cfg.device);
    let options = SessionOptions {
        channel: cfg.channel,
        channel_order: cfg.channel_order,
        focal_length_px: cfg.focal_length_px,
        max_frames: cfg.max_frames,
    };
    let mut session = Session::start(
        source,
        StubEngine::new(),
        &geometry,
        &SlotIdentifierFactory,
        options,
    )
    .with_interrupt(interrupted);

    let mut sink = sink_for(cfg.output, std::io::stdout().lock());
    let summary = session.run(&mut *sink);

    if cfg.legacy_exit_status {
        return Ok(ExitCode::SUCCESS);
    }
    Ok(ExitCode::from(summary.reason.exit_code()))
}
