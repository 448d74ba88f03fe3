//! ScreenRec — live screen preview with toggleable recording and snapshots.
//!
//! # Architecture
//!
//! ```text
//! xcap (screenrec-capture)          screenrec-core                 GStreamer (this crate)
//! ───────────────────────────      ──────────────────────────      ─────────────────────────────
//! Monitor::all / capture_image ──► CaptureLoop                ──► appsrc → autovideosink (preview)
//!                                    overlay (REC / FPS / help)      ▲ navigation key events
//!                                    RecordingState toggle      ──► appsrc → encoder → mux → file
//!                                    SnapshotWriter (PNG)
//! ```
//!
//! Keys in the preview window: `r` toggles recording, `s` saves a PNG
//! snapshot, `q` / Escape / closing the window quits. Ctrl-C stops at the
//! next key poll and finalizes the video the same way.

mod encoder;
mod preview;
mod raw_video;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use gstreamer as gst;
use screenrec_capture::XcapCapturer;
use screenrec_core::region;
use screenrec_core::{
    CaptureLoop, CaptureRegion, FourCc, FrameSink, LoopSettings, RecorderConfig,
    RecorderError, SnapshotWriter, StopReason,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::encoder::GstEncoderBackend;
use crate::preview::GstPreview;

// ── CLI ───────────────────────────────────────────────────────────────────────

fn cli() -> Command {
    Command::new("screenrec")
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Preview the screen live; press r to record, s to screenshot, q to quit")
        .arg(
            Arg::new("outfile")
                .short('o')
                .long("outfile")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Output video file [default: capture.mp4]"),
        )
        .arg(
            Arg::new("fps")
                .long("fps")
                .value_name("FLOAT")
                .value_parser(value_parser!(f64))
                .help("Target frame rate of the recording [default: 20.0]"),
        )
        .arg(
            Arg::new("monitor")
                .long("monitor")
                .value_name("INT")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i32))
                .help("Display index: 0 = all displays, 1.. = single display [default: 1]"),
        )
        .arg(
            Arg::new("region")
                .long("region")
                .value_names(["LEFT", "TOP", "WIDTH", "HEIGHT"])
                .num_args(4)
                .allow_negative_numbers(true)
                .value_parser(value_parser!(i64))
                .help("Explicit capture rectangle; overrides --monitor"),
        )
        .arg(
            Arg::new("codec")
                .long("codec")
                .value_name("FOURCC")
                .help("Four-character codec code; default depends on the output extension"),
        )
        .arg(
            Arg::new("snapshot-dir")
                .long("snapshot-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Directory for screenshots [default: .]"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("JSON configuration file; command-line flags override it"),
        )
}

/// Defaults, then the `--config` file, then explicit flags.
fn build_config(matches: &ArgMatches) -> Result<RecorderConfig> {
    let mut cfg = match matches.get_one::<PathBuf>("config") {
        Some(path) => RecorderConfig::from_file(path)
            .with_context(|| format!("Loading config file {}", path.display()))?,
        None => RecorderConfig::default(),
    };

    if let Some(out) = matches.get_one::<PathBuf>("outfile") {
        cfg.output = out.clone();
    }
    if let Some(&fps) = matches.get_one::<f64>("fps") {
        cfg.target_fps = fps;
    }
    if let Some(&monitor) = matches.get_one::<i32>("monitor") {
        cfg.monitor_index = monitor;
    }
    if let Some(values) = matches.get_many::<i64>("region") {
        cfg.region = Some(parse_region(&values.copied().collect::<Vec<_>>())?);
    }
    if let Some(codec) = matches.get_one::<String>("codec") {
        cfg.codec = Some(codec.parse::<FourCc>()?);
    }
    if let Some(dir) = matches.get_one::<PathBuf>("snapshot-dir") {
        cfg.snapshot_dir = dir.clone();
    }

    cfg.validate()?;
    Ok(cfg)
}

fn parse_region(values: &[i64]) -> Result<CaptureRegion> {
    let &[left, top, width, height] = values else {
        bail!("--region takes exactly four values");
    };
    if width <= 0 || height <= 0 {
        bail!("--region size must be positive, got {width}x{height}");
    }
    Ok(CaptureRegion::new(
        i32::try_from(left).context("--region LEFT out of range")?,
        i32::try_from(top).context("--region TOP out of range")?,
        u32::try_from(width).context("--region WIDTH out of range")?,
        u32::try_from(height).context("--region HEIGHT out of range")?,
    ))
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("ScreenRec v{}", env!("CARGO_PKG_VERSION"));

    let cfg = build_config(&cli().get_matches())?;

    let mut capturer = XcapCapturer::open().context("Opening screen capture")?;
    // An explicit region is trusted without listing displays.
    let region = match region::resolve_with(cfg.region, cfg.monitor_index, &mut capturer) {
        Ok(region) => region,
        Err(e @ RecorderError::InvalidMonitorIndex { .. }) => {
            error!("{e}");
            return Ok(());
        }
        Err(e) => return Err(e).context("Resolving capture region"),
    };
    info!("Capture rectangle: {region}");

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("Installing Ctrl-C handler")?;
    }

    gst::init().context("Initializing GStreamer")?;

    let sink = FrameSink::open(
        &GstEncoderBackend,
        &cfg.output,
        cfg.resolved_codec(),
        cfg.target_fps,
        region.size(),
    );
    let settings = LoopSettings {
        window_name:  cfg.window_title.clone(),
        preview_size: cfg.preview_size(&region),
        poll_timeout: cfg.poll_timeout(),
    };
    let snapshots = SnapshotWriter::new(&cfg.snapshot_dir, &cfg.snapshot_prefix);
    info!("Screenshots go to {}", cfg.snapshot_dir.display());

    let summary = CaptureLoop::new(capturer, GstPreview::new(), sink, snapshots, region, settings)
        .with_interrupt(interrupted)
        .run()
        .map_err(|e| {
            error!("Capture loop failed: {e}");
            e
        })
        .context("Running capture loop")?;

    if summary.stop_reason == StopReason::Interrupted {
        info!("Interrupted by user.");
    }
    info!(
        "{} frames shown, {} written, {} screenshot(s)",
        summary.iterations,
        summary.frames_written,
        summary.snapshots.len()
    );
    if summary.video_saved {
        info!("Saved video to {}", summary.output.display());
    } else if summary.sink_was_open {
        warn!("No video was saved to {}", summary.output.display());
    }
    Ok(())
}
