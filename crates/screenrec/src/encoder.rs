//! GStreamer encode pipeline writing the output video file.
//!
//! # Codec → encoder
//!
//! | FourCC                                   | Element(s)             |
//! |------------------------------------------|------------------------|
//! | `mp4v`, `FMP4`, `XVID`, `DIVX`, `DX50`   | `avenc_mpeg4`          |
//! | `MJPG`                                   | `jpegenc`              |
//! | `H264`, `X264`, `avc1`                   | `x264enc ! h264parse`  |
//! | `VP80`                                   | `vp8enc`               |
//! | `VP90`                                   | `vp9enc`               |
//!
//! # Extension → container
//!
//! `.mp4`/`.m4v` → `mp4mux`, `.mov` → `qtmux`, `.mkv` → `matroskamux`,
//! `.webm` → `webmmux`, anything else → `avimux`.
//!
//! # Pipeline
//!
//! ```text
//! appsrc (BGR, fixed framerate, PTS = n / fps)
//!   → videoconvert
//!   → <encoder>
//!   → <muxer>
//!   → filesink location=<output>
//! ```

use std::path::Path;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use screenrec_core::codec::extension_lowercase;
use screenrec_core::{EncoderBackend, FourCc, Frame, SinkError, VideoEncoder};
use tracing::{debug, info, warn};

use crate::raw_video;

/// How long `close` waits for the muxer to finalize the file.
const FINALIZE_TIMEOUT_SECS: u64 = 10;

/// Frames the appsrc may queue before `write` blocks.
const QUEUED_FRAMES: u64 = 4;

// ── Element selection ─────────────────────────────────────────────────────────

/// Encoder fragment for `codec`, or `None` when no encoder maps to it.
fn encoder_for(codec: FourCc) -> Option<&'static str> {
    let fragment = match codec.as_bytes() {
        b"mp4v" | b"MP4V" | b"FMP4" | b"XVID" | b"DIVX" | b"DX50" => "avenc_mpeg4 bitrate=4000000",
        b"MJPG" => "jpegenc quality=90",
        b"H264" | b"h264" | b"X264" | b"x264" | b"avc1" => {
            "x264enc speed-preset=veryfast tune=zerolatency ! h264parse"
        }
        b"VP80" => "vp8enc deadline=1",
        b"VP90" => "vp9enc deadline=1",
        _ => return None,
    };
    Some(fragment)
}

fn muxer_for(path: &Path) -> &'static str {
    match extension_lowercase(path).as_deref() {
        Some("mp4" | "m4v") => "mp4mux",
        Some("mov") => "qtmux",
        Some("mkv") => "matroskamux",
        Some("webm") => "webmmux",
        _ => "avimux",
    }
}

/// First element name of a launch fragment (`"x264enc speed-preset=…"` → `"x264enc"`).
fn element_name(fragment: &str) -> &str {
    fragment.split_whitespace().next().unwrap_or(fragment)
}

fn require_element(name: &str) -> Result<(), SinkError> {
    if gst::ElementFactory::find(name).is_none() {
        return Err(SinkError::Pipeline(format!("GStreamer element '{name}' is not installed")));
    }
    Ok(())
}

// ── GstEncoderBackend ─────────────────────────────────────────────────────────

/// Opens [`GstVideoEncoder`]s. `gstreamer::init()` must have been called.
#[derive(Debug, Default)]
pub struct GstEncoderBackend;

impl EncoderBackend for GstEncoderBackend {
    fn open(
        &self,
        path: &Path,
        codec: FourCc,
        fps: f64,
        size: (u32, u32),
    ) -> Result<Box<dyn VideoEncoder>, SinkError> {
        Ok(Box::new(GstVideoEncoder::new(path, codec, fps, size)?))
    }
}

// ── GstVideoEncoder ───────────────────────────────────────────────────────────

/// Encodes BGR frames at a fixed rate into a container file.
pub struct GstVideoEncoder {
    pipeline:  gst::Pipeline,
    appsrc:    AppSrc,
    size:      (u32, u32),
    framerate: (i32, i32),
    next:      u64,
    finished:  bool,
}

impl GstVideoEncoder {
    pub fn new(path: &Path, codec: FourCc, fps: f64, (width, height): (u32, u32)) -> Result<Self, SinkError> {
        let encoder = encoder_for(codec).ok_or_else(|| SinkError::UnsupportedCodec {
            codec: codec.to_string(),
        })?;
        let muxer = muxer_for(path);
        require_element(element_name(encoder))?;
        require_element(muxer)?;

        let framerate = raw_video::fps_fraction(fps);
        let desc = format!(
            "appsrc name=src format=time \
             ! videoconvert \
             ! {encoder} \
             ! {muxer} \
             ! filesink name=out"
        );
        debug!("Encoder pipeline: {}", desc);

        let pipeline = gst::parse::launch(&desc)
            .map_err(|e| SinkError::Pipeline(format!("Parsing encoder pipeline: {e}")))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| SinkError::Pipeline("Expected a Pipeline".into()))?;

        let appsrc = pipeline
            .by_name("src")
            .ok_or_else(|| SinkError::Pipeline("Finding appsrc 'src'".into()))?
            .downcast::<AppSrc>()
            .map_err(|_| SinkError::Pipeline("Expected AppSrc".into()))?;
        appsrc.set_caps(Some(&raw_video::bgr_caps(width, height, Some(framerate))));
        appsrc.set_format(gst::Format::Time);
        appsrc.set_block(true);
        appsrc.set_max_bytes(raw_video::bgr_stride(width) as u64 * height as u64 * QUEUED_FRAMES);

        let filesink = pipeline
            .by_name("out")
            .ok_or_else(|| SinkError::Pipeline("Finding filesink 'out'".into()))?;
        let location = path.to_string_lossy().into_owned();
        filesink.set_property("location", location.as_str());

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| SinkError::Pipeline(format!("Starting encoder pipeline: {e}")))?;

        info!(
            "Encoder ready: {} ({}, {}x{} @ {}/{} fps, {})",
            path.display(), codec, width, height, framerate.0, framerate.1, element_name(encoder)
        );

        Ok(Self {
            pipeline,
            appsrc,
            size: (width, height),
            framerate,
            next: 0,
            finished: false,
        })
    }

    /// Surface an error the pipeline posted since the last call.
    fn pending_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(describe_error(err)),
            _ => None,
        }
    }

    fn stop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("Stopping encoder pipeline: {e}");
        }
        self.finished = true;
    }
}

impl VideoEncoder for GstVideoEncoder {
    fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        if self.finished {
            return Err(SinkError::Write { reason: "encoder already closed".into() });
        }
        if frame.size() != self.size {
            return Err(SinkError::Write {
                reason: format!(
                    "frame is {}x{}, encoder expects {}x{}",
                    frame.width(), frame.height(), self.size.0, self.size.1
                ),
            });
        }
        if let Some(reason) = self.pending_error() {
            return Err(SinkError::Write { reason });
        }

        let mut buffer = raw_video::bgr_buffer(frame);
        if let Some(buf) = buffer.get_mut() {
            let pts = raw_video::frame_pts(self.next, self.framerate);
            buf.set_pts(pts);
            buf.set_duration(raw_video::frame_pts(self.next + 1, self.framerate) - pts);
        }
        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| SinkError::Write { reason: format!("appsrc push_buffer: {e:?}") })?;
        self.next += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if self.finished {
            return Ok(());
        }
        let timeout = gst::ClockTime::from_seconds(FINALIZE_TIMEOUT_SECS);
        let outcome = drain(&self.pipeline, &self.appsrc, timeout);
        self.stop();
        debug!("Encoder finalized after {} frames", self.next);
        outcome.map_err(|reason| SinkError::Finalize { reason })
    }
}

impl Drop for GstVideoEncoder {
    fn drop(&mut self) {
        if !self.finished {
            self.stop();
        }
    }
}

/// Push EOS and wait up to `timeout` for it to reach the sink.
///
/// Returns at once when the appsrc refuses the EOS (pipeline already
/// stopped or failed), since no EOS message would ever follow.
fn drain(pipeline: &gst::Pipeline, appsrc: &AppSrc, timeout: gst::ClockTime) -> Result<(), String> {
    if let Err(e) = appsrc.end_of_stream() {
        warn!("Encoder refused end-of-stream: {e:?}");
        return Err(format!("appsrc end_of_stream: {e:?}"));
    }
    let bus = pipeline.bus().ok_or_else(|| "pipeline has no bus".to_owned())?;
    match bus.timed_pop_filtered(timeout, &[gst::MessageType::Eos, gst::MessageType::Error]) {
        Some(msg) => match msg.view() {
            gst::MessageView::Error(err) => Err(describe_error(err)),
            _ => Ok(()),
        },
        None => Err(format!("no EOS within {}s", timeout.seconds())),
    }
}

fn describe_error(err: &gst::message::Error) -> String {
    let source = err.src().map(|s| s.path_string().to_string()).unwrap_or_default();
    match err.debug() {
        Some(debug) => format!("{source}: {} ({debug})", err.error()),
        None => format!("{source}: {}", err.error()),
    }
}
