//! Preview windows backed by GStreamer video sinks.
//!
//! # Pipeline (one per window)
//!
//! ```text
//! appsrc (BGR, live, do-timestamp)
//!   → videoconvert
//!   → videoscale add-borders=true
//!   → capsfilter name=fit   (initial window size)   ◄── navigation events
//!   → autovideosink sync=false
//! ```
//!
//! Key presses arrive as upstream navigation events from the sink window;
//! a pad hook on the `fit` src pad forwards them over a channel that
//! [`GstPreview::poll_key`] waits on. Closing the window makes the sink post
//! an error on the bus, which is reported as [`KeyCode::Close`].

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use screenrec_core::{Frame, KeyCode, PreviewError, PreviewSurface};
use tracing::{debug, info, warn};

use crate::raw_video;

// ── Navigation events ─────────────────────────────────────────────────────────

/// Key name of a navigation `key-press` structure.
fn key_press_name(structure: &gst::StructureRef) -> Option<&str> {
    if structure.get::<&str>("event").ok()? != "key-press" {
        return None;
    }
    structure.get::<&str>("key").ok()
}

fn key_press(event: &gst::EventRef) -> Option<KeyCode> {
    if event.type_() != gst::EventType::Navigation {
        return None;
    }
    key_press_name(event.structure()?).map(KeyCode::from_name)
}

// ── Window ────────────────────────────────────────────────────────────────────

struct Window {
    pipeline:   gst::Pipeline,
    appsrc:     AppSrc,
    caps_size:  Option<(u32, u32)>,
    title_sent: bool,
}

impl Window {
    fn open(name: &str, (width, height): (u32, u32), keys: Sender<KeyCode>) -> Result<Self, PreviewError> {
        let desc = format!(
            "appsrc name=src is-live=true do-timestamp=true format=time \
             ! videoconvert \
             ! videoscale add-borders=true \
             ! capsfilter name=fit caps=video/x-raw,width={width},height={height},pixel-aspect-ratio=1/1 \
             ! autovideosink sync=false"
        );
        debug!("Preview pipeline for {:?}: {}", name, desc);

        let pipeline = gst::parse::launch(&desc)
            .map_err(|e| PreviewError::Pipeline(format!("Parsing preview pipeline: {e}")))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| PreviewError::Pipeline("Expected a Pipeline".into()))?;

        let appsrc = pipeline
            .by_name("src")
            .ok_or_else(|| PreviewError::Pipeline("Finding appsrc 'src'".into()))?
            .downcast::<AppSrc>()
            .map_err(|_| PreviewError::Pipeline("Expected AppSrc".into()))?;

        let fit_src = pipeline
            .by_name("fit")
            .and_then(|fit| fit.static_pad("src"))
            .ok_or_else(|| PreviewError::Pipeline("Finding capsfilter 'fit' src pad".into()))?;
        fit_src.add_probe(gst::PadProbeType::EVENT_UPSTREAM, move |_, info| {
            if let Some(gst::PadProbeData::Event(ref event)) = info.data {
                if let Some(key) = key_press(event) {
                    let _ = keys.send(key);
                }
            }
            gst::PadProbeReturn::Ok
        });

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| PreviewError::WindowUnavailable(format!("{name}: {e}")))?;

        Ok(Self { pipeline, appsrc, caps_size: None, title_sent: false })
    }

    fn send_title(&mut self, title: &str) {
        let mut tags = gst::TagList::new();
        tags.make_mut().add::<gst::tags::Title>(&title, gst::TagMergeMode::Replace);
        if !self.appsrc.send_event(gst::event::Tag::new(tags)) {
            debug!("Window title tag was not accepted");
        }
        self.title_sent = true;
    }

    /// An error or EOS on the bus means the sink window has gone away.
    fn closed_reason(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(err.error().to_string()),
            _ => Some("end of stream".to_owned()),
        }
    }

    fn stop(&self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("Stopping preview pipeline: {e}");
        }
    }
}

// ── GstPreview ────────────────────────────────────────────────────────────────

/// [`PreviewSurface`] drawing into GStreamer sink windows.
///
/// `gstreamer::init()` must have been called.
pub struct GstPreview {
    windows: HashMap<String, Window>,
    keys_tx: Sender<KeyCode>,
    keys_rx: Receiver<KeyCode>,
    closed:  bool,
}

impl GstPreview {
    pub fn new() -> Self {
        let (keys_tx, keys_rx) = mpsc::channel();
        Self { windows: HashMap::new(), keys_tx, keys_rx, closed: false }
    }

    fn any_window_closed(&self) -> bool {
        for (name, window) in &self.windows {
            if let Some(reason) = window.closed_reason() {
                info!("Preview window {:?} closed: {}", name, reason);
                return true;
            }
        }
        false
    }
}

impl Default for GstPreview {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewSurface for GstPreview {
    fn create_window(&mut self, name: &str, initial_size: (u32, u32)) -> Result<(), PreviewError> {
        if self.windows.contains_key(name) {
            return Ok(());
        }
        let window = Window::open(name, initial_size, self.keys_tx.clone())?;
        info!("Preview window {:?} opened ({}x{})", name, initial_size.0, initial_size.1);
        self.windows.insert(name.to_owned(), window);
        Ok(())
    }

    fn show(&mut self, name: &str, frame: &Frame) -> Result<(), PreviewError> {
        let window = self
            .windows
            .get_mut(name)
            .ok_or_else(|| PreviewError::WindowUnavailable(name.to_owned()))?;

        if window.caps_size != Some(frame.size()) {
            window
                .appsrc
                .set_caps(Some(&raw_video::bgr_caps(frame.width(), frame.height(), None)));
            window.caps_size = Some(frame.size());
        }

        match window.appsrc.push_buffer(raw_video::bgr_buffer(frame)) {
            Ok(_) => {}
            // Window already gone; the next key poll reports the close.
            Err(gst::FlowError::Flushing | gst::FlowError::Eos) => return Ok(()),
            Err(e) => return Err(PreviewError::Present(format!("appsrc push_buffer: {e:?}"))),
        }

        if !window.title_sent {
            window.send_title(name);
        }
        Ok(())
    }

    fn poll_key(&mut self, timeout: Duration) -> Option<KeyCode> {
        if self.closed || self.any_window_closed() {
            self.closed = true;
            return Some(KeyCode::Close);
        }
        self.keys_rx.recv_timeout(timeout).ok()
    }

    fn destroy_all_windows(&mut self) {
        for (name, window) in self.windows.drain() {
            window.stop();
            debug!("Preview window {:?} destroyed", name);
        }
    }
}

impl Drop for GstPreview {
    fn drop(&mut self) {
        self.destroy_all_windows();
    }
}
