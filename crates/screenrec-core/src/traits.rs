//! Collaborator interfaces driven by the capture loop.
//!
//! Production implementations:
//! - [`DisplayCapture`] — `screenrec_capture::XcapCapturer`
//! - [`PreviewSurface`] — GStreamer video sink window (`screenrec` binary)
//! - [`EncoderBackend`] / [`VideoEncoder`] — GStreamer encode pipeline (`screenrec` binary)

use std::path::Path;
use std::time::Duration;

use crate::errors::{CaptureError, PreviewError, SinkError};
use crate::types::{CaptureRegion, DisplayGeometry, FourCc, Frame, KeyCode, RawFrame};

// MARK: - DisplayCapture

/// Grabs pixels from the desktop. Dropping the value releases the handle.
pub trait DisplayCapture {
    /// Display rectangles: index 0 is the union of all displays,
    /// indices ≥ 1 the physical displays in enumeration order.
    fn list_displays(&mut self) -> Result<Vec<DisplayGeometry>, CaptureError>;

    /// Grab one 4-channel frame covering `region`.
    fn grab(&mut self, region: &CaptureRegion) -> Result<RawFrame, CaptureError>;
}

// MARK: - PreviewSurface

/// On-screen preview windows plus the keyboard input they receive.
pub trait PreviewSurface {
    fn create_window(&mut self, name: &str, initial_size: (u32, u32)) -> Result<(), PreviewError>;

    fn show(&mut self, window: &str, frame: &Frame) -> Result<(), PreviewError>;

    /// Wait up to `timeout` for one key press.
    fn poll_key(&mut self, timeout: Duration) -> Option<KeyCode>;

    fn destroy_all_windows(&mut self);
}

// MARK: - Video encoding

/// An open encoder bound to one output file.
pub trait VideoEncoder {
    fn write(&mut self, frame: &Frame) -> Result<(), SinkError>;

    /// Flush and finalize the container. Called at most once.
    fn close(&mut self) -> Result<(), SinkError>;
}

/// Opens encoders; a rejection leaves the frame sink unopened.
pub trait EncoderBackend {
    fn open(
        &self,
        path: &Path,
        codec: FourCc,
        fps: f64,
        size: (u32, u32),
    ) -> Result<Box<dyn VideoEncoder>, SinkError>;
}
