//! screenrec-core — types, errors, configuration and the capture loop.
//!
//! Everything here is independent of the OS capture API and of GStreamer;
//! those live behind the traits in [`traits`].

pub mod capture_loop;
pub mod codec;
pub mod config;
pub mod errors;
pub mod overlay;
pub mod rate;
pub mod region;
pub mod sink;
pub mod snapshot;
pub mod traits;
pub mod types;

#[cfg(test)]
mod test_support;

pub use capture_loop::{CaptureLoop, LoopSettings, RunSummary, StopReason};
pub use config::RecorderConfig;
pub use errors::{CaptureError, PreviewError, RecorderError, SinkError, SnapshotError};
pub use rate::RateEstimator;
pub use sink::{FrameSink, SinkState};
pub use snapshot::SnapshotWriter;
pub use traits::{DisplayCapture, EncoderBackend, PreviewSurface, VideoEncoder};
pub use types::*;
