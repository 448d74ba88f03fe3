//! `FrameSink` — the output video file and its lifecycle.
//!
//! ```text
//!   open() ──accepted──► Open ──close()/drop──► Closed
//!      │                  │
//!      │                  └──write error──► Failed   (encoder released; writes skipped)
//!      │
//!      └──rejected──► Unopened   (permanent for this run; writes skipped)
//! ```
//!
//! The container is only finalized on close, so an open sink is always closed
//! when it is dropped. A video counts as saved only when that close succeeded
//! and at least one frame went in.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::{RecorderError, SinkError};
use crate::traits::{EncoderBackend, VideoEncoder};
use crate::types::{FourCc, Frame};

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Unopened,
    Open,
    /// The encoder failed mid-run and was released.
    Failed,
    Closed,
}

enum Inner {
    Unopened(RecorderError),
    Open(Box<dyn VideoEncoder>),
    Failed,
    Closed,
}

/// Video output bound to a path, codec, frame rate and frame size.
pub struct FrameSink {
    path:   PathBuf,
    codec:  FourCc,
    size:   (u32, u32),
    inner:  Inner,
    frames: u64,
    finalized: bool,
}

impl FrameSink {
    /// Ask `backend` for an encoder. Never fails: a rejected open yields an
    /// unopened sink, reported once here.
    pub fn open(
        backend: &dyn EncoderBackend,
        path: &Path,
        codec: FourCc,
        fps: f64,
        size: (u32, u32),
    ) -> Self {
        let inner = match backend.open(path, codec, fps, size) {
            Ok(encoder) => {
                info!(
                    "Video sink open: {} ({} @ {:.2} fps, {}x{})",
                    path.display(), codec, fps, size.0, size.1
                );
                Inner::Open(encoder)
            }
            Err(e) => {
                let err = RecorderError::SinkUnopenable(e);
                warn!("{err}. Check codec/filename. Preview and screenshots remain available.");
                Inner::Unopened(err)
            }
        };
        Self { path: path.to_owned(), codec, size, inner, frames: 0, finalized: false }
    }

    pub fn state(&self) -> SinkState {
        match self.inner {
            Inner::Unopened(_) => SinkState::Unopened,
            Inner::Open(_) => SinkState::Open,
            Inner::Failed => SinkState::Failed,
            Inner::Closed => SinkState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == SinkState::Open
    }

    /// Why the backend refused to open, if it did.
    pub fn unopened_reason(&self) -> Option<&RecorderError> {
        match &self.inner {
            Inner::Unopened(e) => Some(e),
            _ => None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames accepted by the encoder so far.
    pub fn frames_written(&self) -> u64 {
        self.frames
    }

    /// Whether the container was finalized with at least one frame in it.
    pub fn saved(&self) -> bool {
        self.finalized && self.frames > 0
    }

    /// Append one frame. Returns `Ok(false)` when the sink is not open.
    ///
    /// An encoder error releases the encoder and leaves the sink `Failed`,
    /// so it is returned at most once per run.
    pub fn write(&mut self, frame: &Frame) -> Result<bool, SinkError> {
        let Inner::Open(encoder) = &mut self.inner else {
            return Ok(false);
        };
        if frame.size() != self.size {
            return Err(SinkError::Write {
                reason: format!(
                    "frame is {}x{}, sink expects {}x{}",
                    frame.width(), frame.height(), self.size.0, self.size.1
                ),
            });
        }
        if let Err(e) = encoder.write(frame) {
            self.fail();
            return Err(e);
        }
        self.frames += 1;
        Ok(true)
    }

    fn fail(&mut self) {
        if let Inner::Open(mut encoder) = std::mem::replace(&mut self.inner, Inner::Failed) {
            if let Err(e) = encoder.close() {
                debug!("Releasing failed encoder for {}: {e}", self.path.display());
            }
        }
    }

    /// Finalize the container. Only the first call on an open sink does work.
    pub fn close(&mut self) -> Result<(), SinkError> {
        match std::mem::replace(&mut self.inner, Inner::Closed) {
            Inner::Open(mut encoder) => {
                debug!("Closing video sink {} after {} frames", self.path.display(), self.frames);
                encoder.close()?;
                self.finalized = true;
                Ok(())
            }
            kept @ (Inner::Unopened(_) | Inner::Failed) => {
                self.inner = kept;
                Ok(())
            }
            Inner::Closed => Ok(()),
        }
    }
}

impl Drop for FrameSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Video sink close failed: {e}");
        }
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink")
            .field("path", &self.path)
            .field("codec", &self.codec)
            .field("size", &self.size)
            .field("state", &self.state())
            .field("frames", &self.frames)
            .finish()
    }
}
