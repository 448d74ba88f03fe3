//! In-memory collaborators for exercising the loop without a display or GStreamer.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use crate::errors::{CaptureError, PreviewError, SinkError};
use crate::traits::{DisplayCapture, EncoderBackend, PreviewSurface, VideoEncoder};
use crate::types::{CaptureRegion, DisplayGeometry, FourCc, Frame, KeyCode, PixelFormat, RawFrame};

// ── Encoder ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OpenRecord {
    pub path:  PathBuf,
    pub codec: FourCc,
    pub fps:   f64,
    pub size:  (u32, u32),
}

#[derive(Debug, Clone, Default)]
pub struct SinkStats {
    opens:  Vec<OpenRecord>,
    writes: usize,
    closes: usize,
    /// Set when a write arrives after close.
    write_after_close: bool,
}

impl SinkStats {
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn closes(&self) -> usize {
        self.closes
    }

    pub fn last_open(&self) -> Option<&OpenRecord> {
        self.opens.last()
    }

    pub fn write_after_close(&self) -> bool {
        self.write_after_close
    }
}

/// Backend that counts calls reaching the encoder.
pub struct CountingBackend {
    accept: bool,
    /// Opened encoders fail every write and their close.
    broken: bool,
    stats:  Rc<RefCell<SinkStats>>,
}

impl CountingBackend {
    pub fn accepting() -> Self {
        Self { accept: true, broken: false, stats: Rc::default() }
    }

    pub fn rejecting() -> Self {
        Self { accept: false, broken: false, stats: Rc::default() }
    }

    /// Opens fine; the pipeline then fails asynchronously.
    pub fn failing() -> Self {
        Self { accept: true, broken: true, stats: Rc::default() }
    }

    pub fn stats(&self) -> SinkStats {
        self.stats.borrow().clone()
    }
}

impl EncoderBackend for CountingBackend {
    fn open(
        &self,
        path: &Path,
        codec: FourCc,
        fps: f64,
        size: (u32, u32),
    ) -> Result<Box<dyn VideoEncoder>, SinkError> {
        self.stats.borrow_mut().opens.push(OpenRecord { path: path.to_owned(), codec, fps, size });
        if !self.accept {
            return Err(SinkError::Pipeline("simulated encoder rejection".into()));
        }
        Ok(Box::new(CountingEncoder { stats: Rc::clone(&self.stats), closed: false, broken: self.broken }))
    }
}

struct CountingEncoder {
    stats:  Rc<RefCell<SinkStats>>,
    closed: bool,
    broken: bool,
}

impl VideoEncoder for CountingEncoder {
    fn write(&mut self, _frame: &Frame) -> Result<(), SinkError> {
        let mut stats = self.stats.borrow_mut();
        if self.closed {
            stats.write_after_close = true;
        }
        stats.writes += 1;
        if self.broken {
            return Err(SinkError::Write { reason: "simulated negotiation failure".into() });
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.closed = true;
        self.stats.borrow_mut().closes += 1;
        if self.broken {
            return Err(SinkError::Finalize { reason: "simulated muxer failure".into() });
        }
        Ok(())
    }
}

// ── Capture ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CaptureLog {
    pub grabs:    usize,
    pub released: bool,
}

/// Produces solid-colour frames of the requested size.
pub struct FakeCapture {
    displays: Vec<DisplayGeometry>,
    /// After this many grabs, frames come back one pixel too wide.
    mismatch_after: Option<usize>,
    log: Rc<RefCell<CaptureLog>>,
}

impl FakeCapture {
    pub fn new(displays: Vec<DisplayGeometry>) -> Self {
        Self { displays, mismatch_after: None, log: Rc::default() }
    }

    pub fn mismatch_after(mut self, grabs: usize) -> Self {
        self.mismatch_after = Some(grabs);
        self
    }

    pub fn log(&self) -> Rc<RefCell<CaptureLog>> {
        Rc::clone(&self.log)
    }
}

impl DisplayCapture for FakeCapture {
    fn list_displays(&mut self) -> Result<Vec<DisplayGeometry>, CaptureError> {
        Ok(self.displays.clone())
    }

    fn grab(&mut self, region: &CaptureRegion) -> Result<RawFrame, CaptureError> {
        let mut log = self.log.borrow_mut();
        log.grabs += 1;
        let extra = match self.mismatch_after {
            Some(n) if log.grabs > n => 1,
            _ => 0,
        };
        let width = region.width + extra;
        Ok(RawFrame {
            data: [10u8, 20, 30, 255].repeat(width as usize * region.height as usize),
            width,
            height: region.height,
            format: PixelFormat::Bgra,
        })
    }
}

impl Drop for FakeCapture {
    fn drop(&mut self) {
        self.log.borrow_mut().released = true;
    }
}

// ── Preview ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PreviewLog {
    pub windows:    Vec<(String, (u32, u32))>,
    pub shown:      usize,
    pub last_frame: Option<Frame>,
    pub polls:      Vec<Duration>,
    pub destroyed:  usize,
}

/// Replays a fixed key script; once exhausted it reports the window closed.
pub struct ScriptedPreview {
    keys: VecDeque<Option<KeyCode>>,
    log:  Rc<RefCell<PreviewLog>>,
}

impl ScriptedPreview {
    pub fn new<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = Option<KeyCode>>,
    {
        Self { keys: keys.into_iter().collect(), log: Rc::default() }
    }

    pub fn log(&self) -> Rc<RefCell<PreviewLog>> {
        Rc::clone(&self.log)
    }
}

impl PreviewSurface for ScriptedPreview {
    fn create_window(&mut self, name: &str, initial_size: (u32, u32)) -> Result<(), PreviewError> {
        self.log.borrow_mut().windows.push((name.to_owned(), initial_size));
        Ok(())
    }

    fn show(&mut self, window: &str, frame: &Frame) -> Result<(), PreviewError> {
        let mut log = self.log.borrow_mut();
        if !log.windows.iter().any(|(name, _)| name == window) {
            return Err(PreviewError::WindowUnavailable(window.to_owned()));
        }
        log.shown += 1;
        log.last_frame = Some(frame.clone());
        Ok(())
    }

    fn poll_key(&mut self, timeout: Duration) -> Option<KeyCode> {
        self.log.borrow_mut().polls.push(timeout);
        self.keys.pop_front().unwrap_or(Some(KeyCode::Close))
    }

    fn destroy_all_windows(&mut self) {
        let mut log = self.log.borrow_mut();
        log.destroyed += 1;
        log.windows.clear();
    }
}

pub fn key(c: char) -> Option<KeyCode> {
    Some(KeyCode::Char(c))
}

/// A fresh path under the system temp dir; not created until something writes there.
pub fn unique_temp_dir(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("screenrec-{tag}-{}-{nanos}", std::process::id()))
}
