//! `CaptureLoop` — the single-threaded capture → overlay → preview → encode loop.
//!
//! ```text
//!           ┌──────────────────────── one iteration ────────────────────────┐
//!  grab ──► BGR ──► overlay ──► preview ──► [Recording && Open] sink.write ─┤
//!                                                                           │
//!  rate.update(dt) ◄────────────────────────────────────────────────────────┘
//!        │
//!        ▼
//!  poll_key(timeout)   ← the only wait; paces the loop toward target fps
//!        │
//!        ├─ 'r'          Idle ⇄ Recording
//!        ├─ 's'          snapshot of the overlaid frame
//!        ├─ 'q' / Esc    quit ─► teardown
//!        └─ Ctrl-C flag  quit ─► teardown
//! ```
//!
//! Teardown (sink close, window destruction) runs exactly once on every exit
//! path; `Drop` covers panics. The capture handle is released when the loop
//! is dropped.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::errors::{CaptureError, RecorderError};
use crate::overlay;
use crate::rate::RateEstimator;
use crate::sink::FrameSink;
use crate::snapshot::SnapshotWriter;
use crate::traits::{DisplayCapture, PreviewSurface};
use crate::types::{CaptureRegion, Command, Frame, RecordingState};

// ── Settings / results ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub window_name:  String,
    pub preview_size: (u32, u32),
    /// Key-poll timeout; also the pacing interval.
    pub poll_timeout: Duration,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Quit,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stop_reason:    StopReason,
    pub iterations:     u64,
    pub frames_written: u64,
    pub snapshots:      Vec<PathBuf>,
    /// Whether the video sink opened at startup.
    pub sink_was_open:  bool,
    /// Whether the video file was finalized with at least one frame.
    pub video_saved:    bool,
    pub output:         PathBuf,
}

// ── CaptureLoop ───────────────────────────────────────────────────────────────

/// Owns every resource of a run: capture handle, preview, sink.
pub struct CaptureLoop<C: DisplayCapture, P: PreviewSurface> {
    capture:   C,
    preview:   P,
    sink:      FrameSink,
    snapshots: SnapshotWriter,
    region:    CaptureRegion,
    settings:  LoopSettings,
    interrupt: Option<Arc<AtomicBool>>,

    state:          RecordingState,
    rate:           RateEstimator,
    iterations:     u64,
    frames_written: u64,
    saved:          Vec<PathBuf>,
    sink_was_open:  bool,
    torn_down:      bool,
}

impl<C: DisplayCapture, P: PreviewSurface> CaptureLoop<C, P> {
    pub fn new(
        capture: C,
        preview: P,
        sink: FrameSink,
        snapshots: SnapshotWriter,
        region: CaptureRegion,
        settings: LoopSettings,
    ) -> Self {
        let sink_was_open = sink.is_open();
        Self {
            capture,
            preview,
            sink,
            snapshots,
            region,
            settings,
            interrupt: None,
            state: RecordingState::Idle,
            rate: RateEstimator::new(),
            iterations: 0,
            frames_written: 0,
            saved: Vec::new(),
            sink_was_open,
            torn_down: false,
        }
    }

    /// Stop at the next poll boundary once `flag` is set (Ctrl-C handler).
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Run until quit or interrupt. Teardown has happened when this returns,
    /// whether it returns `Ok` or `Err`.
    pub fn run(mut self) -> Result<RunSummary, RecorderError> {
        let result = self.run_iterations();
        self.teardown();

        let stop_reason = match result {
            Ok(reason) => reason,
            Err(RecorderError::InterruptedByUser) => StopReason::Interrupted,
            Err(e) => {
                error!("Capture loop aborted: {e}");
                return Err(e);
            }
        };
        info!(
            "Capture loop stopped ({:?}) after {} iterations, {} frames recorded",
            stop_reason, self.iterations, self.frames_written
        );

        Ok(RunSummary {
            stop_reason,
            iterations:     self.iterations,
            frames_written: self.frames_written,
            snapshots:      std::mem::take(&mut self.saved),
            sink_was_open:  self.sink_was_open,
            video_saved:    self.sink.saved(),
            output:         self.sink.path().to_owned(),
        })
    }

    fn run_iterations(&mut self) -> Result<StopReason, RecorderError> {
        self.preview
            .create_window(&self.settings.window_name, self.settings.preview_size)?;

        let mut last_iteration = Instant::now();
        loop {
            if let Some(reason) = self.step(&mut last_iteration)? {
                return Ok(reason);
            }
        }
    }

    /// One iteration; `Some` when the loop should stop.
    fn step(&mut self, last_iteration: &mut Instant) -> Result<Option<StopReason>, RecorderError> {
        let t0 = Instant::now();
        self.iterations += 1;

        // ── 1. Grab + convert ─────────────────────────────────────────────
        let raw = self.capture.grab(&self.region)?;
        if (raw.width, raw.height) != self.region.size() {
            return Err(CaptureError::DimensionMismatch {
                expected_width:  self.region.width,
                expected_height: self.region.height,
                actual_width:    raw.width,
                actual_height:   raw.height,
            }
            .into());
        }
        let mut frame = Frame::from_raw(&raw)?;

        // ── 2. Overlay + preview ──────────────────────────────────────────
        overlay::render_status(&mut frame, self.state, self.rate.estimate());
        self.preview.show(&self.settings.window_name, &frame)?;

        // ── 3. Record ─────────────────────────────────────────────────────
        if self.state.is_recording() && self.sink.is_open() {
            match self.sink.write(&frame) {
                Ok(true) => self.frames_written += 1,
                Ok(false) => {}
                // The sink is Failed from here on, so this is reported once.
                Err(e) => warn!(
                    "Recording to {} failed, no further frames will be saved: {e}",
                    self.sink.path().display()
                ),
            }
        }

        // ── 4. Measured rate ──────────────────────────────────────────────
        let now = Instant::now();
        let dt = now.saturating_duration_since(*last_iteration).as_secs_f64();
        *last_iteration = now;
        self.rate.update(dt);

        // ── 5. Poll (pacing) + dispatch ───────────────────────────────────
        let key = self.preview.poll_key(self.settings.poll_timeout);
        if self.interrupted() {
            info!("Interrupted by user.");
            return Err(RecorderError::InterruptedByUser);
        }

        let Some(key) = key else {
            return Ok(None);
        };
        debug!("Key {:?} after {:.1} ms", key, t0.elapsed().as_secs_f64() * 1000.0);
        match Command::from_key(&key) {
            Some(command) => Ok(self.dispatch(command, &frame)),
            None => Ok(None),
        }
    }

    fn dispatch(&mut self, command: Command, frame: &Frame) -> Option<StopReason> {
        match command {
            Command::ToggleRecord => {
                self.state = self.state.toggled();
                if self.state.is_recording() {
                    info!("Recording started.");
                    if !self.sink.is_open() {
                        debug!("Recording toggled on without an open video sink; frames are not saved");
                    }
                } else {
                    info!("Recording stopped.");
                }
                None
            }
            Command::Snapshot => {
                match self.snapshots.save(frame) {
                    Ok(path) => {
                        info!("Saved screenshot: {}", path.display());
                        self.saved.push(path);
                    }
                    Err(e) => warn!("Screenshot failed: {e}"),
                }
                None
            }
            Command::Quit => {
                info!("Quitting.");
                Some(StopReason::Quit)
            }
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(e) = self.sink.close() {
            error!("Failed to finalize {}: {e}", self.sink.path().display());
        }
        self.preview.destroy_all_windows();
        debug!("Capture loop teardown complete");
    }
}

impl<C: DisplayCapture, P: PreviewSurface> Drop for CaptureLoop<C, P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    use super::*;
    use crate::test_support::{
        key, unique_temp_dir, CaptureLog, CountingBackend, FakeCapture, PreviewLog, ScriptedPreview,
    };
    use crate::types::{DisplayGeometry, FourCc, KeyCode};

    const REGION: CaptureRegion = CaptureRegion { left: 0, top: 0, width: 64, height: 48 };

    fn settings() -> LoopSettings {
        LoopSettings {
            window_name:  "test".into(),
            preview_size: (64, 48),
            poll_timeout: Duration::from_millis(50),
        }
    }

    fn build(
        backend: &CountingBackend,
        keys: Vec<Option<KeyCode>>,
    ) -> (CaptureLoop<FakeCapture, ScriptedPreview>, Rc<RefCell<PreviewLog>>, Rc<RefCell<CaptureLog>>) {
        let capture = FakeCapture::new(vec![DisplayGeometry::new(0, 0, 64, 48)]);
        let preview = ScriptedPreview::new(keys);
        let (plog, clog) = (preview.log(), capture.log());
        let sink = FrameSink::open(backend, Path::new("capture.mp4"), FourCc::MP4V, 20.0, REGION.size());
        let snapshots = SnapshotWriter::new(unique_temp_dir("loop"), "screenshot");
        (CaptureLoop::new(capture, preview, sink, snapshots, REGION, settings()), plog, clog)
    }

    #[test]
    fn idle_never_writes() {
        let backend = CountingBackend::accepting();
        let (lp, plog, _) = build(&backend, vec![None, None, key('q')]);
        let summary = lp.run().unwrap();

        assert_eq!(summary.stop_reason, StopReason::Quit);
        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.frames_written, 0);
        assert!(summary.sink_was_open);
        assert!(!summary.video_saved, "no frames, nothing saved");
        assert_eq!(plog.borrow().shown, 3);

        let stats = backend.stats();
        assert_eq!(stats.writes(), 0);
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn writes_only_while_recording() {
        let backend = CountingBackend::accepting();
        // it1: 'r' → on; it2, it3 write; it3: 'r' → off; it4 idle; it5 quit.
        let keys = vec![key('r'), None, key('r'), None, key('q')];
        let (lp, plog, _) = build(&backend, keys);
        let summary = lp.run().unwrap();

        assert_eq!(summary.iterations, 5);
        assert_eq!(summary.frames_written, 2);
        assert!(summary.video_saved);
        assert_eq!(plog.borrow().shown, 5);

        let stats = backend.stats();
        assert_eq!(stats.writes(), 2);
        assert_eq!(stats.closes(), 1);
        assert!(!stats.write_after_close());
    }

    #[test]
    fn unopened_sink_skips_encoder_but_previews_every_frame() {
        let backend = CountingBackend::rejecting();
        let keys = vec![key('r'), None, None, None, key('q')];
        let (lp, plog, _) = build(&backend, keys);
        let summary = lp.run().unwrap();

        assert_eq!(summary.iterations, 5);
        assert_eq!(summary.frames_written, 0);
        assert!(!summary.sink_was_open);
        assert_eq!(plog.borrow().shown, 5);

        let stats = backend.stats();
        assert_eq!(stats.writes(), 0);
        assert_eq!(stats.closes(), 0);
    }

    #[test]
    fn encoder_failing_after_open_is_not_reported_saved() {
        let backend = CountingBackend::failing();
        let keys = vec![key('r'), None, None, None, None, key('q')];
        let (lp, plog, _) = build(&backend, keys);
        let summary = lp.run().unwrap();

        assert_eq!(summary.iterations, 6);
        assert_eq!(summary.frames_written, 0);
        assert!(summary.sink_was_open);
        assert!(!summary.video_saved);
        assert_eq!(plog.borrow().shown, 6);

        // Only the first write reaches the encoder; it is released right away.
        let stats = backend.stats();
        assert_eq!(stats.writes(), 1);
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn double_toggle_restores_state() {
        let backend = CountingBackend::accepting();
        let (mut lp, _, _) = build(&backend, vec![]);
        let frame = Frame::new(64, 48);
        let initial = lp.state();
        lp.dispatch(Command::ToggleRecord, &frame);
        assert_eq!(lp.state(), RecordingState::Recording);
        lp.dispatch(Command::ToggleRecord, &frame);
        assert_eq!(lp.state(), initial);
    }

    #[test]
    fn snapshot_does_not_change_recording_state() {
        let backend = CountingBackend::accepting();
        let keys = vec![key('r'), key('s'), key('q')];
        let (lp, _, _) = build(&backend, keys);
        let summary = lp.run().unwrap();

        assert_eq!(summary.snapshots.len(), 1);
        assert!(summary.snapshots[0].exists());
        // Recording stayed on through the snapshot: iterations 2 and 3 wrote.
        assert_eq!(summary.frames_written, 2);
        if let Some(dir) = summary.snapshots[0].parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let backend = CountingBackend::accepting();
        let keys = vec![key('x'), Some(KeyCode::Named("F5".into())), key('q')];
        let (lp, _, _) = build(&backend, keys);
        let summary = lp.run().unwrap();
        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.frames_written, 0);
    }

    #[test]
    fn escape_and_window_close_quit() {
        for quit in [Some(KeyCode::Escape), Some(KeyCode::Close)] {
            let backend = CountingBackend::accepting();
            let (lp, _, _) = build(&backend, vec![quit]);
            let summary = lp.run().unwrap();
            assert_eq!(summary.stop_reason, StopReason::Quit);
            assert_eq!(summary.iterations, 1);
        }
    }

    #[test]
    fn interrupt_runs_teardown_and_closes_once() {
        let backend = CountingBackend::accepting();
        let (lp, plog, clog) = build(&backend, vec![key('r'), None, None]);
        let flag = Arc::new(AtomicBool::new(false));
        let lp = lp.with_interrupt(Arc::clone(&flag));

        flag.store(true, Ordering::SeqCst);
        let summary = lp.run().unwrap();

        assert_eq!(summary.stop_reason, StopReason::Interrupted);
        assert_eq!(summary.iterations, 1);
        assert_eq!(backend.stats().closes(), 1);
        assert_eq!(plog.borrow().destroyed, 1);
        assert!(clog.borrow().released);
    }

    #[test]
    fn dimension_mismatch_fails_fast_with_teardown() {
        let backend = CountingBackend::accepting();
        let capture = FakeCapture::new(vec![]).mismatch_after(2);
        let clog = capture.log();
        let preview = ScriptedPreview::new(vec![key('r'), None, None, None]);
        let plog = preview.log();
        let sink = FrameSink::open(&backend, Path::new("capture.mp4"), FourCc::MP4V, 20.0, REGION.size());
        let snapshots = SnapshotWriter::new(std::env::temp_dir(), "unused");
        let lp = CaptureLoop::new(capture, preview, sink, snapshots, REGION, settings());

        let err = lp.run().unwrap_err();
        assert!(matches!(err, RecorderError::Capture(CaptureError::DimensionMismatch { actual_width: 65, .. })));
        assert_eq!(clog.borrow().grabs, 3);
        assert_eq!(plog.borrow().shown, 2);

        let stats = backend.stats();
        assert_eq!(stats.writes(), 1);
        assert_eq!(stats.closes(), 1);
        assert_eq!(plog.borrow().destroyed, 1);
    }

    #[test]
    fn dropped_without_running_still_closes_sink() {
        let backend = CountingBackend::accepting();
        let (lp, plog, _) = build(&backend, vec![]);
        drop(lp);
        assert_eq!(backend.stats().closes(), 1);
        assert_eq!(plog.borrow().destroyed, 1);
    }

    #[test]
    fn preview_receives_overlaid_frame_and_paced_polls() {
        let backend = CountingBackend::accepting();
        let (lp, plog, _) = build(&backend, vec![key('q')]);
        lp.run().unwrap();

        let log = plog.borrow();
        assert_eq!(log.windows.len(), 0, "windows destroyed at teardown");
        assert_eq!(log.polls, vec![Duration::from_millis(50)]);

        let frame = log.last_frame.as_ref().unwrap();
        assert_eq!(frame.size(), (64, 48));
        // Fake capture fills BGR (10, 20, 30); the grey REC OFF label must be present.
        assert!(frame.as_bytes().chunks_exact(3).any(|px| px == overlay::GREY));
        assert!(frame.as_bytes().chunks_exact(3).any(|px| px == [10, 20, 30]));
    }
}
