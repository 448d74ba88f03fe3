use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::select_codec;
use crate::errors::RecorderError;
use crate::types::{CaptureRegion, FourCc};

/// Run configuration for a recording session.
///
/// Every field has a default, so a partial JSON file is enough; the CLI
/// overrides whatever it sets explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    #[serde(alias = "outFile")]
    pub output: PathBuf,
    #[serde(alias = "targetFPS", alias = "fps")]
    pub target_fps: f64,
    #[serde(alias = "monitorIndex", alias = "monitor")]
    pub monitor_index: i32,
    /// Overrides `monitor_index` when present.
    pub region: Option<CaptureRegion>,
    pub codec: Option<FourCc>,
    #[serde(alias = "snapshotDir")]
    pub snapshot_dir: PathBuf,
    #[serde(alias = "snapshotPrefix")]
    pub snapshot_prefix: String,
    #[serde(alias = "windowTitle")]
    pub window_title: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output:          PathBuf::from("capture.mp4"),
            target_fps:      20.0,
            monitor_index:   1,
            region:          None,
            codec:           None,
            snapshot_dir:    PathBuf::from("."),
            snapshot_prefix: "screenshot".to_owned(),
            window_title:    "ScreenRec - press 'r' to record, 's' to screenshot, 'q' to quit".to_owned(),
        }
    }
}

impl RecorderConfig {
    /// Largest preview window created at startup.
    pub const MAX_PREVIEW: (u32, u32) = (1280, 720);

    pub fn from_json(json: &str) -> Result<Self, RecorderError> {
        serde_json::from_str(json).map_err(|e| RecorderError::Config { reason: e.to_string() })
    }

    /// Read a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self, RecorderError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), RecorderError> {
        if !(self.target_fps.is_finite() && self.target_fps > 0.0) {
            return Err(RecorderError::Config {
                reason: format!("target fps must be a positive number, got {}", self.target_fps),
            });
        }
        if let Some(region) = self.region {
            if region.is_empty() {
                return Err(RecorderError::Config {
                    reason: format!("capture region must have a non-zero size ({region})"),
                });
            }
        }
        Ok(())
    }

    /// Key-poll timeout; doubles as the loop's pacing interval.
    ///
    /// `max(1 ms, 1000 ms / max(1, fps))`, truncated to whole milliseconds.
    pub fn poll_timeout(&self) -> Duration {
        let ms = (1000.0 / self.target_fps.max(1.0)) as u64;
        Duration::from_millis(ms.max(1))
    }

    /// Initial preview window size for a capture region.
    pub fn preview_size(&self, region: &CaptureRegion) -> (u32, u32) {
        (
            region.width.min(Self::MAX_PREVIEW.0),
            region.height.min(Self::MAX_PREVIEW.1),
        )
    }

    /// Codec for the output file (override or extension-derived).
    pub fn resolved_codec(&self) -> FourCc {
        select_codec(&self.output, self.codec)
    }
}
