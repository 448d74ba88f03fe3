use std::path::PathBuf;

use chrono::{DateTime, Local, TimeZone};
use image::{ImageFormat, RgbImage};
use tracing::debug;

use crate::errors::SnapshotError;
use crate::types::Frame;

/// Writes single frames as `<prefix>_<YYYYMMDD_HHMMSS>.png`.
///
/// Two snapshots within the same second share a name; the later one
/// overwrites the earlier.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir:    PathBuf,
    prefix: String,
}

impl SnapshotWriter {
    pub const EXTENSION: &'static str = "png";

    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self { dir: dir.into(), prefix: prefix.into() }
    }

    /// Save `frame` exactly as given (overlay included) and return its path.
    pub fn save(&self, frame: &Frame) -> Result<PathBuf, SnapshotError> {
        self.save_at(frame, Local::now())
    }

    pub fn save_at<Tz: TimeZone>(&self, frame: &Frame, at: DateTime<Tz>) -> Result<PathBuf, SnapshotError>
    where
        Tz::Offset: std::fmt::Display,
    {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(self.file_name(&at));
        if path.exists() {
            debug!("Snapshot {} already exists, overwriting", path.display());
        }
        to_rgb_image(frame)?.save_with_format(&path, ImageFormat::Png)?;
        Ok(path)
    }

    pub fn file_name<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        format!("{}_{}.{}", self.prefix, at.format("%Y%m%d_%H%M%S"), Self::EXTENSION)
    }
}

fn to_rgb_image(frame: &Frame) -> Result<RgbImage, SnapshotError> {
    let mut rgb = Vec::with_capacity(frame.as_bytes().len());
    for px in frame.as_bytes().chunks_exact(Frame::CHANNELS) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    RgbImage::from_raw(frame.width(), frame.height(), rgb).ok_or(SnapshotError::BadFrame {
        width:  frame.width(),
        height: frame.height(),
    })
}
