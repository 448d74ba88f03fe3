use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{CaptureError, RecorderError};

// ── DisplayGeometry ───────────────────────────────────────────────────────────

/// A display rectangle in virtual-desktop coordinates, as reported by the
/// display-capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub left:   i32,
    pub top:    i32,
    pub width:  u32,
    pub height: u32,
}

impl DisplayGeometry {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self { left, top, width, height }
    }

    pub fn right(&self) -> i64 {
        self.left as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.top as i64 + self.height as i64
    }

    /// Smallest rectangle covering every display in `displays`.
    ///
    /// Returns `None` for an empty slice.
    pub fn union_of(displays: &[DisplayGeometry]) -> Option<DisplayGeometry> {
        let first = displays.first()?;
        let (mut l, mut t, mut r, mut b) = (first.left as i64, first.top as i64, first.right(), first.bottom());
        for d in &displays[1..] {
            l = l.min(d.left as i64);
            t = t.min(d.top as i64);
            r = r.max(d.right());
            b = b.max(d.bottom());
        }
        Some(DisplayGeometry {
            left:   l as i32,
            top:    t as i32,
            width:  (r - l) as u32,
            height: (b - t) as u32,
        })
    }
}

// ── CaptureRegion ─────────────────────────────────────────────────────────────

/// The rectangle grabbed every loop iteration. Fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub left:   i32,
    pub top:    i32,
    pub width:  u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self { left, top, width, height }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Overlap of this region with a display, in virtual-desktop coordinates.
    pub fn intersect(&self, display: &DisplayGeometry) -> Option<CaptureRegion> {
        let l = (self.left as i64).max(display.left as i64);
        let t = (self.top as i64).max(display.top as i64);
        let r = (self.left as i64 + self.width as i64).min(display.right());
        let b = (self.top as i64 + self.height as i64).min(display.bottom());
        if r <= l || b <= t {
            return None;
        }
        Some(CaptureRegion::new(l as i32, t as i32, (r - l) as u32, (b - t) as u32))
    }
}

impl From<DisplayGeometry> for CaptureRegion {
    fn from(d: DisplayGeometry) -> Self {
        Self::new(d.left, d.top, d.width, d.height)
    }
}

impl fmt::Display for CaptureRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "left={} top={} w={} h={}",
            self.left, self.top, self.width, self.height
        )
    }
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// Channel order of a 4-byte-per-pixel source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Blue, Green, Red, alpha/padding.
    Bgra,
    /// Red, Green, Blue, alpha.
    Rgba,
}

/// A raw grab as returned by the display-capture backend.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Tightly packed pixels, 4 bytes per pixel.
    pub data:   Vec<u8>,
    pub width:  u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// A BGR frame (3 bytes per pixel, row-major, no padding).
///
/// This is the format shown on the preview and handed to the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width:  u32,
    height: u32,
    data:   Vec<u8>,
}

impl Frame {
    pub const CHANNELS: usize = 3;

    /// A black frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * Self::CHANNELS],
        }
    }

    /// Wrap an existing BGR buffer.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * Self::CHANNELS;
        if data.len() != expected {
            return Err(CaptureError::UnsupportedBuffer {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    /// Drop the alpha/padding channel and reorder to BGR.
    pub fn from_raw(raw: &RawFrame) -> Result<Self, CaptureError> {
        let pixels = raw.width as usize * raw.height as usize;
        if raw.data.len() != pixels * 4 {
            return Err(CaptureError::UnsupportedBuffer {
                expected: pixels * 4,
                actual:   raw.data.len(),
            });
        }

        let mut data = Vec::with_capacity(pixels * Self::CHANNELS);
        match raw.format {
            PixelFormat::Bgra => {
                for px in raw.data.chunks_exact(4) {
                    data.extend_from_slice(&px[..3]);
                }
            }
            PixelFormat::Rgba => {
                for px in raw.data.chunks_exact(4) {
                    data.extend_from_slice(&[px[2], px[1], px[0]]);
                }
            }
        }
        Ok(Self { width: raw.width, height: raw.height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// BGR value at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// Set a pixel; coordinates outside the frame are ignored.
    pub fn put_pixel(&mut self, x: i64, y: i64, bgr: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        self.data[i..i + 3].copy_from_slice(&bgr);
    }
}

// ── FourCc ────────────────────────────────────────────────────────────────────

/// Four-character codec identifier (`mp4v`, `XVID`, `MJPG`, ...).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FourCc([u8; 4]);

impl FourCc {
    pub const MP4V: Self = Self(*b"mp4v");
    pub const XVID: Self = Self(*b"XVID");
    pub const MJPG: Self = Self(*b"MJPG");
    pub const H264: Self = Self(*b"H264");

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Construction only admits ASCII.
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl FromStr for FourCc {
    type Err = RecorderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            return Err(RecorderError::Config {
                reason: format!("codec must be exactly four ASCII characters, got {s:?}"),
            });
        }
        Ok(Self([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl TryFrom<String> for FourCc {
    type Error = RecorderError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FourCc> for String {
    fn from(c: FourCc) -> Self {
        c.as_str().to_owned()
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({})", self.as_str())
    }
}

// ── Keys and commands ─────────────────────────────────────────────────────────

/// A key press reported by the preview surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCode {
    Char(char),
    Escape,
    /// The preview window was closed by the user.
    Close,
    /// Any other named key (`F1`, `Return`, ...).
    Named(String),
}

impl KeyCode {
    /// Map a toolkit key name (`"r"`, `"Escape"`, `"F5"`) to a key code.
    pub fn from_name(name: &str) -> Self {
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::Char(c),
            _ if name == "Escape" => Self::Escape,
            _ => Self::Named(name.to_owned()),
        }
    }
}

/// User command recognised by the capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleRecord,
    Snapshot,
    Quit,
}

impl Command {
    /// Unrecognised keys map to `None` and are ignored by the loop.
    pub fn from_key(key: &KeyCode) -> Option<Self> {
        match key {
            KeyCode::Char('r') => Some(Self::ToggleRecord),
            KeyCode::Char('s') => Some(Self::Snapshot),
            KeyCode::Char('q') | KeyCode::Escape | KeyCode::Close => Some(Self::Quit),
            _ => None,
        }
    }
}

// ── RecordingState ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
}

impl RecordingState {
    pub fn toggled(self) -> Self {
        match self {
            Self::Idle => Self::Recording,
            Self::Recording => Self::Idle,
        }
    }

    pub fn is_recording(self) -> bool {
        self == Self::Recording
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "REC OFF"),
            Self::Recording => write!(f, "REC ON"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_spans_all_displays() {
        let displays = [
            DisplayGeometry::new(0, 0, 1920, 1080),
            DisplayGeometry::new(1920, -200, 1280, 1024),
        ];
        let u = DisplayGeometry::union_of(&displays).unwrap();
        assert_eq!(u, DisplayGeometry::new(0, -200, 3200, 1280));
        assert!(DisplayGeometry::union_of(&[]).is_none());
    }

    #[test]
    fn region_intersection() {
        let region = CaptureRegion::new(1800, 100, 400, 300);
        let left = DisplayGeometry::new(0, 0, 1920, 1080);
        let right = DisplayGeometry::new(1920, 0, 1920, 1080);
        let far = DisplayGeometry::new(5000, 0, 100, 100);

        assert_eq!(region.intersect(&left), Some(CaptureRegion::new(1800, 100, 120, 300)));
        assert_eq!(region.intersect(&right), Some(CaptureRegion::new(1920, 100, 280, 300)));
        assert_eq!(region.intersect(&far), None);
    }

    #[test]
    fn raw_bgra_and_rgba_convert_to_bgr() {
        let bgra = RawFrame { data: vec![1, 2, 3, 255, 4, 5, 6, 0], width: 2, height: 1, format: PixelFormat::Bgra };
        let rgba = RawFrame { data: vec![3, 2, 1, 255, 6, 5, 4, 0], width: 2, height: 1, format: PixelFormat::Rgba };

        let a = Frame::from_raw(&bgra).unwrap();
        let b = Frame::from_raw(&rgba).unwrap();
        assert_eq!(a.as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(a, b);
        assert_eq!(a.size(), (2, 1));
    }

    #[test]
    fn raw_with_wrong_length_is_rejected() {
        let raw = RawFrame { data: vec![0; 7], width: 2, height: 1, format: PixelFormat::Bgra };
        assert!(matches!(
            Frame::from_raw(&raw),
            Err(CaptureError::UnsupportedBuffer { expected: 8, actual: 7 })
        ));
    }

    #[test]
    fn put_pixel_clips_outside_frame() {
        let mut frame = Frame::new(4, 4);
        frame.put_pixel(-1, 0, [9, 9, 9]);
        frame.put_pixel(4, 4, [9, 9, 9]);
        frame.put_pixel(3, 3, [1, 2, 3]);
        assert_eq!(frame.pixel(3, 3), Some([1, 2, 3]));
        assert_eq!(frame.as_bytes().iter().filter(|b| **b != 0).count(), 3);
        assert_eq!(frame.pixel(4, 0), None);
    }

    #[test]
    fn fourcc_parsing() {
        assert_eq!("mp4v".parse::<FourCc>().unwrap(), FourCc::MP4V);
        assert!("h26".parse::<FourCc>().is_err());
        assert!("H2645".parse::<FourCc>().is_err());
        assert_eq!(FourCc::XVID.to_string(), "XVID");
    }

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(Command::from_key(&KeyCode::from_name("r")), Some(Command::ToggleRecord));
        assert_eq!(Command::from_key(&KeyCode::from_name("s")), Some(Command::Snapshot));
        assert_eq!(Command::from_key(&KeyCode::from_name("q")), Some(Command::Quit));
        assert_eq!(Command::from_key(&KeyCode::from_name("Escape")), Some(Command::Quit));
        assert_eq!(Command::from_key(&KeyCode::Close), Some(Command::Quit));
        assert_eq!(Command::from_key(&KeyCode::from_name("x")), None);
        assert_eq!(Command::from_key(&KeyCode::from_name("F5")), None);
    }

    #[test]
    fn toggle_is_an_involution() {
        for start in [RecordingState::Idle, RecordingState::Recording] {
            assert_eq!(start.toggled().toggled(), start);
            assert_ne!(start.toggled(), start);
        }
    }
}
