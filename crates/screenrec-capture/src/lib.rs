//! screenrec-capture — display enumeration and region grabbing.
//!
//! # Backend
//!
//! | Backend | Platforms | Notes |
//! |---------|-----------|-------|
//! | `xcap`  | Linux (X11 / Wayland portal), macOS, Windows | one full-monitor shot per intersecting monitor |
//!
//! # Usage
//!
//! ```rust,no_run
//! # fn example() -> Result<(), screenrec_core::CaptureError> {
//! use screenrec_capture::XcapCapturer;
//! use screenrec_core::DisplayCapture;
//! let mut capturer = XcapCapturer::open()?;
//! let displays = capturer.list_displays()?;   // [union, monitor 1, monitor 2, ...]
//! let raw = capturer.grab(&displays[1].into())?;
//! // raw.data: RGBA pixels (4 bytes/px), raw.width × raw.height
//! # Ok(())
//! # }
//! ```
//!
//! # Grab
//!
//! ```text
//! region (virtual-desktop coords)
//!   │  intersect with every monitor
//!   ▼
//! Monitor::capture_image()  ──► resize to logical size if HiDPI
//!   │                         (logical size changed since startup → DimensionMismatch)
//!   │  crop intersection
//!   ▼
//! paste at (part − region origin) into a region-sized RGBA canvas
//!   │
//!   ▼
//! RawFrame { format: Rgba }   (uncovered areas stay black)
//! ```

use image::imageops::{self, FilterType};
use image::RgbaImage;
use screenrec_core::{CaptureError, CaptureRegion, DisplayCapture, DisplayGeometry, PixelFormat, RawFrame};
use tracing::{debug, info, warn};
use xcap::Monitor;

// ── XcapCapturer ──────────────────────────────────────────────────────────────

/// Capture handle over the monitors present at startup.
///
/// Monitors are enumerated once. A monitor whose logical size changes later
/// fails the grab with [`CaptureError::DimensionMismatch`].
pub struct XcapCapturer {
    monitors: Vec<(DisplayGeometry, Monitor)>,
}

impl XcapCapturer {
    pub fn open() -> Result<Self, CaptureError> {
        let all = Monitor::all().map_err(|e| CaptureError::Enumeration(e.to_string()))?;
        if all.is_empty() {
            return Err(CaptureError::NoDisplays);
        }

        let mut monitors = Vec::with_capacity(all.len());
        for monitor in all {
            let geometry = match geometry_of(&monitor) {
                Ok(geometry) => geometry,
                Err(e) => {
                    warn!("Skipping display {}: {e}", monitor.name().unwrap_or_default());
                    continue;
                }
            };
            info!(
                "Display {}: {} ({}x{} at {},{})",
                monitors.len() + 1,
                monitor.name().unwrap_or_default(),
                geometry.width, geometry.height, geometry.left, geometry.top
            );
            monitors.push((geometry, monitor));
        }
        if monitors.is_empty() {
            return Err(CaptureError::NoDisplays);
        }
        Ok(Self { monitors })
    }
}

impl DisplayCapture for XcapCapturer {
    fn list_displays(&mut self) -> Result<Vec<DisplayGeometry>, CaptureError> {
        let physical: Vec<_> = self.monitors.iter().map(|(g, _)| *g).collect();
        display_list(&physical).ok_or(CaptureError::NoDisplays)
    }

    fn grab(&mut self, region: &CaptureRegion) -> Result<RawFrame, CaptureError> {
        let mut canvas = RgbaImage::new(region.width, region.height);
        for (geometry, monitor) in &self.monitors {
            if region.intersect(geometry).is_none() {
                continue;
            }
            let grab_err = |e: xcap::XCapError| CaptureError::GrabFailed(e.to_string());
            let current = (
                monitor.width().map_err(grab_err)?,
                monitor.height().map_err(grab_err)?,
            );
            check_logical_size(geometry, current)?;
            let shot = monitor.capture_image().map_err(grab_err)?;
            paste_monitor(&mut canvas, region, geometry, shot)?;
        }

        Ok(RawFrame {
            width:  canvas.width(),
            height: canvas.height(),
            data:   canvas.into_raw(),
            format: PixelFormat::Rgba,
        })
    }
}

impl Drop for XcapCapturer {
    fn drop(&mut self) {
        debug!("Releasing capture handle ({} monitors)", self.monitors.len());
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn geometry_of(monitor: &Monitor) -> Result<DisplayGeometry, CaptureError> {
    let e = |e: xcap::XCapError| CaptureError::Enumeration(e.to_string());
    Ok(DisplayGeometry::new(
        monitor.x().map_err(e)?,
        monitor.y().map_err(e)?,
        monitor.width().map_err(e)?,
        monitor.height().map_err(e)?,
    ))
}

/// `[union, physical...]`, or `None` when there are no displays.
fn display_list(physical: &[DisplayGeometry]) -> Option<Vec<DisplayGeometry>> {
    let union = DisplayGeometry::union_of(physical)?;
    let mut list = Vec::with_capacity(physical.len() + 1);
    list.push(union);
    list.extend_from_slice(physical);
    Some(list)
}

fn mismatch(monitor: &DisplayGeometry, (width, height): (u32, u32)) -> CaptureError {
    CaptureError::DimensionMismatch {
        expected_width:  monitor.width,
        expected_height: monitor.height,
        actual_width:    width,
        actual_height:   height,
    }
}

/// The monitor's logical size must still be the one seen at startup.
fn check_logical_size(monitor: &DisplayGeometry, current: (u32, u32)) -> Result<(), CaptureError> {
    if current != (monitor.width, monitor.height) {
        return Err(mismatch(monitor, current));
    }
    Ok(())
}

/// A shot is usable as-is, or as a HiDPI capture: same aspect ratio, scale ≥ 1.
fn is_hidpi_of(monitor: &DisplayGeometry, (width, height): (u32, u32)) -> bool {
    if width < monitor.width || height < monitor.height {
        return false;
    }
    let sx = width as f64 / monitor.width as f64;
    let sy = height as f64 / monitor.height as f64;
    (sx - sy).abs() < 0.01
}

/// Copy the part of `shot` (a full capture of `monitor`) that overlaps
/// `region` into `canvas`, which covers exactly `region`.
fn paste_monitor(
    canvas: &mut RgbaImage,
    region: &CaptureRegion,
    monitor: &DisplayGeometry,
    shot: RgbaImage,
) -> Result<(), CaptureError> {
    let Some(part) = region.intersect(monitor) else {
        return Ok(());
    };

    let shot = if shot.dimensions() == (monitor.width, monitor.height) {
        shot
    } else if is_hidpi_of(monitor, shot.dimensions()) {
        // Physical pixels; bring them to logical size.
        imageops::resize(&shot, monitor.width, monitor.height, FilterType::Triangle)
    } else {
        return Err(mismatch(monitor, shot.dimensions()));
    };

    let sx = (part.left as i64 - monitor.left as i64) as u32;
    let sy = (part.top as i64 - monitor.top as i64) as u32;
    let piece = imageops::crop_imm(&shot, sx, sy, part.width, part.height).to_image();

    let dx = part.left as i64 - region.left as i64;
    let dy = part.top as i64 - region.top as i64;
    imageops::replace(canvas, &piece, dx, dy);
    Ok(())
}
