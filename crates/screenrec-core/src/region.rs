//! Capture-region resolution, run once at startup.

use crate::errors::RecorderError;
use crate::traits::DisplayCapture;
use crate::types::{CaptureRegion, DisplayGeometry};

/// Like [`resolve`], but asks `capture` for the displays only when no
/// explicit region was given.
pub fn resolve_with(
    explicit: Option<CaptureRegion>,
    monitor_index: i32,
    capture: &mut dyn DisplayCapture,
) -> Result<CaptureRegion, RecorderError> {
    if let Some(region) = explicit {
        return Ok(region);
    }
    let displays = capture.list_displays()?;
    resolve(None, monitor_index, &displays)
}

/// Resolve the rectangle to capture for the whole run.
///
/// An explicit region is trusted as-is. Otherwise `monitor_index` selects an
/// entry of `displays`, where index 0 is the union of all physical displays
/// and indices ≥ 1 are the physical displays.
pub fn resolve(
    explicit: Option<CaptureRegion>,
    monitor_index: i32,
    displays: &[DisplayGeometry],
) -> Result<CaptureRegion, RecorderError> {
    if let Some(region) = explicit {
        return Ok(region);
    }

    usize::try_from(monitor_index)
        .ok()
        .and_then(|i| displays.get(i))
        .map(|d| CaptureRegion::from(*d))
        .ok_or(RecorderError::InvalidMonitorIndex {
            index:     monitor_index,
            available: displays.len(),
        })
}
