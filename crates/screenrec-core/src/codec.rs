//! Codec selection for the output file.
//!
//! The mapping is total: every path yields a codec, so opening the sink can
//! never fail on the extension lookup alone.
//!
//! | Extension        | FourCC |
//! |------------------|--------|
//! | `.mp4`, `.m4v`   | `mp4v` |
//! | `.avi`           | `XVID` |
//! | anything else    | `XVID` (default) |

use std::path::Path;

use crate::types::FourCc;

/// Codec used when the extension is not recognised.
pub const DEFAULT_CODEC: FourCc = FourCc::XVID;

/// Pick the codec for `path`, honouring an explicit override.
pub fn select_codec(path: &Path, override_codec: Option<FourCc>) -> FourCc {
    if let Some(codec) = override_codec {
        return codec;
    }
    match extension_lowercase(path).as_deref() {
        Some("mp4" | "m4v") => FourCc::MP4V,
        Some("avi") => FourCc::XVID,
        _ => DEFAULT_CODEC,
    }
}

/// Lowercased extension without the leading dot.
pub fn extension_lowercase(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
