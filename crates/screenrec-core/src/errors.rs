use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Invalid monitor index {index}. Available: 0..{}", .available.saturating_sub(1))]
    InvalidMonitorIndex { index: i32, available: usize },

    #[error("Video sink could not be opened: {0}")]
    SinkUnopenable(#[source] SinkError),

    #[error("Interrupted by user")]
    InterruptedByUser,

    #[error("Configuration invalid: {reason}")]
    Config { reason: String },

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Preview error: {0}")]
    Preview(#[from] PreviewError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to enumerate displays: {0}")]
    Enumeration(String),

    #[error("No displays available")]
    NoDisplays,

    #[error("Screen grab failed: {0}")]
    GrabFailed(String),

    #[error("Captured frame is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width:  u32,
        expected_height: u32,
        actual_width:    u32,
        actual_height:   u32,
    },

    #[error("Pixel buffer has {actual} bytes, expected {expected}")]
    UnsupportedBuffer { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("No encoder available for codec {codec}")]
    UnsupportedCodec { codec: String },

    #[error("Encoder pipeline error: {0}")]
    Pipeline(String),

    #[error("Failed to write frame: {reason}")]
    Write { reason: String },

    #[error("Failed to finalize container: {reason}")]
    Finalize { reason: String },
}

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("Preview window {0:?} does not exist")]
    WindowUnavailable(String),

    #[error("Preview pipeline error: {0}")]
    Pipeline(String),

    #[error("Failed to present frame: {0}")]
    Present(String),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame buffer does not match {width}x{height}")]
    BadFrame { width: u32, height: u32 },
}
