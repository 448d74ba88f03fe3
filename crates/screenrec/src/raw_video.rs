//! Packing BGR frames into GStreamer buffers.
//!
//! GStreamer's packed 24-bit formats pad every row to a multiple of four
//! bytes, while [`Frame`] rows are tightly packed.

use gstreamer as gst;
use gstreamer_video::{VideoCapsBuilder, VideoFormat};
use screenrec_core::Frame;

/// Row stride GStreamer expects for `video/x-raw,format=BGR`.
pub fn bgr_stride(width: u32) -> usize {
    (width as usize * Frame::CHANNELS + 3) & !3
}

/// Copy `frame` into a row-padded byte vector.
pub fn pack_bgr(frame: &Frame) -> Vec<u8> {
    let row = frame.width() as usize * Frame::CHANNELS;
    let stride = bgr_stride(frame.width());
    if row == stride {
        return frame.as_bytes().to_vec();
    }
    let mut out = vec![0u8; stride * frame.height() as usize];
    for (dst, src) in out.chunks_exact_mut(stride).zip(frame.as_bytes().chunks_exact(row)) {
        dst[..row].copy_from_slice(src);
    }
    out
}

pub fn bgr_buffer(frame: &Frame) -> gst::Buffer {
    gst::Buffer::from_mut_slice(pack_bgr(frame))
}

/// `video/x-raw,format=BGR` caps; `framerate` of `None` means variable (0/1).
pub fn bgr_caps(width: u32, height: u32, framerate: Option<(i32, i32)>) -> gst::Caps {
    let (num, den) = framerate.unwrap_or((0, 1));
    VideoCapsBuilder::new()
        .format(VideoFormat::Bgr)
        .width(width as i32)
        .height(height as i32)
        .framerate(gst::Fraction::new(num, den))
        .build()
}

/// Rational approximation of a frame rate, millisecond-precise.
pub fn fps_fraction(fps: f64) -> (i32, i32) {
    if fps.fract() == 0.0 {
        return (fps as i32, 1);
    }
    let num = (fps * 1000.0).round() as i32;
    let den = 1000;
    let g = gcd(num, den);
    (num / g, den / g)
}

/// Presentation time of frame `index` at `num/den` frames per second.
pub fn frame_pts(index: u64, (num, den): (i32, i32)) -> gst::ClockTime {
    let ns = index as u128 * 1_000_000_000 * den as u128 / num.max(1) as u128;
    gst::ClockTime::from_nseconds(ns as u64)
}

fn gcd(mut a: i32, mut b: i32) -> i32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs().max(1)
}
