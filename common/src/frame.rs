use chrono::{Local, NaiveDateTime, Timelike};
use image::RgbImage;
use std::fmt;

/// The payload carried inside a frame: either an encoded JPEG or raw RGB pixels.
#[derive(Debug, Clone)]
pub enum FramePayload {
    /// Already-encoded JPEG (HTTP snapshot / MJPEG sources). Written verbatim.
    Jpeg(Vec<u8>),
    /// Raw 8-bit RGB image. Encoded to JPEG by the sink.
    Rgb(RgbImage),
}

/// One captured image plus its per-session sequence number.
#[derive(Debug, Clone)]
pub struct Frame {
    pub payload: FramePayload,
    pub seq: u64,
}

impl Frame {
    pub fn jpeg(data: Vec<u8>, seq: u64) -> Self {
        Self {
            payload: FramePayload::Jpeg(data),
            seq,
        }
    }

    pub fn rgb(image: RgbImage, seq: u64) -> Self {
        Self {
            payload: FramePayload::Rgb(image),
            seq,
        }
    }

    /// Returns the JPEG data if this frame is already encoded.
    pub fn jpeg_data(&self) -> Option<&[u8]> {
        match &self.payload {
            FramePayload::Jpeg(data) => Some(data),
            FramePayload::Rgb(_) => None,
        }
    }

    /// Size of the payload in bytes (encoded bytes or raw pixel buffer).
    pub fn payload_size(&self) -> usize {
        match &self.payload {
            FramePayload::Jpeg(data) => data.len(),
            FramePayload::Rgb(img) => img.as_raw().len(),
        }
    }
}

/// Wall-clock identifier of a capture cycle, second resolution, local time.
///
/// Computed once when the batch is captured and carried with it, so the
/// directory a batch lands in always matches the moment it was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionTimestamp(NaiveDateTime);

impl SessionTimestamp {
    pub fn now() -> Self {
        Self::new(Local::now().naive_local())
    }

    /// Sub-second precision is dropped.
    pub fn new(at: NaiveDateTime) -> Self {
        Self(at.with_nanosecond(0).unwrap_or(at))
    }

    /// `YYYY-MM-DD`
    pub fn date_component(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// `HH-MM-SS`
    pub fn time_component(&self) -> String {
        self.0.format("%H-%M-%S").to_string()
    }

    /// `self` if it is later than `prev`, otherwise the second right after `prev`.
    ///
    /// Consecutive batches of a session must never share a directory.
    pub fn strictly_after(self, prev: SessionTimestamp) -> Self {
        if self > prev {
            self
        } else {
            Self(prev.0 + chrono::Duration::seconds(1))
        }
    }

    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for SessionTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d/%H-%M-%S"))
    }
}

/// Frames captured within one producer cycle, in capture order.
///
/// May hold fewer than the configured batch size (or none at all) when the
/// source returned empty reads; such batches are still queued and persisted.
#[derive(Debug)]
pub struct FrameBatch {
    pub seq: u64,
    pub captured_at: SessionTimestamp,
    pub frames: Vec<Frame>,
}

impl FrameBatch {
    pub fn new(seq: u64, captured_at: SessionTimestamp, frames: Vec<Frame>) -> Self {
        Self {
            seq,
            captured_at,
            frames,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
