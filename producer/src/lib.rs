pub mod capture;
pub mod http;
pub mod source;
pub mod synthetic;

use std::time::Duration;

pub use capture::{CaptureProducer, CaptureStats};
pub use source::{build_source, FrameReader, FrameSource};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("source url is empty for mode '{0}'")]
    MissingUrl(String),
    #[error("unknown source mode '{0}', expected 'synthetic', 'snapshot' or 'mjpeg'")]
    UnknownMode(String),
    #[error("device unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to open frame source: {0}")]
    Open(#[from] SourceError),
    #[error("frame read did not complete within {0:?}")]
    ReadTimeout(Duration),
    #[error("frame source worker panicked: {0}")]
    Worker(String),
}
