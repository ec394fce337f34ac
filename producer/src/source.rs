use std::time::Duration;

use frame_capture_common::config::SourceConfig;
use frame_capture_common::frame::FramePayload;

use crate::http::{MjpegSource, SnapshotSource};
use crate::synthetic::SyntheticSource;
use crate::SourceError;

/// A capture device that can be opened once per session.
///
/// `open` may block (device probing, HTTP handshake); the producer always
/// calls it from the blocking pool.
pub trait FrameSource: Send + 'static {
    fn open(&mut self) -> Result<Box<dyn FrameReader>, SourceError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// An opened device handle.
pub trait FrameReader: Send + 'static {
    /// Blocking read of a single frame. `None` means the read produced nothing
    /// usable; the caller skips the slot and moves on.
    fn read(&mut self) -> Option<FramePayload>;
}

/// Build the configured source. Mode strings follow `source.mode` in the config file.
pub fn build_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>, SourceError> {
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
    match config.mode.as_str() {
        "synthetic" => Ok(Box::new(SyntheticSource::new(config.width, config.height))),
        "snapshot" => {
            if config.url.is_empty() {
                return Err(SourceError::MissingUrl(config.mode.clone()));
            }
            Ok(Box::new(SnapshotSource::new(&config.url, connect_timeout)))
        }
        "mjpeg" => {
            if config.url.is_empty() {
                return Err(SourceError::MissingUrl(config.mode.clone()));
            }
            Ok(Box::new(MjpegSource::new(&config.url, connect_timeout)))
        }
        other => Err(SourceError::UnknownMode(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: &str, url: &str) -> SourceConfig {
        SourceConfig {
            mode: mode.into(),
            url: url.into(),
            ..SourceConfig::default()
        }
    }

    #[test]
    fn builds_each_known_mode() {
        assert_eq!(build_source(&config("synthetic", "")).unwrap().name(), "synthetic");
        let snap = build_source(&config("snapshot", "http://127.0.0.1:8080/frame")).unwrap();
        assert_eq!(snap.name(), "snapshot");
        let mjpeg = build_source(&config("mjpeg", "http://127.0.0.1:8080/stream")).unwrap();
        assert_eq!(mjpeg.name(), "mjpeg");
    }

    #[test]
    fn http_modes_require_url() {
        assert!(matches!(
            build_source(&config("mjpeg", "")),
            Err(SourceError::MissingUrl(_))
        ));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(matches!(
            build_source(&config("v4l2", "")),
            Err(SourceError::UnknownMode(m)) if m == "v4l2"
        ));
    }
}
