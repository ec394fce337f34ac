use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use frame_capture_common::frame::{Frame, FramePayload};
use image::codecs::jpeg::JpegEncoder;
use tracing::debug;

/// Destination for persisted frames.
///
/// Calls are blocking; the consumer drives them from the blocking pool.
pub trait FrameSink: Send + Sync + 'static {
    fn ensure_dir(&self, dir: &Path) -> Result<(), SinkError>;

    fn write_frame(&self, path: &Path, frame: &Frame) -> Result<(), SinkError>;
}

/// Writes JPEG files to the local filesystem.
///
/// Never replaces an existing file: a second write to the same path fails
/// with [`SinkError::Exists`].
#[derive(Debug, Clone)]
pub struct DiskSink {
    jpeg_quality: u8,
}

impl DiskSink {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }
}

impl FrameSink for DiskSink {
    fn ensure_dir(&self, dir: &Path) -> Result<(), SinkError> {
        std::fs::create_dir_all(dir).map_err(|source| SinkError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })
    }

    fn write_frame(&self, path: &Path, frame: &Frame) -> Result<(), SinkError> {
        match &frame.payload {
            FramePayload::Jpeg(data) => {
                create_new(path)?
                    .write_all(data)
                    .map_err(|e| write_error(path, e))?;
            }
            FramePayload::Rgb(image) => {
                let mut writer = BufWriter::new(create_new(path)?);
                JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality)
                    .encode_image(image)
                    .map_err(|source| SinkError::Encode {
                        path: path.to_path_buf(),
                        source,
                    })?;
                writer.flush().map_err(|e| write_error(path, e))?;
            }
        }
        debug!(path = %path.display(), seq = frame.seq, "frame written");
        Ok(())
    }
}

fn create_new(path: &Path) -> Result<File, SinkError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => SinkError::Exists {
                path: path.to_path_buf(),
            },
            _ => write_error(path, e),
        })
}

fn write_error(path: &Path, source: io::Error) -> SinkError {
    SinkError::Write {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("refusing to overwrite existing frame {}", path.display())]
    Exists { path: PathBuf },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn jpeg_payload_is_written_verbatim() {
        let dir = TempDir::new().unwrap();
        let sink = DiskSink::new(80);
        let path = dir.path().join("frame0.jpg");
        let bytes = vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9];

        sink.write_frame(&path, &Frame::jpeg(bytes.clone(), 0)).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn rgb_payload_is_encoded_as_jpeg() {
        let dir = TempDir::new().unwrap();
        let sink = DiskSink::new(80);
        let path = dir.path().join("frame0.jpg");
        let image = RgbImage::from_pixel(16, 8, Rgb([200, 10, 10]));

        sink.write_frame(&path, &Frame::rgb(image, 0)).unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn ensure_dir_creates_nested_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");
        DiskSink::new(80).ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn ensure_dir_under_a_file_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let err = DiskSink::new(80).ensure_dir(&blocker.join("sub")).unwrap_err();
        assert!(matches!(err, SinkError::CreateDir { .. }));
        assert!(err.to_string().starts_with("failed to create directory "));
    }

    #[test]
    fn existing_frame_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let sink = DiskSink::new(80);
        let path = dir.path().join("frame0.jpg");
        let first = vec![0xFF, 0xD8, 0xAA, 0xFF, 0xD9];

        sink.write_frame(&path, &Frame::jpeg(first.clone(), 0)).unwrap();
        let err = sink
            .write_frame(&path, &Frame::jpeg(vec![0xFF, 0xD8, 0xBB, 0xFF, 0xD9], 1))
            .unwrap_err();
        assert!(matches!(err, SinkError::Exists { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), first);

        let raw = Frame::rgb(RgbImage::new(2, 2), 2);
        assert!(matches!(sink.write_frame(&path, &raw), Err(SinkError::Exists { .. })));
    }
}
