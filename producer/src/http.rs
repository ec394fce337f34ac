use bytes::BytesMut;
use frame_capture_common::frame::FramePayload;
use reqwest::blocking::{Client, Response};
use std::io::Read;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::source::{FrameReader, FrameSource};
use crate::SourceError;

const BOUNDARY: &[u8] = b"--frame\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 16 * 1024;

/// Polls a camera's single-frame JPEG endpoint once per read.
pub struct SnapshotSource {
    url: String,
    connect_timeout: Duration,
}

impl SnapshotSource {
    pub fn new(url: &str, connect_timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            connect_timeout,
        }
    }
}

impl FrameSource for SnapshotSource {
    fn open(&mut self) -> Result<Box<dyn FrameReader>, SourceError> {
        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.connect_timeout)
            .build()
            .map_err(SourceError::HttpConnect)?;

        // Probe once so an unreachable camera fails the session up front.
        let response = client
            .get(&self.url)
            .send()
            .map_err(SourceError::HttpConnect)?;
        if !response.status().is_success() {
            return Err(SourceError::HttpStatus(response.status().as_u16()));
        }

        info!(url = self.url, "snapshot source reachable");
        Ok(Box::new(SnapshotReader {
            client,
            url: self.url.clone(),
        }))
    }

    fn name(&self) -> &str {
        "snapshot"
    }
}

struct SnapshotReader {
    client: Client,
    url: String,
}

impl FrameReader for SnapshotReader {
    fn read(&mut self) -> Option<FramePayload> {
        match self.client.get(&self.url).send() {
            Ok(resp) if resp.status().is_success() => match resp.bytes() {
                Ok(body) if !body.is_empty() => Some(FramePayload::Jpeg(body.to_vec())),
                Ok(_) => {
                    warn!("camera returned an empty snapshot");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "failed to read snapshot body");
                    None
                }
            },
            Ok(resp) => {
                warn!(status = %resp.status(), "non-success response from camera");
                None
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch camera frame");
                None
            }
        }
    }
}

/// Reads a `multipart/x-mixed-replace` MJPEG stream, one JPEG per read.
pub struct MjpegSource {
    url: String,
    connect_timeout: Duration,
}

impl MjpegSource {
    pub fn new(url: &str, connect_timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            connect_timeout,
        }
    }
}

impl FrameSource for MjpegSource {
    fn open(&mut self) -> Result<Box<dyn FrameReader>, SourceError> {
        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(None::<Duration>)
            .build()
            .map_err(SourceError::HttpConnect)?;
        let response = client
            .get(&self.url)
            .send()
            .map_err(SourceError::HttpConnect)?;

        if !response.status().is_success() {
            return Err(SourceError::HttpStatus(response.status().as_u16()));
        }

        info!(status = %response.status(), url = self.url, "connected to MJPEG stream");
        Ok(Box::new(MjpegReader {
            response,
            parser: MjpegParser::new(),
            ended: false,
        }))
    }

    fn name(&self) -> &str {
        "mjpeg"
    }
}

struct MjpegReader {
    response: Response,
    parser: MjpegParser,
    ended: bool,
}

impl FrameReader for MjpegReader {
    fn read(&mut self) -> Option<FramePayload> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(jpeg) = self.parser.next_frame() {
                return Some(FramePayload::Jpeg(jpeg));
            }
            if self.ended {
                return None;
            }
            match self.response.read(&mut chunk) {
                Ok(0) => {
                    warn!("MJPEG stream ended");
                    self.ended = true;
                }
                Ok(n) => self.parser.push(&chunk[..n]),
                Err(e) => {
                    warn!(error = %e, "MJPEG stream error");
                    self.ended = true;
                }
            }
        }
    }
}

/// Parse state for the MJPEG multipart stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Looking for the boundary marker `--frame\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental splitter for the multipart body; bytes go in, whole JPEGs come out.
pub struct MjpegParser {
    buffer: BytesMut,
    state: ParseState,
    jpeg_start: usize,
}

impl MjpegParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the next complete JPEG, or `None` if more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, BOUNDARY) {
                        let _ = self.buffer.split_to(pos + BOUNDARY.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep the tail in case the boundary spans chunks
                        if self.buffer.len() > BOUNDARY.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - BOUNDARY.len());
                        }
                        return None;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    let pos = find_subsequence(&self.buffer, HEADER_END)?;
                    let _ = self.buffer.split_to(pos + HEADER_END.len());
                    self.jpeg_start = 0;
                    self.state = ParseState::CollectingJpeg;
                }
                ParseState::CollectingJpeg => {
                    let Some(pos) = find_subsequence(&self.buffer[self.jpeg_start..], BOUNDARY)
                    else {
                        self.jpeg_start = self.buffer.len().saturating_sub(BOUNDARY.len());
                        return None;
                    };

                    let jpeg_end = self.jpeg_start + pos;
                    // Strip trailing \r\n before boundary
                    let end = if self.buffer[..jpeg_end].ends_with(b"\r\n") {
                        jpeg_end - 2
                    } else {
                        jpeg_end
                    };
                    let jpeg = self.buffer[..end].to_vec();
                    let _ = self.buffer.split_to(jpeg_end + BOUNDARY.len());
                    self.state = ParseState::SeekingHeaderEnd;

                    if jpeg.is_empty() {
                        debug!("skipping empty MJPEG part");
                        continue;
                    }
                    return Some(jpeg);
                }
            }
        }
    }
}

impl Default for MjpegParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
