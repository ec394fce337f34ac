use std::time::Duration;

use frame_capture_common::frame::FramePayload;
use image::{Rgb, RgbImage};
use tracing::debug;

use crate::source::{FrameReader, FrameSource};
use crate::SourceError;

/// Test-pattern generator standing in for a physical camera.
///
/// Besides plain gradients it can emulate the failure modes of a real device:
/// refusing to open, returning empty reads on a repeating pattern, and slow reads.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    fail_open: bool,
    /// Repeating read pattern; `false` entries yield an empty read.
    pattern: Vec<bool>,
    read_delay: Option<Duration>,
    /// Per-read delays for the first reads; `read_delay` applies afterwards.
    initial_delays: Vec<Duration>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            fail_open: false,
            pattern: vec![true],
            read_delay: None,
            initial_delays: Vec::new(),
        }
    }

    /// A source whose `open` always fails, like an unplugged camera.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Cycle through `pattern` on every read; `false` produces an empty read.
    pub fn with_pattern(mut self, pattern: Vec<bool>) -> Self {
        if !pattern.is_empty() {
            self.pattern = pattern;
        }
        self
    }

    /// Every read yields nothing.
    pub fn always_empty(self) -> Self {
        self.with_pattern(vec![false])
    }

    /// Block for `delay` inside every read.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Block for `delays[n]` inside the n-th read, for the first `delays.len()` reads.
    pub fn with_initial_read_delays(mut self, delays: Vec<Duration>) -> Self {
        self.initial_delays = delays;
        self
    }
}

impl FrameSource for SyntheticSource {
    fn open(&mut self) -> Result<Box<dyn FrameReader>, SourceError> {
        if self.fail_open {
            return Err(SourceError::Unavailable("synthetic device refused to open".into()));
        }
        debug!(width = self.width, height = self.height, "synthetic source opened");
        Ok(Box::new(SyntheticReader {
            width: self.width,
            height: self.height,
            pattern: self.pattern.clone(),
            read_delay: self.read_delay,
            initial_delays: self.initial_delays.clone(),
            reads: 0,
        }))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

struct SyntheticReader {
    width: u32,
    height: u32,
    pattern: Vec<bool>,
    read_delay: Option<Duration>,
    initial_delays: Vec<Duration>,
    reads: u64,
}

impl FrameReader for SyntheticReader {
    fn read(&mut self) -> Option<FramePayload> {
        let n = self.reads;
        let delay = self.initial_delays.get(n as usize).copied().or(self.read_delay);
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.reads += 1;
        if !self.pattern[(n as usize) % self.pattern.len()] {
            return None;
        }
        let shift = (n % 256) as u8;
        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([(x as u8).wrapping_add(shift), y as u8, 128])
        });
        Some(FramePayload::Rgb(image))
    }
}
