use std::sync::Arc;
use std::time::Duration;

use frame_capture_common::config::CaptureConfig;
use frame_capture_common::frame::{Frame, FrameBatch, FramePayload, SessionTimestamp};
use frame_capture_common::queue::{QueueError, SharedFrameQueue};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::source::{FrameReader, FrameSource};
use crate::CaptureError;

/// Counters reported when the producer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Batches accepted by the queue.
    pub batches: u64,
    /// Frames inside those batches.
    pub frames: u64,
    /// Reads that produced nothing and were skipped.
    pub empty_reads: u64,
}

/// Pulls fixed-size batches from a [`FrameSource`] and pushes them onto the shared queue.
pub struct CaptureProducer {
    source: Box<dyn FrameSource>,
    queue: Arc<SharedFrameQueue>,
    cancel: CancellationToken,
    batch_size: usize,
    pacing_interval: Duration,
    read_timeout: Duration,
}

impl CaptureProducer {
    pub fn new(
        source: Box<dyn FrameSource>,
        queue: Arc<SharedFrameQueue>,
        cancel: CancellationToken,
        config: &CaptureConfig,
    ) -> Self {
        Self {
            source,
            queue,
            cancel,
            batch_size: config.batch_size.max(1),
            pacing_interval: config.pacing_interval().max(Duration::from_millis(1)),
            read_timeout: config.read_timeout(),
        }
    }

    /// Run capture cycles until cancelled or the queue closes.
    ///
    /// Fails if the source cannot be opened or a single read outlives the read
    /// timeout. Cancellation is observed between reads, while paced, and while
    /// waiting for queue space; an in-flight read is always allowed to finish.
    ///
    /// The pause runs after each cycle, and every batch is stamped with a
    /// second strictly later than the one before it.
    pub async fn run(self) -> Result<CaptureStats, CaptureError> {
        let CaptureProducer {
            mut source,
            queue,
            cancel,
            batch_size,
            pacing_interval,
            read_timeout,
        } = self;

        let source_name = source.name().to_string();
        let opened = tokio::select! {
            res = tokio::task::spawn_blocking(move || source.open()) => res,
            _ = cancel.cancelled() => {
                info!(source = source_name, "cancelled before the source opened");
                return Ok(CaptureStats::default());
            }
        };
        let mut reader = opened.map_err(|e| CaptureError::Worker(e.to_string()))??;

        info!(
            source = source_name,
            batch_size,
            pacing_ms = pacing_interval.as_millis() as u64,
            "capture producer started"
        );

        let mut stats = CaptureStats::default();
        let mut batch_seq: u64 = 0;
        let mut frame_seq: u64 = 0;
        let mut last_stamp: Option<SessionTimestamp> = None;

        'session: loop {
            let mut frames = Vec::with_capacity(batch_size);
            for slot in 0..batch_size {
                if cancel.is_cancelled() {
                    debug!(batch = batch_seq, slot, "cancelled mid-cycle, dropping partial batch");
                    break 'session;
                }

                let (returned, payload) = read_bounded(reader, read_timeout).await?;
                reader = returned;
                match payload {
                    Some(payload) => {
                        frames.push(Frame {
                            payload,
                            seq: frame_seq,
                        });
                        frame_seq += 1;
                    }
                    None => {
                        stats.empty_reads += 1;
                        warn!(batch = batch_seq, slot, "captured empty frame, skipping slot");
                    }
                }
            }

            let now = SessionTimestamp::now();
            let captured_at = match last_stamp {
                Some(prev) => now.strictly_after(prev),
                None => now,
            };
            if captured_at != now {
                debug!(batch = batch_seq, %now, %captured_at, "second already used, advancing batch timestamp");
            }
            last_stamp = Some(captured_at);

            let batch = FrameBatch::new(batch_seq, captured_at, frames);
            let frame_count = batch.len() as u64;

            let pushed = tokio::select! {
                biased;
                res = queue.push(batch) => res,
                _ = cancel.cancelled() => {
                    debug!(batch = batch_seq, "cancelled while waiting for queue space, batch not enqueued");
                    break;
                }
            };
            match pushed {
                Ok(()) => {
                    stats.batches += 1;
                    stats.frames += frame_count;
                    debug!(
                        batch = batch_seq,
                        frames = frame_count,
                        %captured_at,
                        queued = queue.len(),
                        "batch enqueued"
                    );
                }
                Err(QueueError::Closed(rejected)) => {
                    debug!(batch = rejected.seq, "queue closed, in-flight batch not enqueued");
                    break;
                }
            }
            batch_seq += 1;

            tokio::select! {
                _ = tokio::time::sleep(pacing_interval) => {}
                _ = cancel.cancelled() => break,
            }
        }

        // HTTP readers own a blocking client; release it off the async workers.
        let _ = tokio::task::spawn_blocking(move || drop(reader)).await;

        info!(
            batches = stats.batches,
            frames = stats.frames,
            empty_reads = stats.empty_reads,
            "capture producer stopped"
        );
        Ok(stats)
    }
}

/// Run one blocking read on the blocking pool, bounded by `limit`.
///
/// The reader is moved into the blocking task and handed back with the result.
/// On timeout the stuck read (and its reader) is abandoned.
async fn read_bounded(
    mut reader: Box<dyn FrameReader>,
    limit: Duration,
) -> Result<(Box<dyn FrameReader>, Option<FramePayload>), CaptureError> {
    let task = tokio::task::spawn_blocking(move || {
        let payload = reader.read();
        (reader, payload)
    });
    match timeout(limit, task).await {
        Ok(Ok(pair)) => Ok(pair),
        Ok(Err(e)) => Err(CaptureError::Worker(e.to_string())),
        Err(_) => {
            warn!(timeout_ms = limit.as_millis() as u64, "frame read timed out");
            Err(CaptureError::ReadTimeout(limit))
        }
    }
}
