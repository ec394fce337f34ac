use std::sync::Arc;
use std::time::Duration;

use frame_capture_common::config::{PersistFailurePolicy, StorageConfig};
use frame_capture_common::frame::FrameBatch;
use frame_capture_common::queue::SharedFrameQueue;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::keys::SessionLayout;
use crate::sink::{FrameSink, SinkError};

/// Counters reported when the consumer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistStats {
    /// Batches fully written.
    pub batches: u64,
    /// Frames written across those batches.
    pub frames: u64,
    /// Batches abandoned under [`PersistFailurePolicy::DropBatch`].
    pub dropped_batches: u64,
}

/// Drains the shared queue and writes every batch through a [`FrameSink`].
///
/// The consumer has no stop flag of its own: it exits when `pop` reports the
/// queue closed and empty.
pub struct PersistenceConsumer {
    queue: Arc<SharedFrameQueue>,
    sink: Arc<dyn FrameSink>,
    layout: Arc<SessionLayout>,
    write_timeout: Duration,
    on_error: PersistFailurePolicy,
}

impl PersistenceConsumer {
    pub fn new(
        queue: Arc<SharedFrameQueue>,
        sink: Arc<dyn FrameSink>,
        config: &StorageConfig,
    ) -> Self {
        Self {
            queue,
            sink,
            layout: Arc::new(SessionLayout::from_config(config)),
            write_timeout: config.write_timeout(),
            on_error: config.on_error,
        }
    }

    pub async fn run(self) -> Result<PersistStats, PersistError> {
        info!(
            write_timeout_ms = self.write_timeout.as_millis() as u64,
            on_error = ?self.on_error,
            "persistence consumer started"
        );

        let mut stats = PersistStats::default();
        while let Some(batch) = self.queue.pop().await {
            let batch_seq = batch.seq;
            match self.persist(batch).await {
                Ok(written) => {
                    stats.batches += 1;
                    stats.frames += written as u64;
                }
                Err(e) => match self.on_error {
                    PersistFailurePolicy::Abort => {
                        error!(error = %e, batch = batch_seq, "failed to persist batch, stopping consumer");
                        return Err(e);
                    }
                    PersistFailurePolicy::DropBatch => {
                        error!(error = %e, batch = batch_seq, "failed to persist batch, dropping it");
                        stats.dropped_batches += 1;
                    }
                },
            }
        }

        info!(
            batches = stats.batches,
            frames = stats.frames,
            dropped_batches = stats.dropped_batches,
            "persistence consumer stopped"
        );
        Ok(stats)
    }

    /// Write one batch on the blocking pool, bounded by the write timeout.
    /// The batch is dropped once its frames are on disk.
    async fn persist(&self, batch: FrameBatch) -> Result<usize, PersistError> {
        let batch_seq = batch.seq;
        let sink = Arc::clone(&self.sink);
        let layout = Arc::clone(&self.layout);
        let task = tokio::task::spawn_blocking(move || write_batch(sink.as_ref(), &layout, batch));

        match timeout(self.write_timeout, task).await {
            Ok(Ok(Ok(written))) => Ok(written),
            Ok(Ok(Err(e))) => Err(PersistError::Sink {
                batch: batch_seq,
                source: e,
            }),
            Ok(Err(e)) => Err(PersistError::Worker(e.to_string())),
            Err(_) => Err(PersistError::Timeout {
                batch: batch_seq,
                limit: self.write_timeout,
            }),
        }
    }
}

fn write_batch(
    sink: &dyn FrameSink,
    layout: &SessionLayout,
    batch: FrameBatch,
) -> Result<usize, SinkError> {
    if batch.is_empty() {
        debug!(batch = batch.seq, "empty batch, nothing to write");
        return Ok(0);
    }

    let dir = layout.batch_dir(&batch.captured_at);
    sink.ensure_dir(&dir)?;

    for (index, frame) in batch.frames.iter().enumerate() {
        let path = SessionLayout::frame_path(&dir, index);
        sink.write_frame(&path, frame)?;
        info!(path = %path.display(), batch = batch.seq, "saved frame");
    }
    Ok(batch.len())
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to persist batch {batch}: {source}")]
    Sink {
        batch: u64,
        #[source]
        source: SinkError,
    },
    #[error("writing batch {batch} did not complete within {limit:?}")]
    Timeout { batch: u64, limit: Duration },
    #[error("persistence worker panicked: {0}")]
    Worker(String),
}
