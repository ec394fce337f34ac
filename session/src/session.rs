use std::sync::Arc;

use frame_capture_common::config::Config;
use frame_capture_common::queue::SharedFrameQueue;
use frame_capture_consumer::{FrameSink, PersistStats, PersistenceConsumer};
use frame_capture_producer::{CaptureProducer, CaptureStats, FrameSource};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::coordinator::{SessionPhase, ShutdownCoordinator, StopReason};
use crate::uplink::{NoopUplink, Uplink};
use crate::SessionError;

/// Outcome of a session that shut down without errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub reason: StopReason,
    pub capture: CaptureStats,
    pub persist: PersistStats,
    /// Batches still queued when the queue closed.
    pub queued_at_shutdown: usize,
    /// Batches dropped because the shutdown policy is `discard`.
    pub discarded: usize,
}

/// One bounded capture session: producer, consumer and uplink tasks plus
/// the coordinator that stops them.
pub struct Session {
    config: Config,
    source: Box<dyn FrameSource>,
    sink: Arc<dyn FrameSink>,
    uplink: Box<dyn Uplink>,
    queue: Arc<SharedFrameQueue>,
    coordinator: ShutdownCoordinator,
    handle_interrupt: bool,
}

impl Session {
    pub fn new(config: Config, source: Box<dyn FrameSource>, sink: Arc<dyn FrameSink>) -> Self {
        let queue = Arc::new(SharedFrameQueue::new(
            config.capture.queue_capacity,
            config.session.shutdown_policy,
        ));
        let coordinator =
            ShutdownCoordinator::new(Arc::clone(&queue), config.session.join_timeout());
        Self {
            config,
            source,
            sink,
            uplink: Box::new(NoopUplink),
            queue,
            coordinator,
            handle_interrupt: false,
        }
    }

    /// Replace the default no-op uplink.
    pub fn with_uplink(mut self, uplink: Box<dyn Uplink>) -> Self {
        self.uplink = uplink;
        self
    }

    /// Also stop the session on Ctrl-C.
    pub fn stop_on_ctrl_c(mut self) -> Self {
        self.handle_interrupt = true;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.coordinator.subscribe()
    }

    pub async fn run(self) -> Result<SessionReport, SessionError> {
        let Session {
            config,
            source,
            sink,
            uplink,
            queue,
            coordinator,
            handle_interrupt,
        } = self;
        let cancel = coordinator.token();
        let worker_exit = CancellationToken::new();

        info!(
            duration_secs = config.session.duration_secs,
            batch_size = config.capture.batch_size,
            queue_capacity = config.capture.queue_capacity,
            shutdown_policy = ?config.session.shutdown_policy,
            source = source.name(),
            uplink = uplink.name(),
            "starting capture session"
        );

        let producer = CaptureProducer::new(
            source,
            Arc::clone(&queue),
            cancel.clone(),
            &config.capture,
        );
        let producer_exit = worker_exit.clone().drop_guard();
        let producer_handle = tokio::spawn(async move {
            let _exit = producer_exit;
            producer.run().await
        });

        let consumer = PersistenceConsumer::new(Arc::clone(&queue), sink, &config.storage);
        let consumer_exit = worker_exit.clone().drop_guard();
        let consumer_handle = tokio::spawn(async move {
            let _exit = consumer_exit;
            consumer.run().await
        });

        let uplink_handle = tokio::spawn(uplink.run(cancel.clone()));

        let reason = coordinator
            .wait_for_stop(config.session.duration(), handle_interrupt, &worker_exit)
            .await;
        let queued_at_shutdown = coordinator.begin_shutdown(reason);

        let capture = coordinator.join("producer", producer_handle).await;
        let persist = coordinator.join("consumer", consumer_handle).await;
        let uplink = coordinator.join("uplink", uplink_handle).await;
        coordinator.finish();

        let capture = capture.and_then(|r| r.map_err(SessionError::from));
        let persist = persist.and_then(|r| r.map_err(SessionError::from));
        let (capture, persist) = match (capture, persist, uplink) {
            (Ok(c), Ok(p), Ok(())) => (c, p),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                error!(error = %e, %reason, "capture session failed");
                return Err(e);
            }
        };

        let report = SessionReport {
            reason,
            capture,
            persist,
            queued_at_shutdown,
            discarded: queue.discarded(),
        };
        info!(
            %reason,
            captured_batches = report.capture.batches,
            persisted_batches = report.persist.batches,
            persisted_frames = report.persist.frames,
            queued_at_shutdown,
            discarded = report.discarded,
            "capture session finished"
        );
        Ok(report)
    }
}
