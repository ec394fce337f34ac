use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use frame_capture_common::queue::SharedFrameQueue;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::SessionError;

/// Process-wide lifecycle: `Running → Stopping → Stopped`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Running,
    Stopping,
    Stopped,
}

/// Why the session left `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured session duration elapsed.
    Elapsed,
    /// Ctrl-C.
    Interrupted,
    /// The producer or consumer returned before the timer fired.
    WorkerExited,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Elapsed => "session duration elapsed",
            StopReason::Interrupted => "interrupted",
            StopReason::WorkerExited => "worker exited early",
        };
        f.write_str(s)
    }
}

/// Owns the session timer and the shutdown protocol.
///
/// Shutdown cancels the shared token first and then closes the queue, which
/// wakes every task parked on either side of it. Joins are bounded so a stuck
/// worker turns into an error instead of hanging the process.
pub struct ShutdownCoordinator {
    cancel: CancellationToken,
    queue: Arc<SharedFrameQueue>,
    phase: watch::Sender<SessionPhase>,
    join_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(queue: Arc<SharedFrameQueue>, join_timeout: Duration) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Running);
        Self {
            cancel: CancellationToken::new(),
            queue,
            phase,
            join_timeout,
        }
    }

    /// Token handed to every worker; cancelled on shutdown.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// Wait for the first stop trigger: timer, Ctrl-C (if enabled), or an early worker exit.
    pub async fn wait_for_stop(
        &self,
        duration: Duration,
        handle_interrupt: bool,
        worker_exit: &CancellationToken,
    ) -> StopReason {
        tokio::select! {
            _ = tokio::time::sleep(duration) => StopReason::Elapsed,
            _ = interrupted(handle_interrupt) => StopReason::Interrupted,
            _ = worker_exit.cancelled() => StopReason::WorkerExited,
        }
    }

    /// Move to `Stopping`: cancel the token, then close the queue and wake all waiters.
    ///
    /// Returns the number of batches still queued at that moment. Only the
    /// first call has any effect.
    pub fn begin_shutdown(&self, reason: StopReason) -> usize {
        let first = self.phase.send_if_modified(|phase| {
            if *phase == SessionPhase::Running {
                *phase = SessionPhase::Stopping;
                true
            } else {
                false
            }
        });
        if !first {
            debug!(%reason, "shutdown already in progress");
            return self.queue.len();
        }

        info!(%reason, "stopping session");
        self.cancel.cancel();
        let remaining = self.queue.close();
        info!(
            remaining,
            policy = ?self.queue.policy(),
            "queue closed, waiting for workers"
        );
        remaining
    }

    /// Join a worker, giving up after the join timeout.
    pub async fn join<T>(
        &self,
        worker: &'static str,
        handle: JoinHandle<T>,
    ) -> Result<T, SessionError> {
        match timeout(self.join_timeout, handle).await {
            Ok(Ok(out)) => {
                debug!(worker, "worker joined");
                Ok(out)
            }
            Ok(Err(e)) => {
                warn!(worker, error = %e, "worker panicked");
                Err(SessionError::Panicked {
                    worker,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    worker,
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "worker did not stop in time, abandoning it"
                );
                Err(SessionError::JoinTimeout {
                    worker,
                    limit: self.join_timeout,
                })
            }
        }
    }

    /// Move to `Stopped` once every worker has been joined or abandoned.
    pub fn finish(&self) {
        self.phase.send_replace(SessionPhase::Stopped);
        info!("session stopped");
    }
}

async fn interrupted(enabled: bool) {
    if !enabled {
        return std::future::pending().await;
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "unable to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_capture_common::config::ShutdownPolicy;

    fn coordinator(join_timeout: Duration) -> ShutdownCoordinator {
        let queue = Arc::new(SharedFrameQueue::new(4, ShutdownPolicy::Drain));
        ShutdownCoordinator::new(queue, join_timeout)
    }

    #[tokio::test]
    async fn shutdown_cancels_token_and_closes_queue_once() {
        let c = coordinator(Duration::from_secs(1));
        let token = c.token();
        assert_eq!(c.phase(), SessionPhase::Running);

        c.begin_shutdown(StopReason::Elapsed);
        assert!(token.is_cancelled());
        assert!(c.queue.is_closed());
        assert_eq!(c.phase(), SessionPhase::Stopping);

        // Second call is a no-op and the phase never goes backwards.
        c.begin_shutdown(StopReason::Interrupted);
        assert_eq!(c.phase(), SessionPhase::Stopping);

        c.finish();
        assert_eq!(c.phase(), SessionPhase::Stopped);
    }

    #[tokio::test]
    async fn shutdown_wakes_a_waiting_consumer() {
        let c = coordinator(Duration::from_secs(1));
        let queue = Arc::clone(&c.queue);
        let consumer = tokio::spawn(async move { queue.pop().await.is_none() });
        tokio::task::yield_now().await;

        c.begin_shutdown(StopReason::Elapsed);
        assert!(c.join("consumer", consumer).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_session_duration() {
        let c = coordinator(Duration::from_secs(1));
        let never = CancellationToken::new();
        let start = tokio::time::Instant::now();
        let reason = c.wait_for_stop(Duration::from_secs(10), false, &never).await;
        assert_eq!(reason, StopReason::Elapsed);
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn early_worker_exit_stops_before_timer() {
        let c = coordinator(Duration::from_secs(1));
        let exited = CancellationToken::new();
        exited.cancel();
        let reason = c.wait_for_stop(Duration::from_secs(10), false, &exited).await;
        assert_eq!(reason, StopReason::WorkerExited);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_worker_becomes_join_timeout() {
        let c = coordinator(Duration::from_millis(100));
        let stuck = tokio::spawn(std::future::pending::<()>());
        let err = c.join("producer", stuck).await.unwrap_err();
        assert!(matches!(err, SessionError::JoinTimeout { worker: "producer", .. }));
    }

    #[tokio::test]
    async fn observers_see_each_phase() {
        let c = coordinator(Duration::from_secs(1));
        let mut rx = c.subscribe();
        assert_eq!(*rx.borrow_and_update(), SessionPhase::Running);

        c.begin_shutdown(StopReason::Elapsed);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SessionPhase::Stopping);

        c.finish();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), SessionPhase::Stopped);
    }
}
