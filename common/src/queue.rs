use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::ShutdownPolicy;
use crate::frame::FrameBatch;

/// Bounded FIFO hand-off between the capture producer and the persistence consumer.
///
/// The lock is never held across an await. Waiters register with the matching
/// `Notify` *before* inspecting the state, so a wake-up that races with the
/// check is never lost.
pub struct SharedFrameQueue {
    state: Mutex<QueueState>,
    /// Signalled when a batch is pushed or the queue closes.
    not_empty: Notify,
    /// Signalled when a batch is popped or the queue closes.
    not_full: Notify,
    capacity: usize,
    policy: ShutdownPolicy,
}

struct QueueState {
    batches: VecDeque<FrameBatch>,
    closed: bool,
    discarded: usize,
}

impl SharedFrameQueue {
    pub fn new(capacity: usize, policy: ShutdownPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                batches: VecDeque::with_capacity(capacity),
                closed: false,
                discarded: 0,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            capacity,
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panicking holder cannot leave the deque half-updated, so keep going.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a batch to the tail and wake one consumer.
    ///
    /// Waits while the queue is full. Once the queue is closed the batch is
    /// handed back inside [`QueueError::Closed`].
    pub async fn push(&self, batch: FrameBatch) -> Result<(), QueueError> {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(QueueError::Closed(batch));
                }
                if state.batches.len() < self.capacity {
                    state.batches.push_back(batch);
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            debug!(capacity = self.capacity, "queue full, waiting for space");
            notified.await;
        }
    }

    /// Remove the head batch, waiting until one is available.
    ///
    /// Returns `None` once the queue is closed and has nothing left to hand
    /// out. Under [`ShutdownPolicy::Discard`] that is immediately on close.
    pub async fn pop(&self) -> Option<FrameBatch> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(batch) = state.batches.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Some(batch);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Close the queue and wake every waiter on both sides.
    ///
    /// Returns how many batches were still queued. With
    /// [`ShutdownPolicy::Discard`] those batches are dropped here.
    pub fn close(&self) -> usize {
        let remaining = {
            let mut state = self.lock();
            if state.closed {
                return state.batches.len();
            }
            state.closed = true;
            let remaining = state.batches.len();
            if self.policy == ShutdownPolicy::Discard && remaining > 0 {
                state.discarded += remaining;
                state.batches.clear();
                warn!(discarded = remaining, "queue closed, discarding pending batches");
            }
            remaining
        };

        debug!(remaining, policy = ?self.policy, "queue closed");
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
        remaining
    }

    pub fn len(&self) -> usize {
        self.lock().batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().batches.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Batches dropped on close under [`ShutdownPolicy::Discard`].
    pub fn discarded(&self) -> usize {
        self.lock().discarded
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> ShutdownPolicy {
        self.policy
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue closed, batch {} not accepted", .0.seq)]
    Closed(FrameBatch),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SessionTimestamp;
    use std::sync::Arc;
    use std::time::Duration;

    fn batch(seq: u64) -> FrameBatch {
        FrameBatch::new(seq, SessionTimestamp::now(), Vec::new())
    }

    #[tokio::test]
    async fn delivers_in_push_order() {
        let queue = SharedFrameQueue::new(8, ShutdownPolicy::Drain);
        for seq in 0..5 {
            queue.push(batch(seq)).await.unwrap();
        }
        for expected in 0..5 {
            assert_eq!(queue.pop().await.unwrap().seq, expected);
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let queue = Arc::new(SharedFrameQueue::new(4, ShutdownPolicy::Drain));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await.map(|b| b.seq) })
        };
        tokio::task::yield_now().await;
        queue.push(batch(7)).await.unwrap();
        assert_eq!(waiter.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn close_releases_waiting_consumer_with_none() {
        let queue = Arc::new(SharedFrameQueue::new(4, ShutdownPolicy::Drain));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        assert_eq!(queue.close(), 0);
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn push_waits_while_full() {
        let queue = Arc::new(SharedFrameQueue::new(1, ShutdownPolicy::Drain));
        queue.push(batch(0)).await.unwrap();

        let pusher = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(batch(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pusher.is_finished(), "push must block on a full queue");
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.pop().await.unwrap().seq, 0);
        pusher.await.unwrap().unwrap();
        assert_eq!(queue.pop().await.unwrap().seq, 1);
    }

    #[tokio::test]
    async fn close_hands_blocked_batch_back_to_pusher() {
        let queue = Arc::new(SharedFrameQueue::new(1, ShutdownPolicy::Drain));
        queue.push(batch(0)).await.unwrap();
        let pusher = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(batch(1)).await })
        };
        tokio::task::yield_now().await;
        queue.close();
        match pusher.await.unwrap() {
            Err(QueueError::Closed(b)) => assert_eq!(b.seq, 1),
            Ok(()) => panic!("push into a closed queue must fail"),
        }
    }

    #[tokio::test]
    async fn drain_policy_hands_out_remaining_after_close() {
        let queue = SharedFrameQueue::new(4, ShutdownPolicy::Drain);
        queue.push(batch(0)).await.unwrap();
        queue.push(batch(1)).await.unwrap();
        assert_eq!(queue.close(), 2);
        assert_eq!(queue.pop().await.unwrap().seq, 0);
        assert_eq!(queue.pop().await.unwrap().seq, 1);
        assert!(queue.pop().await.is_none());
        assert_eq!(queue.discarded(), 0);
    }

    #[tokio::test]
    async fn discard_policy_drops_remaining_on_close() {
        let queue = SharedFrameQueue::new(4, ShutdownPolicy::Discard);
        queue.push(batch(0)).await.unwrap();
        queue.push(batch(1)).await.unwrap();
        assert_eq!(queue.close(), 2);
        assert!(queue.pop().await.is_none());
        assert_eq!(queue.discarded(), 2);
        assert!(queue.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pushers_never_lose_or_duplicate() {
        const PUSHERS: u64 = 4;
        const PER_PUSHER: u64 = 250;

        let queue = Arc::new(SharedFrameQueue::new(8, ShutdownPolicy::Drain));
        let mut handles = Vec::new();
        for p in 0..PUSHERS {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                for i in 0..PER_PUSHER {
                    queue.push(batch(p * 10_000 + i)).await.unwrap();
                }
            }));
        }

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(b) = queue.pop().await {
                    seen.push(b.seq);
                }
                seen
            })
        };

        for h in handles {
            h.await.unwrap();
        }
        queue.close();
        let seen = consumer.await.unwrap();

        assert_eq!(seen.len() as u64, PUSHERS * PER_PUSHER);
        for p in 0..PUSHERS {
            let from_pusher: Vec<u64> = seen
                .iter()
                .copied()
                .filter(|seq| seq / 10_000 == p)
                .map(|seq| seq % 10_000)
                .collect();
            let expected: Vec<u64> = (0..PER_PUSHER).collect();
            assert_eq!(from_pusher, expected, "pusher {p} order broken");
        }
    }
}
