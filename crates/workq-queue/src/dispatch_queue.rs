//! Bounded in-memory channel of job-ready notifications

use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::job::JobId;

/// "Job `job_id` is ready for a worker of `worker_type`"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub job_id: JobId,
    pub worker_type: String,
    /// Retries already spent, carried so a lost `set_retry` write cannot
    /// reset the count
    pub retry_count: u32,
}

impl Notification {
    pub fn new(job_id: JobId, worker_type: impl Into<String>, retry_count: u32) -> Self {
        Self {
            job_id,
            worker_type: worker_type.into(),
            retry_count,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Dispatch queue is closed")]
pub struct QueueClosed;

#[derive(Debug)]
struct State {
    items: VecDeque<Notification>,
    levels: usize,
    closed: bool,
}

/// FIFO shared by producers and every dispatch loop.
///
/// In single-level mode `push` waits while `capacity` notifications are
/// queued. In multi-level mode a full queue gains another level of
/// `capacity` slots instead, and extra levels are released as it drains.
#[derive(Debug)]
pub struct DispatchQueue {
    state: Mutex<State>,
    space: Notify,
    level_capacity: usize,
    multi_level: bool,
}

impl DispatchQueue {
    pub fn new(capacity: usize, multi_level: bool) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity.min(1024)),
                levels: 1,
                closed: false,
            }),
            space: Notify::new(),
            level_capacity: capacity.max(1),
            multi_level,
        }
    }

    /// Enqueue, waiting for a free slot when the queue is full
    pub async fn push(&self, notification: Notification) -> Result<(), QueueClosed> {
        loop {
            // Registered before the check so a pop between unlock and await is not missed
            let space = self.space.notified();
            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(QueueClosed);
                }
                if state.items.len() < self.level_capacity * state.levels {
                    state.items.push_back(notification);
                    return Ok(());
                }
                if self.multi_level {
                    state.levels += 1;
                    debug!(
                        levels = state.levels,
                        queued = state.items.len(),
                        "Dispatch queue grew a level"
                    );
                    state.items.push_back(notification);
                    return Ok(());
                }
            }
            space.await;
        }
    }

    /// Enqueue without waiting for capacity. Used for jobs that already
    /// held a slot once, such as retries and unroutable notifications.
    pub async fn requeue(&self, notification: Notification) -> Result<(), QueueClosed> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(QueueClosed);
        }
        state.items.push_back(notification);
        Ok(())
    }

    /// Take the oldest notification, if any
    pub async fn try_pop(&self) -> Option<Notification> {
        let popped = {
            let mut state = self.state.lock().await;
            let popped = state.items.pop_front();
            if popped.is_some()
                && state.levels > 1
                && state.items.len() <= self.level_capacity * (state.levels - 1)
            {
                state.levels -= 1;
                debug!(
                    levels = state.levels,
                    queued = state.items.len(),
                    "Dispatch queue released a level"
                );
            }
            popped
        };
        if popped.is_some() {
            self.space.notify_waiters();
        }
        popped
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Total slots across the current levels
    pub async fn capacity(&self) -> usize {
        self.level_capacity * self.state.lock().await.levels
    }

    pub async fn levels(&self) -> usize {
        self.state.lock().await.levels
    }

    /// Refuse further pushes and wake producers blocked on a full queue
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.space.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn note(worker_type: &str) -> Notification {
        Notification::new(Uuid::new_v4(), worker_type, 0)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = DispatchQueue::new(10, false);
        let first = note("a");
        let second = note("b");
        queue.push(first.clone()).await.unwrap();
        queue.push(second.clone()).await.unwrap();

        assert_eq!(queue.try_pop().await, Some(first));
        assert_eq!(queue.try_pop().await, Some(second));
        assert_eq!(queue.try_pop().await, None);
    }

    #[tokio::test]
    async fn test_push_blocks_when_full() {
        let queue = Arc::new(DispatchQueue::new(2, false));
        queue.push(note("a")).await.unwrap();
        queue.push(note("a")).await.unwrap();

        let blocked = tokio::spawn({
            let queue = queue.clone();
            async move { queue.push(note("a")).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        queue.try_pop().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("push should resume once a slot frees")
            .unwrap()
            .unwrap();
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn test_multi_level_grows_and_shrinks() {
        let queue = DispatchQueue::new(2, true);
        for _ in 0..5 {
            queue.push(note("a")).await.unwrap();
        }
        assert_eq!(queue.levels().await, 3);
        assert_eq!(queue.capacity().await, 6);

        while queue.try_pop().await.is_some() {}
        assert_eq!(queue.levels().await, 1);
        assert_eq!(queue.capacity().await, 2);
    }

    #[tokio::test]
    async fn test_requeue_ignores_capacity() {
        let queue = DispatchQueue::new(1, false);
        queue.push(note("a")).await.unwrap();
        queue.requeue(note("a")).await.unwrap();
        assert_eq!(queue.len().await, 2);
        assert_eq!(queue.levels().await, 1);
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_producer() {
        let queue = Arc::new(DispatchQueue::new(1, false));
        queue.push(note("a")).await.unwrap();

        let blocked = tokio::spawn({
            let queue = queue.clone();
            async move { queue.push(note("a")).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close().await;

        assert_eq!(blocked.await.unwrap(), Err(QueueClosed));
        assert_eq!(queue.requeue(note("a")).await, Err(QueueClosed));
    }
}
