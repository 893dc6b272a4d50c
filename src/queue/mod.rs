// ================================================================================================
// OPERATION QUEUE - BOUNDED, BACKPRESSURE-AWARE ASYNC TASK RUNNER
// ================================================================================================
//
// Throttles concurrent operations against a downstream dependency:
// - `max_concurrent` bounds operations running at the same time
// - `max_queue_size` bounds operations waiting plus running; beyond it new work is rejected
// - `timeout` bounds the execution time of each admitted operation
//
// Admitted tasks start in FIFO order (tokio's semaphore is fair). Completion order is not
// guaranteed. Only aggregate counters are kept, never task history.
//
// ================================================================================================

use std::{
    fmt,
    future::Future,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{sync::Semaphore, time::Instant};
use tracing::{debug, warn};

/// Configuration for one operation queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationQueueConfig {
    pub max_concurrent: usize,
    pub max_queue_size: usize,
    pub timeout: Duration,
}

impl Default for OperationQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            max_queue_size: 100,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Errors produced by [`OperationQueue::enqueue`]
#[derive(Debug, thiserror::Error)]
pub enum QueueError<E> {
    #[error("operation queue '{queue}' is full ({capacity} operations queued or running)")]
    CapacityExceeded { queue: String, capacity: usize },

    #[error("operation '{key}' in queue '{queue}' timed out after {timeout_ms}ms")]
    Timeout {
        queue: String,
        key: String,
        timeout_ms: u64,
    },

    #[error("operation queue '{queue}' is shut down")]
    Closed { queue: String },

    #[error("{0}")]
    Operation(E),
}

impl<E> QueueError<E> {
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, QueueError::CapacityExceeded { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, QueueError::Timeout { .. })
    }
}

/// Live counters for one queue
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub name: String,
    pub queued: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub rejected: u64,
    pub max_concurrent: usize,
    pub max_queue_size: usize,
}

/// One admitted unit of work, alive from admission until it settles
#[derive(Debug)]
pub struct QueueTask {
    pub key: String,
    pub enqueued_at: Instant,
    pub timeout: Duration,
}

impl fmt::Display for QueueTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (timeout {}ms)", self.key, self.timeout.as_millis())
    }
}

pub struct OperationQueue {
    name: String,
    config: OperationQueueConfig,
    permits: Semaphore,
    pending: AtomicUsize, // queued + running
    running: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    rejected: AtomicU64,
}

impl OperationQueue {
    pub fn new(name: impl Into<String>, config: OperationQueueConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            name: name.into(),
            permits: Semaphore::new(max_concurrent),
            config: OperationQueueConfig {
                max_concurrent,
                ..config
            },
            pending: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &OperationQueueConfig {
        &self.config
    }

    /// Submit an operation. Fails immediately with `CapacityExceeded` when
    /// `max_queue_size` operations are already queued or running.
    pub async fn enqueue<F, Fut, T, E>(
        &self,
        key: impl Into<String>,
        operation: F,
    ) -> Result<T, QueueError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = key.into();

        // ADMISSION: check and reserve capacity in one atomic step
        let capacity = self.config.max_queue_size;
        if self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .is_err()
        {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            warn!(queue = %self.name, key = %key, capacity, "🚫 Operation queue full, rejecting");
            return Err(QueueError::CapacityExceeded {
                queue: self.name.clone(),
                capacity,
            });
        }
        let _pending = CounterGuard::new(&self.pending);

        let task = QueueTask {
            key,
            enqueued_at: Instant::now(),
            timeout: self.config.timeout,
        };
        debug!(queue = %self.name, task = %task, "Task admitted");

        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return Err(QueueError::Closed {
                    queue: self.name.clone(),
                })
            }
        };

        self.running.fetch_add(1, Ordering::AcqRel);
        let _running = CounterGuard::new(&self.running);
        let waited_ms = task.enqueued_at.elapsed().as_millis() as u64;
        debug!(queue = %self.name, key = %task.key, waited_ms, "Task started");

        match tokio::time::timeout(task.timeout, operation()).await {
            Ok(Ok(value)) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Ok(Err(error)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                Err(QueueError::Operation(error))
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!(queue = %self.name, key = %task.key, timeout_ms = task.timeout.as_millis() as u64, "⏰ Operation timed out");
                Err(QueueError::Timeout {
                    queue: self.name.clone(),
                    key: task.key,
                    timeout_ms: self.config.timeout.as_millis() as u64,
                })
            }
        }
    }

    pub fn stats(&self) -> QueueStats {
        let pending = self.pending.load(Ordering::Acquire);
        let running = self.running.load(Ordering::Acquire);
        QueueStats {
            name: self.name.clone(),
            queued: pending.saturating_sub(running),
            running,
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            max_concurrent: self.config.max_concurrent,
            max_queue_size: self.config.max_queue_size,
        }
    }

    /// Stop starting new work. Waiting tasks fail with `Closed`, running ones finish.
    pub fn shutdown(&self) {
        self.permits.close();
        debug!(queue = %self.name, "Operation queue closed");
    }
}

// Decrements its counter on drop so cancelled callers never leak capacity.
struct CounterGuard<'a>(&'a AtomicUsize);

impl<'a> CounterGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        Self(counter)
    }
}

impl Drop for CounterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(max_concurrent: usize, max_queue_size: usize, timeout_ms: u64) -> OperationQueue {
        OperationQueue::new(
            "test",
            OperationQueueConfig {
                max_concurrent,
                max_queue_size,
                timeout: Duration::from_millis(timeout_ms),
            },
        )
    }

    #[tokio::test]
    async fn test_enqueue_returns_operation_result() {
        let q = queue(2, 10, 1000);

        let value = q.enqueue("ok", || async { Ok::<_, String>(7) }).await.unwrap();
        assert_eq!(value, 7);

        let err = q
            .enqueue("bad", || async { Err::<(), _>("boom".to_string()) })
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Operation(ref e) if e == "boom"));

        let stats = q.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.running, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_frees_slot() {
        let q = queue(1, 10, 100);

        let err = q
            .enqueue("slow", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<(), String>(())
            })
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let value = q.enqueue("fast", || async { Ok::<_, String>(1) }).await.unwrap();
        assert_eq!(value, 1);

        let stats = q.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_waiting_work() {
        let q = queue(1, 10, 1000);
        q.shutdown();

        let err = q.enqueue("late", || async { Ok::<(), String>(()) }).await.unwrap_err();
        assert!(matches!(err, QueueError::Closed { .. }));
        assert_eq!(q.stats().queued, 0);
    }
}
