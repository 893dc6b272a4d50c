// ================================================================================================
// OPERATION QUEUE BACKPRESSURE TEST SUITE
// ================================================================================================
//
// Validates the bounded queue in front of every engine call:
// - Concurrency: running operations never exceed max_concurrent
// - Admission: a full queue rejects immediately and never starts the operation
// - Ordering: queued operations start in submission order
// - Timeouts: a timed-out operation releases its slot to the next waiter
//
// All tests run on tokio's paused clock; sleeps advance virtual time only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hybrid_search_server::queue::{OperationQueue, OperationQueueConfig, QueueError};

fn queue(max_concurrent: usize, max_queue_size: usize, timeout_ms: u64) -> Arc<OperationQueue> {
    Arc::new(OperationQueue::new(
        "engine",
        OperationQueueConfig {
            max_concurrent,
            max_queue_size,
            timeout: Duration::from_millis(timeout_ms),
        },
    ))
}

// Let spawned tasks run until `pending` operations are admitted
async fn wait_for_admitted(queue: &OperationQueue, pending: usize) {
    for _ in 0..1_000 {
        let stats = queue.stats();
        if stats.queued + stats.running >= pending {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("operations were never admitted");
}

// ================================================================================================
// TEST SUITE 1: CONCURRENCY LIMITS
// ================================================================================================

#[cfg(test)]
mod concurrency_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_1_1_running_never_exceeds_max_concurrent() {
        let queue = queue(3, 50, 5_000);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..20 {
            let queue = Arc::clone(&queue);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let (active, peak) = (&active, &peak);
                queue
                    .enqueue(format!("op-{i}"), || async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, String>(i)
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        let stats = queue.stats();
        assert_eq!(stats.completed, 20);
        assert_eq!(stats.running, 0);
        assert_eq!(stats.queued, 0);

        println!("✅ 20 operations ran with a peak concurrency of 3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_1_2_stats_report_queued_and_running() {
        let queue = queue(1, 10, 5_000);

        let mut handles = Vec::new();
        for i in 0..3 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(format!("op-{i}"), || async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, String>(())
                    })
                    .await
            }));
        }
        wait_for_admitted(&queue, 3).await;

        let stats = queue.stats();
        assert_eq!(stats.running, 1);
        assert_eq!(stats.queued, 2);

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        println!("✅ Stats: 1 running, 2 queued while saturated");
    }
}

// ================================================================================================
// TEST SUITE 2: ADMISSION CONTROL
// ================================================================================================

#[cfg(test)]
mod admission_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_2_1_full_queue_rejects_immediately() {
        let queue = queue(1, 2, 5_000);

        let mut handles = Vec::new();
        for i in 0..2 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(format!("hold-{i}"), || async {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok::<_, String>(())
                    })
                    .await
            }));
        }
        wait_for_admitted(&queue, 2).await;
        let running_before = queue.stats().running;

        let started = AtomicUsize::new(0);
        let started_ref = &started;
        let err = queue
            .enqueue("overflow", || async move {
                started_ref.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .await
            .unwrap_err();

        assert!(err.is_capacity_exceeded());
        assert!(matches!(err, QueueError::CapacityExceeded { capacity: 2, .. }));
        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert_eq!(queue.stats().running, running_before);
        assert_eq!(queue.stats().rejected, 1);

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Capacity comes back once the backlog drains
        queue.enqueue("after", || async { Ok::<_, String>(()) }).await.unwrap();
        println!("✅ Overflow rejected without starting; capacity restored after drain");
    }

    #[tokio::test(start_paused = true)]
    async fn test_2_2_cancelled_caller_releases_capacity() {
        let queue = queue(1, 1, 5_000);

        let caller = tokio::time::timeout(
            Duration::from_millis(10),
            queue.enqueue("abandoned", || async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, String>(())
            }),
        )
        .await;
        assert!(caller.is_err());

        let stats = queue.stats();
        assert_eq!(stats.queued + stats.running, 0);
        queue.enqueue("next", || async { Ok::<_, String>(()) }).await.unwrap();

        println!("✅ Dropped caller gave its slot back");
    }
}

// ================================================================================================
// TEST SUITE 3: ORDERING AND TIMEOUTS
// ================================================================================================

#[cfg(test)]
mod ordering_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_3_1_operations_start_in_submission_order() {
        let queue = queue(1, 20, 5_000);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..6 {
            let queue_clone = Arc::clone(&queue);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let order = &order;
                queue_clone
                    .enqueue(format!("op-{i}"), || async move {
                        order.lock().unwrap().push(i);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok::<_, String>(())
                    })
                    .await
            }));
            // Submit one at a time so submission order is well defined
            wait_for_admitted(&queue, i + 1).await;
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
        println!("✅ FIFO start order preserved");
    }

    #[tokio::test(start_paused = true)]
    async fn test_3_2_timeout_releases_slot_to_waiter() {
        let queue = queue(1, 5, 100);

        let slow = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                queue
                    .enqueue("slow", || async {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        Ok::<_, String>(())
                    })
                    .await
            })
        };
        wait_for_admitted(&queue, 1).await;

        let waiter = queue.enqueue("waiter", || async { Ok::<_, String>("done") }).await;

        let err = slow.await.unwrap().unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(waiter.unwrap(), "done");

        let stats = queue.stats();
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.completed, 1);
        println!("✅ Timed-out operation freed its slot for the waiter");
    }

    #[tokio::test]
    async fn test_3_3_shutdown_fails_new_work() {
        let queue = queue(2, 10, 1_000);
        queue.enqueue("before", || async { Ok::<_, String>(()) }).await.unwrap();

        queue.shutdown();
        let err = queue
            .enqueue("after", || async { Ok::<_, String>(()) })
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::Closed { .. }));
        println!("✅ Shut-down queue refuses new work");
    }
}
