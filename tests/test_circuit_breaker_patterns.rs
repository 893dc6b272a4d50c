// ================================================================================================
// CIRCUIT BREAKER PATTERNS & FAULT TOLERANCE TEST SUITE
// ================================================================================================
//
// Validates the breaker that guards every call to the search engine:
// - State machine: CLOSED → OPEN after N consecutive failures, OPEN → HALF-OPEN after reset
// - Fail fast: an open breaker rejects without invoking the dependency
// - Recovery: exactly one probe passes; success closes, failure reopens and restarts the wait
// - Concurrency: the single-probe rule holds under parallel callers
//
// Timing tests run with tokio's paused clock, so reset timeouts elapse deterministically.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hybrid_search_server::resilience::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState,
};

fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
    CircuitBreaker::with_config(
        "engine",
        CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_millis(reset_ms),
        },
    )
}

async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
    breaker.execute(|| async { Err::<(), _>("connection refused") }).await
}

async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
    breaker.execute(|| async { Ok::<_, &'static str>(7) }).await
}

// ================================================================================================
// TEST SUITE 1: STATE MACHINE FUNDAMENTALS
// ================================================================================================

#[cfg(test)]
mod state_machine_tests {
    use super::*;

    #[tokio::test]
    async fn test_1_1_starts_closed_and_passes_calls() {
        let breaker = breaker(3, 1_000);
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);

        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.successful_calls, 1);
        assert_eq!(snapshot.failure_count, 0);

        println!("✅ Breaker starts CLOSED and passes calls through");
    }

    #[tokio::test]
    async fn test_1_2_opens_exactly_at_threshold() {
        let breaker = breaker(3, 60_000);

        for expected in 1..=2 {
            assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner(_))));
            assert_eq!(breaker.state(), CircuitBreakerState::Closed);
            assert_eq!(breaker.failure_count(), expected);
        }

        assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner(_))));
        assert_eq!(breaker.state(), CircuitBreakerState::Open);
        assert_eq!(breaker.snapshot().times_opened, 1);

        println!("✅ Breaker opened on failure 3 of threshold 3");
    }

    #[tokio::test]
    async fn test_1_3_open_breaker_rejects_without_invoking() {
        let breaker = breaker(1, 60_000);
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitBreakerState::Open);

        let counter = AtomicU32::new(0);
        let invocations = &counter;
        for _ in 0..5 {
            let result = breaker
                .execute(|| async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, &'static str>(())
                })
                .await;
            let err = result.unwrap_err();
            assert!(err.is_open());
            assert!(err.into_inner().is_none());
        }

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.snapshot().rejected_calls, 5);

        println!("✅ Open breaker rejected 5 calls without touching the dependency");
    }

    #[tokio::test]
    async fn test_1_4_success_breaks_failure_streak() {
        let breaker = breaker(3, 60_000);

        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        succeed(&breaker).await.unwrap();
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;

        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        assert_eq!(breaker.failure_count(), 2);

        println!("✅ Only consecutive failures count toward the threshold");
    }
}

// ================================================================================================
// TEST SUITE 2: RECOVERY THROUGH HALF-OPEN
// ================================================================================================

#[cfg(test)]
mod recovery_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_2_1_stays_open_until_reset_timeout() {
        let breaker = breaker(1, 1_000);
        let _ = fail(&breaker).await;

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(succeed(&breaker).await.unwrap_err().is_open());
        assert_eq!(breaker.state(), CircuitBreakerState::Open);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);

        println!("✅ Reset timeout respected to the millisecond");
    }

    #[tokio::test(start_paused = true)]
    async fn test_2_2_successful_probe_closes_and_resets() {
        let breaker = breaker(2, 500);
        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitBreakerState::Open);

        tokio::time::advance(Duration::from_millis(500)).await;
        succeed(&breaker).await.unwrap();

        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        assert_eq!(breaker.failure_count(), 0);

        // A fresh streak is needed to reopen
        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);

        println!("✅ Probe success closed the breaker and reset the failure count");
    }

    #[tokio::test(start_paused = true)]
    async fn test_2_3_failed_probe_reopens_and_restarts_timeout() {
        let breaker = breaker(1, 1_000);
        let _ = fail(&breaker).await;

        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner(_))));
        assert_eq!(breaker.state(), CircuitBreakerState::Open);
        assert_eq!(breaker.snapshot().times_opened, 2);

        // The wait restarts from the failed probe
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(succeed(&breaker).await.unwrap_err().is_open());

        tokio::time::advance(Duration::from_millis(400)).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);

        println!("✅ Failed probe reopened the breaker with a fresh timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn test_2_4_exactly_one_probe_under_concurrency() {
        let breaker = Arc::new(breaker(1, 100));
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(100)).await;

        let invocations = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let breaker = Arc::clone(&breaker);
            let invocations = Arc::clone(&invocations);
            handles.push(tokio::spawn(async move {
                let invocations = &invocations;
                breaker
                    .execute(|| async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, &'static str>(())
                    })
                    .await
            }));
        }

        let mut admitted = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => admitted += 1,
                Err(e) if e.is_open() => rejected += 1,
                Err(_) => panic!("unexpected inner error"),
            }
        }

        assert_eq!(admitted, 1);
        assert_eq!(rejected, 7);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);

        println!("✅ Half-open admitted a single probe out of 8 concurrent callers");
    }
}

// ================================================================================================
// TEST SUITE 3: FAILURE CLASSIFICATION
// ================================================================================================

#[cfg(test)]
mod classification_tests {
    use super::*;

    #[tokio::test]
    async fn test_3_1_classifier_decides_what_counts() {
        let breaker = breaker(2, 60_000);

        for _ in 0..4 {
            let result = breaker
                .execute_with(|| async { Err::<(), _>(404u16) }, |status| *status >= 500)
                .await;
            assert!(matches!(result, Err(BreakerError::Inner(404))));
        }
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);

        for _ in 0..2 {
            let _ = breaker
                .execute_with(|| async { Err::<(), _>(503u16) }, |status| *status >= 500)
                .await;
        }
        assert_eq!(breaker.state(), CircuitBreakerState::Open);

        println!("✅ Client errors ignored, server errors opened the breaker");
    }

    #[tokio::test(start_paused = true)]
    async fn test_3_2_dropped_call_counts_as_failure() {
        let breaker = breaker(1, 60_000);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            breaker.execute(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, &'static str>(())
            }),
        )
        .await;

        assert!(abandoned.is_err());
        assert_eq!(breaker.state(), CircuitBreakerState::Open);
        assert_eq!(breaker.snapshot().failed_calls, 1);

        println!("✅ Abandoned call recorded as a breaker failure");
    }
}
