// ================================================================================================
// DEPENDENCY REGISTRY - ONE QUEUE AND ONE BREAKER PER DOWNSTREAM DEPENDENCY
// ================================================================================================
//
// Every guarded call runs as `queue.enqueue(key, || breaker.execute_with(op, ...))`:
// - A full queue rejects before the breaker is consulted, so backpressure never trips it
// - A queue timeout drops the in-flight breaker call, which the breaker records as a failure
// - Only dependency failures (connection, timeout, 5xx) count toward opening the breaker
//
// ================================================================================================

use std::fmt;
use std::future::Future;

use serde::Serialize;
use tracing::info;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot};
use crate::error::{Error, Result};
use crate::queue::{OperationQueue, OperationQueueConfig, QueueStats};
use crate::store::{StoreError, StoreResult};

/// Logical downstream dependencies, each isolated behind its own queue and breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependency {
    /// Index lifecycle (create/delete/mapping)
    Index,
    /// Document writes
    Write,
    Search,
    /// Bulk synchronisation of document batches
    Sync,
}

impl Dependency {
    pub const ALL: [Dependency; 4] = [
        Dependency::Index,
        Dependency::Write,
        Dependency::Search,
        Dependency::Sync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::Index => "index",
            Dependency::Write => "write",
            Dependency::Search => "search",
            Dependency::Sync => "sync",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct DependencyGuard {
    dependency: Dependency,
    queue: OperationQueue,
    breaker: CircuitBreaker,
}

impl DependencyGuard {
    pub fn new(
        dependency: Dependency,
        queue_config: OperationQueueConfig,
        breaker_config: CircuitBreakerConfig,
    ) -> Self {
        Self {
            dependency,
            queue: OperationQueue::new(dependency.as_str(), queue_config),
            breaker: CircuitBreaker::with_config(dependency.as_str(), breaker_config),
        }
    }

    pub fn dependency(&self) -> Dependency {
        self.dependency
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run a store operation through this dependency's queue and breaker
    pub async fn run<F, Fut, T>(&self, key: impl Into<String>, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        self.queue
            .enqueue(key, || {
                self.breaker
                    .execute_with(operation, StoreError::is_dependency_failure)
            })
            .await
            .map_err(Error::from)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyTelemetry {
    pub dependency: Dependency,
    pub queue: QueueStats,
    pub breaker: CircuitBreakerSnapshot,
}

/// The process-wide set of dependency guards, built once at startup
pub struct DependencyRegistry {
    index: DependencyGuard,
    write: DependencyGuard,
    search: DependencyGuard,
    sync: DependencyGuard,
}

impl DependencyRegistry {
    pub fn new(queue_config: OperationQueueConfig, breaker_config: CircuitBreakerConfig) -> Self {
        info!(
            max_concurrent = queue_config.max_concurrent,
            max_queue_size = queue_config.max_queue_size,
            failure_threshold = breaker_config.failure_threshold,
            "🛡️ Building dependency guards"
        );
        Self {
            index: DependencyGuard::new(Dependency::Index, queue_config.clone(), breaker_config.clone()),
            write: DependencyGuard::new(Dependency::Write, queue_config.clone(), breaker_config.clone()),
            search: DependencyGuard::new(Dependency::Search, queue_config.clone(), breaker_config.clone()),
            sync: DependencyGuard::new(Dependency::Sync, queue_config, breaker_config),
        }
    }

    pub fn guard(&self, dependency: Dependency) -> &DependencyGuard {
        match dependency {
            Dependency::Index => &self.index,
            Dependency::Write => &self.write,
            Dependency::Search => &self.search,
            Dependency::Sync => &self.sync,
        }
    }

    pub fn telemetry(&self) -> Vec<DependencyTelemetry> {
        Dependency::ALL
            .iter()
            .map(|dependency| {
                let guard = self.guard(*dependency);
                DependencyTelemetry {
                    dependency: *dependency,
                    queue: guard.queue.stats(),
                    breaker: guard.breaker.snapshot(),
                }
            })
            .collect()
    }

    /// Stop admitting work on every queue
    pub fn shutdown(&self) {
        for dependency in Dependency::ALL {
            self.guard(dependency).queue.shutdown();
        }
    }
}
