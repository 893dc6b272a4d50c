// Failure isolation and caller-side retry for the downstream search engine

pub mod circuit_breaker;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot,
    CircuitBreakerState,
};
pub use registry::{Dependency, DependencyGuard, DependencyRegistry, DependencyTelemetry};
pub use retry::{retry_with_backoff, RetryPolicy};
