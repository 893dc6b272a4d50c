// ================================================================================================
// SERVICE CONTEXT - SHARED STATE INJECTED INTO THE PIPELINE AND HANDLERS
// ================================================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::resilience::{Dependency, DependencyGuard, DependencyRegistry, DependencyTelemetry};
use crate::store::DocumentStore;

/// Store plus the per-dependency queues and breakers, constructed once at startup
pub struct ServiceContext {
    store: Arc<DocumentStore>,
    dependencies: DependencyRegistry,
    default_index: String,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Telemetry {
    pub backend: &'static str,
    pub uptime_secs: i64,
    pub dependencies: Vec<DependencyTelemetry>,
}

impl ServiceContext {
    pub fn new(
        store: Arc<DocumentStore>,
        dependencies: DependencyRegistry,
        default_index: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dependencies,
            default_index: default_index.into(),
            started_at: Utc::now(),
        }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn guard(&self, dependency: Dependency) -> &DependencyGuard {
        self.dependencies.guard(dependency)
    }

    pub fn default_index(&self) -> &str {
        &self.default_index
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            backend: self.store.backend_name(),
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            dependencies: self.dependencies.telemetry(),
        }
    }

    pub fn shutdown(&self) {
        self.dependencies.shutdown();
    }
}
