// ARCHITECTURE: API Module - RESTful Service Interface Layer
//
// API STRUCTURE:
// 1. DOCUMENTS (documents.rs): ingestion and removal
//    - POST   /api/v1/documents
//    - POST   /api/v1/documents/batch
//    - GET    /api/v1/indices/{index}/documents/{id}
//    - DELETE /api/v1/indices/{index}/documents/{id}
//
// 2. SEARCH (search.rs): keyword, vector and hybrid queries
//    - POST /api/v1/search
//    - POST /api/v1/search/vector
//
// 3. HEALTH (health.rs): cluster health, stats and queue/breaker telemetry
//    - GET /health
//    - GET /health/extended
//    - GET /api/v1/stats
//    - GET /api/v1/telemetry
//
// Every handler that touches the engine goes through a dependency guard, so
// backpressure and open breakers reach the client as 429/503 with `retryable: true`.

pub mod documents;
pub mod health;
pub mod search;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::context::ServiceContext;
use crate::ingestion::IngestionPipeline;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<ServiceContext>,
    pub pipeline: Arc<IngestionPipeline>,
}

impl AppState {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        let pipeline = Arc::new(IngestionPipeline::new(Arc::clone(&ctx)));
        Self { ctx, pipeline }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/extended", get(health::extended_health))
        .route("/api/v1/stats", get(health::stats))
        .route("/api/v1/telemetry", get(health::telemetry))
        .route("/api/v1/documents", post(documents::ingest_document))
        .route("/api/v1/documents/batch", post(documents::ingest_batch))
        .route(
            "/api/v1/indices/{index}/documents/{id}",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/api/v1/search", post(search::search))
        .route("/api/v1/search/vector", post(search::vector_search))
        .with_state(state)
}
