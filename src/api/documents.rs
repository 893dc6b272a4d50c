// ================================================================================================
// DOCUMENT API
// ================================================================================================

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::AppState;
use crate::error::{Error, Result};
use crate::ingestion::{validate_index_name, BatchIngestOutcome, IngestDocument, IngestOutcome, IngestRequest};
use crate::resilience::Dependency;
use crate::store::{StoredDocument, WriteResult};

#[derive(Debug, Deserialize)]
pub struct IngestDocumentRequest {
    /// Falls back to the configured default index
    pub index: Option<String>,
    pub document: IngestDocument,
}

#[derive(Debug, Deserialize)]
pub struct IngestBatchRequest {
    pub index: Option<String>,
    pub documents: Vec<IngestDocument>,
}

#[derive(Debug, Serialize)]
pub struct DeleteDocumentResponse {
    pub index: String,
    pub id: String,
    pub deleted: bool,
}

pub async fn ingest_document(
    State(state): State<AppState>,
    Json(request): Json<IngestDocumentRequest>,
) -> Result<(StatusCode, Json<IngestOutcome>)> {
    let index = request
        .index
        .unwrap_or_else(|| state.ctx.default_index().to_string());

    let outcome = state
        .pipeline
        .ingest(IngestRequest {
            index,
            document: request.document,
        })
        .await?;

    let status = if outcome.result == WriteResult::Created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

pub async fn ingest_batch(
    State(state): State<AppState>,
    Json(request): Json<IngestBatchRequest>,
) -> Result<Json<BatchIngestOutcome>> {
    if request.documents.is_empty() {
        return Err(Error::Validation("documents cannot be empty".to_string()));
    }
    let index = request
        .index
        .unwrap_or_else(|| state.ctx.default_index().to_string());

    info!(index = %index, count = request.documents.len(), "📦 Batch ingestion requested");
    let outcome = state.pipeline.ingest_batch(&index, request.documents).await?;
    Ok(Json(outcome))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path((index, id)): Path<(String, String)>,
) -> Result<Json<StoredDocument>> {
    validate_index_name(&index)?;
    let store = state.ctx.store();
    let found = state
        .ctx
        .guard(Dependency::Search)
        .run(format!("get:{index}/{id}"), || store.get_document(&index, &id))
        .await?;

    found
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("document '{id}' in index '{index}'")))
}

/// Deleting a missing document is not an error; `deleted` reports whether it existed.
pub async fn delete_document(
    State(state): State<AppState>,
    Path((index, id)): Path<(String, String)>,
) -> Result<Json<DeleteDocumentResponse>> {
    let deleted = state.pipeline.delete(&index, &id).await?;
    info!(index = %index, id = %id, deleted, "🗑️ Document delete handled");
    Ok(Json(DeleteDocumentResponse { index, id, deleted }))
}
