// ================================================================================================
// INGESTION PIPELINE - VALIDATE, ENSURE INDEX, WRITE, REPORT
// ================================================================================================
//
// The orchestration callers use to get documents into the store:
// 1. Validate the request shape (index name, text, embedding values)
// 2. Ensure the target index exists through the "index" queue and breaker
// 3. Upsert the document through the "write" queue and breaker; batches go through "sync"
// 4. Report the outcome
//
// The pipeline owns no long-lived state; queues, breakers and the store come from the
// shared `ServiceContext`. Full queues and open breakers surface as retryable errors.
//
// ================================================================================================

pub mod types;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::ServiceContext;
use crate::error::{Error, Result};
use crate::resilience::Dependency;
use crate::store::BulkOperation;

pub use types::{BatchIngestOutcome, BatchItemOutcome, IngestDocument, IngestOutcome, IngestRequest};

const MAX_INDEX_NAME_BYTES: usize = 255;
const FORBIDDEN_INDEX_CHARS: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ' ', ',', '#', ':'];

/// Index names follow the engine's rules: lowercase, no path or wildcard characters,
/// no leading `-`, `_` or `+`.
pub fn validate_index_name(index: &str) -> Result<()> {
    if index.is_empty() {
        return Err(Error::Validation("index name cannot be empty".to_string()));
    }
    if index.len() > MAX_INDEX_NAME_BYTES {
        return Err(Error::Validation(format!(
            "index name exceeds {MAX_INDEX_NAME_BYTES} bytes"
        )));
    }
    if index == "." || index == ".." {
        return Err(Error::Validation(format!("'{index}' is not a valid index name")));
    }
    if index.starts_with(['-', '_', '+']) {
        return Err(Error::Validation(format!(
            "index name '{index}' must not start with '-', '_' or '+'"
        )));
    }
    if index.chars().any(|c| c.is_uppercase() || FORBIDDEN_INDEX_CHARS.contains(&c)) {
        return Err(Error::Validation(format!(
            "index name '{index}' must be lowercase and must not contain {FORBIDDEN_INDEX_CHARS:?}"
        )));
    }
    Ok(())
}

pub fn validate_document(document: &IngestDocument) -> Result<()> {
    if document.title.trim().is_empty() && document.content.trim().is_empty() {
        return Err(Error::Validation(
            "document must have a non-empty title or content".to_string(),
        ));
    }
    if let Some(id) = &document.id {
        if id.trim().is_empty() {
            return Err(Error::Validation("document id cannot be blank".to_string()));
        }
    }
    if let Some(embeddings) = &document.embeddings {
        if embeddings.is_empty() {
            return Err(Error::Validation("embeddings cannot be empty".to_string()));
        }
        if embeddings.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation(
                "embeddings must contain only finite values".to_string(),
            ));
        }
    }
    Ok(())
}

pub struct IngestionPipeline {
    ctx: Arc<ServiceContext>,
}

impl IngestionPipeline {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// Create the index if it is missing. Returns whether it was created.
    pub async fn ensure_index(&self, index: &str) -> Result<bool> {
        validate_index_name(index)?;
        let store = self.ctx.store();
        let created = self
            .ctx
            .guard(Dependency::Index)
            .run(format!("create_index:{index}"), || store.create_index_if_missing(index))
            .await?;
        if created {
            info!("📁 Index '{}' created on first ingestion", index);
        }
        Ok(created)
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome> {
        let started = Instant::now();
        let IngestRequest { index, document } = request;

        validate_index_name(&index)?;
        validate_document(&document)?;

        let index_created = self.ensure_index(&index).await?;

        let id = document
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let document = document.into_document(id.clone());
        let status = document.processing_status;

        let store = self.ctx.store();
        let ack = self
            .ctx
            .guard(Dependency::Write)
            .run(format!("upsert:{index}/{id}"), || {
                store.upsert_document(&index, &id, &document)
            })
            .await
            .inspect_err(|e| warn!(index = %index, id = %id, retryable = e.is_retryable(), "❌ Ingestion failed: {}", e))?;

        let took_ms = started.elapsed().as_millis() as u64;
        info!(
            index = %index,
            id = %ack.id,
            version = ack.version,
            took_ms,
            "📄 Document ingested"
        );

        Ok(IngestOutcome {
            index,
            id: ack.id,
            version: ack.version,
            result: ack.result,
            status,
            index_created,
            took_ms,
        })
    }

    /// Ingest many documents with one bulk write. Invalid documents are reported
    /// as failed items; valid ones are still written.
    pub async fn ingest_batch(
        &self,
        index: &str,
        documents: Vec<IngestDocument>,
    ) -> Result<BatchIngestOutcome> {
        let started = Instant::now();
        validate_index_name(index)?;
        let index_created = self.ensure_index(index).await?;

        let mut slots: Vec<Option<BatchItemOutcome>> = Vec::with_capacity(documents.len());
        let mut operations = Vec::with_capacity(documents.len());
        for document in documents {
            let id = document
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            match validate_document(&document) {
                Ok(()) => {
                    operations.push(BulkOperation::Index {
                        index: index.to_string(),
                        id: id.clone(),
                        document: document.into_document(id),
                    });
                    slots.push(None);
                }
                Err(e) => slots.push(Some(BatchItemOutcome {
                    id,
                    success: false,
                    version: None,
                    error: Some(e.to_string()),
                })),
            }
        }

        let written = if operations.is_empty() {
            Vec::new()
        } else {
            let store = self.ctx.store();
            let count = operations.len();
            debug!(index, count, "Submitting bulk ingestion");
            self.ctx
                .guard(Dependency::Sync)
                .run(format!("bulk:{index}:{count}"), move || store.bulk(operations))
                .await?
                .items
        };

        let mut written = written.into_iter();
        let items: Vec<BatchItemOutcome> = slots
            .into_iter()
            .filter_map(|slot| {
                slot.or_else(|| {
                    written.next().map(|item| BatchItemOutcome {
                        success: item.is_success(),
                        error: item.error.as_ref().map(ToString::to_string),
                        id: item.id,
                        version: item.version,
                    })
                })
            })
            .collect();

        let succeeded = items.iter().filter(|item| item.success).count();
        let failed = items.len() - succeeded;
        if failed > 0 {
            warn!(index, succeeded, failed, "⚠️ Batch ingestion had failures");
        } else {
            info!(index, succeeded, "📦 Batch ingested");
        }

        Ok(BatchIngestOutcome {
            index: index.to_string(),
            index_created,
            succeeded,
            failed,
            items,
            took_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Delete a document. Returns whether it existed; missing documents are not an error.
    pub async fn delete(&self, index: &str, id: &str) -> Result<bool> {
        validate_index_name(index)?;
        let store = self.ctx.store();
        self.ctx
            .guard(Dependency::Write)
            .run(format!("delete:{index}/{id}"), || store.delete_document(index, id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_name_rules() {
        assert!(validate_index_name("docs").is_ok());
        assert!(validate_index_name("papers-2024.v1").is_ok());
        assert!(validate_index_name("").is_err());
        assert!(validate_index_name("Docs").is_err());
        assert!(validate_index_name("_hidden").is_err());
        assert!(validate_index_name("a/b").is_err());
        assert!(validate_index_name("..").is_err());
        assert!(validate_index_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_document_validation() {
        assert!(validate_document(&IngestDocument::new("Title", "")).is_ok());
        assert!(validate_document(&IngestDocument::new(" ", " ")).is_err());
        assert!(validate_document(&IngestDocument::new("T", "B").with_embeddings(vec![])).is_err());
        assert!(
            validate_document(&IngestDocument::new("T", "B").with_embeddings(vec![f32::INFINITY]))
                .is_err()
        );
        assert!(validate_document(&IngestDocument::new("T", "B").with_id("  ")).is_err());
    }

    #[test]
    fn test_status_follows_embeddings() {
        let pending = IngestDocument::new("T", "B").into_document("a".into());
        assert_eq!(pending.processing_status, crate::store::ProcessingStatus::Pending);

        let complete = IngestDocument::new("T", "B")
            .with_embeddings(vec![0.1, 0.2])
            .into_document("b".into());
        assert_eq!(complete.processing_status, crate::store::ProcessingStatus::Completed);
        assert_eq!(complete.id, "b");
    }
}
