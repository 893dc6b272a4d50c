use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::store::{Document, ProcessingStatus, WriteResult};

/// A document as submitted for ingestion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestDocument {
    /// Caller-assigned id; a UUID is generated when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub embeddings: Option<Vec<f32>>,
}

impl IngestDocument {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_embeddings(mut self, embeddings: Vec<f32>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Build the stored document. Documents carrying embeddings are complete;
    /// the rest wait for the embedding service.
    pub fn into_document(self, id: String) -> Document {
        let status = if self.embeddings.is_some() {
            ProcessingStatus::Completed
        } else {
            ProcessingStatus::Pending
        };
        let now = Utc::now();

        Document {
            id,
            title: self.title,
            content: self.content,
            abstract_text: self.abstract_text,
            authors: self.authors,
            tags: self.tags,
            source: self.source,
            metadata: self.metadata.unwrap_or_default(),
            embeddings: self.embeddings,
            processing_status: status,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub index: String,
    pub document: IngestDocument,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub index: String,
    pub id: String,
    pub version: u64,
    pub result: WriteResult,
    pub status: ProcessingStatus,
    pub index_created: bool,
    pub took_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemOutcome {
    pub id: String,
    pub success: bool,
    pub version: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchIngestOutcome {
    pub index: String,
    pub index_created: bool,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<BatchItemOutcome>,
    pub took_ms: u64,
}
