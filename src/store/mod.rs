// ================================================================================================
// DOCUMENT STORE MODULE
// ================================================================================================
//
// Index lifecycle, document CRUD, bulk writes, hybrid/vector search and cluster health on top
// of a pluggable `SearchEngine` adapter (Elasticsearch over HTTP, or in-memory).
//
// ================================================================================================

pub mod document_store;
pub mod elasticsearch;
pub mod engine;
pub mod factory;
pub mod memory;
pub mod metrics;
pub mod query;
pub mod schema;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use document_store::{
    DocumentStore, ExtendedHealthReport, NodeCounts, SearchHit, SearchOptions, SearchResults,
    ShardCounts, StoreError, StoreResult, StoreStats, StoredDocument, VectorSearchOptions,
};
pub use elasticsearch::{ElasticsearchConfig, ElasticsearchEngine};
pub use engine::{
    AggregationBucket, BulkAction, BulkItemResult, BulkOperation, BulkResponse, EngineError,
    EngineErrorKind, EngineResult, HealthTier, NodePerformance, SearchEngine, SortField,
    SortOrder, TermsAggregation, TotalHits, TotalRelation, WriteAck, WriteResult,
};
pub use factory::{EngineBackend, EngineFactory};
pub use memory::InMemoryEngine;
pub use metrics::{OperationMetrics, OperationMetricsSnapshot};
pub use query::{
    build_hybrid_query, build_text_query, build_vector_query, Fuzziness, HybridWeights,
    MatchOperator, Query, QueryError,
};
pub use schema::{IndexDescriptor, VectorIndexSchema};

/// Processing state of a stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// A searchable document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
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
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<f32>>,
    #[serde(default)]
    pub processing_status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            abstract_text: String::new(),
            authors: Vec::new(),
            tags: Vec::new(),
            source: String::new(),
            metadata: HashMap::new(),
            embeddings: None,
            processing_status: ProcessingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_embeddings(mut self, embeddings: Vec<f32>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: ProcessingStatus) -> Self {
        self.processing_status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_serializes_abstract_field() {
        let mut doc = Document::new("a", "Title", "Body");
        doc.abstract_text = "Summary".to_string();
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["abstract"], "Summary");
        assert_eq!(value["processing_status"], "pending");
        assert!(value.get("embeddings").is_none());

        let back: Document = serde_json::from_value(value).unwrap();
        assert_eq!(back.abstract_text, "Summary");
    }
}
