// ================================================================================================
// SEARCH ENGINE ADAPTER - THE BOUNDARY TO THE DOWNSTREAM ENGINE
// ================================================================================================
//
// `SearchEngine` is the only surface the document store talks to. Each implementation
// classifies its native failures into `EngineErrorKind` exactly once, here at the boundary,
// so nothing above it inspects error messages.
//
// ================================================================================================

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::query::Query;
use super::schema::IndexDescriptor;
use super::Document;

/// Structured classification of engine failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    AlreadyExists,
    NotFound,
    Mapping,
    VersionConflict,
    BadRequest,
    Connection,
    Timeout,
    Server,
    Other,
}

impl EngineErrorKind {
    /// Whether the failure says the engine itself is unhealthy or unreachable,
    /// as opposed to the engine answering "no" to this particular request.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(
            self,
            EngineErrorKind::Connection
                | EngineErrorKind::Timeout
                | EngineErrorKind::Server
                | EngineErrorKind::Other
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineErrorKind::Connection | EngineErrorKind::Timeout | EngineErrorKind::Server
        )
    }
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineErrorKind::AlreadyExists => "already_exists",
            EngineErrorKind::NotFound => "not_found",
            EngineErrorKind::Mapping => "mapping",
            EngineErrorKind::VersionConflict => "version_conflict",
            EngineErrorKind::BadRequest => "bad_request",
            EngineErrorKind::Connection => "connection",
            EngineErrorKind::Timeout => "timeout",
            EngineErrorKind::Server => "server",
            EngineErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::NotFound, message).with_status(404)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::AlreadyExists, message).with_status(400)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteResult {
    Created,
    Updated,
    Deleted,
    NotFound,
    Noop,
}

/// Engine acknowledgement of a single-document write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteAck {
    pub id: String,
    pub version: u64,
    pub result: WriteResult,
}

/// A raw hit as returned by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineHit {
    pub id: String,
    pub score: Option<f32>,
    pub version: Option<u64>,
    pub source: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalRelation {
    /// `value` is the exact number of matches
    Eq,
    /// `value` is a lower bound
    Gte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    pub relation: TotalRelation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortField {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

/// Terms aggregation over a keyword field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsAggregation {
    pub name: String,
    pub field: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationBucket {
    pub key: String,
    pub doc_count: u64,
}

pub const DEFAULT_TRACK_TOTAL_HITS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: Query,
    pub size: usize,
    pub from: usize,
    pub sort: Vec<SortField>,
    pub min_score: Option<f32>,
    pub aggregations: Vec<TermsAggregation>,
    pub track_total_hits: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSearchResponse {
    pub took_ms: u64,
    pub total: TotalHits,
    pub max_score: Option<f32>,
    pub hits: Vec<EngineHit>,
    pub aggregations: HashMap<String, Vec<AggregationBucket>>,
}

/// One entry of a bulk request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BulkOperation {
    Index {
        index: String,
        id: String,
        document: Document,
    },
    Update {
        index: String,
        id: String,
        partial: Value,
    },
    Delete {
        index: String,
        id: String,
    },
}

impl BulkOperation {
    pub fn action(&self) -> BulkAction {
        match self {
            BulkOperation::Index { .. } => BulkAction::Index,
            BulkOperation::Update { .. } => BulkAction::Update,
            BulkOperation::Delete { .. } => BulkAction::Delete,
        }
    }

    pub fn index(&self) -> &str {
        match self {
            BulkOperation::Index { index, .. }
            | BulkOperation::Update { index, .. }
            | BulkOperation::Delete { index, .. } => index,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            BulkOperation::Index { id, .. }
            | BulkOperation::Update { id, .. }
            | BulkOperation::Delete { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Index,
    Update,
    Delete,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Index => "index",
            BulkAction::Update => "update",
            BulkAction::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemResult {
    pub action: BulkAction,
    pub index: String,
    pub id: String,
    pub status: u16,
    pub version: Option<u64>,
    pub result: Option<WriteResult>,
    pub error: Option<EngineError>,
}

impl BulkItemResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    pub took_ms: u64,
    pub errors: bool,
    pub items: Vec<BulkItemResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTier {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterHealthInfo {
    pub cluster_name: String,
    pub status: HealthTier,
    pub number_of_nodes: u32,
    pub number_of_data_nodes: u32,
    pub active_primary_shards: u32,
    pub active_shards: u32,
    pub relocating_shards: u32,
    pub initializing_shards: u32,
    pub unassigned_shards: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatsInfo {
    pub indices: u64,
    pub documents: u64,
    pub store_size_bytes: u64,
}

/// Per-node performance counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePerformance {
    pub node_id: String,
    pub name: String,
    pub query_total: u64,
    pub avg_query_latency_ms: f64,
    pub queries_per_second: f64,
    pub index_total: u64,
    pub avg_index_latency_ms: f64,
    pub index_ops_per_second: f64,
    pub cpu_percent: Option<f64>,
    pub memory_used_percent: Option<f64>,
    pub disk_used_percent: Option<f64>,
}

/// Operations every engine adapter provides
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Short backend name used in logs and reports
    fn backend_name(&self) -> &'static str;

    async fn index_exists(&self, index: &str) -> EngineResult<bool>;

    /// Fails with `AlreadyExists` when the index is present
    async fn create_index(&self, descriptor: &IndexDescriptor) -> EngineResult<()>;

    async fn delete_index(&self, index: &str) -> EngineResult<()>;

    /// Add new field mappings. Changing an existing field's type fails with `Mapping`.
    async fn put_mapping(&self, index: &str, properties: &Map<String, Value>) -> EngineResult<()>;

    /// Dimension of a dense-vector field, `None` if the field is not a vector
    async fn vector_dimension(&self, index: &str, field: &str) -> EngineResult<Option<usize>>;

    async fn index_document(&self, index: &str, id: &str, document: &Document) -> EngineResult<WriteAck>;

    async fn get_document(&self, index: &str, id: &str) -> EngineResult<Option<EngineHit>>;

    /// Merge `partial` into an existing document; fails with `NotFound` if absent
    async fn update_document(&self, index: &str, id: &str, partial: &Value) -> EngineResult<WriteAck>;

    /// Fails with `NotFound` if the document is absent
    async fn delete_document(&self, index: &str, id: &str) -> EngineResult<WriteAck>;

    async fn bulk(&self, operations: &[BulkOperation]) -> EngineResult<BulkResponse>;

    async fn search(&self, index: &str, request: &SearchRequest) -> EngineResult<EngineSearchResponse>;

    async fn count(&self, index: &str, query: &Query) -> EngineResult<u64>;

    async fn cluster_health(&self) -> EngineResult<ClusterHealthInfo>;

    async fn cluster_stats(&self) -> EngineResult<ClusterStatsInfo>;

    async fn node_stats(&self) -> EngineResult<Vec<NodePerformance>>;
}
