// ================================================================================================
// DOCUMENT STORE - INDEX LIFECYCLE, CRUD, SEARCH AND CLUSTER HEALTH
// ================================================================================================
//
// High-level store used by the ingestion pipeline and the HTTP layer:
// - Idempotent index creation and document deletion
// - Embedding dimension checks before any write reaches the engine
// - Bulk writes with per-item outcomes and no rollback
// - Text, vector and hybrid search built through the query builder
// - Stats/health reports that degrade to red instead of failing
//
// ================================================================================================

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::engine::{
    AggregationBucket, BulkItemResult, BulkOperation, BulkResponse, EngineError, EngineErrorKind,
    EngineHit, HealthTier, NodePerformance, SearchEngine, SearchRequest, SortField,
    TermsAggregation, TotalHits, WriteAck, DEFAULT_TRACK_TOTAL_HITS,
};
use super::metrics::{OperationMetrics, OperationMetricsSnapshot};
use super::query::{
    build_filtered_vector_query, build_hybrid_query, build_text_query, build_vector_query,
    HybridWeights, Query, QueryError,
};
use super::schema::{FieldMapping, IndexDescriptor, VectorIndexSchema};
use super::Document;

fn id_suffix(id: &Option<String>) -> String {
    id.as_ref().map(|id| format!(" (id '{id}')")).unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document '{id}' has {actual} embedding dimensions but index '{index}' expects {expected}")]
    DimensionMismatch {
        index: String,
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("query vector has {actual} dimensions but index '{index}' expects {expected}")]
    QueryDimensionMismatch {
        index: String,
        expected: usize,
        actual: usize,
    },

    #[error("{operation} failed on index '{index}'{}: {source}", id_suffix(.id))]
    Engine {
        operation: &'static str,
        index: String,
        id: Option<String>,
        source: EngineError,
    },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("failed to decode document '{id}' from index '{index}': {source}")]
    Decode {
        index: String,
        id: String,
        source: serde_json::Error,
    },
}

impl StoreError {
    fn engine(operation: &'static str, index: &str, id: Option<&str>, source: EngineError) -> Self {
        StoreError::Engine {
            operation,
            index: index.to_string(),
            id: id.map(String::from),
            source,
        }
    }

    /// Engine error kind, if this error came from the engine
    pub fn kind(&self) -> Option<EngineErrorKind> {
        match self {
            StoreError::Engine { source, .. } => Some(source.kind),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(EngineErrorKind::NotFound)
    }

    /// Whether the error means the engine is unhealthy (used as the breaker failure predicate)
    pub fn is_dependency_failure(&self) -> bool {
        self.kind().is_some_and(|kind| kind.is_dependency_failure())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub version: Option<u64>,
    pub source: Document,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub took_ms: u64,
    pub total: TotalHits,
    pub max_score: Option<f32>,
    pub hits: Vec<SearchHit>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub aggregations: HashMap<String, Vec<AggregationBucket>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub size: usize,
    pub from: usize,
    pub sort: Vec<SortField>,
    pub min_score: Option<f32>,
    pub aggregations: Vec<TermsAggregation>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            size: 10,
            from: 0,
            sort: Vec::new(),
            min_score: None,
            aggregations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchOptions {
    pub size: usize,
    /// Threshold on raw cosine similarity
    pub min_score: Option<f32>,
    /// Optional keyword pre-filter
    pub text_query: Option<String>,
    /// Vector field, defaults to the schema's
    pub field: Option<String>,
}

impl Default for VectorSearchOptions {
    fn default() -> Self {
        Self {
            size: 10,
            min_score: None,
            text_query: None,
            field: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDocument {
    pub version: Option<u64>,
    pub document: Document,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub backend: &'static str,
    pub indices: u64,
    pub documents: u64,
    pub size_bytes: u64,
    pub health: HealthTier,
    pub operations: BTreeMap<String, OperationMetricsSnapshot>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeCounts {
    pub total: u32,
    pub data: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShardCounts {
    pub active_primary: u32,
    pub active: u32,
    pub relocating: u32,
    pub initializing: u32,
    pub unassigned: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtendedHealthReport {
    pub cluster_name: String,
    pub status: HealthTier,
    pub nodes: NodeCounts,
    pub shards: ShardCounts,
    pub node_performance: Vec<NodePerformance>,
    pub operations: BTreeMap<String, OperationMetricsSnapshot>,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

pub struct DocumentStore {
    engine: Arc<dyn SearchEngine>,
    schema: VectorIndexSchema,
    dimensions: RwLock<HashMap<String, Option<usize>>>,
    metrics: OperationMetrics,
}

impl DocumentStore {
    pub fn new(engine: Arc<dyn SearchEngine>, schema: VectorIndexSchema) -> Self {
        info!(
            backend = engine.backend_name(),
            dims = schema.dims,
            vector_field = %schema.vector_field,
            "🗄️ Document store initialized"
        );
        Self {
            engine,
            schema,
            dimensions: RwLock::new(HashMap::new()),
            metrics: OperationMetrics::new(),
        }
    }

    pub fn schema(&self) -> &VectorIndexSchema {
        &self.schema
    }

    pub fn engine(&self) -> &Arc<dyn SearchEngine> {
        &self.engine
    }

    pub fn backend_name(&self) -> &'static str {
        self.engine.backend_name()
    }

    async fn observe<T, F>(&self, operation: &'static str, future: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let started = Instant::now();
        let result = future.await;
        // An index that already exists is an answer, not a failed operation
        let succeeded = match &result {
            Ok(_) => true,
            Err(e) => e.kind() == Some(EngineErrorKind::AlreadyExists),
        };
        self.metrics
            .record(operation, started.elapsed().as_millis() as u64, succeeded);
        result
    }

    // ============================================================================================
    // INDEX LIFECYCLE
    // ============================================================================================

    pub async fn index_exists(&self, index: &str) -> StoreResult<bool> {
        self.engine
            .index_exists(index)
            .await
            .map_err(|e| StoreError::engine("index_exists", index, None, e))
    }

    /// Fails with `AlreadyExists` when the index is present
    pub async fn create_index(&self, descriptor: &IndexDescriptor) -> StoreResult<()> {
        let index = descriptor.name.as_str();
        self.observe("create_index", async {
            self.engine
                .create_index(descriptor)
                .await
                .map_err(|e| StoreError::engine("create_index", index, None, e))?;
            self.dimensions.write().await.remove(index);
            info!("📁 Created index '{}' ({} shards, {} replicas)", index, descriptor.number_of_shards, descriptor.number_of_replicas);
            Ok(())
        })
        .await
    }

    /// Create `index` from the store's schema. Returns `false` if it already existed.
    pub async fn create_index_if_missing(&self, index: &str) -> StoreResult<bool> {
        if self.index_exists(index).await? {
            return Ok(false);
        }
        // Lost a race with a concurrent creator
        match self.create_index(&self.schema.descriptor(index)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == Some(EngineErrorKind::AlreadyExists) => {
                debug!("Index '{}' already exists", index);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete an index and every document in it. A missing index is not an error.
    pub async fn delete_index(&self, index: &str) -> StoreResult<()> {
        self.observe("delete_index", async {
            let result = self.engine.delete_index(index).await;
            self.dimensions.write().await.remove(index);
            match result {
                Ok(()) => {
                    info!("🗑️ Deleted index '{}'", index);
                    Ok(())
                }
                Err(e) if e.kind == EngineErrorKind::NotFound => Ok(()),
                Err(e) => Err(StoreError::engine("delete_index", index, None, e)),
            }
        })
        .await
    }

    /// Add field mappings to an existing index
    pub async fn put_mapping(
        &self,
        index: &str,
        properties: &BTreeMap<String, FieldMapping>,
    ) -> StoreResult<()> {
        let body = properties
            .iter()
            .map(|(name, mapping)| (name.clone(), mapping.to_engine_json()))
            .collect();
        self.observe("put_mapping", async {
            self.engine
                .put_mapping(index, &body)
                .await
                .map_err(|e| StoreError::engine("put_mapping", index, None, e))?;
            self.dimensions.write().await.remove(index);
            Ok(())
        })
        .await
    }

    async fn expected_dimension(&self, index: &str, operation: &'static str) -> StoreResult<Option<usize>> {
        if let Some(dims) = self.dimensions.read().await.get(index) {
            return Ok(*dims);
        }
        let dims = self
            .engine
            .vector_dimension(index, &self.schema.vector_field)
            .await
            .map_err(|e| StoreError::engine(operation, index, None, e))?;
        self.dimensions.write().await.insert(index.to_string(), dims);
        Ok(dims)
    }

    /// Reject a query vector whose length differs from the mapped dense-vector `field`.
    /// Unmapped fields are left to the engine.
    async fn check_query_dimension(&self, index: &str, field: &str, query_vector: &[f32]) -> StoreResult<()> {
        if query_vector.is_empty() {
            return Ok(());
        }
        let expected = if field == self.schema.vector_field {
            self.expected_dimension(index, "vector_search").await?
        } else {
            self.engine
                .vector_dimension(index, field)
                .await
                .map_err(|e| StoreError::engine("vector_search", index, None, e))?
        };
        match expected {
            Some(expected) if expected != query_vector.len() => Err(StoreError::QueryDimensionMismatch {
                index: index.to_string(),
                expected,
                actual: query_vector.len(),
            }),
            _ => Ok(()),
        }
    }

    fn check_dimension(index: &str, id: &str, expected: Option<usize>, actual: Option<usize>) -> StoreResult<()> {
        match (expected, actual) {
            (Some(expected), Some(actual)) if expected != actual => Err(StoreError::DimensionMismatch {
                index: index.to_string(),
                id: id.to_string(),
                expected,
                actual,
            }),
            _ => Ok(()),
        }
    }

    fn partial_vector_len(&self, partial: &Value) -> Option<usize> {
        partial
            .get(&self.schema.vector_field)
            .and_then(Value::as_array)
            .map(Vec::len)
    }

    // ============================================================================================
    // DOCUMENT CRUD
    // ============================================================================================

    /// Create or overwrite the document at `id`. Versions increase per id.
    pub async fn upsert_document(&self, index: &str, id: &str, document: &Document) -> StoreResult<WriteAck> {
        self.observe("upsert", async {
            if let Some(embeddings) = &document.embeddings {
                let expected = self.expected_dimension(index, "upsert").await?;
                Self::check_dimension(index, id, expected, Some(embeddings.len()))?;
            }

            let ack = self
                .engine
                .index_document(index, id, document)
                .await
                .map_err(|e| StoreError::engine("upsert", index, Some(id), e))?;
            debug!(index, id, version = ack.version, "Upserted document");
            Ok(ack)
        })
        .await
    }

    pub async fn get_document(&self, index: &str, id: &str) -> StoreResult<Option<StoredDocument>> {
        self.observe("get", async {
            let hit = self
                .engine
                .get_document(index, id)
                .await
                .map_err(|e| StoreError::engine("get", index, Some(id), e))?;
            hit.map(|hit| {
                let version = hit.version;
                decode_source(index, hit).map(|document| StoredDocument { version, document })
            })
            .transpose()
        })
        .await
    }

    /// Merge `partial` into an existing document. A missing document is an error.
    pub async fn update_document(&self, index: &str, id: &str, partial: &Value) -> StoreResult<WriteAck> {
        self.observe("update", async {
            if let Some(actual) = self.partial_vector_len(partial) {
                let expected = self.expected_dimension(index, "update").await?;
                Self::check_dimension(index, id, expected, Some(actual))?;
            }

            self.engine
                .update_document(index, id, partial)
                .await
                .map_err(|e| StoreError::engine("update", index, Some(id), e))
        })
        .await
    }

    /// Delete a document. Returns whether it existed; a missing document is not an error.
    pub async fn delete_document(&self, index: &str, id: &str) -> StoreResult<bool> {
        self.observe("delete", async {
            match self.engine.delete_document(index, id).await {
                Ok(_) => Ok(true),
                Err(e) if e.kind == EngineErrorKind::NotFound => {
                    debug!(index, id, "Delete of missing document treated as success");
                    Ok(false)
                }
                Err(e) => Err(StoreError::engine("delete", index, Some(id), e)),
            }
        })
        .await
    }

    /// Execute a heterogeneous batch in one round trip. Items failing the dimension
    /// check are reported as failed and never sent; other items are unaffected.
    pub async fn bulk(&self, operations: Vec<BulkOperation>) -> StoreResult<BulkResponse> {
        self.observe("bulk", async {
            let started = Instant::now();
            let mut slots: Vec<Option<BulkItemResult>> = Vec::with_capacity(operations.len());
            let mut accepted = Vec::with_capacity(operations.len());

            for operation in operations {
                let actual = match &operation {
                    BulkOperation::Index { document, .. } => document.embeddings.as_ref().map(Vec::len),
                    BulkOperation::Update { partial, .. } => self.partial_vector_len(partial),
                    BulkOperation::Delete { .. } => None,
                };
                let rejection = match actual {
                    Some(actual) => {
                        let expected = match self.expected_dimension(operation.index(), "bulk").await {
                            Ok(expected) => expected,
                            // Missing index: the engine reports it per item
                            Err(e) if e.is_not_found() => None,
                            Err(e) => return Err(e),
                        };
                        Self::check_dimension(operation.index(), operation.id(), expected, Some(actual)).err()
                    }
                    None => None,
                };

                match rejection {
                    Some(error) => slots.push(Some(BulkItemResult {
                        action: operation.action(),
                        index: operation.index().to_string(),
                        id: operation.id().to_string(),
                        status: 400,
                        version: None,
                        result: None,
                        error: Some(EngineError::new(EngineErrorKind::Mapping, error.to_string()).with_status(400)),
                    })),
                    None => {
                        slots.push(None);
                        accepted.push(operation);
                    }
                }
            }

            let engine_items = match accepted.first() {
                None => Vec::new(),
                Some(first) => {
                    let index = first.index().to_string();
                    self.engine
                        .bulk(&accepted)
                        .await
                        .map_err(|e| StoreError::engine("bulk", &index, None, e))?
                        .items
                }
            };

            // Engine items come back in request order; fill the gaps left by rejected items
            let mut engine_items = engine_items.into_iter();
            let items: Vec<BulkItemResult> = slots
                .into_iter()
                .filter_map(|slot| slot.or_else(|| engine_items.next()))
                .collect();
            let errors = items.iter().any(|item| item.error.is_some());
            if errors {
                warn!(
                    failed = items.iter().filter(|item| item.error.is_some()).count(),
                    total = items.len(),
                    "⚠️ Bulk request had item failures"
                );
            }

            Ok(BulkResponse {
                took_ms: started.elapsed().as_millis() as u64,
                errors,
                items,
            })
        })
        .await
    }

    // ============================================================================================
    // SEARCH
    // ============================================================================================

    pub async fn search(&self, index: &str, query: Query, options: SearchOptions) -> StoreResult<SearchResults> {
        self.observe("search", async {
            let request = SearchRequest {
                query,
                size: options.size,
                from: options.from,
                sort: options.sort,
                min_score: options.min_score,
                aggregations: options.aggregations,
                track_total_hits: DEFAULT_TRACK_TOTAL_HITS,
            };
            let response = self
                .engine
                .search(index, &request)
                .await
                .map_err(|e| StoreError::engine("search", index, None, e))?;

            let hits = response
                .hits
                .into_iter()
                .map(|hit| {
                    let id = hit.id.clone();
                    let score = hit.score.unwrap_or(0.0);
                    let version = hit.version;
                    decode_source(index, hit).map(|source| SearchHit {
                        id,
                        score,
                        version,
                        source,
                    })
                })
                .collect::<StoreResult<Vec<_>>>()?;

            debug!(index, hits = hits.len(), took_ms = response.took_ms, "🔍 Search completed");
            Ok(SearchResults {
                took_ms: response.took_ms,
                total: response.total,
                max_score: response.max_score,
                hits,
                aggregations: response.aggregations,
            })
        })
        .await
    }

    pub async fn count(&self, index: &str, query: &Query) -> StoreResult<u64> {
        self.observe("count", async {
            self.engine
                .count(index, query)
                .await
                .map_err(|e| StoreError::engine("count", index, None, e))
        })
        .await
    }

    /// Cosine-similarity search. `min_score` applies to the raw cosine; reported scores are
    /// cosine + 1.0.
    pub async fn vector_search(
        &self,
        index: &str,
        query_vector: &[f32],
        options: VectorSearchOptions,
    ) -> StoreResult<SearchResults> {
        let field = options.field.as_deref().unwrap_or(self.schema.vector_field.as_str());
        self.check_query_dimension(index, field, query_vector).await?;

        let field = Some(field);
        let query = match options.text_query.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => build_filtered_vector_query(
                field,
                Some(query_vector),
                options.min_score,
                build_text_query(Some(text), None, None, None),
            )?,
            _ => build_vector_query(field, Some(query_vector), options.min_score)?,
        };

        self.search(
            index,
            query,
            SearchOptions {
                size: options.size,
                ..Default::default()
            },
        )
        .await
    }

    /// Weighted text + vector search. At least one of `text_query` and `vector` is required;
    /// the text branch is built by the caller with [`build_text_query`].
    pub async fn hybrid_search(
        &self,
        index: &str,
        text_query: Option<Query>,
        vector: Option<&[f32]>,
        weights: HybridWeights,
        options: SearchOptions,
    ) -> StoreResult<SearchResults> {
        if let Some(vector) = vector {
            self.check_query_dimension(index, &self.schema.vector_field, vector).await?;
        }
        let vector_query = vector
            .map(|v| build_vector_query(Some(self.schema.vector_field.as_str()), Some(v), None))
            .transpose()?;

        let query = build_hybrid_query(text_query, vector_query, weights)?;
        self.search(index, query, options).await
    }

    // ============================================================================================
    // STATS AND HEALTH
    // ============================================================================================

    /// Cluster counters and per-operation metrics. Never fails; engine errors yield a
    /// zeroed red report.
    pub async fn stats(&self) -> StoreStats {
        let operations = self.metrics.snapshot();
        let backend = self.engine.backend_name();

        let (stats, health) = tokio::join!(self.engine.cluster_stats(), self.engine.cluster_health());
        match (stats, health) {
            (Ok(stats), Ok(health)) => StoreStats {
                backend,
                indices: stats.indices,
                documents: stats.documents,
                size_bytes: stats.store_size_bytes,
                health: health.status,
                operations,
            },
            (stats, health) => {
                if let Err(e) = &stats {
                    warn!("⚠️ Cluster stats unavailable: {}", e);
                }
                if let Err(e) = &health {
                    warn!("⚠️ Cluster health unavailable: {}", e);
                }
                StoreStats {
                    backend,
                    indices: 0,
                    documents: 0,
                    size_bytes: 0,
                    health: HealthTier::Red,
                    operations,
                }
            }
        }
    }

    /// Health tier only; red when the engine cannot be reached
    pub async fn health(&self) -> HealthTier {
        match self.engine.cluster_health().await {
            Ok(health) => health.status,
            Err(e) => {
                warn!("⚠️ Cluster health unavailable: {}", e);
                HealthTier::Red
            }
        }
    }

    /// Node, shard and per-node performance report
    pub async fn extended_health(&self) -> ExtendedHealthReport {
        let (health, nodes) = tokio::join!(self.engine.cluster_health(), self.engine.node_stats());
        let mut report = ExtendedHealthReport {
            cluster_name: String::new(),
            status: HealthTier::Red,
            nodes: NodeCounts::default(),
            shards: ShardCounts::default(),
            node_performance: Vec::new(),
            operations: self.metrics.snapshot(),
            checked_at: Utc::now(),
            errors: Vec::new(),
        };

        match health {
            Ok(health) => {
                report.cluster_name = health.cluster_name;
                report.status = health.status;
                report.nodes = NodeCounts {
                    total: health.number_of_nodes,
                    data: health.number_of_data_nodes,
                };
                report.shards = ShardCounts {
                    active_primary: health.active_primary_shards,
                    active: health.active_shards,
                    relocating: health.relocating_shards,
                    initializing: health.initializing_shards,
                    unassigned: health.unassigned_shards,
                };
            }
            Err(e) => {
                warn!("⚠️ Cluster health unavailable: {}", e);
                report.errors.push(format!("cluster health: {e}"));
            }
        }
        match nodes {
            Ok(nodes) => report.node_performance = nodes,
            Err(e) => {
                warn!("⚠️ Node stats unavailable: {}", e);
                report.errors.push(format!("node stats: {e}"));
            }
        }

        report
    }
}

fn decode_source(index: &str, hit: EngineHit) -> StoreResult<Document> {
    let mut source = hit.source;
    if let Value::Object(map) = &mut source {
        map.entry("id").or_insert_with(|| json!(hit.id));
    }
    serde_json::from_value(source).map_err(|source| StoreError::Decode {
        index: index.to_string(),
        id: hit.id,
        source,
    })
}
