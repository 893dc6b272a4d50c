// ================================================================================================
// IN-MEMORY SEARCH ENGINE
// ================================================================================================
//
// An in-process engine that evaluates the same `Query` trees the Elasticsearch adapter sends
// over the wire. Used for development and tests:
// - Exact cosine scoring over every candidate (no ANN graph)
// - Lightweight term-frequency keyword scoring with edit-distance fuzziness
// - Per-id versions that keep increasing across delete/re-create
// - An availability switch and artificial latency to simulate an unhealthy engine
//
// ================================================================================================

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::engine::{
    AggregationBucket, BulkItemResult, BulkOperation, BulkResponse, ClusterHealthInfo,
    ClusterStatsInfo, EngineError, EngineErrorKind, EngineHit, EngineResult,
    EngineSearchResponse, HealthTier, NodePerformance, SearchEngine, SearchRequest, SortOrder,
    TotalHits, TotalRelation, WriteAck, WriteResult,
};
use super::query::{BoolQuery, MatchOperator, Query, ScoreScript, TextQuery};
use super::schema::{FieldMapping, IndexDescriptor};
use super::Document;

#[derive(Debug)]
struct StoredEntry {
    source: Value,
    version: u64,
}

#[derive(Debug)]
struct MemoryIndex {
    descriptor: IndexDescriptor,
    docs: BTreeMap<String, StoredEntry>,
    // Last version per id, kept after deletes so versions never go backwards
    versions: HashMap<String, u64>,
}

impl MemoryIndex {
    fn new(descriptor: IndexDescriptor) -> Self {
        Self {
            descriptor,
            docs: BTreeMap::new(),
            versions: HashMap::new(),
        }
    }

    fn next_version(&mut self, id: &str) -> u64 {
        let version = self.versions.entry(id.to_string()).or_insert(0);
        *version += 1;
        *version
    }

    fn check_vectors(&self, source: &Value) -> EngineResult<()> {
        for (field, mapping) in &self.descriptor.properties {
            if let FieldMapping::DenseVector(vector) = mapping {
                if let Some(Value::Array(values)) = source.get(field) {
                    if values.len() != vector.dims {
                        return Err(EngineError::new(
                            EngineErrorKind::Mapping,
                            format!(
                                "field [{field}] has exactly [{}] dimensions but [{}] were provided",
                                vector.dims,
                                values.len()
                            ),
                        )
                        .with_status(400));
                    }
                }
            }
        }
        Ok(())
    }

    fn upsert(&mut self, id: &str, source: Value) -> EngineResult<WriteAck> {
        self.check_vectors(&source)?;
        let version = self.next_version(id);
        let result = match self.docs.insert(id.to_string(), StoredEntry { source, version }) {
            Some(_) => WriteResult::Updated,
            None => WriteResult::Created,
        };
        Ok(WriteAck {
            id: id.to_string(),
            version,
            result,
        })
    }

    fn update(&mut self, id: &str, partial: &Value) -> EngineResult<WriteAck> {
        let mut merged = match self.docs.get(id) {
            Some(entry) => entry.source.clone(),
            None => return Err(EngineError::not_found(format!("[{id}]: document missing"))),
        };
        merge_json(&mut merged, partial);
        self.check_vectors(&merged)?;
        let version = self.next_version(id);
        self.docs.insert(
            id.to_string(),
            StoredEntry {
                source: merged,
                version,
            },
        );
        Ok(WriteAck {
            id: id.to_string(),
            version,
            result: WriteResult::Updated,
        })
    }

    fn delete(&mut self, id: &str) -> EngineResult<WriteAck> {
        match self.docs.remove(id) {
            Some(_) => {
                let version = self.next_version(id);
                Ok(WriteAck {
                    id: id.to_string(),
                    version,
                    result: WriteResult::Deleted,
                })
            }
            None => Err(EngineError::not_found(format!("[{id}]: document not found"))),
        }
    }
}

pub struct InMemoryEngine {
    indices: RwLock<HashMap<String, MemoryIndex>>,
    available: AtomicBool,
    latency_ms: AtomicU64,
    query_total: AtomicU64,
    query_time_ms: AtomicU64,
    index_total: AtomicU64,
    index_time_ms: AtomicU64,
    started_at: Instant,
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            query_total: AtomicU64::new(0),
            query_time_ms: AtomicU64::new(0),
            index_total: AtomicU64::new(0),
            index_time_ms: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Simulate an outage: while unavailable every call fails with `Connection`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, AtomicOrdering::SeqCst);
        info!(available, "In-memory engine availability changed");
    }

    /// Add artificial latency to every call
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, AtomicOrdering::SeqCst);
    }

    async fn gate(&self) -> EngineResult<()> {
        let latency = self.latency_ms.load(AtomicOrdering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.available.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::new(
                EngineErrorKind::Connection,
                "in-memory engine is unavailable",
            ))
        }
    }

    fn record_index_op(&self, started: Instant) {
        self.index_total.fetch_add(1, AtomicOrdering::Relaxed);
        self.index_time_ms
            .fetch_add(started.elapsed().as_millis() as u64, AtomicOrdering::Relaxed);
    }
}

fn no_such_index(index: &str) -> EngineError {
    EngineError::not_found(format!("no such index [{index}]"))
}

fn to_source(document: &Document) -> EngineResult<Value> {
    serde_json::to_value(document).map_err(|e| {
        EngineError::new(EngineErrorKind::BadRequest, format!("unserializable document: {e}"))
            .with_status(400)
    })
}

#[async_trait]
impl SearchEngine for InMemoryEngine {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn index_exists(&self, index: &str) -> EngineResult<bool> {
        self.gate().await?;
        Ok(self.indices.read().await.contains_key(index))
    }

    async fn create_index(&self, descriptor: &IndexDescriptor) -> EngineResult<()> {
        self.gate().await?;
        let mut indices = self.indices.write().await;
        if indices.contains_key(&descriptor.name) {
            return Err(EngineError::already_exists(format!(
                "index [{}] already exists",
                descriptor.name
            )));
        }
        indices.insert(descriptor.name.clone(), MemoryIndex::new(descriptor.clone()));
        debug!(index = %descriptor.name, "Created in-memory index");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> EngineResult<()> {
        self.gate().await?;
        match self.indices.write().await.remove(index) {
            Some(_) => Ok(()),
            None => Err(no_such_index(index)),
        }
    }

    async fn put_mapping(&self, index: &str, properties: &Map<String, Value>) -> EngineResult<()> {
        self.gate().await?;
        let mut indices = self.indices.write().await;
        let memory_index = indices.get_mut(index).ok_or_else(|| no_such_index(index))?;

        let mut parsed = Vec::with_capacity(properties.len());
        for (field, body) in properties {
            let mapping = FieldMapping::from_engine_json(body).ok_or_else(|| {
                EngineError::new(
                    EngineErrorKind::Mapping,
                    format!("unsupported mapping for field [{field}]"),
                )
                .with_status(400)
            })?;
            if let Some(existing) = memory_index.descriptor.properties.get(field) {
                if existing != &mapping {
                    let message = if existing.type_name() == mapping.type_name() {
                        format!("mapper [{field}] has different parameters")
                    } else {
                        format!(
                            "mapper [{field}] cannot be changed from type [{}] to [{}]",
                            existing.type_name(),
                            mapping.type_name()
                        )
                    };
                    return Err(
                        EngineError::new(EngineErrorKind::Mapping, message).with_status(400)
                    );
                }
            }
            parsed.push((field.clone(), mapping));
        }
        memory_index.descriptor.properties.extend(parsed);
        Ok(())
    }

    async fn vector_dimension(&self, index: &str, field: &str) -> EngineResult<Option<usize>> {
        self.gate().await?;
        let indices = self.indices.read().await;
        let memory_index = indices.get(index).ok_or_else(|| no_such_index(index))?;
        Ok(memory_index.descriptor.vector_dimension(field))
    }

    async fn index_document(&self, index: &str, id: &str, document: &Document) -> EngineResult<WriteAck> {
        self.gate().await?;
        let started = Instant::now();
        let source = to_source(document)?;
        let mut indices = self.indices.write().await;
        let memory_index = indices.get_mut(index).ok_or_else(|| no_such_index(index))?;
        let ack = memory_index.upsert(id, source)?;
        self.record_index_op(started);
        Ok(ack)
    }

    async fn get_document(&self, index: &str, id: &str) -> EngineResult<Option<EngineHit>> {
        self.gate().await?;
        let indices = self.indices.read().await;
        let memory_index = indices.get(index).ok_or_else(|| no_such_index(index))?;
        Ok(memory_index.docs.get(id).map(|entry| EngineHit {
            id: id.to_string(),
            score: None,
            version: Some(entry.version),
            source: entry.source.clone(),
        }))
    }

    async fn update_document(&self, index: &str, id: &str, partial: &Value) -> EngineResult<WriteAck> {
        self.gate().await?;
        let started = Instant::now();
        let mut indices = self.indices.write().await;
        let memory_index = indices.get_mut(index).ok_or_else(|| no_such_index(index))?;
        let ack = memory_index.update(id, partial)?;
        self.record_index_op(started);
        Ok(ack)
    }

    async fn delete_document(&self, index: &str, id: &str) -> EngineResult<WriteAck> {
        self.gate().await?;
        let mut indices = self.indices.write().await;
        let memory_index = indices.get_mut(index).ok_or_else(|| no_such_index(index))?;
        memory_index.delete(id)
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> EngineResult<BulkResponse> {
        self.gate().await?;
        let started = Instant::now();
        let mut indices = self.indices.write().await;
        let mut items = Vec::with_capacity(operations.len());

        for operation in operations {
            let outcome = match indices.get_mut(operation.index()) {
                None => Err(no_such_index(operation.index())),
                Some(memory_index) => match operation {
                    BulkOperation::Index { id, document, .. } => {
                        to_source(document).and_then(|source| memory_index.upsert(id, source))
                    }
                    BulkOperation::Update { id, partial, .. } => memory_index.update(id, partial),
                    BulkOperation::Delete { id, .. } => match memory_index.delete(id) {
                        // Bulk deletes of missing documents report not_found without an error
                        Err(e) if e.kind == EngineErrorKind::NotFound => Ok(WriteAck {
                            id: id.clone(),
                            version: memory_index.versions.get(id.as_str()).copied().unwrap_or(0),
                            result: WriteResult::NotFound,
                        }),
                        other => other,
                    },
                },
            };

            items.push(match outcome {
                Ok(ack) => BulkItemResult {
                    action: operation.action(),
                    index: operation.index().to_string(),
                    id: ack.id,
                    status: match ack.result {
                        WriteResult::Created => 201,
                        WriteResult::NotFound => 404,
                        _ => 200,
                    },
                    version: Some(ack.version),
                    result: Some(ack.result),
                    error: None,
                },
                Err(error) => BulkItemResult {
                    action: operation.action(),
                    index: operation.index().to_string(),
                    id: operation.id().to_string(),
                    status: error.status.unwrap_or(500),
                    version: None,
                    result: None,
                    error: Some(error),
                },
            });
        }
        self.record_index_op(started);

        let errors = items.iter().any(|item| item.error.is_some());
        Ok(BulkResponse {
            took_ms: started.elapsed().as_millis() as u64,
            errors,
            items,
        })
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> EngineResult<EngineSearchResponse> {
        self.gate().await?;
        let started = Instant::now();
        let indices = self.indices.read().await;
        let memory_index = indices.get(index).ok_or_else(|| no_such_index(index))?;

        let mut matches: Vec<(&String, f32, &StoredEntry)> = memory_index
            .docs
            .iter()
            .filter_map(|(id, entry)| {
                score_query(&request.query, &entry.source).map(|score| (id, score, entry))
            })
            .filter(|(_, score, _)| request.min_score.map_or(true, |min| *score >= min))
            .collect();

        matches.sort_by(|a, b| {
            for sort in &request.sort {
                let ordering = if sort.field == "_score" {
                    a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal)
                } else {
                    compare_field(&a.2.source, &b.2.source, &sort.field)
                };
                let ordering = match sort.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        let matched = matches.len() as u64;
        let total = if matched > request.track_total_hits {
            TotalHits {
                value: request.track_total_hits,
                relation: TotalRelation::Gte,
            }
        } else {
            TotalHits {
                value: matched,
                relation: TotalRelation::Eq,
            }
        };

        let mut aggregations = HashMap::new();
        for aggregation in &request.aggregations {
            let mut counts: HashMap<String, u64> = HashMap::new();
            for (_, _, entry) in &matches {
                for key in keyword_values(entry.source.get(&aggregation.field)) {
                    *counts.entry(key).or_insert(0) += 1;
                }
            }
            let mut buckets: Vec<AggregationBucket> = counts
                .into_iter()
                .map(|(key, doc_count)| AggregationBucket { key, doc_count })
                .collect();
            buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
            buckets.truncate(aggregation.size);
            aggregations.insert(aggregation.name.clone(), buckets);
        }

        let max_score = matches
            .iter()
            .map(|(_, score, _)| *score)
            .fold(None, |max: Option<f32>, s| Some(max.map_or(s, |m| m.max(s))));

        let hits = matches
            .into_iter()
            .skip(request.from)
            .take(request.size)
            .map(|(id, score, entry)| EngineHit {
                id: id.clone(),
                score: Some(score),
                version: Some(entry.version),
                source: entry.source.clone(),
            })
            .collect();

        let took_ms = started.elapsed().as_millis() as u64;
        self.query_total.fetch_add(1, AtomicOrdering::Relaxed);
        self.query_time_ms.fetch_add(took_ms, AtomicOrdering::Relaxed);

        Ok(EngineSearchResponse {
            took_ms,
            total,
            max_score,
            hits,
            aggregations,
        })
    }

    async fn count(&self, index: &str, query: &Query) -> EngineResult<u64> {
        self.gate().await?;
        let indices = self.indices.read().await;
        let memory_index = indices.get(index).ok_or_else(|| no_such_index(index))?;
        Ok(memory_index
            .docs
            .values()
            .filter(|entry| score_query(query, &entry.source).is_some())
            .count() as u64)
    }

    async fn cluster_health(&self) -> EngineResult<ClusterHealthInfo> {
        self.gate().await?;
        let indices = self.indices.read().await;
        let primaries: u32 = indices.values().map(|i| i.descriptor.number_of_shards).sum();
        // Single node: replica shards can never be assigned
        let unassigned: u32 = indices
            .values()
            .map(|i| i.descriptor.number_of_shards * i.descriptor.number_of_replicas)
            .sum();
        let status = if unassigned > 0 {
            HealthTier::Yellow
        } else {
            HealthTier::Green
        };

        Ok(ClusterHealthInfo {
            cluster_name: "in-memory".to_string(),
            status,
            number_of_nodes: 1,
            number_of_data_nodes: 1,
            active_primary_shards: primaries,
            active_shards: primaries,
            relocating_shards: 0,
            initializing_shards: 0,
            unassigned_shards: unassigned,
        })
    }

    async fn cluster_stats(&self) -> EngineResult<ClusterStatsInfo> {
        self.gate().await?;
        let indices = self.indices.read().await;
        let documents = indices.values().map(|i| i.docs.len() as u64).sum();
        let store_size_bytes = indices
            .values()
            .flat_map(|i| i.docs.values())
            .map(|entry| entry.source.to_string().len() as u64)
            .sum();

        Ok(ClusterStatsInfo {
            indices: indices.len() as u64,
            documents,
            store_size_bytes,
        })
    }

    async fn node_stats(&self) -> EngineResult<Vec<NodePerformance>> {
        self.gate().await?;
        let uptime_secs = self.started_at.elapsed().as_secs_f64().max(1e-3);
        let query_total = self.query_total.load(AtomicOrdering::Relaxed);
        let index_total = self.index_total.load(AtomicOrdering::Relaxed);
        let average = |time: u64, total: u64| if total == 0 { 0.0 } else { time as f64 / total as f64 };

        Ok(vec![NodePerformance {
            node_id: "local".to_string(),
            name: "in-memory".to_string(),
            query_total,
            avg_query_latency_ms: average(self.query_time_ms.load(AtomicOrdering::Relaxed), query_total),
            queries_per_second: query_total as f64 / uptime_secs,
            index_total,
            avg_index_latency_ms: average(self.index_time_ms.load(AtomicOrdering::Relaxed), index_total),
            index_ops_per_second: index_total as f64 / uptime_secs,
            cpu_percent: None,
            memory_used_percent: None,
            disk_used_percent: None,
        }])
    }
}

// ================================================================================================
// QUERY EVALUATION
// ================================================================================================

/// Score of `query` against one document source, `None` when it does not match
fn score_query(query: &Query, source: &Value) -> Option<f32> {
    match query {
        Query::MatchAll => Some(1.0),
        Query::Exists { field } => match source.get(field) {
            Some(Value::Null) | None => None,
            Some(_) => Some(1.0),
        },
        Query::Term { field, value } => {
            let matches = match source.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                Some(stored) => stored == value,
                None => false,
            };
            matches.then_some(1.0)
        }
        Query::MultiMatch(text) => score_text(text, source),
        Query::ScriptScore {
            query,
            script,
            min_score,
        } => {
            let inner = score_query(query, source)?;
            let score = match script {
                ScoreScript::Weight { weight } => inner * weight,
                ScoreScript::CosineSimilarity {
                    field,
                    query_vector,
                    offset,
                } => {
                    let stored = vector_field(source, field)?;
                    cosine_similarity(query_vector, &stored)? + offset
                }
            };
            match min_score {
                Some(min) if score < *min => None,
                _ => Some(score),
            }
        }
        Query::Bool(bool_query) => score_bool(bool_query, source),
    }
}

fn score_bool(query: &BoolQuery, source: &Value) -> Option<f32> {
    let mut score = 0.0;

    for clause in &query.must {
        score += score_query(clause, source)?;
    }
    for clause in &query.filter {
        score_query(clause, source)?;
    }
    if query.must_not.iter().any(|clause| score_query(clause, source).is_some()) {
        return None;
    }

    let required = query.minimum_should_match.map(|m| m as usize).unwrap_or(
        if query.must.is_empty() && query.filter.is_empty() && !query.should.is_empty() {
            1
        } else {
            0
        },
    );
    let mut matched = 0;
    for clause in &query.should {
        if let Some(clause_score) = score_query(clause, source) {
            matched += 1;
            score += clause_score;
        }
    }
    if matched < required {
        return None;
    }

    Some(score)
}

fn score_text(text: &TextQuery, source: &Value) -> Option<f32> {
    let terms = tokenize(&text.query);
    if terms.is_empty() {
        return None;
    }

    let require_all = text.operator == MatchOperator::And;
    let mut best: Option<f32> = None;

    for spec in &text.fields {
        let (field, boost) = parse_field_boost(spec);
        let tokens: Vec<String> = keyword_values(source.get(field))
            .iter()
            .flat_map(|value| tokenize(value))
            .collect();
        if tokens.is_empty() {
            continue;
        }

        let mut field_score = 0.0;
        let mut matched_terms = 0;
        for term in &terms {
            let max_edits = text.fuzziness.max_edits(term.chars().count());
            let mut tf = 0usize;
            let mut exact = false;
            for token in &tokens {
                if token == term {
                    tf += 1;
                    exact = true;
                } else if max_edits > 0 && within_edits(term, token, max_edits) {
                    tf += 1;
                }
            }
            if tf > 0 {
                matched_terms += 1;
                let weight = if exact { 1.0 } else { 0.7 };
                field_score += (1.0 + (tf as f32).ln()) * weight;
            }
        }

        // best_fields: with AND every term has to appear in the same field
        if require_all && matched_terms < terms.len() {
            continue;
        }
        if field_score > 0.0 {
            let boosted = field_score * boost;
            best = Some(best.map_or(boosted, |b: f32| b.max(boosted)));
        }
    }

    best
}

fn parse_field_boost(spec: &str) -> (&str, f32) {
    let (field, boost) = match spec.split_once('^') {
        Some((field, boost)) => (field, boost.parse().unwrap_or(1.0)),
        None => (spec, 1.0),
    };
    (field.strip_suffix(".keyword").unwrap_or(field), boost)
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn keyword_values(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::Number(n)) => vec![n.to_string()],
        Some(Value::Bool(b)) => vec![b.to_string()],
        _ => Vec::new(),
    }
}

fn within_edits(a: &str, b: &str, max_edits: usize) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max_edits {
        return false;
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        current[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            current[j] = (previous[j] + 1)
                .min(current[j - 1] + 1)
                .min(previous[j - 1] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()] <= max_edits
}

fn vector_field(source: &Value, field: &str) -> Option<Vec<f32>> {
    match source.get(field)? {
        Value::Array(values) => values
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect(),
        _ => None,
    }
}

/// Cosine similarity, `None` when lengths differ or a vector has zero norm
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        None
    } else {
        Some(dot_product / (norm_a * norm_b))
    }
}

fn compare_field(a: &Value, b: &Value, field: &str) -> Ordering {
    match (a.get(field), b.get(field)) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_json(existing, value)
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
