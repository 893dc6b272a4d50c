// ================================================================================================
// ELASTICSEARCH ENGINE - HTTP ADAPTER
// ================================================================================================
//
// `SearchEngine` implementation over the Elasticsearch REST API:
// - One shared `reqwest::Client` with a request timeout
// - Optional `ApiKey` authentication
// - Writes use `refresh=wait_for` so they are visible to the next search
// - Every non-2xx response is classified into an `EngineErrorKind` in `classify_response`
//
// ================================================================================================

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::engine::{
    AggregationBucket, BulkAction, BulkItemResult, BulkOperation, BulkResponse,
    ClusterHealthInfo, ClusterStatsInfo, EngineError, EngineErrorKind, EngineHit, EngineResult,
    EngineSearchResponse, HealthTier, NodePerformance, SearchEngine, SearchRequest, SortOrder,
    TotalHits, TotalRelation, WriteAck, WriteResult,
};
use super::query::Query;
use super::schema::{FieldMapping, IndexDescriptor};
use super::Document;

/// Connection settings for an Elasticsearch cluster
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct ElasticsearchEngine {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl ElasticsearchEngine {
    pub fn new(config: ElasticsearchConfig) -> EngineResult<Self> {
        info!("🔗 Initializing Elasticsearch client: {}", config.url);

        let base_url = Url::parse(&config.url).map_err(|e| {
            EngineError::new(
                EngineErrorKind::Other,
                format!("invalid engine url '{}': {e}", config.url),
            )
        })?;
        if base_url.cannot_be_a_base() {
            return Err(EngineError::new(
                EngineErrorKind::Other,
                format!("engine url '{}' cannot be used as a base", config.url),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                EngineError::new(EngineErrorKind::Other, format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
        })
    }

    /// Cheap reachability check against the cluster root
    pub async fn ping(&self) -> EngineResult<()> {
        self.send(self.request(Method::GET, &[], &[])).await.map(|_| ())
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str], query: &[(&str, &str)]) -> RequestBuilder {
        let mut request = self.client.request(method, self.url(segments, query));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("ApiKey {key}"));
        }
        request
    }

    /// Send a request and return status plus parsed body, without judging the status
    async fn send_raw(&self, request: RequestBuilder) -> EngineResult<(StatusCode, Value)> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok((status, body))
    }

    async fn send(&self, request: RequestBuilder) -> EngineResult<Value> {
        let (status, body) = self.send_raw(request).await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_response(status.as_u16(), &body))
        }
    }
}

fn transport_error(error: reqwest::Error) -> EngineError {
    let kind = if error.is_timeout() {
        EngineErrorKind::Timeout
    } else if error.is_connect() || error.is_request() {
        EngineErrorKind::Connection
    } else {
        EngineErrorKind::Other
    };
    EngineError::new(kind, error.to_string())
}

/// Map an error response onto an `EngineErrorKind`
pub fn classify_response(status: u16, body: &Value) -> EngineError {
    let error_type = body
        .pointer("/error/type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let reason = body
        .pointer("/error/reason")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| body.get("error").and_then(Value::as_str).map(String::from))
        .or_else(|| body.get("result").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| format!("engine responded with status {status}"));

    let kind = match error_type {
        "resource_already_exists_exception" => EngineErrorKind::AlreadyExists,
        "index_not_found_exception" | "document_missing_exception" => EngineErrorKind::NotFound,
        "version_conflict_engine_exception" => EngineErrorKind::VersionConflict,
        "mapper_parsing_exception"
        | "document_parsing_exception"
        | "strict_dynamic_mapping_exception" => EngineErrorKind::Mapping,
        "illegal_argument_exception" if reason.contains("mapper") => EngineErrorKind::Mapping,
        _ => match status {
            404 => EngineErrorKind::NotFound,
            409 => EngineErrorKind::VersionConflict,
            408 | 504 => EngineErrorKind::Timeout,
            429 | 500..=599 => EngineErrorKind::Server,
            400..=499 => EngineErrorKind::BadRequest,
            _ => EngineErrorKind::Other,
        },
    };

    EngineError::new(kind, reason).with_status(status)
}

fn decode_error(what: &str, error: serde_json::Error) -> EngineError {
    EngineError::new(
        EngineErrorKind::Other,
        format!("unexpected {what} response: {error}"),
    )
}

#[derive(Debug, Deserialize)]
struct WriteResponseBody {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_version")]
    version: u64,
    result: WriteResult,
}

impl From<WriteResponseBody> for WriteAck {
    fn from(body: WriteResponseBody) -> Self {
        WriteAck {
            id: body.id,
            version: body.version,
            result: body.result,
        }
    }
}

fn parse_write_ack(body: Value) -> EngineResult<WriteAck> {
    serde_json::from_value::<WriteResponseBody>(body)
        .map(WriteAck::from)
        .map_err(|e| decode_error("write", e))
}

/// NDJSON body of a `_bulk` request
pub fn bulk_body(operations: &[BulkOperation]) -> EngineResult<String> {
    let mut body = String::new();
    for operation in operations {
        let header = json!({
            operation.action().as_str(): { "_index": operation.index(), "_id": operation.id() }
        });
        body.push_str(&header.to_string());
        body.push('\n');
        match operation {
            BulkOperation::Index { document, .. } => {
                let source = serde_json::to_string(document).map_err(|e| {
                    EngineError::new(EngineErrorKind::BadRequest, e.to_string()).with_status(400)
                })?;
                body.push_str(&source);
                body.push('\n');
            }
            BulkOperation::Update { partial, .. } => {
                body.push_str(&json!({ "doc": partial }).to_string());
                body.push('\n');
            }
            BulkOperation::Delete { .. } => {}
        }
    }
    Ok(body)
}

fn parse_bulk_response(body: &Value) -> EngineResult<BulkResponse> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::new(EngineErrorKind::Other, "bulk response without items"))?;

    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let (action_name, detail) = item
            .as_object()
            .and_then(|map| map.iter().next())
            .ok_or_else(|| EngineError::new(EngineErrorKind::Other, "malformed bulk item"))?;
        let action = match action_name.as_str() {
            "update" => BulkAction::Update,
            "delete" => BulkAction::Delete,
            _ => BulkAction::Index,
        };
        let status = detail.get("status").and_then(Value::as_u64).unwrap_or(500) as u16;
        let error = detail
            .get("error")
            .map(|error| classify_response(status, &json!({ "error": error })));
        let result = detail
            .get("result")
            .and_then(|r| serde_json::from_value::<WriteResult>(r.clone()).ok());

        results.push(BulkItemResult {
            action,
            index: detail.get("_index").and_then(Value::as_str).unwrap_or_default().to_string(),
            id: detail.get("_id").and_then(Value::as_str).unwrap_or_default().to_string(),
            status,
            version: detail.get("_version").and_then(Value::as_u64),
            result,
            error,
        });
    }

    Ok(BulkResponse {
        took_ms: body.get("took").and_then(Value::as_u64).unwrap_or(0),
        errors: results.iter().any(|item| item.error.is_some()),
        items: results,
    })
}

fn search_body(request: &SearchRequest) -> Value {
    let mut body = Map::new();
    body.insert("query".into(), request.query.to_engine_json());
    body.insert("size".into(), json!(request.size));
    body.insert("from".into(), json!(request.from));
    body.insert("version".into(), json!(true));
    body.insert("track_total_hits".into(), json!(request.track_total_hits));
    if let Some(min_score) = request.min_score {
        body.insert("min_score".into(), json!(min_score));
    }
    if !request.sort.is_empty() {
        let sort: Vec<Value> = request
            .sort
            .iter()
            .map(|s| {
                let order = match s.order {
                    SortOrder::Asc => "asc",
                    SortOrder::Desc => "desc",
                };
                json!({ s.field.as_str(): { "order": order } })
            })
            .collect();
        body.insert("sort".into(), Value::Array(sort));
    }
    if !request.aggregations.is_empty() {
        let aggs: Map<String, Value> = request
            .aggregations
            .iter()
            .map(|a| {
                (
                    a.name.clone(),
                    json!({ "terms": { "field": a.field, "size": a.size } }),
                )
            })
            .collect();
        body.insert("aggs".into(), Value::Object(aggs));
    }
    Value::Object(body)
}

fn parse_search_response(body: &Value) -> EngineResult<EngineSearchResponse> {
    let hits_section = body
        .get("hits")
        .ok_or_else(|| EngineError::new(EngineErrorKind::Other, "search response without hits"))?;

    let total = TotalHits {
        value: hits_section
            .pointer("/total/value")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        relation: match hits_section.pointer("/total/relation").and_then(Value::as_str) {
            Some("gte") => TotalRelation::Gte,
            _ => TotalRelation::Eq,
        },
    };

    let hits = hits_section
        .get("hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| EngineHit {
                    id: hit.get("_id").and_then(Value::as_str).unwrap_or_default().to_string(),
                    score: hit.get("_score").and_then(Value::as_f64).map(|s| s as f32),
                    version: hit.get("_version").and_then(Value::as_u64),
                    source: hit.get("_source").cloned().unwrap_or(Value::Null),
                })
                .collect()
        })
        .unwrap_or_default();

    let mut aggregations = HashMap::new();
    if let Some(aggs) = body.get("aggregations").and_then(Value::as_object) {
        for (name, agg) in aggs {
            let buckets = agg
                .get("buckets")
                .and_then(Value::as_array)
                .map(|buckets| {
                    buckets
                        .iter()
                        .map(|bucket| AggregationBucket {
                            key: match bucket.get("key") {
                                Some(Value::String(s)) => s.clone(),
                                Some(other) => other.to_string(),
                                None => String::new(),
                            },
                            doc_count: bucket.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
                        })
                        .collect()
                })
                .unwrap_or_default();
            aggregations.insert(name.clone(), buckets);
        }
    }

    Ok(EngineSearchResponse {
        took_ms: body.get("took").and_then(Value::as_u64).unwrap_or(0),
        total,
        max_score: hits_section
            .get("max_score")
            .and_then(Value::as_f64)
            .map(|s| s as f32),
        hits,
        aggregations,
    })
}

fn parse_node_stats(body: &Value) -> Vec<NodePerformance> {
    let Some(nodes) = body.get("nodes").and_then(Value::as_object) else {
        return Vec::new();
    };

    nodes
        .iter()
        .map(|(node_id, node)| {
            let u = |pointer: &str| node.pointer(pointer).and_then(Value::as_u64).unwrap_or(0);
            let f = |pointer: &str| node.pointer(pointer).and_then(Value::as_f64);

            let query_total = u("/indices/search/query_total");
            let index_total = u("/indices/indexing/index_total");
            let uptime_secs = (u("/jvm/uptime_in_millis") as f64 / 1000.0).max(1e-3);
            let average = |time: u64, total: u64| {
                if total == 0 {
                    0.0
                } else {
                    time as f64 / total as f64
                }
            };
            let disk_used_percent = match (f("/fs/total/total_in_bytes"), f("/fs/total/available_in_bytes")) {
                (Some(total), Some(available)) if total > 0.0 => {
                    Some((total - available) / total * 100.0)
                }
                _ => None,
            };

            NodePerformance {
                node_id: node_id.clone(),
                name: node.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                query_total,
                avg_query_latency_ms: average(u("/indices/search/query_time_in_millis"), query_total),
                queries_per_second: query_total as f64 / uptime_secs,
                index_total,
                avg_index_latency_ms: average(u("/indices/indexing/index_time_in_millis"), index_total),
                index_ops_per_second: index_total as f64 / uptime_secs,
                cpu_percent: f("/os/cpu/percent"),
                memory_used_percent: f("/os/mem/used_percent"),
                disk_used_percent,
            }
        })
        .collect()
}

const REFRESH: (&str, &str) = ("refresh", "wait_for");

#[async_trait]
impl SearchEngine for ElasticsearchEngine {
    fn backend_name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn index_exists(&self, index: &str) -> EngineResult<bool> {
        let (status, body) = self.send_raw(self.request(Method::HEAD, &[index], &[])).await?;
        match status {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(classify_response(other.as_u16(), &body)),
        }
    }

    async fn create_index(&self, descriptor: &IndexDescriptor) -> EngineResult<()> {
        debug!("📁 Creating index {}", descriptor.name);
        let request = self
            .request(Method::PUT, &[&descriptor.name], &[])
            .json(&descriptor.to_engine_json());
        self.send(request).await.map(|_| ())
    }

    async fn delete_index(&self, index: &str) -> EngineResult<()> {
        self.send(self.request(Method::DELETE, &[index], &[])).await.map(|_| ())
    }

    async fn put_mapping(&self, index: &str, properties: &Map<String, Value>) -> EngineResult<()> {
        let request = self
            .request(Method::PUT, &[index, "_mapping"], &[])
            .json(&json!({ "properties": properties }));
        self.send(request).await.map(|_| ())
    }

    async fn vector_dimension(&self, index: &str, field: &str) -> EngineResult<Option<usize>> {
        let body = self.send(self.request(Method::GET, &[index, "_mapping"], &[])).await?;
        // Keyed by concrete index name, which may differ from an alias
        let mapping = body
            .get(index)
            .or_else(|| body.as_object().and_then(|m| m.values().next()))
            .and_then(|entry| entry.pointer("/mappings/properties"))
            .and_then(|properties| properties.get(field));

        Ok(match mapping.and_then(FieldMapping::from_engine_json) {
            Some(FieldMapping::DenseVector(vector)) => Some(vector.dims),
            _ => None,
        })
    }

    async fn index_document(&self, index: &str, id: &str, document: &Document) -> EngineResult<WriteAck> {
        let request = self
            .request(Method::PUT, &[index, "_doc", id], &[REFRESH])
            .json(document);
        parse_write_ack(self.send(request).await?)
    }

    async fn get_document(&self, index: &str, id: &str) -> EngineResult<Option<EngineHit>> {
        let (status, body) = self
            .send_raw(self.request(Method::GET, &[index, "_doc", id], &[]))
            .await?;

        if status == StatusCode::NOT_FOUND && body.get("found") == Some(&Value::Bool(false)) {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_response(status.as_u16(), &body));
        }

        Ok(Some(EngineHit {
            id: id.to_string(),
            score: None,
            version: body.get("_version").and_then(Value::as_u64),
            source: body.get("_source").cloned().unwrap_or(Value::Null),
        }))
    }

    async fn update_document(&self, index: &str, id: &str, partial: &Value) -> EngineResult<WriteAck> {
        let request = self
            .request(Method::POST, &[index, "_update", id], &[REFRESH])
            .json(&json!({ "doc": partial }));
        parse_write_ack(self.send(request).await?)
    }

    async fn delete_document(&self, index: &str, id: &str) -> EngineResult<WriteAck> {
        let request = self.request(Method::DELETE, &[index, "_doc", id], &[REFRESH]);
        parse_write_ack(self.send(request).await?)
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> EngineResult<BulkResponse> {
        let request = self
            .request(Method::POST, &["_bulk"], &[REFRESH])
            .header("Content-Type", "application/x-ndjson")
            .body(bulk_body(operations)?);
        let response = parse_bulk_response(&self.send(request).await?)?;
        if response.errors {
            warn!(
                failed = response.items.iter().filter(|i| !i.is_success()).count(),
                total = response.items.len(),
                "⚠️ Bulk request completed with item failures"
            );
        }
        Ok(response)
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> EngineResult<EngineSearchResponse> {
        let http = self
            .request(Method::POST, &[index, "_search"], &[])
            .json(&search_body(request));
        parse_search_response(&self.send(http).await?)
    }

    async fn count(&self, index: &str, query: &Query) -> EngineResult<u64> {
        let request = self
            .request(Method::POST, &[index, "_count"], &[])
            .json(&json!({ "query": query.to_engine_json() }));
        let body = self.send(request).await?;
        body.get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| EngineError::new(EngineErrorKind::Other, "count response without count"))
    }

    async fn cluster_health(&self) -> EngineResult<ClusterHealthInfo> {
        let body = self
            .send(self.request(Method::GET, &["_cluster", "health"], &[]))
            .await?;
        #[derive(Deserialize)]
        struct HealthBody {
            cluster_name: String,
            status: HealthTier,
            number_of_nodes: u32,
            number_of_data_nodes: u32,
            active_primary_shards: u32,
            active_shards: u32,
            relocating_shards: u32,
            initializing_shards: u32,
            unassigned_shards: u32,
        }
        let health: HealthBody =
            serde_json::from_value(body).map_err(|e| decode_error("cluster health", e))?;

        Ok(ClusterHealthInfo {
            cluster_name: health.cluster_name,
            status: health.status,
            number_of_nodes: health.number_of_nodes,
            number_of_data_nodes: health.number_of_data_nodes,
            active_primary_shards: health.active_primary_shards,
            active_shards: health.active_shards,
            relocating_shards: health.relocating_shards,
            initializing_shards: health.initializing_shards,
            unassigned_shards: health.unassigned_shards,
        })
    }

    async fn cluster_stats(&self) -> EngineResult<ClusterStatsInfo> {
        let body = self
            .send(self.request(Method::GET, &["_cluster", "stats"], &[]))
            .await?;
        let u = |pointer: &str| body.pointer(pointer).and_then(Value::as_u64).unwrap_or(0);

        Ok(ClusterStatsInfo {
            indices: u("/indices/count"),
            documents: u("/indices/docs/count"),
            store_size_bytes: u("/indices/store/size_in_bytes"),
        })
    }

    async fn node_stats(&self) -> EngineResult<Vec<NodePerformance>> {
        let body = self
            .send(self.request(Method::GET, &["_nodes", "stats", "indices,os,fs,jvm"], &[]))
            .await?;
        Ok(parse_node_stats(&body))
    }
}
