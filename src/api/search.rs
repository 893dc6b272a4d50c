// ================================================================================================
// SEARCH API
// ================================================================================================
//
// Keyword search, cosine-similarity search and the weighted hybrid of both. A request that
// carries a vector is answered with the hybrid query; text-only requests use the keyword
// query with the caller's fields, operator and fuzziness.
//
// ================================================================================================

use std::collections::HashMap;

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::AppState;
use crate::error::{Error, Result};
use crate::ingestion::validate_index_name;
use crate::resilience::Dependency;
use crate::store::{
    build_text_query, AggregationBucket, Document, Fuzziness, HybridWeights, MatchOperator,
    SearchOptions, SearchResults, SortField, TermsAggregation, TotalHits, VectorSearchOptions,
};

// LIMITS: matches the engine's default result window
const MAX_PAGE_SIZE: usize = 100;
const MAX_RESULT_WINDOW: usize = 10_000;

// ================================================================================================
// API TYPES
// ================================================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    pub index: Option<String>,
    pub query: Option<String>,
    pub vector: Option<Vec<f32>>,
    #[serde(default)]
    pub fields: Vec<String>,
    pub operator: Option<MatchOperator>,
    pub fuzziness: Option<Fuzziness>,
    pub weights: Option<HybridWeights>,
    pub size: Option<usize>,
    pub from: Option<usize>,
    #[serde(default)]
    pub sort: Vec<SortField>,
    #[serde(default)]
    pub aggregations: Vec<TermsAggregation>,
}

#[derive(Debug, Deserialize)]
pub struct VectorSearchRequest {
    pub index: Option<String>,
    pub vector: Vec<f32>,
    pub size: Option<usize>,
    /// Raw cosine similarity threshold
    pub min_score: Option<f32>,
    /// Optional keyword pre-filter
    pub text_query: Option<String>,
    pub field: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchHitResponse {
    pub id: String,
    pub score: f32,
    pub source: Document,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHitResponse>,
    pub total: TotalHits,
    pub took: u64,
    pub max_score: Option<f32>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub aggregations: HashMap<String, Vec<AggregationBucket>>,
}

impl From<SearchResults> for SearchResponse {
    fn from(results: SearchResults) -> Self {
        Self {
            hits: results
                .hits
                .into_iter()
                .map(|hit| SearchHitResponse {
                    id: hit.id,
                    score: hit.score,
                    source: hit.source,
                })
                .collect(),
            total: results.total,
            took: results.took_ms,
            max_score: results.max_score,
            aggregations: results.aggregations,
        }
    }
}

fn page(size: Option<usize>, from: Option<usize>) -> Result<(usize, usize)> {
    let size = size.unwrap_or(SearchOptions::default().size);
    let from = from.unwrap_or(0);
    if size > MAX_PAGE_SIZE {
        return Err(Error::Validation(format!("size must be at most {MAX_PAGE_SIZE}")));
    }
    match from.checked_add(size) {
        Some(end) if end <= MAX_RESULT_WINDOW => {}
        _ => {
            return Err(Error::Validation(format!(
                "from + size must be at most {MAX_RESULT_WINDOW}"
            )))
        }
    }
    Ok((size, from))
}

// ================================================================================================
// API HANDLERS
// ================================================================================================

pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let index = request
        .index
        .unwrap_or_else(|| state.ctx.default_index().to_string());
    validate_index_name(&index)?;
    let (size, from) = page(request.size, request.from)?;

    let options = SearchOptions {
        size,
        from,
        sort: request.sort,
        aggregations: request.aggregations,
        ..Default::default()
    };
    let store = state.ctx.store();
    let guard = state.ctx.guard(Dependency::Search);
    let fields = (!request.fields.is_empty()).then_some(request.fields.as_slice());

    let results = match request.vector {
        Some(vector) => {
            let weights = request.weights.unwrap_or_default();
            debug!(index = %index, text_weight = weights.text_weight, vector_weight = weights.vector_weight, "Hybrid search");
            // Blank text leaves the vector branch alone
            let text_query = request
                .query
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(|text| build_text_query(Some(text), fields, request.operator, request.fuzziness));
            guard
                .run(format!("hybrid:{index}"), || {
                    store.hybrid_search(&index, text_query, Some(vector.as_slice()), weights, options)
                })
                .await?
        }
        None => {
            let query = build_text_query(
                request.query.as_deref(),
                fields,
                request.operator,
                request.fuzziness,
            );
            guard
                .run(format!("search:{index}"), || store.search(&index, query, options))
                .await?
        }
    };

    Ok(Json(results.into()))
}

pub async fn vector_search(
    State(state): State<AppState>,
    Json(request): Json<VectorSearchRequest>,
) -> Result<Json<SearchResponse>> {
    let index = request
        .index
        .unwrap_or_else(|| state.ctx.default_index().to_string());
    validate_index_name(&index)?;
    let (size, _) = page(request.size, None)?;
    if let Some(min_score) = request.min_score {
        if !(-1.0..=1.0).contains(&min_score) {
            return Err(Error::Validation(
                "min_score is a cosine similarity and must be within [-1, 1]".to_string(),
            ));
        }
    }

    let options = VectorSearchOptions {
        size,
        min_score: request.min_score,
        text_query: request.text_query,
        field: request.field,
    };
    let store = state.ctx.store();
    let results = state
        .ctx
        .guard(Dependency::Search)
        .run(format!("vector:{index}"), || {
            store.vector_search(&index, &request.vector, options)
        })
        .await?;

    Ok(Json(results.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_limits() {
        assert_eq!(page(None, None).unwrap(), (10, 0));
        assert_eq!(page(Some(25), Some(50)).unwrap(), (25, 50));
        assert!(page(Some(MAX_PAGE_SIZE + 1), None).is_err());
        assert!(page(Some(50), Some(MAX_RESULT_WINDOW)).is_err());
        assert!(matches!(page(Some(10), Some(usize::MAX)), Err(Error::Validation(_))));
    }

    #[test]
    fn test_search_request_defaults() {
        let request: SearchRequest = serde_json::from_str(r#"{"query": "rust"}"#).unwrap();
        assert!(request.vector.is_none());
        assert!(request.fields.is_empty());
        assert!(request.index.is_none());

        let request: SearchRequest = serde_json::from_str(
            r#"{"query": "rust", "vector": [0.1, 0.2], "weights": {"text_weight": 0.3, "vector_weight": 0.7}, "operator": "and"}"#,
        )
        .unwrap();
        assert_eq!(request.weights.unwrap().vector_weight, 0.7);
        assert_eq!(request.operator, Some(MatchOperator::And));
    }
}
