// ================================================================================================
// QUERY BUILDER - KEYWORD, VECTOR AND HYBRID QUERY TREES
// ================================================================================================
//
// Pure, stateless builders. Every builder returns a `Query` tree and never executes anything.
// `Query` is a closed sum type so both engine adapters match on it exhaustively.
//
// Hybrid scoring: bool.should of a weighted text branch and a weighted vector branch, each
// contributing `score * weight`, summed, with at least one branch required to match. Weights
// are plain multipliers and branch scores are not normalised against each other.
//
// ================================================================================================

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::schema::DEFAULT_VECTOR_FIELD;

/// Offset added to cosine similarity so vector scores stay non-negative
pub const COSINE_SCORE_OFFSET: f32 = 1.0;

pub const DEFAULT_TEXT_FIELDS: &[&str] = &["title^3", "abstract^2", "content", "tags", "authors"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOperator {
    #[default]
    Or,
    And,
}

impl MatchOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOperator::Or => "or",
            MatchOperator::And => "and",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fuzziness {
    #[default]
    Auto,
    Exact(u8),
    None,
}

impl Fuzziness {
    /// Maximum edit distance allowed for a term of `term_len` characters
    pub fn max_edits(&self, term_len: usize) -> usize {
        match self {
            Fuzziness::Auto => match term_len {
                0..=2 => 0,
                3..=5 => 1,
                _ => 2,
            },
            Fuzziness::Exact(edits) => *edits as usize,
            Fuzziness::None => 0,
        }
    }

    fn to_engine_json(self) -> Option<Value> {
        match self {
            Fuzziness::Auto => Some(json!("AUTO")),
            Fuzziness::Exact(edits) => Some(json!(edits.to_string())),
            Fuzziness::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextQuery {
    pub query: String,
    pub fields: Vec<String>,
    pub operator: MatchOperator,
    pub fuzziness: Fuzziness,
}

/// Scoring scripts understood by both engines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreScript {
    /// `cosineSimilarity(query_vector, field) + offset`
    CosineSimilarity {
        field: String,
        query_vector: Vec<f32>,
        offset: f32,
    },
    /// `_score * weight`
    Weight { weight: f32 },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoolQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
    pub filter: Vec<Query>,
    pub must_not: Vec<Query>,
    pub minimum_should_match: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    MatchAll,
    MultiMatch(TextQuery),
    Exists {
        field: String,
    },
    Term {
        field: String,
        value: Value,
    },
    ScriptScore {
        query: Box<Query>,
        script: ScoreScript,
        min_score: Option<f32>,
    },
    Bool(BoolQuery),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("vector query requires a non-empty query vector")]
    EmptyVector,

    #[error("query vector contains non-finite values")]
    NonFiniteVector,

    #[error("hybrid query requires at least one of a text or vector sub-query")]
    NoSubQuery,
}

/// Branch multipliers for hybrid queries. Not required to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub text_weight: f32,
    pub vector_weight: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            text_weight: 0.5,
            vector_weight: 0.5,
        }
    }
}

/// Multi-field keyword query. Defaults to OR semantics, AUTO fuzziness and
/// [`DEFAULT_TEXT_FIELDS`]; an absent or blank query matches everything.
pub fn build_text_query(
    query: Option<&str>,
    fields: Option<&[String]>,
    operator: Option<MatchOperator>,
    fuzziness: Option<Fuzziness>,
) -> Query {
    let text = match query.map(str::trim) {
        Some(text) if !text.is_empty() => text,
        _ => return Query::MatchAll,
    };

    let fields = match fields {
        Some(fields) if !fields.is_empty() => fields.to_vec(),
        _ => DEFAULT_TEXT_FIELDS.iter().map(|f| f.to_string()).collect(),
    };

    Query::MultiMatch(TextQuery {
        query: text.to_string(),
        fields,
        operator: operator.unwrap_or_default(),
        fuzziness: fuzziness.unwrap_or_default(),
    })
}

/// Cosine-similarity query over `field`. Only documents carrying the field are
/// candidates; scores are `cosine + 1.0`. `min_score` is expressed in raw cosine
/// terms and shifted by the same offset.
pub fn build_vector_query(
    field: Option<&str>,
    vector: Option<&[f32]>,
    min_score: Option<f32>,
) -> Result<Query, QueryError> {
    build_vector_query_over(field, vector, min_score, None)
}

/// Vector query whose candidates are first narrowed by a keyword query.
pub fn build_filtered_vector_query(
    field: Option<&str>,
    vector: Option<&[f32]>,
    min_score: Option<f32>,
    prefilter: Query,
) -> Result<Query, QueryError> {
    build_vector_query_over(field, vector, min_score, Some(prefilter))
}

fn build_vector_query_over(
    field: Option<&str>,
    vector: Option<&[f32]>,
    min_score: Option<f32>,
    prefilter: Option<Query>,
) -> Result<Query, QueryError> {
    let vector = match vector {
        Some(v) if !v.is_empty() => v,
        _ => return Err(QueryError::EmptyVector),
    };
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(QueryError::NonFiniteVector);
    }
    let field = field.unwrap_or(DEFAULT_VECTOR_FIELD).to_string();

    let candidates = BoolQuery {
        must: prefilter.into_iter().collect(),
        filter: vec![Query::Exists {
            field: field.clone(),
        }],
        ..Default::default()
    };

    Ok(Query::ScriptScore {
        query: Box::new(Query::Bool(candidates)),
        script: ScoreScript::CosineSimilarity {
            field,
            query_vector: vector.to_vec(),
            offset: COSINE_SCORE_OFFSET,
        },
        min_score: min_score.map(|s| s + COSINE_SCORE_OFFSET),
    })
}

/// Weighted blend of a text and a vector sub-query.
pub fn build_hybrid_query(
    text_query: Option<Query>,
    vector_query: Option<Query>,
    weights: HybridWeights,
) -> Result<Query, QueryError> {
    if text_query.is_none() && vector_query.is_none() {
        return Err(QueryError::NoSubQuery);
    }

    let mut should = Vec::with_capacity(2);
    if let Some(text) = text_query {
        should.push(weighted(text, weights.text_weight));
    }
    if let Some(vector) = vector_query {
        should.push(weighted(vector, weights.vector_weight));
    }

    Ok(Query::Bool(BoolQuery {
        should,
        minimum_should_match: Some(1),
        ..Default::default()
    }))
}

fn weighted(query: Query, weight: f32) -> Query {
    Query::ScriptScore {
        query: Box::new(query),
        script: ScoreScript::Weight { weight },
        min_score: None,
    }
}

impl Query {
    /// Render the query tree in the engine's native JSON form
    pub fn to_engine_json(&self) -> Value {
        match self {
            Query::MatchAll => json!({ "match_all": {} }),
            Query::MultiMatch(text) => {
                let mut body = Map::new();
                body.insert("query".into(), json!(text.query));
                body.insert("fields".into(), json!(text.fields));
                body.insert("operator".into(), json!(text.operator.as_str()));
                body.insert("type".into(), json!("best_fields"));
                if let Some(fuzziness) = text.fuzziness.to_engine_json() {
                    body.insert("fuzziness".into(), fuzziness);
                }
                json!({ "multi_match": Value::Object(body) })
            }
            Query::Exists { field } => json!({ "exists": { "field": field } }),
            Query::Term { field, value } => json!({ "term": { field.as_str(): value } }),
            Query::ScriptScore {
                query,
                script,
                min_score,
            } => {
                let script_json = match script {
                    ScoreScript::CosineSimilarity {
                        field,
                        query_vector,
                        offset,
                    } => json!({
                        "source": format!("cosineSimilarity(params.query_vector, '{field}') + {offset:.1}"),
                        "params": { "query_vector": query_vector }
                    }),
                    ScoreScript::Weight { weight } => json!({
                        "source": "_score * params.weight",
                        "params": { "weight": weight }
                    }),
                };
                let mut body = Map::new();
                body.insert("query".into(), query.to_engine_json());
                body.insert("script".into(), script_json);
                if let Some(min_score) = min_score {
                    body.insert("min_score".into(), json!(min_score));
                }
                json!({ "script_score": Value::Object(body) })
            }
            Query::Bool(bool_query) => {
                let mut body = Map::new();
                let clauses = [
                    ("must", &bool_query.must),
                    ("should", &bool_query.should),
                    ("filter", &bool_query.filter),
                    ("must_not", &bool_query.must_not),
                ];
                for (name, clause) in clauses {
                    if !clause.is_empty() {
                        body.insert(
                            name.into(),
                            Value::Array(clause.iter().map(Query::to_engine_json).collect()),
                        );
                    }
                }
                if let Some(msm) = bool_query.minimum_should_match {
                    body.insert("minimum_should_match".into(), json!(msm));
                }
                json!({ "bool": Value::Object(body) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch_weight(branch: &Query) -> f32 {
        match branch {
            Query::ScriptScore {
                script: ScoreScript::Weight { weight },
                ..
            } => *weight,
            other => panic!("expected weighted branch, got {other:?}"),
        }
    }

    #[test]
    fn test_text_query_defaults() {
        let query = build_text_query(Some("rust async"), None, None, None);
        match query {
            Query::MultiMatch(text) => {
                assert_eq!(text.query, "rust async");
                assert_eq!(text.operator, MatchOperator::Or);
                assert_eq!(text.fuzziness, Fuzziness::Auto);
                assert_eq!(text.fields.len(), DEFAULT_TEXT_FIELDS.len());
            }
            other => panic!("unexpected query {other:?}"),
        }
    }

    #[test]
    fn test_absent_text_query_matches_everything() {
        assert_eq!(build_text_query(None, None, None, None), Query::MatchAll);
        assert_eq!(build_text_query(Some("   "), None, None, None), Query::MatchAll);
    }

    #[test]
    fn test_vector_query_requires_vector() {
        assert_eq!(
            build_vector_query(None, None, None).unwrap_err(),
            QueryError::EmptyVector
        );
        assert_eq!(
            build_vector_query(None, Some(&[]), None).unwrap_err(),
            QueryError::EmptyVector
        );
        assert_eq!(
            build_vector_query(None, Some(&[f32::NAN]), None).unwrap_err(),
            QueryError::NonFiniteVector
        );
    }

    #[test]
    fn test_vector_query_structure() {
        let query = build_vector_query(Some("embeddings"), Some(&[1.0, 0.0]), Some(0.8)).unwrap();
        let body = query.to_engine_json();

        let script_score = &body["script_score"];
        assert_eq!(
            script_score["query"]["bool"]["filter"][0]["exists"]["field"],
            "embeddings"
        );
        assert_eq!(
            script_score["script"]["source"],
            "cosineSimilarity(params.query_vector, 'embeddings') + 1.0"
        );
        assert_eq!(script_score["script"]["params"]["query_vector"], json!([1.0, 0.0]));
        let min_score = script_score["min_score"].as_f64().unwrap();
        assert!((min_score - 1.8).abs() < 1e-6);
    }

    #[test]
    fn test_hybrid_query_weights() {
        let text = build_text_query(Some("graph search"), None, None, None);
        let vector = build_vector_query(None, Some(&[0.1, 0.2, 0.3]), None).unwrap();

        let hybrid = build_hybrid_query(
            Some(text),
            Some(vector),
            HybridWeights {
                text_weight: 0.3,
                vector_weight: 0.7,
            },
        )
        .unwrap();

        match &hybrid {
            Query::Bool(bool_query) => {
                assert_eq!(bool_query.minimum_should_match, Some(1));
                assert_eq!(bool_query.should.len(), 2);
                assert!((branch_weight(&bool_query.should[0]) - 0.3).abs() < f32::EPSILON);
                assert!((branch_weight(&bool_query.should[1]) - 0.7).abs() < f32::EPSILON);
                assert!(bool_query.must.is_empty());
            }
            other => panic!("expected bool query, got {other:?}"),
        }

        let body = hybrid.to_engine_json();
        assert_eq!(body["bool"]["minimum_should_match"], 1);
        assert_eq!(
            body["bool"]["should"][0]["script_score"]["script"]["source"],
            "_score * params.weight"
        );
        assert!(body["bool"]["should"][0]["script_score"]["query"]["multi_match"].is_object());
    }

    #[test]
    fn test_hybrid_query_needs_a_branch() {
        assert_eq!(
            build_hybrid_query(None, None, HybridWeights::default()).unwrap_err(),
            QueryError::NoSubQuery
        );

        let text_only = build_hybrid_query(
            Some(build_text_query(Some("x"), None, None, None)),
            None,
            HybridWeights::default(),
        )
        .unwrap();
        match text_only {
            Query::Bool(b) => assert_eq!(b.should.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_weights_are_not_normalised() {
        let hybrid = build_hybrid_query(
            Some(Query::MatchAll),
            Some(Query::MatchAll),
            HybridWeights {
                text_weight: 2.0,
                vector_weight: 3.0,
            },
        )
        .unwrap();
        let body = hybrid.to_engine_json();
        let w0 = body["bool"]["should"][0]["script_score"]["script"]["params"]["weight"]
            .as_f64()
            .unwrap();
        let w1 = body["bool"]["should"][1]["script_score"]["script"]["params"]["weight"]
            .as_f64()
            .unwrap();
        assert_eq!(w0, 2.0);
        assert_eq!(w1, 3.0);
    }

    #[test]
    fn test_fuzziness_auto_edits() {
        assert_eq!(Fuzziness::Auto.max_edits(2), 0);
        assert_eq!(Fuzziness::Auto.max_edits(4), 1);
        assert_eq!(Fuzziness::Auto.max_edits(9), 2);
        assert_eq!(Fuzziness::None.max_edits(9), 0);
    }
}
