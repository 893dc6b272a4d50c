// ================================================================================================
// VECTOR INDEX SCHEMA - FIELD MAPPINGS AND ANN PARAMETERS
// ================================================================================================
//
// Static description of what a document index stores:
// - Scalar document fields mapped as keyword/text/date
// - The dense-vector field with its dimensionality and HNSW graph parameters
// - Shard/replica counts and analyzer settings
//
// ================================================================================================

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const DEFAULT_VECTOR_FIELD: &str = "embeddings";
pub const DEFAULT_VECTOR_DIMENSION: usize = 3072;

/// Similarity function used by the dense-vector field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorSimilarity {
    Cosine,
    DotProduct,
    L2Norm,
}

impl VectorSimilarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorSimilarity::Cosine => "cosine",
            VectorSimilarity::DotProduct => "dot_product",
            VectorSimilarity::L2Norm => "l2_norm",
        }
    }
}

/// HNSW graph construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswOptions {
    pub m: u32,
    pub ef_construction: u32,
}

impl Default for HnswOptions {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseVectorMapping {
    pub dims: usize,
    pub index: bool,
    pub similarity: VectorSimilarity,
    pub hnsw: HnswOptions,
}

/// Mapping of a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldMapping {
    Keyword,
    Text {
        analyzer: Option<String>,
        keyword_subfield: bool,
    },
    Date,
    Long,
    Float,
    Object {
        enabled: bool,
    },
    DenseVector(DenseVectorMapping),
}

impl FieldMapping {
    pub fn text() -> Self {
        FieldMapping::Text {
            analyzer: None,
            keyword_subfield: false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldMapping::Keyword => "keyword",
            FieldMapping::Text { .. } => "text",
            FieldMapping::Date => "date",
            FieldMapping::Long => "long",
            FieldMapping::Float => "float",
            FieldMapping::Object { .. } => "object",
            FieldMapping::DenseVector(_) => "dense_vector",
        }
    }

    pub fn to_engine_json(&self) -> Value {
        match self {
            FieldMapping::Text {
                analyzer,
                keyword_subfield,
            } => {
                let mut field = Map::new();
                field.insert("type".into(), json!("text"));
                if let Some(analyzer) = analyzer {
                    field.insert("analyzer".into(), json!(analyzer));
                }
                if *keyword_subfield {
                    field.insert(
                        "fields".into(),
                        json!({ "keyword": { "type": "keyword", "ignore_above": 256 } }),
                    );
                }
                Value::Object(field)
            }
            FieldMapping::Object { enabled } => json!({ "type": "object", "enabled": enabled }),
            FieldMapping::DenseVector(vector) => json!({
                "type": "dense_vector",
                "dims": vector.dims,
                "index": vector.index,
                "similarity": vector.similarity.as_str(),
                "index_options": {
                    "type": "hnsw",
                    "m": vector.hnsw.m,
                    "ef_construction": vector.hnsw.ef_construction,
                }
            }),
            other => json!({ "type": other.type_name() }),
        }
    }

    /// Parse an engine-native field mapping. `None` for types this crate does not model.
    pub fn from_engine_json(value: &Value) -> Option<Self> {
        let mapping = match value.get("type").and_then(Value::as_str).unwrap_or("object") {
            "keyword" => FieldMapping::Keyword,
            "text" => FieldMapping::Text {
                analyzer: value.get("analyzer").and_then(Value::as_str).map(String::from),
                keyword_subfield: value.pointer("/fields/keyword").is_some(),
            },
            "date" => FieldMapping::Date,
            "long" => FieldMapping::Long,
            "float" => FieldMapping::Float,
            "object" => FieldMapping::Object {
                enabled: value.get("enabled").and_then(Value::as_bool).unwrap_or(true),
            },
            "dense_vector" => {
                let similarity = match value.get("similarity").and_then(Value::as_str) {
                    Some("dot_product") => VectorSimilarity::DotProduct,
                    Some("l2_norm") => VectorSimilarity::L2Norm,
                    _ => VectorSimilarity::Cosine,
                };
                let defaults = HnswOptions::default();
                let hnsw = HnswOptions {
                    m: value
                        .pointer("/index_options/m")
                        .and_then(Value::as_u64)
                        .map_or(defaults.m, |m| m as u32),
                    ef_construction: value
                        .pointer("/index_options/ef_construction")
                        .and_then(Value::as_u64)
                        .map_or(defaults.ef_construction, |ef| ef as u32),
                };
                FieldMapping::DenseVector(DenseVectorMapping {
                    dims: value.get("dims").and_then(Value::as_u64)? as usize,
                    index: value.get("index").and_then(Value::as_bool).unwrap_or(true),
                    similarity,
                    hnsw,
                })
            }
            _ => return None,
        };
        Some(mapping)
    }
}

/// Analyzer settings applied to text fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerSettings {
    pub default_analyzer: String,
    pub stopwords: Option<String>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            default_analyzer: "standard".to_string(),
            stopwords: Some("_english_".to_string()),
        }
    }
}

/// Full description of an index as handed to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    pub analysis: AnalyzerSettings,
    pub dynamic: bool,
    pub properties: BTreeMap<String, FieldMapping>,
}

impl IndexDescriptor {
    /// Dimension of the named dense-vector field, if mapped
    pub fn vector_dimension(&self, field: &str) -> Option<usize> {
        match self.properties.get(field) {
            Some(FieldMapping::DenseVector(vector)) => Some(vector.dims),
            _ => None,
        }
    }

    pub fn properties_json(&self) -> Map<String, Value> {
        self.properties
            .iter()
            .map(|(name, mapping)| (name.clone(), mapping.to_engine_json()))
            .collect()
    }

    /// Body of a create-index request
    pub fn to_engine_json(&self) -> Value {
        let mut analyzer = Map::new();
        analyzer.insert("type".into(), json!(self.analysis.default_analyzer));
        if let Some(stopwords) = &self.analysis.stopwords {
            analyzer.insert("stopwords".into(), json!(stopwords));
        }

        json!({
            "settings": {
                "number_of_shards": self.number_of_shards,
                "number_of_replicas": self.number_of_replicas,
                "analysis": {
                    "analyzer": { "default": Value::Object(analyzer) }
                }
            },
            "mappings": {
                "dynamic": self.dynamic,
                "properties": Value::Object(self.properties_json()),
            }
        })
    }
}

/// Schema for document indices: which fields are stored and how the
/// vector field is indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndexSchema {
    pub vector_field: String,
    pub dims: usize,
    pub similarity: VectorSimilarity,
    pub hnsw: HnswOptions,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    pub analysis: AnalyzerSettings,
}

impl Default for VectorIndexSchema {
    fn default() -> Self {
        Self {
            vector_field: DEFAULT_VECTOR_FIELD.to_string(),
            dims: DEFAULT_VECTOR_DIMENSION,
            similarity: VectorSimilarity::Cosine,
            hnsw: HnswOptions::default(),
            number_of_shards: 1,
            number_of_replicas: 1,
            analysis: AnalyzerSettings::default(),
        }
    }
}

impl VectorIndexSchema {
    pub fn with_dims(dims: usize) -> Self {
        Self {
            dims,
            ..Self::default()
        }
    }

    pub fn field_mappings(&self) -> BTreeMap<String, FieldMapping> {
        let mut properties = BTreeMap::new();
        properties.insert("id".to_string(), FieldMapping::Keyword);
        properties.insert(
            "title".to_string(),
            FieldMapping::Text {
                analyzer: None,
                keyword_subfield: true,
            },
        );
        properties.insert("content".to_string(), FieldMapping::text());
        properties.insert("abstract".to_string(), FieldMapping::text());
        properties.insert("authors".to_string(), FieldMapping::Keyword);
        properties.insert("tags".to_string(), FieldMapping::Keyword);
        properties.insert("source".to_string(), FieldMapping::Keyword);
        properties.insert("processing_status".to_string(), FieldMapping::Keyword);
        properties.insert("metadata".to_string(), FieldMapping::Object { enabled: false });
        properties.insert("created_at".to_string(), FieldMapping::Date);
        properties.insert("updated_at".to_string(), FieldMapping::Date);
        properties.insert(
            self.vector_field.clone(),
            FieldMapping::DenseVector(DenseVectorMapping {
                dims: self.dims,
                index: true,
                similarity: self.similarity,
                hnsw: self.hnsw,
            }),
        );
        properties
    }

    pub fn descriptor(&self, name: impl Into<String>) -> IndexDescriptor {
        IndexDescriptor {
            name: name.into(),
            number_of_shards: self.number_of_shards,
            number_of_replicas: self.number_of_replicas,
            analysis: self.analysis.clone(),
            dynamic: false,
            properties: self.field_mappings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_engine_json() {
        let descriptor = VectorIndexSchema::default().descriptor("docs");
        let body = descriptor.to_engine_json();

        assert_eq!(body["settings"]["number_of_shards"], 1);
        assert_eq!(body["settings"]["number_of_replicas"], 1);
        assert_eq!(body["mappings"]["dynamic"], false);

        let vector = &body["mappings"]["properties"]["embeddings"];
        assert_eq!(vector["type"], "dense_vector");
        assert_eq!(vector["dims"], 3072);
        assert_eq!(vector["index"], true);
        assert_eq!(vector["similarity"], "cosine");
        assert_eq!(vector["index_options"]["type"], "hnsw");
        assert_eq!(vector["index_options"]["m"], 16);
        assert_eq!(vector["index_options"]["ef_construction"], 100);

        assert_eq!(body["mappings"]["properties"]["tags"]["type"], "keyword");
        assert_eq!(body["mappings"]["properties"]["content"]["type"], "text");
        assert_eq!(
            body["mappings"]["properties"]["title"]["fields"]["keyword"]["type"],
            "keyword"
        );
    }

    #[test]
    fn test_field_mapping_parses_its_own_json() {
        for mapping in VectorIndexSchema::with_dims(8).field_mappings().values() {
            let parsed = FieldMapping::from_engine_json(&mapping.to_engine_json());
            assert_eq!(parsed.as_ref(), Some(mapping));
        }
        assert!(FieldMapping::from_engine_json(&json!({ "type": "geo_point" })).is_none());
    }

    #[test]
    fn test_vector_dimension_lookup() {
        let descriptor = VectorIndexSchema::with_dims(3).descriptor("docs");
        assert_eq!(descriptor.vector_dimension("embeddings"), Some(3));
        assert_eq!(descriptor.vector_dimension("title"), None);
        assert_eq!(descriptor.vector_dimension("missing"), None);
    }
}
