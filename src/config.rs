use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::queue::OperationQueueConfig;
use crate::resilience::CircuitBreakerConfig;
use crate::store::schema::{HnswOptions, DEFAULT_VECTOR_DIMENSION};
use crate::store::{EngineBackend, ElasticsearchConfig, VectorIndexSchema};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub index: IndexSettings,
    pub queue: QueueSettings,
    pub breaker: BreakerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub backend: EngineBackend,
    pub url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    pub default_index: String,
    pub vector_dimension: usize,
    pub shards: u32,
    pub replicas: u32,
    pub hnsw_m: u32,
    pub hnsw_ef_construction: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    pub max_concurrent: usize,
    pub max_queue_size: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let hnsw = HnswOptions::default();
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                log_level: "info".to_string(),
            },
            engine: EngineConfig {
                backend: EngineBackend::Auto,
                url: "http://localhost:9200".to_string(),
                api_key: None,
                timeout_secs: 30,
            },
            index: IndexSettings {
                default_index: "documents".to_string(),
                vector_dimension: DEFAULT_VECTOR_DIMENSION,
                shards: 1,
                replicas: 1,
                hnsw_m: hnsw.m,
                hnsw_ef_construction: hnsw.ef_construction,
            },
            queue: QueueSettings {
                max_concurrent: 4,
                max_queue_size: 100,
                timeout_ms: 30_000,
            },
            breaker: BreakerSettings {
                failure_threshold: 5,
                reset_timeout_ms: 30_000,
            },
        }
    }
}

/// Parse `key` from the environment. Unset keys take the default; unparseable ones are
/// logged and take the default too.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("⚠️ Ignoring invalid {}='{}' ({}), using default", key, raw, e);
            default
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or(defaults.server.host),
                port: env_or("PORT", defaults.server.port),
                log_level: env::var("LOG_LEVEL").unwrap_or(defaults.server.log_level),
            },
            engine: EngineConfig {
                backend: env_or("SEARCH_BACKEND", defaults.engine.backend),
                url: env::var("SEARCH_ENGINE_URL").unwrap_or(defaults.engine.url),
                api_key: env::var("SEARCH_ENGINE_API_KEY").ok().filter(|k| !k.is_empty()),
                timeout_secs: env_or("SEARCH_ENGINE_TIMEOUT_SECS", defaults.engine.timeout_secs),
            },
            index: IndexSettings {
                default_index: env::var("DEFAULT_INDEX").unwrap_or(defaults.index.default_index),
                vector_dimension: env_or("VECTOR_DIMENSION", defaults.index.vector_dimension),
                shards: env_or("INDEX_SHARDS", defaults.index.shards),
                replicas: env_or("INDEX_REPLICAS", defaults.index.replicas),
                hnsw_m: env_or("HNSW_M", defaults.index.hnsw_m),
                hnsw_ef_construction: env_or("HNSW_EF_CONSTRUCTION", defaults.index.hnsw_ef_construction),
            },
            queue: QueueSettings {
                max_concurrent: env_or("QUEUE_MAX_CONCURRENT", defaults.queue.max_concurrent),
                max_queue_size: env_or("QUEUE_MAX_SIZE", defaults.queue.max_queue_size),
                timeout_ms: env_or("QUEUE_TIMEOUT_MS", defaults.queue.timeout_ms),
            },
            breaker: BreakerSettings {
                failure_threshold: env_or("BREAKER_FAILURE_THRESHOLD", defaults.breaker.failure_threshold),
                reset_timeout_ms: env_or("BREAKER_RESET_TIMEOUT_MS", defaults.breaker.reset_timeout_ms),
            },
        }
    }

    pub fn load() -> anyhow::Result<Self> {
        let config = Self::from_env();
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.engine.url.is_empty() {
            return Err("Search engine URL cannot be empty".to_string());
        }
        if self.engine.timeout_secs == 0 {
            return Err("Search engine timeout must be greater than 0".to_string());
        }
        if self.index.default_index.is_empty() {
            return Err("Default index name cannot be empty".to_string());
        }
        if self.index.vector_dimension == 0 {
            return Err("Vector dimension must be greater than 0".to_string());
        }
        if self.index.shards == 0 {
            return Err("Index shard count must be greater than 0".to_string());
        }
        if self.queue.max_concurrent == 0 {
            return Err("Queue max_concurrent must be greater than 0".to_string());
        }
        if self.queue.max_queue_size < self.queue.max_concurrent {
            return Err("Queue max_queue_size must be at least max_concurrent".to_string());
        }
        if self.queue.timeout_ms == 0 {
            return Err("Queue timeout must be greater than 0".to_string());
        }
        if self.breaker.failure_threshold == 0 {
            return Err("Breaker failure threshold must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn elasticsearch_config(&self) -> ElasticsearchConfig {
        ElasticsearchConfig {
            url: self.engine.url.clone(),
            api_key: self.engine.api_key.clone(),
            timeout: Duration::from_secs(self.engine.timeout_secs),
        }
    }

    pub fn queue_config(&self) -> OperationQueueConfig {
        OperationQueueConfig {
            max_concurrent: self.queue.max_concurrent,
            max_queue_size: self.queue.max_queue_size,
            timeout: Duration::from_millis(self.queue.timeout_ms),
        }
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            reset_timeout: Duration::from_millis(self.breaker.reset_timeout_ms),
        }
    }

    pub fn schema(&self) -> VectorIndexSchema {
        VectorIndexSchema {
            dims: self.index.vector_dimension,
            number_of_shards: self.index.shards,
            number_of_replicas: self.index.replicas,
            hnsw: HnswOptions {
                m: self.index.hnsw_m,
                ef_construction: self.index.hnsw_ef_construction,
            },
            ..VectorIndexSchema::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.index.vector_dimension, 3072);
        assert_eq!(config.engine.backend, EngineBackend::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparseable_env_values_fall_back() {
        env::set_var("HSS_TEST_BACKEND", "solr");
        env::set_var("HSS_TEST_PORT", "not-a-port");
        env::set_var("HSS_TEST_SHARDS", " 3 ");

        assert_eq!(env_or("HSS_TEST_BACKEND", EngineBackend::Memory), EngineBackend::Memory);
        assert_eq!(env_or("HSS_TEST_PORT", 8080u16), 8080);
        assert_eq!(env_or("HSS_TEST_SHARDS", 1u32), 3);
        assert_eq!(env_or("HSS_TEST_UNSET", 7u64), 7);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.queue.max_queue_size = 2;
        config.queue.max_concurrent = 4;
        assert!(config.validate().is_err());

        config = Config::default();
        config.breaker.failure_threshold = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.engine.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_component_configs() {
        let mut config = Config::default();
        config.index.vector_dimension = 3;
        config.index.hnsw_m = 32;
        config.queue.timeout_ms = 250;

        let schema = config.schema();
        assert_eq!(schema.dims, 3);
        assert_eq!(schema.hnsw.m, 32);
        assert_eq!(schema.vector_field, "embeddings");
        assert_eq!(config.queue_config().timeout, Duration::from_millis(250));
        assert_eq!(config.breaker_config().failure_threshold, 5);
    }
}
