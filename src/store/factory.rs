// ================================================================================================
// SEARCH ENGINE FACTORY - BACKEND SELECTION
// ================================================================================================
//
// Picks the engine adapter at startup:
// - `elasticsearch`: HTTP adapter, must be reachable
// - `memory`: in-process engine for development and tests
// - `auto`: Elasticsearch when it answers a ping, otherwise in-memory
//
// ================================================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::elasticsearch::{ElasticsearchConfig, ElasticsearchEngine};
use super::engine::SearchEngine;
use super::memory::InMemoryEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    Elasticsearch,
    Memory,
    #[default]
    Auto,
}

impl fmt::Display for EngineBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineBackend::Elasticsearch => "elasticsearch",
            EngineBackend::Memory => "memory",
            EngineBackend::Auto => "auto",
        })
    }
}

impl FromStr for EngineBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elasticsearch" | "es" => Ok(EngineBackend::Elasticsearch),
            "memory" | "in-memory" | "inmemory" => Ok(EngineBackend::Memory),
            "auto" => Ok(EngineBackend::Auto),
            other => Err(format!("unknown search backend '{other}'")),
        }
    }
}

/// Engine factory with fallback selection
pub struct EngineFactory;

impl EngineFactory {
    pub async fn create(
        backend: EngineBackend,
        config: ElasticsearchConfig,
    ) -> Result<Arc<dyn SearchEngine>> {
        info!("🏭 Initializing search engine factory (backend: {})", backend);

        match backend {
            EngineBackend::Elasticsearch => {
                let engine = Self::connect_elasticsearch(config)
                    .await
                    .context("Elasticsearch backend requested but unavailable")?;
                info!("✅ Using Elasticsearch search backend");
                Ok(engine)
            }
            EngineBackend::Memory => Ok(Self::create_in_memory()),
            EngineBackend::Auto => match Self::connect_elasticsearch(config).await {
                Ok(engine) => {
                    info!("✅ Using Elasticsearch search backend");
                    Ok(engine)
                }
                Err(e) => {
                    warn!("⚠️ Elasticsearch unavailable ({:#}), falling back to in-memory engine", e);
                    Ok(Self::create_in_memory())
                }
            },
        }
    }

    pub fn create_in_memory() -> Arc<dyn SearchEngine> {
        info!("💾 Creating in-memory search engine");
        Arc::new(InMemoryEngine::new())
    }

    async fn connect_elasticsearch(config: ElasticsearchConfig) -> Result<Arc<dyn SearchEngine>> {
        debug!("🔧 Elasticsearch configuration: URL={}, timeout={:?}", config.url, config.timeout);
        let engine = ElasticsearchEngine::new(config)?;
        engine.ping().await.context("Elasticsearch ping failed")?;
        Ok(Arc::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("elasticsearch".parse::<EngineBackend>(), Ok(EngineBackend::Elasticsearch));
        assert_eq!(" Memory ".parse::<EngineBackend>(), Ok(EngineBackend::Memory));
        assert_eq!("auto".parse::<EngineBackend>(), Ok(EngineBackend::Auto));
        assert!("solr".parse::<EngineBackend>().is_err());
    }

    #[tokio::test]
    async fn test_auto_falls_back_to_memory() {
        let config = ElasticsearchConfig {
            url: "http://127.0.0.1:1".to_string(),
            api_key: None,
            timeout: Duration::from_millis(200),
        };
        let engine = EngineFactory::create(EngineBackend::Auto, config).await.unwrap();
        assert_eq!(engine.backend_name(), "memory");
    }
}
