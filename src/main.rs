use std::net::SocketAddr;
use std::sync::Arc;

use hybrid_search_server::api::{self, AppState};
use hybrid_search_server::resilience::{retry_with_backoff, DependencyRegistry, RetryPolicy};
use hybrid_search_server::store::{DocumentStore, EngineFactory};
use hybrid_search_server::{Config, Error, ServiceContext};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize structured logging before config so parse warnings are visible
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| Config::default().server.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    let config = Config::load()?;

    tracing::info!("🚀 Starting Hybrid Search Server");
    tracing::info!(
        "📊 Queue Configuration - Max Concurrent: {}, Max Queue: {}, Timeout: {}ms",
        config.queue.max_concurrent,
        config.queue.max_queue_size,
        config.queue.timeout_ms
    );
    tracing::info!(
        "🛡️ Breaker Configuration - Failure Threshold: {}, Reset Timeout: {}ms",
        config.breaker.failure_threshold,
        config.breaker.reset_timeout_ms
    );

    // STORAGE: Engine selection with in-memory fallback
    let engine = EngineFactory::create(config.engine.backend, config.elasticsearch_config()).await?;
    let store = Arc::new(DocumentStore::new(engine, config.schema()));
    tracing::info!("✅ Document store ready on '{}' backend", store.backend_name());

    let dependencies = DependencyRegistry::new(config.queue_config(), config.breaker_config());
    let ctx = Arc::new(ServiceContext::new(
        Arc::clone(&store),
        dependencies,
        config.index.default_index.clone(),
    ));
    let state = AppState::new(Arc::clone(&ctx));

    // STARTUP: Default index, retried while the engine comes up
    let default_index = config.index.default_index.clone();
    let ensured = retry_with_backoff(
        &RetryPolicy::default(),
        "ensure_default_index",
        Error::is_retryable,
        || state.pipeline.ensure_index(&default_index),
    )
    .await;
    match ensured {
        Ok(true) => tracing::info!("📁 Created default index '{}'", default_index),
        Ok(false) => tracing::info!("📁 Default index '{}' already exists", default_index),
        Err(e) => tracing::warn!(
            "⚠️ Default index '{}' not ensured, it will be created on first ingestion: {}",
            default_index,
            e
        ),
    }

    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("🌐 Server starting on http://{}", addr);
    tracing::info!("📡 Available endpoints:");
    tracing::info!("  • GET    /health - Cluster health");
    tracing::info!("  • GET    /health/extended - Node and shard report");
    tracing::info!("  • GET    /api/v1/stats - Index and operation stats");
    tracing::info!("  • GET    /api/v1/telemetry - Queue and breaker state");
    tracing::info!("  • POST   /api/v1/documents - Ingest a document");
    tracing::info!("  • POST   /api/v1/documents/batch - Ingest many documents");
    tracing::info!("  • GET    /api/v1/indices/{{index}}/documents/{{id}} - Fetch a document");
    tracing::info!("  • DELETE /api/v1/indices/{{index}}/documents/{{id}} - Delete a document");
    tracing::info!("  • POST   /api/v1/search - Keyword or hybrid search");
    tracing::info!("  • POST   /api/v1/search/vector - Vector search");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("✅ Server ready and accepting requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .inspect_err(|e| tracing::error!("❌ Server error: {}", e))?;

    // CLEANUP: stop admitting queued work
    ctx.shutdown();
    tracing::info!("👋 Server shutdown complete");
    Ok(())
}

// RELIABILITY: Ctrl+C for interactive runs, SIGTERM for containers
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("❌ Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("❌ Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("🛑 Shutdown signal received");
}
