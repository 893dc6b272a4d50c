// ================================================================================================
// INGESTION PIPELINE TEST SUITE
// ================================================================================================
//
// Drives the pipeline through the shared service context with an in-memory engine:
// - Happy path: index created on first use, status derived from embeddings, versions bump
// - Batches: invalid documents reported per item while valid ones are written
// - Resilience: open breakers and full queues surface as retryable errors

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use hybrid_search_server::ingestion::{IngestDocument, IngestRequest, IngestionPipeline};
use hybrid_search_server::queue::OperationQueueConfig;
use hybrid_search_server::resilience::{
    CircuitBreakerConfig, CircuitBreakerState, Dependency, DependencyRegistry,
};
use hybrid_search_server::store::{DocumentStore, InMemoryEngine, ProcessingStatus, VectorIndexSchema, WriteResult};
use hybrid_search_server::{Error, ServiceContext};

fn context_with(
    queue: OperationQueueConfig,
    breaker: CircuitBreakerConfig,
) -> (Arc<InMemoryEngine>, Arc<ServiceContext>) {
    let engine = Arc::new(InMemoryEngine::new());
    let store = Arc::new(DocumentStore::new(engine.clone(), VectorIndexSchema::with_dims(3)));
    let ctx = Arc::new(ServiceContext::new(
        store,
        DependencyRegistry::new(queue, breaker),
        "documents",
    ));
    (engine, ctx)
}

fn context() -> (Arc<InMemoryEngine>, Arc<ServiceContext>) {
    context_with(OperationQueueConfig::default(), CircuitBreakerConfig::default())
}

fn request(index: &str, document: IngestDocument) -> IngestRequest {
    IngestRequest {
        index: index.to_string(),
        document,
    }
}

// ================================================================================================
// TEST SUITE 1: HAPPY PATH
// ================================================================================================

#[cfg(test)]
mod happy_path_tests {
    use super::*;

    #[tokio::test]
    async fn test_1_1_first_ingestion_creates_index() {
        let (_, ctx) = context();
        let pipeline = IngestionPipeline::new(ctx.clone());

        let outcome = pipeline
            .ingest(request(
                "papers",
                IngestDocument::new("Attention", "Transformers").with_id("p1"),
            ))
            .await
            .unwrap();

        assert!(outcome.index_created);
        assert_eq!(outcome.id, "p1");
        assert_eq!(outcome.result, WriteResult::Created);
        assert_eq!(outcome.status, ProcessingStatus::Pending);
        assert!(ctx.store().index_exists("papers").await.unwrap());

        let again = pipeline
            .ingest(request(
                "papers",
                IngestDocument::new("Attention v2", "Transformers")
                    .with_id("p1")
                    .with_embeddings(vec![0.1, 0.2, 0.3]),
            ))
            .await
            .unwrap();

        assert!(!again.index_created);
        assert!(again.version > outcome.version);
        assert_eq!(again.status, ProcessingStatus::Completed);

        for n in 0..3 {
            pipeline
                .ingest(request("papers", IngestDocument::new(format!("Paper {n}"), "Body")))
                .await
                .unwrap();
        }
        // An existing index is never reported as a failed create
        let stats = ctx.store().stats().await;
        assert_eq!(stats.operations["create_index"].errors, 0);
        assert_eq!(stats.operations["create_index"].total, 1);

        println!("✅ Index created once; re-ingestion bumped v{} -> v{}", outcome.version, again.version);
    }

    #[tokio::test]
    async fn test_1_2_generated_ids_are_unique() {
        let (_, ctx) = context();
        let pipeline = IngestionPipeline::new(ctx);

        let a = pipeline
            .ingest(request("docs", IngestDocument::new("A", "Body")))
            .await
            .unwrap();
        let b = pipeline
            .ingest(request("docs", IngestDocument::new("B", "Body")))
            .await
            .unwrap();

        assert_ne!(a.id, b.id);
        assert!(uuid::Uuid::parse_str(&a.id).is_ok());

        println!("✅ Generated ids: {} / {}", a.id, b.id);
    }

    #[tokio::test]
    async fn test_1_3_invalid_input_is_a_validation_error() {
        let (_, ctx) = context();
        let pipeline = IngestionPipeline::new(ctx.clone());

        let err = pipeline
            .ingest(request("Bad Index", IngestDocument::new("T", "B")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let err = pipeline
            .ingest(request("docs", IngestDocument::new("", "")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!err.is_retryable());

        // Validation happens before any engine call
        assert!(!ctx.store().index_exists("docs").await.unwrap());
        println!("✅ Invalid requests rejected up front");
    }

    #[tokio::test]
    async fn test_1_4_wrong_embedding_length_is_bad_request() {
        let (_, ctx) = context();
        let pipeline = IngestionPipeline::new(ctx);

        let err = pipeline
            .ingest(request(
                "docs",
                IngestDocument::new("T", "B").with_embeddings(vec![0.1, 0.2]),
            ))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_retryable());
        println!("✅ Dimension mismatch maps to 400");
    }

    #[tokio::test]
    async fn test_1_5_delete_reports_existence() {
        let (_, ctx) = context();
        let pipeline = IngestionPipeline::new(ctx);

        pipeline
            .ingest(request("docs", IngestDocument::new("T", "B").with_id("x")))
            .await
            .unwrap();

        assert!(pipeline.delete("docs", "x").await.unwrap());
        assert!(!pipeline.delete("docs", "x").await.unwrap());
        println!("✅ Delete is idempotent through the pipeline");
    }
}

// ================================================================================================
// TEST SUITE 2: BATCH INGESTION
// ================================================================================================

#[cfg(test)]
mod batch_tests {
    use super::*;

    #[tokio::test]
    async fn test_2_1_batch_reports_each_item() {
        let (_, ctx) = context();
        let pipeline = IngestionPipeline::new(ctx.clone());

        let outcome = pipeline
            .ingest_batch(
                "docs",
                vec![
                    IngestDocument::new("Good", "One").with_id("good"),
                    IngestDocument::new("", "").with_id("empty"),
                    IngestDocument::new("Short", "Vec")
                        .with_id("short")
                        .with_embeddings(vec![1.0]),
                    IngestDocument::new("Also good", "Two")
                        .with_id("good-2")
                        .with_embeddings(vec![0.0, 0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        assert!(outcome.index_created);
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 2);
        let ids: Vec<&str> = outcome.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["good", "empty", "short", "good-2"]);
        assert!(outcome.items[0].success);
        assert!(!outcome.items[1].success);
        assert!(outcome.items[1].error.is_some());
        assert!(!outcome.items[2].success);
        assert!(outcome.items[3].success);

        assert!(ctx.store().get_document("docs", "good-2").await.unwrap().is_some());
        assert!(ctx.store().get_document("docs", "short").await.unwrap().is_none());

        // One bulk call through the sync guard, none through the single-document writer
        assert_eq!(ctx.guard(Dependency::Sync).breaker().snapshot().total_calls, 1);
        assert_eq!(ctx.guard(Dependency::Write).breaker().snapshot().total_calls, 0);

        println!("✅ Batch: {} succeeded, {} failed", outcome.succeeded, outcome.failed);
    }
}

// ================================================================================================
// TEST SUITE 3: BACKPRESSURE AND FAILURE ISOLATION
// ================================================================================================

#[cfg(test)]
mod resilience_tests {
    use super::*;

    #[tokio::test]
    async fn test_3_1_open_breaker_is_retryable_503() {
        let (engine, ctx) = context_with(
            OperationQueueConfig::default(),
            CircuitBreakerConfig {
                failure_threshold: 2,
                reset_timeout: Duration::from_secs(60),
            },
        );
        let pipeline = IngestionPipeline::new(ctx.clone());
        engine.set_available(false);

        for _ in 0..2 {
            let err = pipeline
                .ingest(request("docs", IngestDocument::new("T", "B")))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Store(_)));
            assert!(err.is_retryable());
        }
        assert_eq!(
            ctx.guard(Dependency::Index).breaker().state(),
            CircuitBreakerState::Open
        );

        let err = pipeline
            .ingest(request("docs", IngestDocument::new("T", "B")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BreakerOpen { .. }));
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        // Other dependencies stay isolated
        assert_eq!(
            ctx.guard(Dependency::Search).breaker().state(),
            CircuitBreakerState::Closed
        );

        println!("✅ Engine outage opened the index breaker; callers told to retry");
    }

    #[tokio::test(start_paused = true)]
    async fn test_3_2_full_queue_is_retryable_429() {
        let (engine, ctx) = context_with(
            OperationQueueConfig {
                max_concurrent: 1,
                max_queue_size: 1,
                timeout: Duration::from_secs(30),
            },
            CircuitBreakerConfig::default(),
        );
        engine.set_latency(Duration::from_secs(1));
        let pipeline = Arc::new(IngestionPipeline::new(ctx.clone()));

        let first = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .ingest(request("docs", IngestDocument::new("First", "B")))
                    .await
            })
        };

        let index_queue = ctx.guard(Dependency::Index).queue();
        for _ in 0..1_000 {
            if index_queue.stats().running == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(index_queue.stats().running, 1);

        let err = pipeline
            .ingest(request("docs", IngestDocument::new("Second", "B")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueueFull { .. }));
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        // The rejection never reached the breaker
        assert_eq!(ctx.guard(Dependency::Index).breaker().snapshot().failed_calls, 0);

        first.await.unwrap().unwrap();
        println!("✅ Saturated queue rejected the second ingestion with 429");
    }

    #[tokio::test(start_paused = true)]
    async fn test_3_3_queue_timeout_is_retryable_504() {
        let (engine, ctx) = context_with(
            OperationQueueConfig {
                max_concurrent: 2,
                max_queue_size: 10,
                timeout: Duration::from_millis(200),
            },
            CircuitBreakerConfig::default(),
        );
        let pipeline = IngestionPipeline::new(ctx.clone());
        pipeline.ensure_index("docs").await.unwrap();
        engine.set_latency(Duration::from_secs(5));

        let err = pipeline
            .ingest(request("docs", IngestDocument::new("Slow", "B")))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ctx.guard(Dependency::Index).breaker().failure_count(), 1);

        println!("✅ Slow engine surfaced as a retryable timeout");
    }
}
