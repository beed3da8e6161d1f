//! Edge Case Tests
//!
//! Error shapes on the wire, deadlines, degenerate vectors and metadata
//! values.

use crate::*;
use serde_json::json;
use vectorhub::{ErrorKind, IngestReport, MetadataValue, SearchQuery};

// =============================================================================
// Error shapes
// =============================================================================

#[tokio::test]
async fn test_wire_shape_of_dimension_mismatch() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    let err = store
        .add_vectors(
            &alice(),
            docs.id,
            vec![
                VectorRecord::new(vec![1.0, 0.0, 0.0]),
                VectorRecord::new(vec![1.0, 0.0]),
            ],
        )
        .await
        .unwrap_err();

    assert!(err.is_validation_error());
    assert!(!err.is_retryable());
    assert_eq!(err.status_code(), 422);
    assert_eq!(
        err.to_wire(),
        json!({
            "code": "DimensionMismatch",
            "message": "Dimension mismatch: expected 3, got 2",
            "details": {
                "field": "embedding",
                "expected": 3,
                "got": 2,
                "index": 1,
                "retryable": false
            }
        })
    );
}

#[tokio::test]
async fn test_wire_shape_of_not_found() {
    let store = ephemeral();
    let err = store.get_collection(&alice(), "ghost").await.unwrap_err();

    let wire = err.to_wire();
    assert_eq!(wire["code"], "NotFound");
    assert_eq!(wire["details"]["field"], "collection");
    assert_eq!(wire["details"]["retryable"], false);
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_status_codes_by_kind() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    let conflict = store.create_collection(&alice(), "docs", 3).await.unwrap_err();
    assert_eq!(conflict.status_code(), 409);

    let top_k = store
        .search(&alice(), docs.id, SearchQuery::new(vec![1.0, 0.0, 0.0]).with_top_k(0))
        .await
        .unwrap_err();
    assert_eq!(top_k.kind(), ErrorKind::InvalidTopK);
    assert_eq!(top_k.status_code(), 422);
    assert_eq!(top_k.to_wire()["details"]["max"], 1000);

    let name = store.create_collection(&alice(), "", 3).await.unwrap_err();
    assert_eq!(name.kind(), ErrorKind::BadRequest);
    assert_eq!(name.status_code(), 400);
}

// =============================================================================
// Deadlines and backend faults
// =============================================================================

#[tokio::test]
async fn test_slow_backend_times_out() {
    init_tracing();
    let backend = Arc::new(FaultyBackend::new(100).with_search_delay(Duration::from_millis(500)));
    let store = VectorStore::builder()
        .with_backend(backend)
        .request_timeout(Duration::from_millis(50))
        .open()
        .await
        .unwrap();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    let err = store
        .search(&alice(), docs.id, SearchQuery::new(vec![1.0, 0.0, 0.0]))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        VectorError::Timeout {
            operation: "search".to_string(),
            after_ms: 50
        }
    );
    assert!(err.is_retryable());
    assert_eq!(err.status_code(), 504);
    assert_eq!(err.to_wire()["details"]["operation"], "search");
}

#[tokio::test]
async fn test_backend_rejection_is_reported_per_record() {
    let store = store_with(Arc::new(FaultyBackend::new(100))).await;
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    let report = store
        .add_vectors(
            &alice(),
            docs.id,
            vec![
                VectorRecord::new(vec![1.0, 0.0, 0.0]).with_document_id("fine"),
                VectorRecord::new(vec![0.0, 1.0, 0.0]).with_document_id("poison-1"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(report.failed(), 2);
    for outcome in &report.outcomes {
        let err = outcome.result.as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.is_retryable());
    }
    assert_eq!(store.stats(&alice(), docs.id).await.unwrap().count, 0);
}

// =============================================================================
// Degenerate vectors
// =============================================================================

#[tokio::test]
async fn test_zero_query_scores_zero() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
    store
        .add_vectors(
            &alice(),
            docs.id,
            vec![
                VectorRecord::new(vec![1.0, 0.0, 0.0]),
                VectorRecord::new(vec![0.0, 0.0, 0.0]),
            ],
        )
        .await
        .unwrap();

    let hits = store
        .search(&alice(), docs.id, SearchQuery::new(vec![0.0, 0.0, 0.0]))
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.similarity == 0.0));
}

#[tokio::test]
async fn test_non_finite_query_rejected() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
        let err = store
            .search(&alice(), docs.id, SearchQuery::new(vec![1.0, bad, 0.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::InvalidEmbedding { index: None, .. }));
        assert_eq!(err.field(), Some("query_vector"));
    }
}

#[tokio::test]
async fn test_opposite_vectors_score_minus_one() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 2).await.unwrap();
    store
        .add_vectors(&alice(), docs.id, vec![VectorRecord::new(vec![-2.0, 0.0])])
        .await
        .unwrap();

    let hits = store
        .search(&alice(), docs.id, SearchQuery::new(vec![3.0, 0.0]))
        .await
        .unwrap();
    assert!((hits[0].similarity + 1.0).abs() < 1e-6);
}

// =============================================================================
// Metadata values
// =============================================================================

#[tokio::test]
async fn test_metadata_round_trips_through_search() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 2).await.unwrap();
    store
        .add_vectors(
            &alice(),
            docs.id,
            vec![VectorRecord::new(vec![1.0, 0.0])
                .with_field("title", "Rust")
                .with_field("score", 0.5)
                .with_field("public", true)
                .with_field("note", MetadataValue::Null)],
        )
        .await
        .unwrap();

    let hits = store
        .search(&alice(), docs.id, SearchQuery::new(vec![1.0, 0.0]))
        .await
        .unwrap();
    let metadata = &hits[0].metadata;
    assert_eq!(metadata["title"], MetadataValue::from("Rust"));
    assert_eq!(metadata["score"], MetadataValue::from(0.5));
    assert_eq!(metadata["public"], MetadataValue::from(true));
    assert!(metadata["note"].is_null());
}

#[tokio::test]
async fn test_empty_metadata_key_rejected() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 2).await.unwrap();

    let err = store
        .add_vectors(
            &alice(),
            docs.id,
            vec![VectorRecord::new(vec![1.0, 0.0]).with_field("", 1)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VectorError::InvalidMetadata { .. }));
    assert_eq!(store.stats(&alice(), docs.id).await.unwrap().count, 0);
}

#[tokio::test]
async fn test_empty_delete_is_noop() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 2).await.unwrap();
    store.delete_vectors(&alice(), docs.id, &[]).await.unwrap();

    let report: IngestReport = store.add_vectors(&alice(), docs.id, vec![]).await.unwrap();
    assert!(report.is_empty());
}
