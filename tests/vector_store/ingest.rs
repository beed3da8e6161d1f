//! Ingestion Tests
//!
//! - Per-record reports in input order
//! - Whole-call validation
//! - Document uniqueness
//! - Chunk failure isolation
//! - Replace and delete
//! - Reading vectors back by id, document id and page

use crate::*;
use vectorhub::{ErrorKind, MetadataValue, Page, SearchQuery};

#[tokio::test]
async fn test_add_reports_every_record() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    let report = store
        .add_vectors(
            &alice(),
            docs.id,
            vec![
                VectorRecord::new(axis(3, 0)).with_document_id("a"),
                VectorRecord::new(axis(3, 1)),
                VectorRecord::new(axis(3, 2)).with_field("lang", "en"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(report.len(), 3);
    assert!(report.all_succeeded());
    assert_eq!(report.ids().len(), 3);
    let indices: Vec<_> = report.iter().map(|o| o.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(store.stats(&alice(), docs.id).await.unwrap().count, 3);
}

#[tokio::test]
async fn test_empty_add_is_noop() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
    let report = store.add_vectors(&alice(), docs.id, vec![]).await.unwrap();
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_dimension_mismatch_writes_nothing() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    let err = store
        .add_vectors(
            &alice(),
            docs.id,
            vec![
                VectorRecord::new(axis(3, 0)),
                VectorRecord::new(vec![1.0, 0.0]),
            ],
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        VectorError::DimensionMismatch {
            expected: 3,
            got: 2,
            index: Some(1)
        }
    );
    assert_eq!(err.to_string(), "Dimension mismatch: expected 3, got 2");
    assert_eq!(store.stats(&alice(), docs.id).await.unwrap().count, 0);
}

#[tokio::test]
async fn test_non_finite_embedding_rejected() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 2).await.unwrap();
    for bad in [f32::NAN, f32::INFINITY] {
        let err = store
            .add_vectors(&alice(), docs.id, vec![VectorRecord::new(vec![bad, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::InvalidEmbedding { index: Some(0), .. }));
    }
}

#[tokio::test]
async fn test_duplicate_document_across_calls() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
    store
        .add_vectors(&alice(), docs.id, vec![VectorRecord::new(axis(3, 0)).with_document_id("a")])
        .await
        .unwrap();

    let report = store
        .add_vectors(
            &alice(),
            docs.id,
            vec![
                VectorRecord::new(axis(3, 1)).with_document_id("b"),
                VectorRecord::new(axis(3, 2)).with_document_id("a"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    let dup = &report.outcomes[1];
    assert_eq!(dup.document_id.as_deref(), Some("a"));
    assert_eq!(dup.result.as_ref().unwrap_err().kind(), ErrorKind::AlreadyExists);
    assert_eq!(store.stats(&alice(), docs.id).await.unwrap().count, 2);
}

#[tokio::test]
async fn test_duplicate_document_in_one_call_rejects_call() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
    let err = store
        .add_vectors(
            &alice(),
            docs.id,
            vec![
                VectorRecord::new(axis(3, 0)).with_document_id("same"),
                VectorRecord::new(axis(3, 1)).with_document_id("same"),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VectorError::DuplicateDocument { .. }));
    assert_eq!(store.stats(&alice(), docs.id).await.unwrap().count, 0);
}

#[tokio::test]
async fn test_chunk_failure_is_isolated() {
    let backend = Arc::new(FaultyBackend::new(2));
    let store = store_with(backend.clone()).await;
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    // Chunks of 2: [d0 d1] [d2 poison3] [d4 d5]
    let records: Vec<_> = (0..6)
        .map(|i| {
            let doc = if i == 3 {
                format!("{}{}", POISON_PREFIX, i)
            } else {
                format!("d{}", i)
            };
            VectorRecord::new(vec![1.0, i as f32, 0.0]).with_document_id(doc)
        })
        .collect();

    let report = store.add_vectors(&alice(), docs.id, records).await.unwrap();

    let ok: Vec<bool> = report.iter().map(|o| o.is_ok()).collect();
    assert_eq!(ok, vec![true, true, false, false, true, true]);
    for failed in &report.outcomes[2..4] {
        assert!(failed.result.as_ref().unwrap_err().is_retryable());
    }
    assert_eq!(backend.add_calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    assert_eq!(store.stats(&alice(), docs.id).await.unwrap().count, 4);
}

#[tokio::test]
async fn test_many_chunks_keep_order() {
    let store = store_with(Arc::new(FaultyBackend::new(7))).await;
    let docs = store.create_collection(&alice(), "docs", 2).await.unwrap();

    let records: Vec<_> = (0..100)
        .map(|i| VectorRecord::new(vec![1.0, i as f32]).with_document_id(format!("doc-{:03}", i)))
        .collect();
    let report = store.add_vectors(&alice(), docs.id, records).await.unwrap();

    assert!(report.all_succeeded());
    for (i, outcome) in report.iter().enumerate() {
        assert_eq!(outcome.index, i);
        assert_eq!(outcome.document_id, Some(format!("doc-{:03}", i)));
    }
    // Ids are unique
    let mut ids = report.ids();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 100);
}

#[tokio::test]
async fn test_reserved_metadata_prefix_rejected() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 2).await.unwrap();
    let err = store
        .add_vectors(
            &alice(),
            docs.id,
            vec![VectorRecord::new(vec![1.0, 0.0]).with_field("_vh_document_id", "spoof")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VectorError::InvalidMetadata { .. }));
    assert_eq!(err.field(), Some("_vh_document_id"));
}

#[tokio::test]
async fn test_replace_vector() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
    let report = store
        .add_vectors(&alice(), docs.id, vec![VectorRecord::new(axis(3, 0)).with_document_id("a")])
        .await
        .unwrap();
    let old = report.ids().remove(0);

    let replaced = store
        .replace_vector(
            &alice(),
            docs.id,
            old.clone(),
            VectorRecord::new(axis(3, 1)).with_document_id("a"),
        )
        .await
        .unwrap();
    assert!(replaced.all_succeeded());
    let new_id = replaced.ids().remove(0);
    assert_ne!(new_id, old);

    let hits = store
        .search(&alice(), docs.id, SearchQuery::new(axis(3, 1)).with_top_k(1))
        .await
        .unwrap();
    assert_eq!(hits[0].id, new_id);
    assert_eq!(store.stats(&alice(), docs.id).await.unwrap().count, 1);
}

#[tokio::test]
async fn test_delete_vectors() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
    let report = store
        .add_vectors(
            &alice(),
            docs.id,
            (0..3).map(|i| VectorRecord::new(axis(3, i))).collect(),
        )
        .await
        .unwrap();
    let ids = report.ids();

    store.delete_vectors(&alice(), docs.id, &ids[..2]).await.unwrap();
    store.delete_vectors(&alice(), docs.id, &[]).await.unwrap();
    assert_eq!(store.stats(&alice(), docs.id).await.unwrap().count, 1);

    let err = store
        .delete_vectors(&alice(), docs.id, &[VectorId::from("not-an-int")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_replace_missing_vector_is_not_found() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    let err = store
        .replace_vector(
            &alice(),
            docs.id,
            VectorId::from(999999_i64),
            VectorRecord::new(axis(3, 0)),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        VectorError::VectorNotFound {
            id: "999999".to_string()
        }
    );
    assert_eq!(err.status_code(), 404);
    assert_eq!(store.stats(&alice(), docs.id).await.unwrap().count, 0);
}

// =============================================================================
// Reading vectors back
// =============================================================================

#[tokio::test]
async fn test_get_vector_and_by_document_id() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
    let report = store
        .add_vectors(
            &alice(),
            docs.id,
            vec![
                VectorRecord::new(vec![0.5, 0.0, 1.5])
                    .with_document_id("a")
                    .with_field("lang", "en"),
                VectorRecord::new(axis(3, 1)),
            ],
        )
        .await
        .unwrap();
    let ids = report.ids();

    let entry = store.get_vector(&alice(), docs.id, &ids[0]).await.unwrap();
    assert_eq!(entry.id, ids[0]);
    assert_eq!(entry.document_id.as_deref(), Some("a"));
    assert_eq!(entry.embedding, vec![0.5, 0.0, 1.5]);
    assert_eq!(entry.metadata["lang"], MetadataValue::from("en"));

    let by_doc = store.get_by_document_id(&alice(), docs.id, "a").await.unwrap();
    assert_eq!(by_doc, entry);

    let anonymous = store.get_vector(&alice(), docs.id, &ids[1]).await.unwrap();
    assert!(anonymous.document_id.is_none());
}

#[tokio::test]
async fn test_get_missing_vector_is_not_found() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    let err = store
        .get_vector(&alice(), docs.id, &VectorId::from(42_i64))
        .await
        .unwrap_err();
    assert_eq!(err, VectorError::VectorNotFound { id: "42".to_string() });

    let err = store
        .get_by_document_id(&alice(), docs.id, "ghost")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        VectorError::VectorNotFound {
            id: "ghost".to_string()
        }
    );
    assert_eq!(err.field(), Some("id"));
}

#[tokio::test]
async fn test_get_vector_is_owner_scoped() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
    let report = store
        .add_vectors(&alice(), docs.id, vec![VectorRecord::new(axis(3, 0)).with_document_id("a")])
        .await
        .unwrap();

    let err = store
        .get_vector(&bob(), docs.id, &report.ids()[0])
        .await
        .unwrap_err();
    assert!(matches!(err, VectorError::CollectionNotFound { .. }));
    let err = store.get_by_document_id(&bob(), docs.id, "a").await.unwrap_err();
    assert!(matches!(err, VectorError::CollectionNotFound { .. }));
}

#[tokio::test]
async fn test_list_vectors_pages() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
    let report = store
        .add_vectors(
            &alice(),
            docs.id,
            (0..5)
                .map(|i| VectorRecord::new(axis(3, i % 3)).with_document_id(format!("d{}", i)))
                .collect(),
        )
        .await
        .unwrap();
    let ids = report.ids();

    let first = store.list_vectors(&alice(), docs.id, Page::new(0, 2)).await.unwrap();
    let second = store.list_vectors(&alice(), docs.id, Page::new(2, 2)).await.unwrap();
    let last = store.list_vectors(&alice(), docs.id, Page::new(4, 2)).await.unwrap();

    let listed: Vec<_> = first
        .iter()
        .chain(&second)
        .chain(&last)
        .map(|e| e.id.clone())
        .collect();
    assert_eq!(listed, ids);
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].document_id.as_deref(), Some("d4"));

    let past_end = store.list_vectors(&alice(), docs.id, Page::new(5, 2)).await.unwrap();
    assert!(past_end.is_empty());

    let err = store
        .list_vectors(&alice(), docs.id, Page::new(0, 0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}
