//! Collection Lifecycle Tests
//!
//! - Create with validation
//! - Owner scoping
//! - Lookup by id and name
//! - Delete and rollback
//! - Description, metadata and update
//! - Paged listing with counts

use crate::*;
use std::sync::atomic::Ordering;
use vectorhub::{
    CollectionId, CollectionOptions, CollectionUpdate, ErrorKind, Metadata, MetadataValue, Page,
    SearchQuery, MAX_PAGE_LIMIT,
};

#[tokio::test]
async fn test_create_collection_basic() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    assert_eq!(docs.name, "docs");
    assert_eq!(docs.dimensions, 3);
    assert_eq!(docs.owner, alice());
    assert_eq!(docs.backend_type, BackendType::Memory);
}

#[tokio::test]
async fn test_same_name_same_owner_already_exists() {
    let store = ephemeral();
    store.create_collection(&alice(), "docs", 3).await.unwrap();

    let err = store.create_collection(&alice(), "docs", 3).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(err.status_code(), 409);
    assert_eq!(err.field(), Some("name"));
}

#[tokio::test]
async fn test_same_name_different_owner_succeeds() {
    let store = ephemeral();
    let a = store.create_collection(&alice(), "docs", 3).await.unwrap();
    let b = store.create_collection(&bob(), "docs", 3).await.unwrap();
    assert_ne!(a.id, b.id);
}

#[tokio::test]
async fn test_invalid_dimensions() {
    let store = ephemeral();
    for dims in [0, 65_537] {
        let err = store.create_collection(&alice(), "docs", dims).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDimensions, "dims = {}", dims);
    }
    // Largest allowed works
    store.create_collection(&alice(), "wide", 65_536).await.unwrap();
}

#[tokio::test]
async fn test_invalid_names() {
    let store = ephemeral();
    let long = "x".repeat(257);
    for name in ["", "a/b", "_system", "nul\0byte", long.as_str()] {
        let err = store.create_collection(&alice(), name, 3).await.unwrap_err();
        assert!(
            matches!(err, VectorError::InvalidCollectionName { .. }),
            "{:?} should be rejected, got {:?}",
            name,
            err
        );
    }
}

#[tokio::test]
async fn test_get_by_id_and_name() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    assert_eq!(store.get_collection(&alice(), docs.id).await.unwrap(), docs);
    assert_eq!(store.get_collection(&alice(), "docs").await.unwrap(), docs);
}

#[tokio::test]
async fn test_get_missing_is_not_found() {
    let store = ephemeral();
    let err = store
        .get_collection(&alice(), CollectionId(404))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_other_owner_cannot_see_collection() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    assert!(store.get_collection(&bob(), docs.id).await.unwrap_err().is_not_found());
    assert!(store
        .search(&bob(), docs.id, SearchQuery::new(vec![1.0, 0.0, 0.0]))
        .await
        .unwrap_err()
        .is_not_found());
    assert!(store.stats(&bob(), docs.id).await.unwrap_err().is_not_found());
    assert!(store
        .delete_collection(&bob(), docs.id)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_list_collections_sorted_and_scoped() {
    let store = ephemeral();
    store.create_collection(&alice(), "zebra", 3).await.unwrap();
    store.create_collection(&alice(), "apple", 8).await.unwrap();
    store.create_collection(&bob(), "mango", 3).await.unwrap();

    let names: Vec<_> = store
        .list_collections(&alice())
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["apple", "zebra"]);
    assert!(store.list_collections(&OwnerId::from("carol")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_then_search_not_found() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
    store
        .add_vectors(&alice(), docs.id, vec![VectorRecord::new(vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();

    store.delete_collection(&alice(), docs.id).await.unwrap();

    let err = store
        .search(&alice(), docs.id, SearchQuery::new(vec![1.0, 0.0, 0.0]))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    // Name can be reused, with a fresh id
    let again = store.create_collection(&alice(), "docs", 3).await.unwrap();
    assert!(again.id > docs.id);
}

#[tokio::test]
async fn test_delete_rolls_back_when_backend_drop_fails() {
    let backend = Arc::new(FaultyBackend::new(16));
    let store = store_with(backend.clone()).await;
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
    store
        .add_vectors(&alice(), docs.id, vec![VectorRecord::new(vec![1.0, 0.0, 0.0])])
        .await
        .unwrap();

    backend.fail_drop.store(true, Ordering::SeqCst);
    let err = store.delete_collection(&alice(), docs.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(err.is_retryable());

    // Still registered and still searchable
    assert_eq!(store.get_collection(&alice(), docs.id).await.unwrap(), docs);
    let stats = store.stats(&alice(), docs.id).await.unwrap();
    assert_eq!(stats.count, 1);

    backend.fail_drop.store(false, Ordering::SeqCst);
    store.delete_collection(&alice(), docs.id).await.unwrap();
}

// =============================================================================
// Description, metadata and update
// =============================================================================

fn labels(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), MetadataValue::from(*v)))
        .collect()
}

#[tokio::test]
async fn test_create_with_description_and_metadata() {
    let store = ephemeral();
    let docs = store
        .create_collection_with(
            &alice(),
            "docs",
            3,
            CollectionOptions::default()
                .with_description("support articles")
                .with_metadata(labels(&[("team", "support")])),
        )
        .await
        .unwrap();

    let fetched = store.get_collection(&alice(), docs.id).await.unwrap();
    assert_eq!(fetched.description.as_deref(), Some("support articles"));
    assert_eq!(fetched.metadata["team"], MetadataValue::from("support"));
}

#[tokio::test]
async fn test_update_renames_collection() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    let renamed = store
        .update_collection(
            &alice(),
            docs.id,
            CollectionUpdate::default()
                .rename("articles")
                .with_description("renamed"),
        )
        .await
        .unwrap();
    assert_eq!(renamed.id, docs.id);
    assert_eq!(renamed.name, "articles");
    assert_eq!(renamed.dimensions, 3);

    assert!(store.get_collection(&alice(), "docs").await.unwrap_err().is_not_found());
    let by_name = store.get_collection(&alice(), "articles").await.unwrap();
    assert_eq!(by_name.description.as_deref(), Some("renamed"));

    // The old name is free again
    store.create_collection(&alice(), "docs", 3).await.unwrap();
}

#[tokio::test]
async fn test_update_to_taken_name_conflicts() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
    store.create_collection(&alice(), "notes", 3).await.unwrap();

    let err = store
        .update_collection(&alice(), docs.id, CollectionUpdate::default().rename("notes"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(store.get_collection(&alice(), docs.id).await.unwrap().name, "docs");
}

#[tokio::test]
async fn test_update_other_owner_not_found() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();

    let err = store
        .update_collection(&bob(), docs.id, CollectionUpdate::default().rename("mine"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

// =============================================================================
// Paged listing
// =============================================================================

#[tokio::test]
async fn test_list_collections_page_counts_vectors() {
    let store = ephemeral();
    let mut ids = Vec::new();
    for (name, vectors) in [("a", 0), ("b", 2), ("c", 1), ("d", 3)] {
        let collection = store.create_collection(&alice(), name, 2).await.unwrap();
        let records = (0..vectors)
            .map(|i| VectorRecord::new(vec![1.0, i as f32]))
            .collect();
        store.add_vectors(&alice(), collection.id, records).await.unwrap();
        ids.push(collection.id);
    }
    store.create_collection(&bob(), "hidden", 2).await.unwrap();

    let page = store.list_collections_page(&alice(), Page::new(1, 2)).await.unwrap();
    let names: Vec<_> = page.iter().map(|s| s.collection.name.as_str()).collect();
    assert_eq!(names, ["b", "c"]);
    assert_eq!(page[0].vector_count, 2);
    assert_eq!(page[1].vector_count, 1);
    assert_eq!(page[0].collection.id, ids[1]);

    let tail = store.list_collections_page(&alice(), Page::new(3, 10)).await.unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].vector_count, 3);

    let past_end = store.list_collections_page(&alice(), Page::new(10, 10)).await.unwrap();
    assert!(past_end.is_empty());
}

#[tokio::test]
async fn test_list_collections_page_rejects_bad_limit() {
    let store = ephemeral();
    for limit in [0, MAX_PAGE_LIMIT + 1] {
        let err = store
            .list_collections_page(&alice(), Page::new(0, limit))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest, "limit = {}", limit);
    }
}

#[tokio::test]
async fn test_summary_serializes_flat() {
    let store = ephemeral();
    store.create_collection(&alice(), "docs", 3).await.unwrap();

    let page = store.list_collections_page(&alice(), Page::default()).await.unwrap();
    let json = serde_json::to_value(&page[0]).unwrap();
    assert_eq!(json["name"], "docs");
    assert_eq!(json["vector_count"], 0);
}
