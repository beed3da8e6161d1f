//! Durability Tests
//!
//! The registry survives a reopen; the vectors live in the backend, which
//! the tests share between store instances.

use crate::*;
use std::fs;
use vectorhub::{
    BackendType, CollectionId, CollectionRef, ErrorKind, MemoryMetadataStore, MetadataStore,
    RegistrySnapshot, SearchQuery,
};

async fn open_at(backend: Arc<dyn VectorBackend>, path: &std::path::Path) -> VectorResult<VectorStore> {
    init_tracing();
    VectorStore::builder()
        .with_backend(backend)
        .registry_path(path)
        .open()
        .await
}

#[tokio::test]
async fn test_collections_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.vhrg");
    let backend: Arc<dyn VectorBackend> = Arc::new(MemoryBackend::new(100));

    let docs = {
        let store = open_at(backend.clone(), &path).await.unwrap();
        let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
        store
            .add_vectors(
                &alice(),
                docs.id,
                vec![
                    VectorRecord::new(vec![1.0, 0.0, 0.0]).with_document_id("a"),
                    VectorRecord::new(vec![0.0, 1.0, 0.0]).with_document_id("b"),
                ],
            )
            .await
            .unwrap();
        docs
    };
    assert!(path.exists());

    let store = open_at(backend, &path).await.unwrap();
    let reopened = store.get_collection(&alice(), "docs").await.unwrap();
    assert_eq!(reopened, docs);

    let hits = store
        .search(&alice(), docs.id, SearchQuery::new(vec![1.0, 0.0, 0.0]).with_top_k(1))
        .await
        .unwrap();
    assert_eq!(hits[0].document_id.as_deref(), Some("a"));
}

#[tokio::test]
async fn test_ids_continue_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.vhrg");
    let backend: Arc<dyn VectorBackend> = Arc::new(MemoryBackend::new(100));

    let first = {
        let store = open_at(backend.clone(), &path).await.unwrap();
        let first = store.create_collection(&alice(), "first", 3).await.unwrap();
        let doomed = store.create_collection(&alice(), "doomed", 3).await.unwrap();
        store.delete_collection(&alice(), doomed.id).await.unwrap();
        first
    };

    let store = open_at(backend, &path).await.unwrap();
    let next = store.create_collection(&alice(), "next", 3).await.unwrap();
    assert!(next.id > CollectionId(first.id.as_u64() + 1));
    assert!(store.get_collection(&alice(), "doomed").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_corrupted_registry_refuses_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.vhrg");
    let backend: Arc<dyn VectorBackend> = Arc::new(MemoryBackend::new(100));

    {
        let store = open_at(backend.clone(), &path).await.unwrap();
        store.create_collection(&alice(), "docs", 3).await.unwrap();
    }

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let err = open_at(backend, &path).await.unwrap_err();
    assert!(matches!(err, VectorError::Corruption(_)), "got {:?}", err);
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn test_missing_registry_file_opens_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.vhrg");

    let store = open_at(Arc::new(MemoryBackend::new(100)), &path).await.unwrap();
    assert!(store.list_collections(&alice()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_foreign_backend_collection_reads_as_not_found() {
    let metadata = Arc::new(MemoryMetadataStore::new());
    metadata
        .save(&RegistrySnapshot {
            next_id: 8,
            collections: vec![Collection {
                id: CollectionId(7),
                owner: alice(),
                name: "legacy".to_string(),
                dimensions: 3,
                backend_type: BackendType::Postgres,
                created_at: chrono::Utc::now(),
                description: None,
                metadata: Default::default(),
            }],
        })
        .unwrap();

    init_tracing();
    let store = VectorStore::builder()
        .with_metadata_store(metadata)
        .open()
        .await
        .unwrap();

    let err = store
        .get_collection(&alice(), CollectionRef::Id(CollectionId(7)))
        .await
        .unwrap_err();
    assert!(matches!(err, VectorError::BackendMismatch { .. }));
    assert!(err.is_not_found());
    assert_eq!(err.status_code(), 404);

    let err = store
        .search(&alice(), CollectionId(7), SearchQuery::new(vec![1.0, 0.0, 0.0]))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let fresh = store.create_collection(&alice(), "fresh", 3).await.unwrap();
    assert_eq!(fresh.id, CollectionId(8));
}
