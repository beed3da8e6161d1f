//! Search Tests
//!
//! - End-to-end ranking
//! - Tie ordering
//! - Equality filters and rejected filter shapes
//! - top_k bounds

use crate::*;
use rand::{Rng, SeedableRng};
use serde_json::json;
use vectorhub::{
    cosine_similarity, CollectionId, ErrorKind, FilterCondition, MetadataFilter,
    MetadataValue, SearchQuery,
};

async fn docs_example(store: &VectorStore) -> CollectionId {
    let docs = store.create_collection(&alice(), "docs", 3).await.unwrap();
    store
        .add_vectors(
            &alice(),
            docs.id,
            vec![
                VectorRecord::new(vec![1.0, 0.0, 0.0]).with_document_id("a"),
                VectorRecord::new(vec![0.0, 1.0, 0.0]).with_document_id("b"),
                VectorRecord::new(vec![0.9, 0.1, 0.0]).with_document_id("c"),
            ],
        )
        .await
        .unwrap();
    docs.id
}

#[tokio::test]
async fn test_end_to_end_docs_example() {
    let store = ephemeral();
    let docs = docs_example(&store).await;

    let hits = store
        .search(&alice(), docs, SearchQuery::new(vec![1.0, 0.0, 0.0]).with_top_k(2))
        .await
        .unwrap();

    let ids: Vec<_> = hits.iter().map(|h| h.document_id.as_deref().unwrap()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    assert!((hits[1].similarity - 0.9939).abs() < 1e-3);
    assert!(hits.iter().all(|h| h.embedding.is_none()));
}

#[tokio::test]
async fn test_default_top_k_is_five() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 2).await.unwrap();
    store
        .add_vectors(
            &alice(),
            docs.id,
            (0..10).map(|i| VectorRecord::new(vec![1.0, i as f32])).collect(),
        )
        .await
        .unwrap();
    let hits = store
        .search(&alice(), docs.id, SearchQuery::new(vec![1.0, 0.0]))
        .await
        .unwrap();
    assert_eq!(hits.len(), 5);
}

#[tokio::test]
async fn test_top_result_is_most_similar() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "random", 16).await.unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);

    let vectors: Vec<Vec<f32>> = (0..200)
        .map(|_| (0..16).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();
    store
        .add_vectors(
            &alice(),
            docs.id,
            vectors.iter().cloned().map(VectorRecord::new).collect(),
        )
        .await
        .unwrap();

    for _ in 0..10 {
        let query: Vec<f32> = (0..16).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let hits = store
            .search(&alice(), docs.id, SearchQuery::new(query.clone()).with_top_k(10))
            .await
            .unwrap();

        let best = vectors
            .iter()
            .map(|v| cosine_similarity(&query, v))
            .fold(f32::MIN, f32::max);
        assert!((hits[0].similarity - best).abs() < 1e-5);
        for pair in hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }
}

#[tokio::test]
async fn test_identical_queries_identical_results() {
    let store = ephemeral();
    let docs = docs_example(&store).await;
    let query = SearchQuery::new(vec![0.5, 0.5, 0.0]).with_top_k(3);

    let first = store.search(&alice(), docs, query.clone()).await.unwrap();
    for _ in 0..5 {
        let again = store.search(&alice(), docs, query.clone()).await.unwrap();
        let a: Vec<_> = first.iter().map(|h| &h.id).collect();
        let b: Vec<_> = again.iter().map(|h| &h.id).collect();
        assert_eq!(a, b);
    }
}

#[tokio::test]
async fn test_ties_ordered_by_id() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "ties", 2).await.unwrap();
    let report = store
        .add_vectors(
            &alice(),
            docs.id,
            (0..6).map(|_| VectorRecord::new(vec![1.0, 1.0])).collect(),
        )
        .await
        .unwrap();

    let hits = store
        .search(&alice(), docs.id, SearchQuery::new(vec![1.0, 1.0]).with_top_k(3))
        .await
        .unwrap();
    let mut expected = report.ids();
    expected.sort();
    let got: Vec<_> = hits.into_iter().map(|h| h.id).collect();
    assert_eq!(got, expected[..3].to_vec());
}

#[tokio::test]
async fn test_fewer_vectors_than_top_k() {
    let store = ephemeral();
    let docs = docs_example(&store).await;
    let hits = store
        .search(&alice(), docs, SearchQuery::new(vec![1.0, 0.0, 0.0]).with_top_k(50))
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
}

#[tokio::test]
async fn test_empty_collection_returns_nothing() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "empty", 4).await.unwrap();
    let hits = store
        .search(&alice(), docs.id, SearchQuery::new(axis(4, 0)))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_include_vectors() {
    let store = ephemeral();
    let docs = docs_example(&store).await;
    let hits = store
        .search(
            &alice(),
            docs,
            SearchQuery::new(vec![1.0, 0.0, 0.0]).with_top_k(1).with_vectors(),
        )
        .await
        .unwrap();
    assert_eq!(hits[0].embedding.as_deref(), Some(&[1.0, 0.0, 0.0][..]));
}

#[tokio::test]
async fn test_equality_filter() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 2).await.unwrap();
    store
        .add_vectors(
            &alice(),
            docs.id,
            vec![
                VectorRecord::new(vec![1.0, 0.0]).with_document_id("en-1").with_field("lang", "en"),
                VectorRecord::new(vec![0.9, 0.1])
                    .with_document_id("fr-1")
                    .with_field("lang", "fr"),
                VectorRecord::new(vec![0.1, 0.9])
                    .with_document_id("en-2")
                    .with_field("lang", "en")
                    .with_field("draft", true),
                VectorRecord::new(vec![0.5, 0.5]).with_document_id("none"),
            ],
        )
        .await
        .unwrap();

    let hits = store
        .search(
            &alice(),
            docs.id,
            SearchQuery::new(vec![1.0, 0.0])
                .with_top_k(10)
                .with_filter(MetadataFilter::new().eq("lang", "en")),
        )
        .await
        .unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.document_id.clone().unwrap()).collect();
    assert_eq!(ids, vec!["en-1", "en-2"]);
    assert_eq!(hits[0].metadata["lang"], MetadataValue::from("en"));

    // Conditions are ANDed
    let hits = store
        .search(
            &alice(),
            docs.id,
            SearchQuery::new(vec![1.0, 0.0])
                .with_top_k(10)
                .with_filter(MetadataFilter::new().eq("lang", "en").eq("draft", true)),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id.as_deref(), Some("en-2"));

    // Missing keys never match
    let hits = store
        .search(
            &alice(),
            docs.id,
            SearchQuery::new(vec![1.0, 0.0])
                .with_filter(MetadataFilter::new().eq("team", "search")),
        )
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_json_filter() {
    let store = ephemeral();
    let docs = store.create_collection(&alice(), "docs", 2).await.unwrap();
    store
        .add_vectors(
            &alice(),
            docs.id,
            vec![
                VectorRecord::new(vec![1.0, 0.0]).with_field("year", 2024),
                VectorRecord::new(vec![1.0, 0.1]).with_field("year", 2023),
            ],
        )
        .await
        .unwrap();

    let filter = MetadataFilter::from_json(&json!({ "year": { "$eq": 2024 } })).unwrap();
    let hits = store
        .search(&alice(), docs.id, SearchQuery::new(vec![1.0, 0.0]).with_filter(filter))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata["year"], MetadataValue::from(2024));
}

#[tokio::test]
async fn test_non_equality_filters_unsupported() {
    let store = ephemeral();
    let docs = docs_example(&store).await;

    let conditions = vec![
        FilterCondition::Gt(json!(1)),
        FilterCondition::Lte(json!(1)),
        FilterCondition::Ne(json!("x")),
        FilterCondition::In(vec![json!("a"), json!("b")]),
    ];
    for condition in conditions {
        let op = condition.operator();
        let err = store
            .search(
                &alice(),
                docs,
                SearchQuery::new(vec![1.0, 0.0, 0.0])
                    .with_filter(MetadataFilter::new().with("field", condition)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter, "operator {}", op);
        assert_eq!(err.field(), Some("field"));
        assert_eq!(err.status_code(), 422);
    }

    let err = MetadataFilter::from_json(&json!({ "year": { "$regex": "^20" } })).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
}

#[tokio::test]
async fn test_top_k_bounds() {
    init_tracing();
    let store = VectorStore::builder().max_top_k(10).open().await.unwrap();
    let docs = docs_example(&store).await;

    for top_k in [0, 11] {
        let err = store
            .search(&alice(), docs, SearchQuery::new(vec![1.0, 0.0, 0.0]).with_top_k(top_k))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            VectorError::InvalidTopK {
                requested: top_k,
                max: 10
            }
        );
    }
    store
        .search(&alice(), docs, SearchQuery::new(vec![1.0, 0.0, 0.0]).with_top_k(10))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_query_dimension_mismatch() {
    let store = ephemeral();
    let docs = docs_example(&store).await;
    let err = store
        .search(&alice(), docs, SearchQuery::new(vec![1.0, 0.0]))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        VectorError::DimensionMismatch {
            expected: 3,
            got: 2,
            index: None
        }
    );
    assert_eq!(err.field(), Some("query_vector"));
}

#[tokio::test]
async fn test_backend_top_k_cap_applies() {
    let store = store_with(Arc::new(FaultyBackend::new(100).with_max_top_k(50))).await;
    let docs = store.create_collection(&alice(), "docs", 2).await.unwrap();
    store
        .add_vectors(&alice(), docs.id, vec![VectorRecord::new(vec![1.0, 0.0])])
        .await
        .unwrap();

    let err = store
        .search(&alice(), docs.id, SearchQuery::new(vec![1.0, 0.0]).with_top_k(51))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        VectorError::InvalidTopK {
            requested: 51,
            max: 50
        }
    );

    let hits = store
        .search(&alice(), docs.id, SearchQuery::new(vec![1.0, 0.0]).with_top_k(50))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}
