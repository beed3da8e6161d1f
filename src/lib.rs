//! # vectorhub
//!
//! Pluggable vector similarity search over PostgreSQL/pgvector, Pinecone
//! and Weaviate.
//!
//! Callers create named, fixed-dimension collections, add embeddings with
//! metadata, and run k-NN searches with equality filters. Results always
//! carry cosine similarity (higher is better) whichever backend runs
//! underneath.
//!
//! ## Quick Start
//!
//! ```ignore
//! use vectorhub::prelude::*;
//!
//! let store = VectorStore::ephemeral()?;
//! let owner = OwnerId::from("alice");
//!
//! let docs = store.create_collection(&owner, "docs", 3).await?;
//! store
//!     .add_vectors(&owner, docs.id, vec![
//!         VectorRecord::new(vec![1.0, 0.0, 0.0]).with_document_id("a"),
//!         VectorRecord::new(vec![0.0, 1.0, 0.0]).with_document_id("b"),
//!     ])
//!     .await?;
//!
//! let hits = store
//!     .search(&owner, docs.id, SearchQuery::new(vec![1.0, 0.0, 0.0]).with_top_k(1))
//!     .await?;
//! assert_eq!(hits[0].document_id.as_deref(), Some("a"));
//! ```
//!
//! ## Backends
//!
//! The backend is picked once, from [`BackendConfig`]:
//!
//! | Backend | Physical unit | Vector ids | Document uniqueness |
//! |---------|---------------|------------|---------------------|
//! | PostgreSQL + pgvector | table `vh_c{id}` | integers | strict (UNIQUE) |
//! | Pinecone | index `vh-c{id}` | UUIDs | relaxed (UUIDv5 overwrite) |
//! | Weaviate | class `VhC{id}` | UUIDs | relaxed (UUIDv5 overwrite) |
//! | Memory | process memory | integers | strict |
//!
//! ## Crates
//!
//! - `vectorhub-core`: data model, errors, validation, ranking
//! - `vectorhub-backends`: the [`VectorBackend`] trait and adapters
//! - `vectorhub-registry`: durable collection registry

#![warn(missing_docs)]

mod config;
mod error;
mod ingest;
mod query;
mod store;

pub mod prelude;

// Re-export main entry points
pub use store::{VectorStore, VectorStoreBuilder};
pub use config::{
    RegistryConfig, VectorStoreConfig, DEFAULT_MAX_CONCURRENT_BATCHES, DEFAULT_MAX_TOP_K,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_TIE_OVERFETCH,
};
pub use error::{Error, ErrorKind, Result, VectorError, VectorResult};

// Re-export the data model
pub use vectorhub_core::{
    cosine_similarity, document_vector_id, metadata_from_json, metadata_to_json, rank_results,
    BackendType, Collection, CollectionId, CollectionOptions, CollectionRef, CollectionStats,
    CollectionSummary, CollectionUpdate, EqualityFilter, FilterCondition, IngestReport, Metadata,
    MetadataFilter, MetadataValue, OwnerId, Page, RecordOutcome, SearchQuery, SearchResult,
    VectorEntry, VectorId, VectorRecord, DEFAULT_PAGE_LIMIT, DEFAULT_TOP_K, MAX_PAGE_LIMIT,
};

// Re-export backends
pub use vectorhub_backends::{
    BackendCapabilities, BackendConfig, BackendQuery, MemoryBackend, PineconeBackend,
    PostgresBackend, VectorBackend, WeaviateBackend,
};

// Re-export registry persistence
pub use vectorhub_registry::{
    FileMetadataStore, MemoryMetadataStore, MetadataStore, RegistrySnapshot,
};
