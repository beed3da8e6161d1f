//! Backend adapters for vectorhub
//!
//! Each adapter translates the unified contract to one physical store:
//! - [`PostgresBackend`]: PostgreSQL + pgvector, one table per collection
//! - [`PineconeBackend`]: Pinecone serverless, one index per collection
//! - [`WeaviateBackend`]: Weaviate, one class per collection
//! - [`MemoryBackend`]: in-process brute-force index
//!
//! The backend is chosen once at construction via [`connect`] and shared as
//! `Arc<dyn VectorBackend>`. Adapters are stateless between calls apart from
//! their client (pool or HTTP client).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod deadline;
pub mod factory;
mod http;
pub mod memory;
pub mod pinecone;
pub mod postgres;
pub mod weaviate;

pub use config::BackendConfig;
pub use deadline::with_deadline;
pub use factory::connect;
pub use memory::MemoryBackend;
pub use pinecone::PineconeBackend;
pub use postgres::PostgresBackend;
pub use weaviate::WeaviateBackend;

use async_trait::async_trait;
use vectorhub_core::{
    BackendType, Collection, CollectionStats, EqualityFilter, Page, SearchResult, VectorEntry,
    VectorId, VectorRecord, VectorResult,
};

/// Behaviour a backend guarantees beyond the common contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Document ids are unique even under concurrent ingestion
    ///
    /// When false, ids derived from document ids make a racing duplicate
    /// overwrite the earlier vector instead of failing.
    pub strict_document_uniqueness: bool,
    /// A completed write is visible to the next search
    pub read_after_write: bool,
    /// A chunk of records is written all-or-nothing
    pub transactional_batches: bool,
    /// Largest collection dimension accepted
    pub max_dimensions: usize,
    /// Largest result count one query may ask for, if the store caps it
    pub max_top_k: Option<usize>,
}

/// k-NN request as seen by an adapter
///
/// Already validated: the vector has the collection's dimensions, the
/// filter is equality-only and `limit` is within the configured ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendQuery {
    /// Query embedding
    pub vector: Vec<f32>,
    /// Number of candidates to return
    pub limit: usize,
    /// Conjunctive equality filter
    pub filter: EqualityFilter,
    /// Return stored embeddings
    pub include_vectors: bool,
}

/// Unified trait for all vector store backends
///
/// Similarities returned by [`VectorBackend::search`] are cosine similarity
/// (higher = more similar). Adapters convert native distances before
/// returning. Errors are never converted into empty results.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Which store this adapter talks to
    fn backend_type(&self) -> BackendType;

    /// Guarantees of this adapter
    fn capabilities(&self) -> BackendCapabilities;

    /// Number of records sent per write request
    fn batch_size(&self) -> usize;

    /// Create the physical collection
    ///
    /// "Already exists" is success, so re-creating after a partial failure
    /// is safe.
    async fn create_collection(&self, collection: &Collection) -> VectorResult<()>;

    /// Drop the physical collection and all its vectors
    ///
    /// A missing collection is success.
    async fn drop_collection(&self, collection: &Collection) -> VectorResult<()>;

    /// Write one chunk of already validated records
    ///
    /// Returns one result per record, in order. An `Err` for the whole call
    /// means the chunk failed as a unit.
    async fn add_vectors(
        &self,
        collection: &Collection,
        records: &[VectorRecord],
    ) -> VectorResult<Vec<VectorResult<VectorId>>>;

    /// Nearest neighbours of `query.vector`
    async fn search(
        &self,
        collection: &Collection,
        query: &BackendQuery,
    ) -> VectorResult<Vec<SearchResult>>;

    /// Remove vectors by id (unknown ids are ignored)
    async fn delete_vectors(&self, collection: &Collection, ids: &[VectorId]) -> VectorResult<()>;

    /// Id of the vector stored under `document_id`, if any
    async fn find_document(
        &self,
        collection: &Collection,
        document_id: &str,
    ) -> VectorResult<Option<VectorId>>;

    /// Stored vector with the given id, if any
    async fn get_vector(
        &self,
        collection: &Collection,
        id: &VectorId,
    ) -> VectorResult<Option<VectorEntry>>;

    /// One page of stored vectors in the store's listing order
    ///
    /// Integer-id stores list in id order. The page has already been
    /// validated.
    async fn list_vectors(
        &self,
        collection: &Collection,
        page: Page,
    ) -> VectorResult<Vec<VectorEntry>>;

    /// Count and backend-specific statistics
    async fn stats(&self, collection: &Collection) -> VectorResult<CollectionStats>;
}

/// Key under which adapters without a document column store the document id
pub(crate) const DOCUMENT_ID_KEY: &str = "_vh_document_id";
