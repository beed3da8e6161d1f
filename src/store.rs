//! Main entry point for vectorhub.
//!
//! [`VectorStore`] composes the collection registry, the ingestion pipeline
//! and the query engine over exactly one backend adapter.

use crate::config::{RegistryConfig, VectorStoreConfig};
use crate::ingest::IngestionPipeline;
use crate::query::QueryEngine;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use vectorhub_backends::{
    connect, with_deadline, BackendCapabilities, BackendConfig, MemoryBackend, VectorBackend,
};
use vectorhub_core::{
    BackendType, Collection, CollectionId, CollectionOptions, CollectionRef, CollectionStats,
    CollectionSummary, CollectionUpdate, IngestReport, OwnerId, Page, SearchQuery, SearchResult,
    VectorEntry, VectorError, VectorId, VectorRecord, VectorResult,
};
use vectorhub_registry::{
    CollectionRegistry, FileMetadataStore, MemoryMetadataStore, MetadataStore,
};

/// The vector store.
///
/// Create one with [`VectorStore::open`], [`VectorStore::builder`] or
/// [`VectorStore::ephemeral`]. All operations are scoped to an owner; a
/// collection belonging to someone else behaves as if it did not exist.
///
/// # Example
///
/// ```ignore
/// use vectorhub::prelude::*;
///
/// let store = VectorStore::ephemeral()?;
/// let owner = OwnerId::from("alice");
/// let docs = store.create_collection(&owner, "docs", 3).await?;
///
/// store
///     .add_vectors(&owner, docs.id, vec![
///         VectorRecord::new(vec![1.0, 0.0, 0.0]).with_document_id("a"),
///     ])
///     .await?;
///
/// let hits = store
///     .search(&owner, docs.id, SearchQuery::new(vec![1.0, 0.0, 0.0]).with_top_k(2))
///     .await?;
/// ```
pub struct VectorStore {
    backend: Arc<dyn VectorBackend>,
    registry: CollectionRegistry,
    ingest: IngestionPipeline,
    query: QueryEngine,
    request_timeout: Duration,
    max_concurrent_batches: usize,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("backend", &self.backend.backend_type())
            .field("registry", &self.registry)
            .finish()
    }
}

impl VectorStore {
    /// Open a store from a full configuration.
    ///
    /// # Errors
    ///
    /// `Config` for invalid settings, registry errors (`Storage`,
    /// `Corruption`) if the registry file cannot be read.
    pub async fn open(config: VectorStoreConfig) -> VectorResult<Self> {
        config.validate()?;
        let backend = connect(&config.backend).await?;
        Self::assemble(backend, &config)
    }

    /// Open a store configured from the process environment.
    ///
    /// See [`VectorStoreConfig::from_env`] for the variables read.
    pub async fn from_env() -> VectorResult<Self> {
        Self::open(VectorStoreConfig::from_env()?).await
    }

    /// Memory backend and memory registry; everything is lost on drop.
    ///
    /// Use this for tests and prototyping.
    pub fn ephemeral() -> VectorResult<Self> {
        let config = VectorStoreConfig::default();
        let backend: Arc<dyn VectorBackend> =
            Arc::new(MemoryBackend::new(config.backend.batch_size()));
        Self::assemble(backend, &config)
    }

    /// Create a builder for store configuration.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = VectorStore::builder()
    ///     .backend(BackendConfig::postgres("postgres://localhost/vectors"))
    ///     .registry_path("./registry.vhrg")
    ///     .max_top_k(200)
    ///     .open()
    ///     .await?;
    /// ```
    pub fn builder() -> VectorStoreBuilder {
        VectorStoreBuilder::new()
    }

    fn assemble(backend: Arc<dyn VectorBackend>, config: &VectorStoreConfig) -> VectorResult<Self> {
        let store: Arc<dyn MetadataStore> = match &config.registry {
            RegistryConfig::Memory => Arc::new(MemoryMetadataStore::new()),
            RegistryConfig::File { path } => Arc::new(FileMetadataStore::new(path.clone())),
        };
        Self::assemble_with(backend, store, config)
    }

    fn assemble_with(
        backend: Arc<dyn VectorBackend>,
        store: Arc<dyn MetadataStore>,
        config: &VectorStoreConfig,
    ) -> VectorResult<Self> {
        let registry = CollectionRegistry::open(backend.clone(), store, config.request_timeout)?;
        let ingest = IngestionPipeline::new(
            backend.clone(),
            config.request_timeout,
            config.max_concurrent_batches,
        );
        let query = QueryEngine::new(
            backend.clone(),
            config.request_timeout,
            config.max_top_k,
            config.tie_overfetch,
        );
        info!(
            backend = %backend.backend_type(),
            max_top_k = query.max_top_k(),
            request_timeout_ms = config.request_timeout.as_millis() as u64,
            "vector store opened"
        );
        Ok(VectorStore {
            backend,
            registry,
            ingest,
            query,
            request_timeout: config.request_timeout,
            max_concurrent_batches: config.max_concurrent_batches.max(1),
        })
    }

    /// Backend this store runs on
    pub fn backend_type(&self) -> BackendType {
        self.backend.backend_type()
    }

    /// Guarantees of the running backend
    pub fn capabilities(&self) -> BackendCapabilities {
        self.backend.capabilities()
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Create a collection of fixed `dimensions` for `owner`.
    ///
    /// # Errors
    ///
    /// `CollectionAlreadyExists`, `InvalidDimensions`,
    /// `InvalidCollectionName`, or a backend error.
    pub async fn create_collection(
        &self,
        owner: &OwnerId,
        name: &str,
        dimensions: usize,
    ) -> VectorResult<Collection> {
        self.registry.create(owner, name, dimensions).await
    }

    /// Create a collection with a description and metadata.
    ///
    /// # Errors
    ///
    /// As [`create_collection`](Self::create_collection), plus
    /// `InvalidMetadata` for a reserved or empty metadata key.
    pub async fn create_collection_with(
        &self,
        owner: &OwnerId,
        name: &str,
        dimensions: usize,
        options: CollectionOptions,
    ) -> VectorResult<Collection> {
        self.registry
            .create_with(owner, name, dimensions, options)
            .await
    }

    /// Look up a collection by id or name.
    pub async fn get_collection(
        &self,
        owner: &OwnerId,
        collection: impl Into<CollectionRef>,
    ) -> VectorResult<Collection> {
        self.registry.get(owner, &collection.into())
    }

    /// Collections of `owner`, sorted by name.
    pub async fn list_collections(&self, owner: &OwnerId) -> VectorResult<Vec<Collection>> {
        Ok(self.registry.list(owner))
    }

    /// One page of `owner`'s collections, sorted by name, with vector counts.
    ///
    /// Counts come from the backend. A count that cannot be read fails the
    /// whole page.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a limit outside `1..=MAX_PAGE_LIMIT`, or a backend
    /// error.
    pub async fn list_collections_page(
        &self,
        owner: &OwnerId,
        page: Page,
    ) -> VectorResult<Vec<CollectionSummary>> {
        let collections = self.registry.list_page(owner, page)?;
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_batches));
        let mut counts = JoinSet::new();

        for (index, collection) in collections.iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| VectorError::Internal(e.to_string()))?;
            let backend = self.backend.clone();
            let collection = collection.clone();
            let timeout = self.request_timeout;
            counts.spawn(async move {
                let _permit = permit;
                let stats = with_deadline("stats", timeout, backend.stats(&collection)).await;
                (index, stats)
            });
        }

        let mut vector_counts = vec![0u64; collections.len()];
        while let Some(joined) = counts.join_next().await {
            let (index, stats) = joined.map_err(|e| {
                warn!(error = %e, "collection count task failed");
                VectorError::Internal(format!("collection count task failed: {}", e))
            })?;
            vector_counts[index] = stats?.count;
        }

        Ok(collections
            .into_iter()
            .zip(vector_counts)
            .map(|(collection, vector_count)| CollectionSummary {
                collection,
                vector_count,
            })
            .collect())
    }

    /// Rename a collection or change its description or metadata.
    ///
    /// Fields left as `None` in `update` keep their value.
    pub async fn update_collection(
        &self,
        owner: &OwnerId,
        id: CollectionId,
        update: CollectionUpdate,
    ) -> VectorResult<Collection> {
        self.registry.update(owner, id, update).await
    }

    /// Delete a collection and all its vectors.
    pub async fn delete_collection(&self, owner: &OwnerId, id: CollectionId) -> VectorResult<()> {
        self.registry.delete(owner, id).await
    }

    // =========================================================================
    // Vectors
    // =========================================================================

    /// Add vectors to a collection.
    ///
    /// Malformed input rejects the whole call. Otherwise the report holds
    /// one outcome per record, in input order.
    pub async fn add_vectors(
        &self,
        owner: &OwnerId,
        id: CollectionId,
        records: Vec<VectorRecord>,
    ) -> VectorResult<IngestReport> {
        let collection = self.registry.get(owner, &CollectionRef::Id(id))?;
        self.ingest.add(&collection, records).await
    }

    /// Replace one vector with a new record.
    ///
    /// Not atomic: the old vector is deleted first, then the record added.
    ///
    /// # Errors
    ///
    /// `VectorNotFound` if `old` is not stored; nothing is written then.
    pub async fn replace_vector(
        &self,
        owner: &OwnerId,
        id: CollectionId,
        old: VectorId,
        record: VectorRecord,
    ) -> VectorResult<IngestReport> {
        let collection = self.registry.get(owner, &CollectionRef::Id(id))?;
        self.ingest.replace(&collection, old, record).await
    }

    /// Read one stored vector.
    ///
    /// # Errors
    ///
    /// `VectorNotFound` if the collection holds no vector with this id.
    pub async fn get_vector(
        &self,
        owner: &OwnerId,
        id: CollectionId,
        vector: &VectorId,
    ) -> VectorResult<VectorEntry> {
        let collection = self.registry.get(owner, &CollectionRef::Id(id))?;
        self.fetch_vector(&collection, vector)
            .await?
            .ok_or_else(|| VectorError::VectorNotFound {
                id: vector.to_string(),
            })
    }

    /// Read the vector stored for a document id.
    ///
    /// # Errors
    ///
    /// `VectorNotFound` (naming the document id) if no vector carries it.
    pub async fn get_by_document_id(
        &self,
        owner: &OwnerId,
        id: CollectionId,
        document_id: &str,
    ) -> VectorResult<VectorEntry> {
        let collection = self.registry.get(owner, &CollectionRef::Id(id))?;
        let not_found = || VectorError::VectorNotFound {
            id: document_id.to_string(),
        };
        let found = with_deadline(
            "find_document",
            self.request_timeout,
            self.backend.find_document(&collection, document_id),
        )
        .await?;
        let Some(vector) = found else {
            return Err(not_found());
        };
        // Deleted between the lookup and the read
        self.fetch_vector(&collection, &vector)
            .await?
            .ok_or_else(not_found)
    }

    /// One page of stored vectors in backend order.
    ///
    /// Memory and PostgreSQL page in id order. Pinecone and Weaviate page in
    /// their own listing order, which is stable while the collection is not
    /// written to.
    ///
    /// # Errors
    ///
    /// `BadRequest` for a limit outside `1..=MAX_PAGE_LIMIT`.
    pub async fn list_vectors(
        &self,
        owner: &OwnerId,
        id: CollectionId,
        page: Page,
    ) -> VectorResult<Vec<VectorEntry>> {
        page.validate()?;
        let collection = self.registry.get(owner, &CollectionRef::Id(id))?;
        with_deadline(
            "list_vectors",
            self.request_timeout,
            self.backend.list_vectors(&collection, page),
        )
        .await
    }

    async fn fetch_vector(
        &self,
        collection: &Collection,
        vector: &VectorId,
    ) -> VectorResult<Option<VectorEntry>> {
        with_deadline(
            "get_vector",
            self.request_timeout,
            self.backend.get_vector(collection, vector),
        )
        .await
    }

    /// Remove vectors by id.
    pub async fn delete_vectors(
        &self,
        owner: &OwnerId,
        id: CollectionId,
        ids: &[VectorId],
    ) -> VectorResult<()> {
        let collection = self.registry.get(owner, &CollectionRef::Id(id))?;
        self.ingest.delete_vectors(&collection, ids).await
    }

    /// k-NN search, most similar first.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound`, `DimensionMismatch`, `InvalidTopK`,
    /// `UnsupportedFilter`, or a backend error.
    pub async fn search(
        &self,
        owner: &OwnerId,
        id: CollectionId,
        query: SearchQuery,
    ) -> VectorResult<Vec<SearchResult>> {
        let collection = self.registry.get(owner, &CollectionRef::Id(id))?;
        self.query.search(&collection, &query).await
    }

    /// Vector count and backend-specific details.
    pub async fn stats(&self, owner: &OwnerId, id: CollectionId) -> VectorResult<CollectionStats> {
        let collection = self.registry.get(owner, &CollectionRef::Id(id))?;
        with_deadline(
            "stats",
            self.request_timeout,
            self.backend.stats(&collection),
        )
        .await
    }
}

/// Builder for store configuration.
///
/// # Example
///
/// ```ignore
/// // Production: pgvector with a durable registry
/// let store = VectorStore::builder()
///     .backend(BackendConfig::postgres(url))
///     .registry_path("/var/lib/vectorhub/registry.vhrg")
///     .open()
///     .await?;
///
/// // Tests: custom adapter, in-memory registry
/// let store = VectorStore::builder()
///     .with_backend(Arc::new(MyBackend::new()))
///     .open()
///     .await?;
/// ```
pub struct VectorStoreBuilder {
    config: VectorStoreConfig,
    backend: Option<Arc<dyn VectorBackend>>,
    metadata_store: Option<Arc<dyn MetadataStore>>,
}

impl VectorStoreBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: VectorStoreConfig::default(),
            backend: None,
            metadata_store: None,
        }
    }

    /// Start from an existing configuration.
    pub fn config(mut self, config: VectorStoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Backend settings.
    pub fn backend(mut self, backend: BackendConfig) -> Self {
        self.config.backend = backend;
        self
    }

    /// Use an already constructed adapter instead of connecting.
    ///
    /// Overrides [`backend`](Self::backend).
    pub fn with_backend(mut self, backend: Arc<dyn VectorBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Persist the registry in a file.
    pub fn registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.registry = RegistryConfig::File { path: path.into() };
        self
    }

    /// Persist the registry through a custom store.
    ///
    /// Overrides [`registry_path`](Self::registry_path).
    pub fn with_metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata_store = Some(store);
        self
    }

    /// Largest `top_k` a search may ask for.
    pub fn max_top_k(mut self, max: usize) -> Self {
        self.config.max_top_k = max;
        self
    }

    /// Extra candidates requested beyond `top_k`.
    pub fn tie_overfetch(mut self, extra: usize) -> Self {
        self.config.tie_overfetch = extra;
        self
    }

    /// Deadline for every adapter call.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Ingestion chunks in flight per call.
    pub fn max_concurrent_batches(mut self, n: usize) -> Self {
        self.config.max_concurrent_batches = n;
        self
    }

    /// Open the store.
    pub async fn open(self) -> VectorResult<VectorStore> {
        let VectorStoreBuilder {
            config,
            backend,
            metadata_store,
        } = self;
        config.validate()?;

        let backend = match backend {
            Some(backend) => backend,
            None => connect(&config.backend).await?,
        };
        match metadata_store {
            Some(store) => VectorStore::assemble_with(backend, store, &config),
            None => VectorStore::assemble(backend, &config),
        }
    }
}

impl Default for VectorStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
