//! Data model shared by the registry, the adapters and the facade
//!
//! These types define collections, vector records and search results.
//! Backend-specific encodings (table rows, Pinecone vectors, Weaviate
//! objects) live in the adapters.

use crate::error::{VectorError, VectorResult};
use crate::metadata::{Metadata, MetadataFilter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Default number of results returned by a search
pub const DEFAULT_TOP_K: usize = 5;

/// Default page size for listings
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Largest page a listing returns
pub const MAX_PAGE_LIMIT: usize = 1000;

// =============================================================================
// Backend type
// =============================================================================

/// Physical store behind a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// PostgreSQL with the pgvector extension
    Postgres,
    /// Pinecone managed indexes
    Pinecone,
    /// Weaviate classes
    Weaviate,
    /// In-process brute-force index
    Memory,
}

impl BackendType {
    /// Canonical lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            BackendType::Postgres => "postgres",
            BackendType::Pinecone => "pinecone",
            BackendType::Weaviate => "weaviate",
            BackendType::Memory => "memory",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pgvector" => Some(BackendType::Postgres),
            "pinecone" => Some(BackendType::Pinecone),
            "weaviate" => Some(BackendType::Weaviate),
            "memory" | "in_memory" => Some(BackendType::Memory),
            _ => None,
        }
    }

    /// Largest collection dimension the store accepts
    pub fn max_dimensions(&self) -> usize {
        match self {
            BackendType::Postgres => 16_000,
            BackendType::Pinecone => 20_000,
            BackendType::Weaviate => 65_535,
            BackendType::Memory => 65_536,
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque owner identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create a new OwnerId
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        OwnerId(s.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        OwnerId(s)
    }
}

impl From<i64> for OwnerId {
    fn from(v: i64) -> Self {
        OwnerId(v.to_string())
    }
}

impl From<u64> for OwnerId {
    fn from(v: u64) -> Self {
        OwnerId(v.to_string())
    }
}

/// Registry-assigned collection identifier
///
/// IMPORTANT: CollectionIds are never reused. The registry persists the
/// next id alongside the collection records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub u64);

impl CollectionId {
    /// Create a new CollectionId
    pub fn new(id: u64) -> Self {
        CollectionId(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CollectionId {
    fn from(v: u64) -> Self {
        CollectionId(v)
    }
}

/// Backend-assigned vector identifier
///
/// Postgres and the memory backend hand out integers, Pinecone and Weaviate
/// use strings. Ordering puts every integer before every string so that
/// ranking ties break the same way on every backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VectorId {
    /// Integer id (postgres, memory)
    Int(i64),
    /// String id (pinecone, weaviate)
    Str(String),
}

impl VectorId {
    /// Integer value, if this is an integer id
    pub fn as_int(&self) -> Option<i64> {
        match self {
            VectorId::Int(v) => Some(*v),
            VectorId::Str(_) => None,
        }
    }

    /// String value, if this is a string id
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VectorId::Int(_) => None,
            VectorId::Str(s) => Some(s),
        }
    }
}

impl Ord for VectorId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (VectorId::Int(a), VectorId::Int(b)) => a.cmp(b),
            (VectorId::Int(_), VectorId::Str(_)) => Ordering::Less,
            (VectorId::Str(_), VectorId::Int(_)) => Ordering::Greater,
            (VectorId::Str(a), VectorId::Str(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for VectorId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorId::Int(v) => write!(f, "{}", v),
            VectorId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for VectorId {
    fn from(v: i64) -> Self {
        VectorId::Int(v)
    }
}

impl From<String> for VectorId {
    fn from(v: String) -> Self {
        VectorId::Str(v)
    }
}

impl From<&str> for VectorId {
    fn from(v: &str) -> Self {
        VectorId::Str(v.to_string())
    }
}

impl From<Uuid> for VectorId {
    fn from(v: Uuid) -> Self {
        VectorId::Str(v.to_string())
    }
}

/// Namespace for document-derived vector ids
const DOCUMENT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_9b3d_4c7e_8a15_d2e0_b7c4_1f93);

/// Deterministic vector id for a document within a collection
///
/// Used by backends that accept caller-chosen ids so that re-ingesting the
/// same document addresses the same vector.
pub fn document_vector_id(collection: CollectionId, document_id: &str) -> Uuid {
    let name = format!("{}/{}", collection.as_u64(), document_id);
    Uuid::new_v5(&DOCUMENT_NAMESPACE, name.as_bytes())
}

/// Random vector id for records without a document id
pub fn random_vector_id() -> Uuid {
    Uuid::new_v4()
}

// =============================================================================
// Collections
// =============================================================================

/// Collection metadata
///
/// Identity for uniqueness is `(owner, name)`. Dimensions never change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Registry-assigned id
    pub id: CollectionId,
    /// Owner of the collection
    pub owner: OwnerId,
    /// Collection name, unique per owner
    pub name: String,
    /// Embedding dimension
    pub dimensions: usize,
    /// Store holding the vectors
    pub backend_type: BackendType,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Caller metadata attached to the collection itself
    #[serde(default)]
    pub metadata: Metadata,
}

impl Collection {
    /// Name of the physical table, index or class for this collection
    pub fn physical_name(&self) -> String {
        match self.backend_type {
            BackendType::Postgres => format!("vh_c{}", self.id),
            BackendType::Pinecone => format!("vh-c{}", self.id),
            BackendType::Weaviate => format!("VhC{}", self.id),
            BackendType::Memory => format!("c{}", self.id),
        }
    }
}

/// Optional settings for a new collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionOptions {
    /// Free-form description
    pub description: Option<String>,
    /// Caller metadata attached to the collection
    pub metadata: Metadata,
}

impl CollectionOptions {
    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the collection metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Change to the mutable fields of a collection
///
/// `None` leaves a field untouched. Dimensions and backend are fixed at
/// creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionUpdate {
    /// New name, unique per owner
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New collection metadata (replaces the old map)
    pub metadata: Option<Metadata>,
}

impl CollectionUpdate {
    /// Rename the collection
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the collection metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check if the update changes nothing
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.metadata.is_none()
    }
}

/// Collection with its current vector count, as returned by listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    /// Registry record
    #[serde(flatten)]
    pub collection: Collection,
    /// Vectors stored in the backend
    pub vector_count: u64,
}

/// Offset pagination for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Entries to skip
    pub offset: usize,
    /// Entries to return, in `1..=MAX_PAGE_LIMIT`
    pub limit: usize,
}

impl Page {
    /// Page starting at `offset`
    pub fn new(offset: usize, limit: usize) -> Self {
        Page { offset, limit }
    }

    /// Reject limits outside `1..=MAX_PAGE_LIMIT`
    pub fn validate(&self) -> VectorResult<()> {
        if self.limit == 0 || self.limit > MAX_PAGE_LIMIT {
            return Err(VectorError::BadRequest {
                message: format!(
                    "page limit {} must be in 1..={}",
                    self.limit, MAX_PAGE_LIMIT
                ),
            });
        }
        Ok(())
    }
}

impl Default for Page {
    fn default() -> Self {
        Page {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Address a collection by id or by name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionRef {
    /// Registry id
    Id(CollectionId),
    /// Owner-scoped name
    Name(String),
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionRef::Id(id) => write!(f, "{}", id),
            CollectionRef::Name(name) => f.write_str(name),
        }
    }
}

impl From<CollectionId> for CollectionRef {
    fn from(id: CollectionId) -> Self {
        CollectionRef::Id(id)
    }
}

impl From<&str> for CollectionRef {
    fn from(name: &str) -> Self {
        CollectionRef::Name(name.to_string())
    }
}

impl From<String> for CollectionRef {
    fn from(name: String) -> Self {
        CollectionRef::Name(name)
    }
}

/// Collection statistics
///
/// `details` is an open map of backend-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    /// Number of stored vectors
    pub count: u64,
    /// Backend that produced the stats
    pub backend: BackendType,
    /// Backend-specific fields
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl CollectionStats {
    /// Create stats with no backend-specific details
    pub fn new(backend: BackendType, count: u64) -> Self {
        CollectionStats {
            count,
            backend,
            details: serde_json::Map::new(),
        }
    }

    /// Add a backend-specific field
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

// =============================================================================
// Records and results
// =============================================================================

/// Vector to ingest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Embedding, length must equal the collection dimensions
    pub embedding: Vec<f32>,
    /// Scalar metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Caller document id, unique per collection when present
    #[serde(default)]
    pub document_id: Option<String>,
}

impl VectorRecord {
    /// Create a record with no metadata and no document id
    pub fn new(embedding: Vec<f32>) -> Self {
        VectorRecord {
            embedding,
            metadata: Metadata::new(),
            document_id: None,
        }
    }

    /// Set the document id
    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    /// Replace the metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add one metadata entry
    pub fn with_field(
        mut self,
        key: impl Into<String>,
        value: impl Into<crate::metadata::MetadataValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get the embedding dimension
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// k-NN query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Query embedding
    pub vector: Vec<f32>,
    /// Number of results
    pub top_k: usize,
    /// Metadata filter (conjunctive)
    pub filter: MetadataFilter,
    /// Return stored embeddings with each result
    pub include_vectors: bool,
}

impl SearchQuery {
    /// Query with the default top_k and no filter
    pub fn new(vector: Vec<f32>) -> Self {
        SearchQuery {
            vector,
            top_k: DEFAULT_TOP_K,
            filter: MetadataFilter::new(),
            include_vectors: false,
        }
    }

    /// Set top_k
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the filter
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Request stored embeddings
    pub fn with_vectors(mut self) -> Self {
        self.include_vectors = true;
        self
    }
}

/// Search result entry
///
/// `similarity` is cosine similarity in `[-1, 1]` regardless of the native
/// metric of the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Backend vector id
    pub id: VectorId,
    /// Caller document id, if one was stored
    pub document_id: Option<String>,
    /// Stored metadata
    pub metadata: Metadata,
    /// Stored embedding, when requested and available
    pub embedding: Option<Vec<f32>>,
    /// Cosine similarity (higher = more similar)
    pub similarity: f32,
}

/// Vector as stored, returned by point lookups and listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    /// Backend vector id
    pub id: VectorId,
    /// Caller document id, if one was stored
    pub document_id: Option<String>,
    /// Stored metadata
    pub metadata: Metadata,
    /// Stored embedding
    pub embedding: Vec<f32>,
}

/// Result of ingesting one record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    /// Position of the record in the request
    pub index: usize,
    /// Document id of the record, if any
    pub document_id: Option<String>,
    /// Assigned id or the per-record error
    pub result: VectorResult<VectorId>,
}

impl RecordOutcome {
    /// Check if the record was stored
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-record results of an ingestion call, in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// One outcome per input record
    pub outcomes: Vec<RecordOutcome>,
}

impl IngestReport {
    /// Wrap outcomes (must already be in input order)
    pub fn new(outcomes: Vec<RecordOutcome>) -> Self {
        IngestReport { outcomes }
    }

    /// Number of records in the request
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Check if the request was empty
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of stored records
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    /// Number of rejected records
    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// Check if every record was stored
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(RecordOutcome::is_ok)
    }

    /// Ids of stored records, in input order
    pub fn ids(&self) -> Vec<VectorId> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().cloned())
            .collect()
    }

    /// Iterate over the outcomes
    pub fn iter(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter()
    }
}
