//! Core types for vectorhub
//!
//! This crate defines the data model shared by every layer:
//! - Collection, CollectionId, OwnerId, BackendType: collection identity
//! - VectorRecord, VectorId, IngestReport: ingestion input and output
//! - SearchQuery, SearchResult, MetadataFilter: the query contract
//! - VectorError: the unified error taxonomy
//!
//! It also holds the backend-independent algorithms: cosine similarity,
//! deterministic ranking and local validation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod metadata;
pub mod similarity;
pub mod types;
pub mod validate;

pub use error::{ErrorKind, VectorError, VectorResult};
pub use metadata::{
    metadata_from_json, metadata_to_json, EqualityFilter, FilterCondition, Metadata,
    MetadataFilter, MetadataValue, RESERVED_METADATA_PREFIX,
};
pub use similarity::{cosine_similarity, rank_results, sanitize_similarity};
pub use types::{
    document_vector_id, random_vector_id, BackendType, Collection, CollectionId,
    CollectionOptions, CollectionRef, CollectionStats, CollectionSummary, CollectionUpdate,
    IngestReport, OwnerId, Page, RecordOutcome, SearchQuery, SearchResult, VectorEntry, VectorId,
    VectorRecord, DEFAULT_PAGE_LIMIT, DEFAULT_TOP_K, MAX_PAGE_LIMIT,
};
