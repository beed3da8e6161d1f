//! Error taxonomy for the vector store layer
//!
//! Every failure surfaced by the registry, the ingestion pipeline, the query
//! engine or a backend adapter is a [`VectorError`]. Each variant carries the
//! offending field as structured data so an HTTP layer can map it to a status
//! code without parsing strings.
//!
//! ## Error Kinds (Canonical)
//!
//! | Kind | Retryable | Description |
//! |------|-----------|-------------|
//! | NotFound | no | Unknown collection or vector |
//! | AlreadyExists | no | Duplicate collection name or document id |
//! | InvalidDimensions | no | Collection dimensions out of range |
//! | DimensionMismatch | no | Embedding length differs from the collection |
//! | InvalidTopK | no | `top_k` is zero or above the ceiling |
//! | UnsupportedFilter | no | Filter cannot be expressed by the backend |
//! | BadRequest | no | Malformed input rejected locally or by the backend |
//! | Unauthorized | no | Backend rejected the credentials |
//! | Unavailable | yes | Backend unreachable or overloaded |
//! | Timeout | yes | Deadline expired client-side |
//! | Config | no | Missing or malformed configuration |
//! | Internal | no | Registry storage failure or invariant violation |

use crate::types::{BackendType, CollectionId};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

/// Coarse classification of a [`VectorError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown collection or vector
    NotFound,
    /// Duplicate collection name or document id
    AlreadyExists,
    /// Collection dimensions out of range
    InvalidDimensions,
    /// Embedding length differs from the collection
    DimensionMismatch,
    /// `top_k` is zero or exceeds the configured ceiling
    InvalidTopK,
    /// Filter cannot be expressed by the unified contract or the backend
    UnsupportedFilter,
    /// Malformed request
    BadRequest,
    /// Backend rejected the credentials
    Unauthorized,
    /// Transient backend fault
    Unavailable,
    /// Client-side deadline expired
    Timeout,
    /// Configuration problem detected at construction
    Config,
    /// Bug, corruption or registry storage failure
    Internal,
}

impl ErrorKind {
    /// Canonical error code used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::InvalidDimensions => "InvalidDimensions",
            ErrorKind::DimensionMismatch => "DimensionMismatch",
            ErrorKind::InvalidTopK => "InvalidTopK",
            ErrorKind::UnsupportedFilter => "UnsupportedFilter",
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Config => "Config",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the vector store layer
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VectorError {
    /// Collection with given id or name was not found for this owner
    #[error("Collection not found: {name}")]
    CollectionNotFound {
        /// Collection id or name as requested
        name: String,
    },

    /// Collection name already registered for this owner
    #[error("Collection already exists: {name}")]
    CollectionAlreadyExists {
        /// Collection name
        name: String,
    },

    /// Collection belongs to a backend other than the running one
    #[error("Collection {id} lives in backend {actual}, this store runs {expected}")]
    BackendMismatch {
        /// Collection id
        id: CollectionId,
        /// Backend of the running store
        expected: BackendType,
        /// Backend recorded for the collection
        actual: BackendType,
    },

    /// Vector with given id was not found
    #[error("Vector not found: {id}")]
    VectorNotFound {
        /// Vector id
        id: String,
    },

    /// A vector with this document id already exists in the collection
    #[error("Duplicate document id '{document_id}' in collection {collection}")]
    DuplicateDocument {
        /// Collection name
        collection: String,
        /// Conflicting document id
        document_id: String,
    },

    /// Collection dimensions must be in `1..=max`
    #[error("Invalid dimensions: {dimensions} (must be in 1..={max})")]
    InvalidDimensions {
        /// Requested dimensions
        dimensions: usize,
        /// Maximum accepted by the backend
        max: usize,
    },

    /// Vector length doesn't match the collection configuration
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Collection dimensions
        expected: usize,
        /// Length of the offending vector
        got: usize,
        /// Position of the offending record in the request (None for queries)
        index: Option<usize>,
    },

    /// `top_k` outside `1..=max`
    #[error("Invalid top_k: {requested} (must be in 1..={max})")]
    InvalidTopK {
        /// Requested top_k
        requested: usize,
        /// Configured ceiling
        max: usize,
    },

    /// Filter condition cannot be honoured
    #[error("Unsupported filter on '{field}': {reason}")]
    UnsupportedFilter {
        /// Metadata key of the rejected condition
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Collection name is invalid
    #[error("Invalid collection name: {name} ({reason})")]
    InvalidCollectionName {
        /// The invalid name
        name: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// Embedding contains non-finite components or is empty
    #[error("Invalid embedding: {reason}")]
    InvalidEmbedding {
        /// Position of the offending record (None for queries)
        index: Option<usize>,
        /// Reason why it's invalid
        reason: String,
    },

    /// Metadata key or value cannot be stored
    #[error("Invalid metadata key '{key}': {reason}")]
    InvalidMetadata {
        /// Offending key
        key: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// Backend rejected the request as malformed
    #[error("Bad request: {message}")]
    BadRequest {
        /// Backend message
        message: String,
    },

    /// Backend rejected the credentials
    #[error("Unauthorized by {backend} backend: {message}")]
    Unauthorized {
        /// Backend name
        backend: BackendType,
        /// Backend message
        message: String,
    },

    /// Backend unreachable, overloaded or failing
    #[error("{backend} backend unavailable: {message}")]
    Unavailable {
        /// Backend name
        backend: BackendType,
        /// Backend message
        message: String,
    },

    /// Deadline expired before the backend answered
    #[error("Timeout after {after_ms}ms during {operation}")]
    Timeout {
        /// Adapter operation that timed out
        operation: String,
        /// Deadline in milliseconds
        after_ms: u64,
    },

    /// Required configuration missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Registry storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Registry file failed validation
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for vector store operations
pub type VectorResult<T> = Result<T, VectorError>;

impl VectorError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            VectorError::CollectionNotFound { .. }
            | VectorError::VectorNotFound { .. }
            | VectorError::BackendMismatch { .. } => ErrorKind::NotFound,
            VectorError::CollectionAlreadyExists { .. } | VectorError::DuplicateDocument { .. } => {
                ErrorKind::AlreadyExists
            }
            VectorError::InvalidDimensions { .. } => ErrorKind::InvalidDimensions,
            VectorError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            VectorError::InvalidTopK { .. } => ErrorKind::InvalidTopK,
            VectorError::UnsupportedFilter { .. } => ErrorKind::UnsupportedFilter,
            VectorError::InvalidCollectionName { .. }
            | VectorError::InvalidEmbedding { .. }
            | VectorError::InvalidMetadata { .. }
            | VectorError::BadRequest { .. } => ErrorKind::BadRequest,
            VectorError::Unauthorized { .. } => ErrorKind::Unauthorized,
            VectorError::Unavailable { .. } => ErrorKind::Unavailable,
            VectorError::Timeout { .. } => ErrorKind::Timeout,
            VectorError::Config(_) => ErrorKind::Config,
            VectorError::Storage(_)
            | VectorError::Corruption(_)
            | VectorError::Serialization(_)
            | VectorError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Canonical wire code
    pub fn error_code(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Name of the offending input field, when there is one
    pub fn field(&self) -> Option<&str> {
        match self {
            VectorError::CollectionNotFound { .. } | VectorError::BackendMismatch { .. } => {
                Some("collection")
            }
            VectorError::CollectionAlreadyExists { .. } | VectorError::InvalidCollectionName { .. } => {
                Some("name")
            }
            VectorError::VectorNotFound { .. } => Some("id"),
            VectorError::DuplicateDocument { .. } => Some("document_id"),
            VectorError::InvalidDimensions { .. } => Some("dimensions"),
            VectorError::DimensionMismatch { index: Some(_), .. }
            | VectorError::InvalidEmbedding { index: Some(_), .. } => Some("embedding"),
            VectorError::DimensionMismatch { index: None, .. }
            | VectorError::InvalidEmbedding { index: None, .. } => Some("query_vector"),
            VectorError::InvalidTopK { .. } => Some("top_k"),
            VectorError::UnsupportedFilter { field, .. } => Some(field),
            VectorError::InvalidMetadata { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Check if the caller may retry this operation with backoff
    ///
    /// Only transient backend faults are retryable. The core never retries
    /// on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unavailable | ErrorKind::Timeout)
    }

    /// Check if this error indicates the vector/collection was not found
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if this error was raised by local validation
    ///
    /// Validation errors are detected before any backend call.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            VectorError::DimensionMismatch { .. }
                | VectorError::InvalidDimensions { .. }
                | VectorError::InvalidTopK { .. }
                | VectorError::UnsupportedFilter { .. }
                | VectorError::InvalidCollectionName { .. }
                | VectorError::InvalidEmbedding { .. }
                | VectorError::InvalidMetadata { .. }
        )
    }

    /// Suggested HTTP status for this error
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists => 409,
            ErrorKind::InvalidDimensions
            | ErrorKind::DimensionMismatch
            | ErrorKind::InvalidTopK
            | ErrorKind::UnsupportedFilter => 422,
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Unavailable => 503,
            ErrorKind::Timeout => 504,
            ErrorKind::Config | ErrorKind::Internal => 500,
        }
    }

    /// Encode as `{"code", "message", "details"}`
    pub fn to_wire(&self) -> JsonValue {
        let mut details = serde_json::Map::new();
        if let Some(field) = self.field() {
            details.insert("field".to_string(), json!(field));
        }
        match self {
            VectorError::DimensionMismatch {
                expected,
                got,
                index,
            } => {
                details.insert("expected".to_string(), json!(expected));
                details.insert("got".to_string(), json!(got));
                if let Some(index) = index {
                    details.insert("index".to_string(), json!(index));
                }
            }
            VectorError::InvalidTopK { requested, max } => {
                details.insert("requested".to_string(), json!(requested));
                details.insert("max".to_string(), json!(max));
            }
            VectorError::InvalidDimensions { dimensions, max } => {
                details.insert("dimensions".to_string(), json!(dimensions));
                details.insert("max".to_string(), json!(max));
            }
            VectorError::DuplicateDocument { document_id, .. } => {
                details.insert("document_id".to_string(), json!(document_id));
            }
            VectorError::Timeout {
                operation,
                after_ms,
            } => {
                details.insert("operation".to_string(), json!(operation));
                details.insert("after_ms".to_string(), json!(after_ms));
            }
            _ => {}
        }
        details.insert("retryable".to_string(), json!(self.is_retryable()));

        json!({
            "code": self.error_code(),
            "message": self.to_string(),
            "details": JsonValue::Object(details),
        })
    }
}
