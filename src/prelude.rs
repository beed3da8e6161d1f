//! Convenient imports for vectorhub.
//!
//! ```ignore
//! use vectorhub::prelude::*;
//!
//! let store = VectorStore::ephemeral()?;
//! ```

// Main entry point
pub use crate::store::{VectorStore, VectorStoreBuilder};
pub use crate::config::{RegistryConfig, VectorStoreConfig};

// Error handling
pub use crate::error::{ErrorKind, VectorError, VectorResult};

// Core types
pub use vectorhub_core::{
    CollectionId, CollectionOptions, CollectionRef, CollectionUpdate, IngestReport,
    MetadataFilter, MetadataValue, OwnerId, Page, SearchQuery, SearchResult, VectorEntry,
    VectorId, VectorRecord,
};

// Backend selection
pub use vectorhub_backends::BackendConfig;

// Re-export serde_json for filters built from JSON
pub use serde_json::json;
