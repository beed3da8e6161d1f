//! Local validation shared by the registry, the pipeline and the query engine
//!
//! Everything here runs before any backend call.

use crate::error::{VectorError, VectorResult};
use crate::metadata::{Metadata, RESERVED_METADATA_PREFIX};
use crate::types::BackendType;

/// Maximum collection name length in bytes
pub const MAX_COLLECTION_NAME_LEN: usize = 256;

/// Validate a collection name
///
/// Names must be non-empty, at most 256 bytes, free of `/` and NUL, and
/// must not start with `_` (reserved).
pub fn validate_collection_name(name: &str) -> VectorResult<()> {
    let invalid = |reason: &str| VectorError::InvalidCollectionName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("Collection name cannot be empty"));
    }
    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(invalid("Collection name exceeds 256 bytes"));
    }
    if name.contains('/') {
        return Err(invalid("Collection name cannot contain '/'"));
    }
    if name.contains('\0') {
        return Err(invalid("Collection name cannot contain null bytes"));
    }
    if name.starts_with('_') {
        return Err(invalid("Collection name cannot start with '_' (reserved)"));
    }
    Ok(())
}

/// Validate collection dimensions for a backend
pub fn validate_dimensions(dimensions: usize, backend: BackendType) -> VectorResult<()> {
    let max = backend.max_dimensions();
    if dimensions == 0 || dimensions > max {
        return Err(VectorError::InvalidDimensions { dimensions, max });
    }
    Ok(())
}

/// Validate an embedding against the collection dimensions
///
/// `index` is the record position for ingestion, None for queries.
pub fn validate_embedding(
    embedding: &[f32],
    expected: usize,
    index: Option<usize>,
) -> VectorResult<()> {
    if embedding.len() != expected {
        return Err(VectorError::DimensionMismatch {
            expected,
            got: embedding.len(),
            index,
        });
    }
    if let Some(pos) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(VectorError::InvalidEmbedding {
            index,
            reason: format!("component {} is not finite", pos),
        });
    }
    Ok(())
}

/// Validate metadata keys
pub fn validate_metadata(metadata: &Metadata) -> VectorResult<()> {
    for key in metadata.keys() {
        if key.is_empty() {
            return Err(VectorError::InvalidMetadata {
                key: key.clone(),
                reason: "metadata keys cannot be empty".to_string(),
            });
        }
        if key.starts_with(RESERVED_METADATA_PREFIX) {
            return Err(VectorError::InvalidMetadata {
                key: key.clone(),
                reason: format!("prefix '{}' is reserved", RESERVED_METADATA_PREFIX),
            });
        }
    }
    Ok(())
}

/// Validate top_k against the configured ceiling
pub fn validate_top_k(top_k: usize, max: usize) -> VectorResult<()> {
    if top_k == 0 || top_k > max {
        return Err(VectorError::InvalidTopK {
            requested: top_k,
            max,
        });
    }
    Ok(())
}
