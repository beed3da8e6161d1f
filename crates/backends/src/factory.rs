//! Backend selection
//!
//! The store picks exactly one backend at construction time. There is no
//! runtime switching; a different backend means a different store.

use crate::config::BackendConfig;
use crate::{MemoryBackend, PineconeBackend, PostgresBackend, VectorBackend, WeaviateBackend};
use std::sync::Arc;
use tracing::info;
use vectorhub_core::VectorResult;

/// Build the adapter described by `config`
///
/// No network traffic happens here: the Postgres pool connects lazily and
/// the HTTP adapters only build a client.
///
/// # Errors
///
/// `Config` when the configuration is invalid.
pub async fn connect(config: &BackendConfig) -> VectorResult<Arc<dyn VectorBackend>> {
    config.validate()?;

    let backend: Arc<dyn VectorBackend> = match config {
        BackendConfig::Postgres {
            url,
            max_connections,
            batch_size,
        } => Arc::new(PostgresBackend::connect(url, *max_connections, *batch_size)?),
        BackendConfig::Pinecone {
            api_key,
            environment,
            controller_url,
            batch_size,
        } => Arc::new(PineconeBackend::new(
            api_key,
            environment,
            controller_url,
            *batch_size,
        )?),
        BackendConfig::Weaviate {
            url,
            api_key,
            batch_size,
        } => Arc::new(WeaviateBackend::new(url, api_key.as_deref(), *batch_size)?),
        BackendConfig::Memory { batch_size } => Arc::new(MemoryBackend::new(*batch_size)),
    };

    info!(
        backend = %backend.backend_type(),
        batch_size = backend.batch_size(),
        "vector backend ready"
    );
    Ok(backend)
}
