//! Store configuration
//!
//! Everything is read once when the store is opened. Backend settings live
//! in [`BackendConfig`]; this module adds the registry location and the
//! limits the facade enforces on top of any backend.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use vectorhub_backends::BackendConfig;
use vectorhub_core::{VectorError, VectorResult};

/// Default ceiling for `top_k`
pub const DEFAULT_MAX_TOP_K: usize = 1_000;
/// Default extra candidates fetched so ties at the cut-off resolve by id
pub const DEFAULT_TIE_OVERFETCH: usize = 8;
/// Default deadline for a single adapter call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of ingestion chunks in flight per call
pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 4;

/// Where the collection registry is persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegistryConfig {
    /// Process memory; lost on drop
    #[default]
    Memory,
    /// Single snapshot file
    File {
        /// Snapshot path
        path: PathBuf,
    },
}

/// Full configuration of a [`VectorStore`](crate::VectorStore)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Backend to run on
    pub backend: BackendConfig,
    /// Registry persistence
    pub registry: RegistryConfig,
    /// Largest `top_k` a search may ask for
    pub max_top_k: usize,
    /// Extra candidates requested from the backend beyond `top_k`
    pub tie_overfetch: usize,
    /// Deadline for every adapter call
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    /// Ingestion chunks in flight per `add_vectors` call
    pub max_concurrent_batches: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        VectorStoreConfig {
            backend: BackendConfig::default(),
            registry: RegistryConfig::default(),
            max_top_k: DEFAULT_MAX_TOP_K,
            tie_overfetch: DEFAULT_TIE_OVERFETCH,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
        }
    }
}

impl VectorStoreConfig {
    /// Read configuration from the process environment
    ///
    /// Backend variables are documented on [`BackendConfig`]. In addition:
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `VECTORHUB_REGISTRY_PATH` | in-memory registry |
    /// | `VECTORHUB_MAX_TOP_K` | 1000 |
    /// | `VECTORHUB_REQUEST_TIMEOUT_MS` | 30000 |
    ///
    /// # Errors
    ///
    /// `Config` for a missing required variable or an unparsable number.
    pub fn from_env() -> VectorResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup<F>(lookup: F) -> VectorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str| -> VectorResult<Option<u64>> {
            get(key)
                .map(|v| {
                    v.trim().parse::<u64>().map_err(|_| {
                        VectorError::Config(format!("{} must be a non-negative integer, got '{}'", key, v))
                    })
                })
                .transpose()
        };

        let mut config = VectorStoreConfig {
            backend: BackendConfig::from_lookup(&lookup)?,
            ..Default::default()
        };
        if let Some(path) = get("VECTORHUB_REGISTRY_PATH") {
            config.registry = RegistryConfig::File {
                path: PathBuf::from(path),
            };
        }
        if let Some(max) = number("VECTORHUB_MAX_TOP_K")? {
            config.max_top_k = max as usize;
        }
        if let Some(ms) = number("VECTORHUB_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check limits and backend settings without connecting
    pub fn validate(&self) -> VectorResult<()> {
        if self.max_top_k == 0 {
            return Err(VectorError::Config("max_top_k must be > 0".to_string()));
        }
        if self.max_concurrent_batches == 0 {
            return Err(VectorError::Config(
                "max_concurrent_batches must be > 0".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(VectorError::Config(
                "request_timeout must be > 0".to_string(),
            ));
        }
        self.backend.validate()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
