//! Backend configuration
//!
//! Read once at start, either deserialized or from the environment:
//!
//! | Variable | Backend | Default |
//! |----------|---------|---------|
//! | `VECTOR_STORE_TYPE` | all | `postgres` |
//! | `POSTGRES_VECTOR_DB_URL` (fallback `DATABASE_URL`) | postgres | required |
//! | `PINECONE_API_KEY` | pinecone | required |
//! | `PINECONE_ENVIRONMENT` | pinecone | `us-east-1-aws` |
//! | `PINECONE_CONTROLLER_URL` | pinecone | `https://api.pinecone.io` |
//! | `WEAVIATE_URL` | weaviate | required |
//! | `WEAVIATE_API_KEY` | weaviate | none |

use serde::{Deserialize, Serialize};
use std::fmt;
use vectorhub_core::{BackendType, VectorError, VectorResult};

/// Default Pinecone environment (`<region>-<cloud>`)
pub const DEFAULT_PINECONE_ENVIRONMENT: &str = "us-east-1-aws";
/// Default Pinecone control plane
pub const DEFAULT_PINECONE_CONTROLLER_URL: &str = "https://api.pinecone.io";

fn default_pg_max_connections() -> u32 {
    10
}

fn default_pg_batch_size() -> usize {
    500
}

fn default_remote_batch_size() -> usize {
    100
}

fn default_memory_batch_size() -> usize {
    256
}

fn default_pinecone_environment() -> String {
    DEFAULT_PINECONE_ENVIRONMENT.to_string()
}

fn default_pinecone_controller_url() -> String {
    DEFAULT_PINECONE_CONTROLLER_URL.to_string()
}

/// Settings for the one backend a store runs on
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// PostgreSQL + pgvector
    Postgres {
        /// Connection string
        url: String,
        /// Pool size
        #[serde(default = "default_pg_max_connections")]
        max_connections: u32,
        /// Records per insert transaction
        #[serde(default = "default_pg_batch_size")]
        batch_size: usize,
    },
    /// Pinecone serverless
    Pinecone {
        /// API key
        api_key: String,
        /// `<region>-<cloud>`, e.g. `us-east-1-aws`
        #[serde(default = "default_pinecone_environment")]
        environment: String,
        /// Control plane base URL
        #[serde(default = "default_pinecone_controller_url")]
        controller_url: String,
        /// Records per upsert request
        #[serde(default = "default_remote_batch_size")]
        batch_size: usize,
    },
    /// Weaviate
    Weaviate {
        /// Base URL, e.g. `http://localhost:8080`
        url: String,
        /// Optional bearer token
        #[serde(default)]
        api_key: Option<String>,
        /// Objects per batch request
        #[serde(default = "default_remote_batch_size")]
        batch_size: usize,
    },
    /// In-process index
    Memory {
        /// Records per chunk
        #[serde(default = "default_memory_batch_size")]
        batch_size: usize,
    },
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendConfig::Postgres {
                max_connections,
                batch_size,
                ..
            } => f
                .debug_struct("Postgres")
                .field("url", &"<redacted>")
                .field("max_connections", max_connections)
                .field("batch_size", batch_size)
                .finish(),
            BackendConfig::Pinecone {
                environment,
                controller_url,
                batch_size,
                ..
            } => f
                .debug_struct("Pinecone")
                .field("api_key", &"<redacted>")
                .field("environment", environment)
                .field("controller_url", controller_url)
                .field("batch_size", batch_size)
                .finish(),
            BackendConfig::Weaviate {
                url,
                api_key,
                batch_size,
            } => f
                .debug_struct("Weaviate")
                .field("url", url)
                .field("api_key", &api_key.as_ref().map(|_| "<redacted>"))
                .field("batch_size", batch_size)
                .finish(),
            BackendConfig::Memory { batch_size } => f
                .debug_struct("Memory")
                .field("batch_size", batch_size)
                .finish(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::memory()
    }
}

impl BackendConfig {
    /// In-process backend with default chunking
    pub fn memory() -> Self {
        BackendConfig::Memory {
            batch_size: default_memory_batch_size(),
        }
    }

    /// Postgres backend with default pool and chunking
    pub fn postgres(url: impl Into<String>) -> Self {
        BackendConfig::Postgres {
            url: url.into(),
            max_connections: default_pg_max_connections(),
            batch_size: default_pg_batch_size(),
        }
    }

    /// Pinecone backend in the default environment
    pub fn pinecone(api_key: impl Into<String>) -> Self {
        BackendConfig::Pinecone {
            api_key: api_key.into(),
            environment: default_pinecone_environment(),
            controller_url: default_pinecone_controller_url(),
            batch_size: default_remote_batch_size(),
        }
    }

    /// Weaviate backend without authentication
    pub fn weaviate(url: impl Into<String>) -> Self {
        BackendConfig::Weaviate {
            url: url.into(),
            api_key: None,
            batch_size: default_remote_batch_size(),
        }
    }

    /// Which backend this configures
    pub fn backend_type(&self) -> BackendType {
        match self {
            BackendConfig::Postgres { .. } => BackendType::Postgres,
            BackendConfig::Pinecone { .. } => BackendType::Pinecone,
            BackendConfig::Weaviate { .. } => BackendType::Weaviate,
            BackendConfig::Memory { .. } => BackendType::Memory,
        }
    }

    /// Records per write request
    pub fn batch_size(&self) -> usize {
        match self {
            BackendConfig::Postgres { batch_size, .. }
            | BackendConfig::Pinecone { batch_size, .. }
            | BackendConfig::Weaviate { batch_size, .. }
            | BackendConfig::Memory { batch_size } => *batch_size,
        }
    }

    /// Override records per write request
    pub fn with_batch_size(mut self, size: usize) -> Self {
        match &mut self {
            BackendConfig::Postgres { batch_size, .. }
            | BackendConfig::Pinecone { batch_size, .. }
            | BackendConfig::Weaviate { batch_size, .. }
            | BackendConfig::Memory { batch_size } => *batch_size = size,
        }
        self
    }

    /// Read the backend configuration from the process environment
    ///
    /// # Errors
    ///
    /// `Config` if the backend type is unknown or a required variable is
    /// missing.
    pub fn from_env() -> VectorResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the backend configuration through a variable lookup
    pub fn from_lookup<F>(lookup: F) -> VectorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                VectorError::Config(format!("{} environment variable is required", key))
            })
        };

        let kind = get("VECTOR_STORE_TYPE").unwrap_or_else(|| "postgres".to_string());
        let backend = BackendType::parse(&kind).ok_or_else(|| {
            VectorError::Config(format!("unknown VECTOR_STORE_TYPE '{}'", kind))
        })?;

        let config = match backend {
            BackendType::Postgres => {
                let url = get("POSTGRES_VECTOR_DB_URL")
                    .or_else(|| get("DATABASE_URL"))
                    .ok_or_else(|| {
                        VectorError::Config(
                            "POSTGRES_VECTOR_DB_URL or DATABASE_URL environment variable is required"
                                .to_string(),
                        )
                    })?;
                BackendConfig::postgres(url)
            }
            BackendType::Pinecone => BackendConfig::Pinecone {
                api_key: require("PINECONE_API_KEY")?,
                environment: get("PINECONE_ENVIRONMENT")
                    .unwrap_or_else(default_pinecone_environment),
                controller_url: get("PINECONE_CONTROLLER_URL")
                    .unwrap_or_else(default_pinecone_controller_url),
                batch_size: default_remote_batch_size(),
            },
            BackendType::Weaviate => BackendConfig::Weaviate {
                url: require("WEAVIATE_URL")?,
                api_key: get("WEAVIATE_API_KEY"),
                batch_size: default_remote_batch_size(),
            },
            BackendType::Memory => BackendConfig::memory(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the settings without connecting
    ///
    /// # Errors
    ///
    /// `Config` for empty credentials, unparsable URLs, a zero batch size
    /// or a malformed Pinecone environment.
    pub fn validate(&self) -> VectorResult<()> {
        if self.batch_size() == 0 {
            return Err(VectorError::Config("batch_size must be > 0".to_string()));
        }
        match self {
            BackendConfig::Postgres {
                url,
                max_connections,
                ..
            } => {
                if url.trim().is_empty() {
                    return Err(VectorError::Config("postgres url is empty".to_string()));
                }
                if *max_connections == 0 {
                    return Err(VectorError::Config(
                        "max_connections must be > 0".to_string(),
                    ));
                }
            }
            BackendConfig::Pinecone {
                api_key,
                environment,
                controller_url,
                ..
            } => {
                if api_key.trim().is_empty() {
                    return Err(VectorError::Config("pinecone api_key is empty".to_string()));
                }
                pinecone_region_and_cloud(environment)?;
                parse_url(controller_url)?;
            }
            BackendConfig::Weaviate { url, .. } => {
                parse_url(url)?;
            }
            BackendConfig::Memory { .. } => {}
        }
        Ok(())
    }
}

/// Split a Pinecone environment into `(region, cloud)`
///
/// The cloud is the part after the last `-`: `us-east-1-aws` is region
/// `us-east-1` on `aws`.
pub fn pinecone_region_and_cloud(environment: &str) -> VectorResult<(String, String)> {
    match environment.rsplit_once('-') {
        Some((region, cloud)) if !region.is_empty() && !cloud.is_empty() => {
            Ok((region.to_string(), cloud.to_string()))
        }
        _ => Err(VectorError::Config(format!(
            "PINECONE_ENVIRONMENT '{}' must look like <region>-<cloud>",
            environment
        ))),
    }
}

pub(crate) fn parse_url(raw: &str) -> VectorResult<url::Url> {
    url::Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| VectorError::Config(format!("invalid url '{}': {}", raw, e)))
}
