//! HTTP plumbing shared by the Pinecone and Weaviate adapters

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use vectorhub_core::{BackendType, VectorError, VectorResult};

/// Per-request timeout on the HTTP client itself
///
/// The facade enforces its own deadline on top of this.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn build_client(backend: BackendType) -> VectorResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(CLIENT_TIMEOUT)
        .build()
        .map_err(|e| VectorError::Config(format!("{} http client: {}", backend, e)))
}

/// Classify a transport-level failure
pub(crate) fn transport_error(backend: BackendType, err: reqwest::Error) -> VectorError {
    if err.is_timeout() {
        VectorError::Timeout {
            operation: format!("{} request", backend),
            after_ms: CLIENT_TIMEOUT.as_millis() as u64,
        }
    } else if err.is_builder() {
        VectorError::BadRequest {
            message: err.to_string(),
        }
    } else if err.is_decode() {
        VectorError::Internal(format!("{} returned an unreadable body: {}", backend, err))
    } else {
        // Failed to get a response. Most likely an intermittent network error.
        VectorError::Unavailable {
            backend,
            message: err.to_string(),
        }
    }
}

/// Classify a non-success status
///
/// `collection` is the physical name the request addressed; a 404 reports it
/// as the missing collection.
pub(crate) fn status_error(
    backend: BackendType,
    status: StatusCode,
    body: &str,
    collection: &str,
) -> VectorError {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, truncate(body, 512))
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            tracing::warn!(%backend, %status, "backend rejected credentials");
            VectorError::Unauthorized { backend, message }
        }
        StatusCode::NOT_FOUND => {
            tracing::debug!(%backend, collection, body = %message, "backend reported not found");
            VectorError::CollectionNotFound {
                name: collection.to_string(),
            }
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => VectorError::Timeout {
            operation: format!("{} request ({})", backend, status),
            after_ms: 0,
        },
        StatusCode::TOO_MANY_REQUESTS => VectorError::Unavailable { backend, message },
        s if s.is_server_error() => VectorError::Unavailable { backend, message },
        _ => VectorError::BadRequest { message },
    }
}

/// Turn a response into `Ok(response)` or a classified error
pub(crate) async fn check(
    backend: BackendType,
    response: Response,
    collection: &str,
) -> VectorResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(backend, status, &body, collection))
}

/// Check the status and decode a JSON body
pub(crate) async fn json<T: DeserializeOwned>(
    backend: BackendType,
    response: Response,
    collection: &str,
) -> VectorResult<T> {
    check(backend, response, collection)
        .await?
        .json::<T>()
        .await
        .map_err(|e| transport_error(backend, e))
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
