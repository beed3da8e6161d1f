//! Pinecone serverless backend
//!
//! One index per collection (`vh-c{id}`, cosine metric). The control plane
//! creates, describes and deletes indexes; vectors go to the index's own
//! data-plane host. Host names are cached per index and evicted when the
//! index is dropped.
//!
//! Vector ids are strings. A record with a document id gets the
//! deterministic UUIDv5 of `(collection, document_id)`, so a racing
//! duplicate overwrites the earlier vector instead of failing. Pinecone
//! reports cosine similarity directly, so scores pass through unchanged.

use crate::config::{parse_url, pinecone_region_and_cloud};
use crate::http;
use crate::{BackendCapabilities, BackendQuery, VectorBackend, DOCUMENT_ID_KEY};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use vectorhub_core::similarity::sanitize_similarity;
use vectorhub_core::{
    document_vector_id, random_vector_id, BackendType, Collection, CollectionStats,
    EqualityFilter, Metadata, MetadataValue, Page, SearchResult, VectorEntry, VectorError,
    VectorId, VectorRecord, VectorResult,
};

const API_VERSION: &str = "2024-07";
const BACKEND: BackendType = BackendType::Pinecone;

/// Pinecone rejects queries with a larger `topK`
const MAX_TOP_K: usize = 10_000;

/// Ids per `/vectors/list` request (the service maximum)
const LIST_PAGE_SIZE: usize = 100;

/// Pinecone adapter
#[derive(Debug)]
pub struct PineconeBackend {
    client: reqwest::Client,
    api_key: String,
    controller_url: String,
    region: String,
    cloud: String,
    batch_size: usize,
    readiness_poll: Duration,
    hosts: RwLock<HashMap<String, String>>,
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Serialize)]
struct PineconeVector<'a> {
    id: String,
    values: &'a [f32],
    metadata: Map<String, JsonValue>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default)]
    metadata: Option<Map<String, JsonValue>>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, FetchedVector>,
}

#[derive(Debug, Deserialize)]
struct FetchedVector {
    #[serde(default)]
    values: Vec<f32>,
    #[serde(default)]
    metadata: Option<Map<String, JsonValue>>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedId>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ListedId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    total_vector_count: u64,
    #[serde(default)]
    dimension: Option<u64>,
    #[serde(default)]
    index_fullness: Option<f64>,
    #[serde(default)]
    namespaces: Option<JsonValue>,
}

impl PineconeBackend {
    /// Create an adapter
    ///
    /// # Errors
    ///
    /// `Config` for an empty key, a malformed environment or an invalid
    /// controller URL.
    pub fn new(
        api_key: &str,
        environment: &str,
        controller_url: &str,
        batch_size: usize,
    ) -> VectorResult<Self> {
        if api_key.trim().is_empty() {
            return Err(VectorError::Config("pinecone api_key is empty".to_string()));
        }
        let (region, cloud) = pinecone_region_and_cloud(environment)?;
        parse_url(controller_url)?;
        Ok(PineconeBackend {
            client: http::build_client(BACKEND)?,
            api_key: api_key.to_string(),
            controller_url: controller_url.trim_end_matches('/').to_string(),
            region,
            cloud,
            batch_size: batch_size.max(1),
            readiness_poll: Duration::from_millis(500),
            hosts: RwLock::new(HashMap::new()),
        })
    }

    /// Override the interval between readiness checks after index creation
    pub fn with_readiness_poll(mut self, interval: Duration) -> Self {
        self.readiness_poll = interval;
        self
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> VectorResult<reqwest::Response> {
        builder
            .send()
            .await
            .map_err(|e| http::transport_error(BACKEND, e))
    }

    async fn describe_index(&self, name: &str) -> VectorResult<IndexDescription> {
        let url = format!("{}/indexes/{}", self.controller_url, name);
        let response = self.send(self.request(reqwest::Method::GET, &url)).await?;
        http::json(BACKEND, response, name).await
    }

    /// Data-plane base URL for an index
    async fn host(&self, name: &str) -> VectorResult<String> {
        if let Some(host) = self.hosts.read().get(name) {
            return Ok(host.clone());
        }
        let description = self.describe_index(name).await?;
        let host = normalize_host(&description.host);
        self.hosts.write().insert(name.to_string(), host.clone());
        Ok(host)
    }

    async fn data_post<T: Serialize + ?Sized>(
        &self,
        collection: &Collection,
        path: &str,
        body: &T,
    ) -> VectorResult<reqwest::Response> {
        let name = collection.physical_name();
        let host = self.host(&name).await?;
        let response = self
            .send(
                self.request(reqwest::Method::POST, &format!("{}{}", host, path))
                    .json(body),
            )
            .await?;
        http::check(BACKEND, response, &name).await
    }

    /// Fetch vectors by id; absent ids are missing from the map
    async fn fetch(
        &self,
        collection: &Collection,
        ids: &[String],
    ) -> VectorResult<HashMap<String, FetchedVector>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let name = collection.physical_name();
        let host = self.host(&name).await?;
        let params: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        let response = self
            .send(
                self.request(reqwest::Method::GET, &format!("{}/vectors/fetch", host))
                    .query(&params),
            )
            .await?;
        let fetched: FetchResponse = http::json(BACKEND, response, &name).await?;
        Ok(fetched.vectors)
    }

    /// Walk `/vectors/list` until `wanted` ids are known or the index ends
    async fn list_ids(&self, collection: &Collection, wanted: usize) -> VectorResult<Vec<String>> {
        let name = collection.physical_name();
        let host = self.host(&name).await?;
        let url = format!("{}/vectors/list", host);
        let limit = LIST_PAGE_SIZE.to_string();

        let mut ids = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut request = self
                .request(reqwest::Method::GET, &url)
                .query(&[("limit", limit.as_str())]);
            if let Some(token) = &token {
                request = request.query(&[("paginationToken", token.as_str())]);
            }
            let page: ListResponse = http::json(BACKEND, self.send(request).await?, &name).await?;
            ids.extend(page.vectors.into_iter().map(|v| v.id));
            token = page.pagination.and_then(|p| p.next);
            if ids.len() >= wanted || token.is_none() {
                return Ok(ids);
            }
        }
    }

    async fn wait_until_ready(&self, name: &str) -> VectorResult<()> {
        loop {
            let description = self.describe_index(name).await?;
            if description.status.map_or(true, |s| s.ready) {
                self.hosts
                    .write()
                    .insert(name.to_string(), normalize_host(&description.host));
                return Ok(());
            }
            debug!(index = name, "waiting for pinecone index to become ready");
            tokio::time::sleep(self.readiness_poll).await;
        }
    }
}

#[async_trait]
impl VectorBackend for PineconeBackend {
    fn backend_type(&self) -> BackendType {
        BACKEND
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            strict_document_uniqueness: false,
            read_after_write: false,
            transactional_batches: false,
            max_dimensions: BACKEND.max_dimensions(),
            max_top_k: Some(MAX_TOP_K),
        }
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn create_collection(&self, collection: &Collection) -> VectorResult<()> {
        let name = collection.physical_name();
        let body = json!({
            "name": name,
            "dimension": collection.dimensions,
            "metric": "cosine",
            "spec": { "serverless": { "cloud": self.cloud, "region": self.region } },
        });
        let url = format!("{}/indexes", self.controller_url);
        let response = self
            .send(self.request(reqwest::Method::POST, &url).json(&body))
            .await?;
        if response.status() == StatusCode::CONFLICT {
            warn!(index = %name, "pinecone index already exists, reusing");
        } else {
            http::check(BACKEND, response, &name).await?;
        }
        self.wait_until_ready(&name).await
    }

    async fn drop_collection(&self, collection: &Collection) -> VectorResult<()> {
        let name = collection.physical_name();
        let url = format!("{}/indexes/{}", self.controller_url, name);
        let response = self
            .send(self.request(reqwest::Method::DELETE, &url))
            .await?;
        if response.status() != StatusCode::NOT_FOUND {
            http::check(BACKEND, response, &name).await?;
        }
        self.hosts.write().remove(&name);
        Ok(())
    }

    async fn add_vectors(
        &self,
        collection: &Collection,
        records: &[VectorRecord],
    ) -> VectorResult<Vec<VectorResult<VectorId>>> {
        let mut results: Vec<VectorResult<VectorId>> = Vec::with_capacity(records.len());
        let mut vectors = Vec::with_capacity(records.len());

        for record in records {
            if let Some((key, _)) = record.metadata.iter().find(|(_, v)| v.is_null()) {
                results.push(Err(VectorError::InvalidMetadata {
                    key: key.clone(),
                    reason: "pinecone does not store null metadata values".to_string(),
                }));
                continue;
            }
            let id = match &record.document_id {
                Some(doc) => document_vector_id(collection.id, doc),
                None => random_vector_id(),
            }
            .to_string();

            let mut metadata: Map<String, JsonValue> = record
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            if let Some(doc) = &record.document_id {
                metadata.insert(DOCUMENT_ID_KEY.to_string(), json!(doc));
            }
            vectors.push(PineconeVector {
                id: id.clone(),
                values: &record.embedding,
                metadata,
            });
            results.push(Ok(VectorId::Str(id)));
        }

        if !vectors.is_empty() {
            self.data_post(collection, "/vectors/upsert", &json!({ "vectors": vectors }))
                .await?;
            debug!(index = %collection.physical_name(), vectors = vectors.len(), "upserted chunk");
        }
        Ok(results)
    }

    async fn search(
        &self,
        collection: &Collection,
        query: &BackendQuery,
    ) -> VectorResult<Vec<SearchResult>> {
        let mut body = json!({
            "vector": query.vector,
            "topK": query.limit,
            "includeMetadata": true,
            "includeValues": query.include_vectors,
        });
        if !query.filter.is_empty() {
            body["filter"] = translate_filter(&query.filter)?;
        }

        let response: QueryResponse = self
            .data_post(collection, "/query", &body)
            .await?
            .json()
            .await
            .map_err(|e| http::transport_error(BACKEND, e))?;

        Ok(response
            .matches
            .into_iter()
            .map(|m| {
                let (metadata, document_id) = split_metadata(m.metadata.unwrap_or_default());
                SearchResult {
                    id: VectorId::Str(m.id),
                    document_id,
                    metadata,
                    embedding: (query.include_vectors && !m.values.is_empty()).then_some(m.values),
                    similarity: sanitize_similarity(m.score.unwrap_or(f32::NAN)),
                }
            })
            .collect())
    }

    async fn delete_vectors(&self, collection: &Collection, ids: &[VectorId]) -> VectorResult<()> {
        let ids = ids
            .iter()
            .map(|id| {
                id.as_str().map(str::to_string).ok_or_else(|| VectorError::BadRequest {
                    message: format!("pinecone vector ids are strings, got {}", id),
                })
            })
            .collect::<VectorResult<Vec<String>>>()?;
        for chunk in ids.chunks(self.batch_size.max(1)) {
            self.data_post(collection, "/vectors/delete", &json!({ "ids": chunk }))
                .await?;
        }
        Ok(())
    }

    async fn find_document(
        &self,
        collection: &Collection,
        document_id: &str,
    ) -> VectorResult<Option<VectorId>> {
        let id = document_vector_id(collection.id, document_id).to_string();
        let fetched = self.fetch(collection, std::slice::from_ref(&id)).await?;
        Ok(fetched.contains_key(&id).then(|| VectorId::Str(id)))
    }

    async fn get_vector(
        &self,
        collection: &Collection,
        id: &VectorId,
    ) -> VectorResult<Option<VectorEntry>> {
        let Some(id) = id.as_str() else {
            return Ok(None);
        };
        let id = id.to_string();
        let mut fetched = self.fetch(collection, std::slice::from_ref(&id)).await?;
        Ok(fetched.remove(&id).map(|v| entry_from_fetched(id, v)))
    }

    async fn list_vectors(
        &self,
        collection: &Collection,
        page: Page,
    ) -> VectorResult<Vec<VectorEntry>> {
        let ids: Vec<String> = self
            .list_ids(collection, page.offset.saturating_add(page.limit))
            .await?
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        let mut fetched = self.fetch(collection, &ids).await?;
        // A vector deleted between list and fetch is skipped.
        Ok(ids
            .into_iter()
            .filter_map(|id| fetched.remove(&id).map(|v| entry_from_fetched(id, v)))
            .collect())
    }

    async fn stats(&self, collection: &Collection) -> VectorResult<CollectionStats> {
        let stats: IndexStats = self
            .data_post(collection, "/describe_index_stats", &json!({}))
            .await?
            .json()
            .await
            .map_err(|e| http::transport_error(BACKEND, e))?;

        let mut out = CollectionStats::new(BACKEND, stats.total_vector_count)
            .with_detail("index_name", collection.physical_name());
        if let Some(dimension) = stats.dimension {
            out = out.with_detail("dimensions", dimension);
        }
        if let Some(fullness) = stats.index_fullness {
            out = out.with_detail("index_fullness", fullness);
        }
        if let Some(namespaces) = stats.namespaces {
            out = out.with_detail("namespaces", namespaces);
        }
        Ok(out)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// `{ "k": { "$eq": v }, ... }`
fn translate_filter(filter: &EqualityFilter) -> VectorResult<JsonValue> {
    let mut out = Map::new();
    for (key, value) in filter.iter() {
        if value.is_null() {
            return Err(VectorError::UnsupportedFilter {
                field: key.to_string(),
                reason: "pinecone cannot match null values".to_string(),
            });
        }
        out.insert(key.to_string(), json!({ "$eq": value.to_json() }));
    }
    Ok(JsonValue::Object(out))
}

/// Separate caller metadata from the stored document id
///
/// Non-scalar values (written by other clients) are skipped.
fn split_metadata(raw: Map<String, JsonValue>) -> (Metadata, Option<String>) {
    let mut metadata = Metadata::new();
    let mut document_id = None;
    for (key, value) in raw {
        if key == DOCUMENT_ID_KEY {
            document_id = value.as_str().map(str::to_string);
        } else if let Some(scalar) = MetadataValue::from_json(&value) {
            metadata.insert(key, scalar);
        }
    }
    (metadata, document_id)
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn entry_from_fetched(id: String, fetched: FetchedVector) -> VectorEntry {
    let (metadata, document_id) = split_metadata(fetched.metadata.unwrap_or_default());
    VectorEntry {
        id: VectorId::Str(id),
        document_id,
        metadata,
        embedding: fetched.values,
    }
}
