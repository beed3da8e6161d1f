//! Weaviate backend
//!
//! One class per collection (`VhC{id}`, vectorizer `none`, cosine distance).
//! Each object carries:
//! - `document_id`: caller document id
//! - `metadata_json`: the full metadata map, JSON-encoded
//! - `m_<key>`: one property per metadata key whose name is property-safe,
//!   used for `where` filtering
//!
//! `m_*` properties are declared explicitly the first time a key is seen,
//! strings with `field` tokenization so `Equal` compares the whole value.
//! Auto-schema would type them as word-tokenized text.
//!
//! Search goes through GraphQL `nearVector` and reports `1 - distance`.
//! Object ids are UUIDv5 of `(collection, document_id)` when a document id
//! is present, so concurrent duplicates overwrite rather than fail.

use crate::config::parse_url;
use crate::http;
use crate::{BackendCapabilities, BackendQuery, VectorBackend};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};
use vectorhub_core::similarity::similarity_from_cosine_distance;
use vectorhub_core::{
    document_vector_id, metadata_to_json, random_vector_id, BackendType, Collection,
    CollectionStats, EqualityFilter, Metadata, MetadataValue, Page, SearchResult, VectorEntry,
    VectorError, VectorId, VectorRecord, VectorResult,
};

const BACKEND: BackendType = BackendType::Weaviate;
const PROPERTY_PREFIX: &str = "m_";

/// Weaviate's default `QUERY_MAXIMUM_RESULTS`
const MAX_TOP_K: usize = 10_000;

/// Weaviate adapter
#[derive(Debug)]
pub struct WeaviateBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    batch_size: usize,
    /// `m_*` properties known to exist, per class
    declared: Mutex<HashMap<String, HashSet<String>>>,
}

#[derive(Debug, Deserialize)]
struct WeaviateObject {
    id: String,
    #[serde(default)]
    properties: Map<String, JsonValue>,
    #[serde(default)]
    vector: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ObjectList {
    #[serde(default)]
    objects: Vec<WeaviateObject>,
}

#[derive(Debug, Deserialize)]
struct BatchObjectResult {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    result: Option<BatchResultStatus>,
}

#[derive(Debug, Deserialize)]
struct BatchResultStatus {
    #[serde(default)]
    errors: Option<BatchErrors>,
}

#[derive(Debug, Deserialize)]
struct BatchErrors {
    #[serde(default)]
    error: Vec<BatchErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct BatchErrorMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<JsonValue>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl WeaviateBackend {
    /// Create an adapter
    ///
    /// # Errors
    ///
    /// `Config` if the URL cannot be parsed.
    pub fn new(url: &str, api_key: Option<&str>, batch_size: usize) -> VectorResult<Self> {
        parse_url(url)?;
        Ok(WeaviateBackend {
            client: http::build_client(BACKEND)?,
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()).map(str::to_string),
            batch_size: batch_size.max(1),
            declared: Mutex::new(HashMap::new()),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> VectorResult<reqwest::Response> {
        builder
            .send()
            .await
            .map_err(|e| http::transport_error(BACKEND, e))
    }

    async fn graphql(&self, class: &str, query: String) -> VectorResult<JsonValue> {
        let response = self
            .send(
                self.request(reqwest::Method::POST, "/v1/graphql")
                    .json(&json!({ "query": query })),
            )
            .await?;
        let body: GraphQlResponse = http::json(BACKEND, response, class).await?;
        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let message = errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            if message.contains("Cannot query field") && message.contains(class) {
                return Err(VectorError::CollectionNotFound {
                    name: class.to_string(),
                });
            }
            return Err(VectorError::BadRequest { message });
        }
        body.data
            .ok_or_else(|| VectorError::Internal("weaviate graphql returned no data".to_string()))
    }

    /// Declare the `m_*` properties a chunk needs before it is written
    async fn declare_properties(&self, class: &str, records: &[VectorRecord]) -> VectorResult<()> {
        let wanted = filter_properties(records);
        let missing: Vec<(String, JsonValue)> = {
            let declared = self.declared.lock();
            let known = declared.get(class);
            wanted
                .into_iter()
                .filter(|(name, _)| known.map_or(true, |k| !k.contains(name)))
                .collect()
        };

        for (name, schema) in missing {
            let response = self
                .send(
                    self.request(
                        reqwest::Method::POST,
                        &format!("/v1/schema/{}/properties", class),
                    )
                    .json(&schema),
                )
                .await?;
            let status = response.status();
            if status == StatusCode::UNPROCESSABLE_ENTITY {
                let text = response.text().await.unwrap_or_default();
                if !text.contains("already exists") {
                    return Err(http::status_error(BACKEND, status, &text, class));
                }
            } else {
                http::check(BACKEND, response, class).await?;
                debug!(class, property = %name, "declared property");
            }
            self.declared
                .lock()
                .entry(class.to_string())
                .or_default()
                .insert(name);
        }
        Ok(())
    }
}

#[async_trait]
impl VectorBackend for WeaviateBackend {
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
        let class = collection.physical_name();
        let body = json!({
            "class": class,
            "vectorizer": "none",
            "vectorIndexConfig": { "distance": "cosine" },
            "properties": [
                { "name": "document_id", "dataType": ["text"], "tokenization": "field" },
                { "name": "metadata_json", "dataType": ["text"] },
            ],
        });
        let response = self
            .send(self.request(reqwest::Method::POST, "/v1/schema").json(&body))
            .await?;

        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let text = response.text().await.unwrap_or_default();
            if text.contains("already exists") {
                warn!(class = %class, "weaviate class already exists, reusing");
                return Ok(());
            }
            return Err(http::status_error(BACKEND, status, &text, &class));
        }
        http::check(BACKEND, response, &class).await?;
        Ok(())
    }

    async fn drop_collection(&self, collection: &Collection) -> VectorResult<()> {
        let class = collection.physical_name();
        let response = self
            .send(self.request(reqwest::Method::DELETE, &format!("/v1/schema/{}", class)))
            .await?;
        if response.status() != StatusCode::NOT_FOUND {
            http::check(BACKEND, response, &class).await?;
        }
        self.declared.lock().remove(&class);
        Ok(())
    }

    async fn add_vectors(
        &self,
        collection: &Collection,
        records: &[VectorRecord],
    ) -> VectorResult<Vec<VectorResult<VectorId>>> {
        let class = collection.physical_name();
        let ids: Vec<String> = records
            .iter()
            .map(|r| match &r.document_id {
                Some(doc) => document_vector_id(collection.id, doc),
                None => random_vector_id(),
            })
            .map(|u| u.to_string())
            .collect();

        self.declare_properties(&class, records).await?;

        let objects: Vec<JsonValue> = records
            .iter()
            .zip(&ids)
            .map(|(record, id)| {
                json!({
                    "class": class,
                    "id": id,
                    "vector": record.embedding,
                    "properties": object_properties(record),
                })
            })
            .collect();

        let response = self
            .send(
                self.request(reqwest::Method::POST, "/v1/batch/objects")
                    .json(&json!({ "objects": objects })),
            )
            .await?;
        let outcomes: Vec<BatchObjectResult> = http::json(BACKEND, response, &class).await?;

        let mut results: Vec<VectorResult<VectorId>> =
            ids.iter().map(|id| Ok(VectorId::Str(id.clone()))).collect();
        for (position, outcome) in outcomes.iter().enumerate() {
            let Some(message) = outcome
                .result
                .as_ref()
                .and_then(|r| r.errors.as_ref())
                .and_then(|e| e.error.first())
                .map(|e| e.message.clone())
            else {
                continue;
            };
            // Prefer matching by id; fall back to response order.
            let index = outcome
                .id
                .as_ref()
                .and_then(|id| ids.iter().position(|x| x == id))
                .unwrap_or(position);
            if let Some(slot) = results.get_mut(index) {
                *slot = Err(object_error(message, &class));
            }
        }

        debug!(class = %class, objects = records.len(), "batched objects");
        Ok(results)
    }

    async fn search(
        &self,
        collection: &Collection,
        query: &BackendQuery,
    ) -> VectorResult<Vec<SearchResult>> {
        let class = collection.physical_name();
        let gql = search_query(&class, query)?;
        let data = match self.graphql(&class, gql).await {
            Ok(data) => data,
            // No object ever carried the filtered key, so nothing can match.
            Err(VectorError::BadRequest { message }) if message.contains("no such prop") => {
                debug!(class = %class, %message, "filter on undeclared property");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let hits = data
            .get("Get")
            .and_then(|g| g.get(&class))
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default();

        hits.iter()
            .map(|hit| result_from_hit(hit, query.include_vectors))
            .collect()
    }

    async fn delete_vectors(&self, collection: &Collection, ids: &[VectorId]) -> VectorResult<()> {
        let class = collection.physical_name();
        for id in ids {
            let Some(id) = id.as_str() else {
                return Err(VectorError::BadRequest {
                    message: format!("weaviate object ids are uuids, got {}", id),
                });
            };
            let response = self
                .send(self.request(
                    reqwest::Method::DELETE,
                    &format!("/v1/objects/{}/{}", class, id),
                ))
                .await?;
            if response.status() != StatusCode::NOT_FOUND {
                http::check(BACKEND, response, &class).await?;
            }
        }
        Ok(())
    }

    async fn find_document(
        &self,
        collection: &Collection,
        document_id: &str,
    ) -> VectorResult<Option<VectorId>> {
        let class = collection.physical_name();
        let id = document_vector_id(collection.id, document_id).to_string();
        let response = self
            .send(self.request(
                reqwest::Method::GET,
                &format!("/v1/objects/{}/{}", class, id),
            ))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        http::check(BACKEND, response, &class).await?;
        Ok(Some(VectorId::Str(id)))
    }

    async fn get_vector(
        &self,
        collection: &Collection,
        id: &VectorId,
    ) -> VectorResult<Option<VectorEntry>> {
        let Some(id) = id.as_str() else {
            return Ok(None);
        };
        let class = collection.physical_name();
        let response = self
            .send(
                self.request(
                    reqwest::Method::GET,
                    &format!("/v1/objects/{}/{}", class, id),
                )
                .query(&[("include", "vector")]),
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let object: WeaviateObject = http::json(BACKEND, response, &class).await?;
        Ok(Some(entry_from_object(object)))
    }

    async fn list_vectors(
        &self,
        collection: &Collection,
        page: Page,
    ) -> VectorResult<Vec<VectorEntry>> {
        let class = collection.physical_name();
        let limit = page.limit.to_string();
        let offset = page.offset.to_string();
        let response = self
            .send(self.request(reqwest::Method::GET, "/v1/objects").query(&[
                ("class", class.as_str()),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
                ("include", "vector"),
            ]))
            .await?;
        let list: ObjectList = http::json(BACKEND, response, &class).await?;
        Ok(list.objects.into_iter().map(entry_from_object).collect())
    }

    async fn stats(&self, collection: &Collection) -> VectorResult<CollectionStats> {
        let class = collection.physical_name();
        let data = self
            .graphql(&class, format!("{{ Aggregate {{ {} {{ meta {{ count }} }} }} }}", class))
            .await?;
        let count = data
            .get("Aggregate")
            .and_then(|a| a.get(&class))
            .and_then(|c| c.get(0))
            .and_then(|c| c.pointer("/meta/count"))
            .and_then(JsonValue::as_u64)
            .ok_or_else(|| {
                VectorError::Internal(format!("weaviate aggregate for {} has no count", class))
            })?;

        Ok(CollectionStats::new(BACKEND, count)
            .with_detail("class_name", class)
            .with_detail("dimensions", collection.dimensions))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Weaviate property names must match `[_A-Za-z][_0-9A-Za-z]*`
fn is_property_safe(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn property_name(key: &str) -> String {
    format!("{}{}", PROPERTY_PREFIX, key)
}

fn object_properties(record: &VectorRecord) -> JsonValue {
    let mut props = Map::new();
    props.insert(
        "document_id".to_string(),
        record
            .document_id
            .as_ref()
            .map_or(JsonValue::Null, |d| json!(d)),
    );
    props.insert(
        "metadata_json".to_string(),
        json!(metadata_to_json(&record.metadata).to_string()),
    );
    for (key, value) in &record.metadata {
        if !is_property_safe(key) {
            continue;
        }
        let encoded = match value {
            MetadataValue::Null => continue,
            MetadataValue::Bool(b) => json!(b),
            // Always a float so auto-schema types the property as number.
            MetadataValue::Number(n) => json!(*n),
            MetadataValue::String(s) => json!(s),
        };
        props.insert(property_name(key), encoded);
    }
    JsonValue::Object(props)
}

/// Schema for each `m_*` property the records carry, first type seen wins
fn filter_properties(records: &[VectorRecord]) -> BTreeMap<String, JsonValue> {
    let mut out = BTreeMap::new();
    for (key, value) in records.iter().flat_map(|r| r.metadata.iter()) {
        if !is_property_safe(key) {
            continue;
        }
        let name = property_name(key);
        if out.contains_key(&name) {
            continue;
        }
        let schema = match value {
            MetadataValue::Null => continue,
            MetadataValue::Bool(_) => json!({ "name": name, "dataType": ["boolean"] }),
            MetadataValue::Number(_) => json!({ "name": name, "dataType": ["number"] }),
            MetadataValue::String(_) => {
                json!({ "name": name, "dataType": ["text"], "tokenization": "field" })
            }
        };
        out.insert(name, schema);
    }
    out
}

fn entry_from_object(object: WeaviateObject) -> VectorEntry {
    let props = &object.properties;
    VectorEntry {
        id: VectorId::Str(object.id),
        document_id: props
            .get("document_id")
            .and_then(JsonValue::as_str)
            .map(str::to_string),
        metadata: props
            .get("metadata_json")
            .and_then(JsonValue::as_str)
            .map(parse_metadata_json)
            .unwrap_or_default(),
        embedding: object.vector,
    }
}

fn object_error(message: String, class: &str) -> VectorError {
    let lower = message.to_lowercase();
    let missing_class = lower.contains("not present in schema")
        || (lower.contains("class") && lower.contains("not found"));
    if missing_class {
        VectorError::CollectionNotFound {
            name: class.to_string(),
        }
    } else {
        VectorError::BadRequest { message }
    }
}

/// GraphQL `where` operand for one condition
fn where_operand(key: &str, value: &MetadataValue) -> VectorResult<String> {
    if !is_property_safe(key) {
        return Err(VectorError::UnsupportedFilter {
            field: key.to_string(),
            reason: "weaviate can only filter on keys made of letters, digits and '_'"
                .to_string(),
        });
    }
    let (value_field, literal) = match value {
        MetadataValue::Null => {
            return Err(VectorError::UnsupportedFilter {
                field: key.to_string(),
                reason: "weaviate cannot match null values".to_string(),
            })
        }
        MetadataValue::Bool(b) => ("valueBoolean", b.to_string()),
        MetadataValue::Number(n) => ("valueNumber", json!(*n).to_string()),
        MetadataValue::String(s) => ("valueText", json!(s).to_string()),
    };
    Ok(format!(
        "{{ path: [\"{}\"], operator: Equal, {}: {} }}",
        property_name(key),
        value_field,
        literal
    ))
}

fn where_clause(filter: &EqualityFilter) -> VectorResult<Option<String>> {
    let operands = filter
        .iter()
        .map(|(k, v)| where_operand(k, v))
        .collect::<VectorResult<Vec<_>>>()?;
    Ok(match operands.len() {
        0 => None,
        1 => operands.into_iter().next(),
        _ => Some(format!(
            "{{ operator: And, operands: [{}] }}",
            operands.join(", ")
        )),
    })
}

fn search_query(class: &str, query: &BackendQuery) -> VectorResult<String> {
    let vector = json!(query.vector).to_string();
    let mut args = format!("nearVector: {{ vector: {} }}, limit: {}", vector, query.limit);
    if let Some(clause) = where_clause(&query.filter)? {
        args.push_str(", where: ");
        args.push_str(&clause);
    }
    let additional = if query.include_vectors {
        "id distance vector"
    } else {
        "id distance"
    };
    Ok(format!(
        "{{ Get {{ {}({}) {{ document_id metadata_json _additional {{ {} }} }} }} }}",
        class, args, additional
    ))
}

fn result_from_hit(hit: &JsonValue, include_vectors: bool) -> VectorResult<SearchResult> {
    let additional = hit
        .get("_additional")
        .ok_or_else(|| VectorError::Internal("weaviate hit without _additional".to_string()))?;
    let id = additional
        .get("id")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| VectorError::Internal("weaviate hit without id".to_string()))?;
    let distance = additional
        .get("distance")
        .and_then(JsonValue::as_f64)
        .unwrap_or(f64::NAN);

    let metadata = hit
        .get("metadata_json")
        .and_then(JsonValue::as_str)
        .map(parse_metadata_json)
        .unwrap_or_default();

    let embedding = if include_vectors {
        additional.get("vector").and_then(JsonValue::as_array).map(|v| {
            v.iter()
                .filter_map(JsonValue::as_f64)
                .map(|x| x as f32)
                .collect()
        })
    } else {
        None
    };

    Ok(SearchResult {
        id: VectorId::Str(id.to_string()),
        document_id: hit
            .get("document_id")
            .and_then(JsonValue::as_str)
            .map(str::to_string),
        metadata,
        embedding,
        similarity: similarity_from_cosine_distance(distance),
    })
}

fn parse_metadata_json(raw: &str) -> Metadata {
    serde_json::from_str::<Map<String, JsonValue>>(raw)
        .map(|obj| {
            obj.into_iter()
                .filter_map(|(k, v)| MetadataValue::from_json(&v).map(|s| (k, s)))
                .collect()
        })
        .unwrap_or_default()
}
