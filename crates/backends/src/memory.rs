//! In-process brute-force backend
//!
//! Implements the full adapter contract with strict semantics:
//! - `RwLock<BTreeMap<physical name, MemCollection>>` holds every collection
//! - Ids are integers, monotonically increasing, never reused
//! - Search is exact cosine over every vector, sorted by
//!   (similarity desc, id asc)
//!
//! Used by embedded callers and by the test suite, so every contract
//! property can be checked without network services. Contents do not
//! survive the process.

use crate::{BackendCapabilities, BackendQuery, VectorBackend};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use vectorhub_core::similarity::{cosine_similarity, rank_results};
use vectorhub_core::{
    BackendType, Collection, CollectionStats, Metadata, Page, SearchResult, VectorEntry,
    VectorError, VectorId, VectorRecord, VectorResult,
};

#[derive(Debug, Clone)]
struct StoredVector {
    embedding: Vec<f32>,
    metadata: Metadata,
    document_id: Option<String>,
}

impl StoredVector {
    fn to_entry(&self, id: i64) -> VectorEntry {
        VectorEntry {
            id: VectorId::Int(id),
            document_id: self.document_id.clone(),
            metadata: self.metadata.clone(),
            embedding: self.embedding.clone(),
        }
    }
}

#[derive(Debug)]
struct MemCollection {
    dimensions: usize,
    next_id: i64,
    vectors: BTreeMap<i64, StoredVector>,
    documents: HashMap<String, i64>,
}

impl MemCollection {
    fn new(dimensions: usize) -> Self {
        MemCollection {
            dimensions,
            next_id: 1,
            vectors: BTreeMap::new(),
            documents: HashMap::new(),
        }
    }

    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Brute-force backend held in process memory
#[derive(Debug)]
pub struct MemoryBackend {
    collections: RwLock<BTreeMap<String, MemCollection>>,
    batch_size: usize,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new(batch_size: usize) -> Self {
        MemoryBackend {
            collections: RwLock::new(BTreeMap::new()),
            batch_size: batch_size.max(1),
        }
    }

    /// Check if the physical collection exists
    pub fn has_collection(&self, collection: &Collection) -> bool {
        self.collections
            .read()
            .contains_key(&collection.physical_name())
    }

    fn not_found(collection: &Collection) -> VectorError {
        VectorError::CollectionNotFound {
            name: collection.physical_name(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        MemoryBackend::new(256)
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            strict_document_uniqueness: true,
            read_after_write: true,
            transactional_batches: true,
            max_dimensions: BackendType::Memory.max_dimensions(),
            max_top_k: None,
        }
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn create_collection(&self, collection: &Collection) -> VectorResult<()> {
        let mut collections = self.collections.write();
        collections
            .entry(collection.physical_name())
            .or_insert_with(|| MemCollection::new(collection.dimensions));
        Ok(())
    }

    async fn drop_collection(&self, collection: &Collection) -> VectorResult<()> {
        self.collections.write().remove(&collection.physical_name());
        Ok(())
    }

    async fn add_vectors(
        &self,
        collection: &Collection,
        records: &[VectorRecord],
    ) -> VectorResult<Vec<VectorResult<VectorId>>> {
        let mut collections = self.collections.write();
        let mem = collections
            .get_mut(&collection.physical_name())
            .ok_or_else(|| Self::not_found(collection))?;

        let mut results = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if record.embedding.len() != mem.dimensions {
                results.push(Err(VectorError::DimensionMismatch {
                    expected: mem.dimensions,
                    got: record.embedding.len(),
                    index: Some(i),
                }));
                continue;
            }
            if let Some(doc) = &record.document_id {
                if mem.documents.contains_key(doc) {
                    results.push(Err(VectorError::DuplicateDocument {
                        collection: collection.name.clone(),
                        document_id: doc.clone(),
                    }));
                    continue;
                }
            }

            let id = mem.allocate_id();
            if let Some(doc) = &record.document_id {
                mem.documents.insert(doc.clone(), id);
            }
            mem.vectors.insert(
                id,
                StoredVector {
                    embedding: record.embedding.clone(),
                    metadata: record.metadata.clone(),
                    document_id: record.document_id.clone(),
                },
            );
            results.push(Ok(VectorId::Int(id)));
        }
        Ok(results)
    }

    async fn search(
        &self,
        collection: &Collection,
        query: &BackendQuery,
    ) -> VectorResult<Vec<SearchResult>> {
        let collections = self.collections.read();
        let mem = collections
            .get(&collection.physical_name())
            .ok_or_else(|| Self::not_found(collection))?;

        let candidates: Vec<SearchResult> = mem
            .vectors
            .iter()
            .filter(|(_, v)| query.filter.matches(&v.metadata))
            .map(|(id, v)| SearchResult {
                id: VectorId::Int(*id),
                document_id: v.document_id.clone(),
                metadata: v.metadata.clone(),
                embedding: query.include_vectors.then(|| v.embedding.clone()),
                similarity: cosine_similarity(&query.vector, &v.embedding),
            })
            .collect();

        Ok(rank_results(candidates, query.limit))
    }

    async fn delete_vectors(&self, collection: &Collection, ids: &[VectorId]) -> VectorResult<()> {
        let ints = ids
            .iter()
            .map(|id| {
                id.as_int().ok_or_else(|| VectorError::BadRequest {
                    message: format!("memory backend ids are integers, got '{}'", id),
                })
            })
            .collect::<VectorResult<Vec<i64>>>()?;

        let mut collections = self.collections.write();
        let mem = collections
            .get_mut(&collection.physical_name())
            .ok_or_else(|| Self::not_found(collection))?;
        for id in ints {
            if let Some(removed) = mem.vectors.remove(&id) {
                if let Some(doc) = removed.document_id {
                    mem.documents.remove(&doc);
                }
            }
        }
        Ok(())
    }

    async fn find_document(
        &self,
        collection: &Collection,
        document_id: &str,
    ) -> VectorResult<Option<VectorId>> {
        let collections = self.collections.read();
        let mem = collections
            .get(&collection.physical_name())
            .ok_or_else(|| Self::not_found(collection))?;
        Ok(mem.documents.get(document_id).map(|id| VectorId::Int(*id)))
    }

    async fn get_vector(
        &self,
        collection: &Collection,
        id: &VectorId,
    ) -> VectorResult<Option<VectorEntry>> {
        let collections = self.collections.read();
        let mem = collections
            .get(&collection.physical_name())
            .ok_or_else(|| Self::not_found(collection))?;
        Ok(id
            .as_int()
            .and_then(|id| mem.vectors.get(&id).map(|v| v.to_entry(id))))
    }

    async fn list_vectors(
        &self,
        collection: &Collection,
        page: Page,
    ) -> VectorResult<Vec<VectorEntry>> {
        let collections = self.collections.read();
        let mem = collections
            .get(&collection.physical_name())
            .ok_or_else(|| Self::not_found(collection))?;
        Ok(mem
            .vectors
            .iter()
            .skip(page.offset)
            .take(page.limit)
            .map(|(id, v)| v.to_entry(*id))
            .collect())
    }

    async fn stats(&self, collection: &Collection) -> VectorResult<CollectionStats> {
        let collections = self.collections.read();
        let mem = collections
            .get(&collection.physical_name())
            .ok_or_else(|| Self::not_found(collection))?;
        Ok(
            CollectionStats::new(BackendType::Memory, mem.vectors.len() as u64)
                .with_detail("dimensions", mem.dimensions)
                .with_detail("next_id", mem.next_id),
        )
    }
}
