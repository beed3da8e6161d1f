//! Vector ingestion
//!
//! `add` runs in three phases:
//!
//! 1. Local validation. Any failure rejects the whole call before a single
//!    backend write.
//! 2. Document lookups. Records whose `document_id` already exists get a
//!    `DuplicateDocument` outcome and are not sent.
//! 3. Chunked writes. The rest is split into `batch_size` chunks sent with at
//!    most `max_concurrent_batches` in flight. A failed chunk fails only its
//!    own records.
//!
//! Outcomes are reported in input order.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use vectorhub_backends::{with_deadline, VectorBackend};
use vectorhub_core::validate::{validate_embedding, validate_metadata};
use vectorhub_core::{
    Collection, IngestReport, RecordOutcome, VectorError, VectorId, VectorRecord, VectorResult,
};

type Outcome = VectorResult<VectorId>;

pub(crate) struct IngestionPipeline {
    backend: Arc<dyn VectorBackend>,
    request_timeout: Duration,
    max_concurrent_batches: usize,
}

impl IngestionPipeline {
    pub(crate) fn new(
        backend: Arc<dyn VectorBackend>,
        request_timeout: Duration,
        max_concurrent_batches: usize,
    ) -> Self {
        IngestionPipeline {
            backend,
            request_timeout,
            max_concurrent_batches: max_concurrent_batches.max(1),
        }
    }

    /// Reject the call if any record is malformed
    fn validate(&self, collection: &Collection, records: &[VectorRecord]) -> VectorResult<()> {
        let mut seen = HashSet::new();
        for (index, record) in records.iter().enumerate() {
            validate_embedding(&record.embedding, collection.dimensions, Some(index))?;
            validate_metadata(&record.metadata)?;
            if let Some(doc) = &record.document_id {
                if !seen.insert(doc.as_str()) {
                    return Err(VectorError::DuplicateDocument {
                        collection: collection.name.clone(),
                        document_id: doc.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) async fn add(
        &self,
        collection: &Collection,
        records: Vec<VectorRecord>,
    ) -> VectorResult<IngestReport> {
        if records.is_empty() {
            return Ok(IngestReport::default());
        }
        self.validate(collection, &records)?;

        let mut outcomes: Vec<Option<Outcome>> = vec![None; records.len()];
        self.mark_existing_documents(collection, &records, &mut outcomes)
            .await;

        let pending: Vec<usize> = (0..records.len())
            .filter(|&i| outcomes[i].is_none())
            .collect();
        self.write_chunks(collection, &records, &pending, &mut outcomes)
            .await;

        let report = IngestReport::new(
            records
                .into_iter()
                .zip(outcomes)
                .enumerate()
                .map(|(index, (record, outcome))| RecordOutcome {
                    index,
                    document_id: record.document_id,
                    result: outcome.unwrap_or_else(|| {
                        Err(VectorError::Internal(
                            "ingestion task ended without a result".to_string(),
                        ))
                    }),
                })
                .collect(),
        );
        debug!(
            collection = %collection.id,
            records = report.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "ingestion finished"
        );
        Ok(report)
    }

    /// Look up every document id; hits and lookup failures become outcomes
    async fn mark_existing_documents(
        &self,
        collection: &Collection,
        records: &[VectorRecord],
        outcomes: &mut [Option<Outcome>],
    ) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_batches));
        let mut lookups = JoinSet::new();

        for (index, record) in records.iter().enumerate() {
            let Some(doc) = record.document_id.clone() else {
                continue;
            };
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let backend = self.backend.clone();
            let collection = collection.clone();
            let timeout = self.request_timeout;
            lookups.spawn(async move {
                let _permit = permit;
                let found = with_deadline(
                    "find_document",
                    timeout,
                    backend.find_document(&collection, &doc),
                )
                .await;
                (index, doc, found)
            });
        }

        while let Some(joined) = lookups.join_next().await {
            let (index, doc, found) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(collection = %collection.id, error = %e, "document lookup task failed");
                    continue;
                }
            };
            match found {
                Ok(None) => {}
                Ok(Some(_)) => {
                    outcomes[index] = Some(Err(VectorError::DuplicateDocument {
                        collection: collection.name.clone(),
                        document_id: doc,
                    }));
                }
                Err(e) => outcomes[index] = Some(Err(e)),
            }
        }
    }

    async fn write_chunks(
        &self,
        collection: &Collection,
        records: &[VectorRecord],
        pending: &[usize],
        outcomes: &mut [Option<Outcome>],
    ) {
        if pending.is_empty() {
            return;
        }
        let batch_size = self.backend.batch_size().max(1);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_batches));
        let mut chunks = JoinSet::new();

        for (chunk_no, indices) in pending.chunks(batch_size).enumerate() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let indices = indices.to_vec();
            let chunk: Vec<VectorRecord> = indices.iter().map(|&i| records[i].clone()).collect();
            let backend = self.backend.clone();
            let collection = collection.clone();
            let timeout = self.request_timeout;

            debug!(
                collection = %collection.id,
                chunk = chunk_no,
                records = chunk.len(),
                "dispatching ingestion chunk"
            );
            chunks.spawn(async move {
                let _permit = permit;
                let written = with_deadline(
                    "add_vectors",
                    timeout,
                    backend.add_vectors(&collection, &chunk),
                )
                .await;
                (chunk_no, indices, written)
            });
        }

        while let Some(joined) = chunks.join_next().await {
            // A panicked chunk leaves its outcomes unset; `add` reports them.
            let Ok((chunk_no, indices, written)) = joined else {
                continue;
            };
            let results = match written {
                Ok(results) if results.len() == indices.len() => results,
                Ok(results) => {
                    let e = VectorError::Internal(format!(
                        "backend returned {} results for {} records",
                        results.len(),
                        indices.len()
                    ));
                    vec![Err(e); indices.len()]
                }
                Err(e) => {
                    warn!(
                        collection = %collection.id,
                        chunk = chunk_no,
                        records = indices.len(),
                        error = %e,
                        "ingestion chunk failed"
                    );
                    vec![Err(e); indices.len()]
                }
            };
            for (index, result) in indices.into_iter().zip(results) {
                outcomes[index] = Some(result);
            }
        }
    }

    /// Delete then add; not atomic
    ///
    /// The replacement is validated and the old vector looked up before
    /// anything is deleted. If the add fails after the delete, the old vector
    /// is gone.
    pub(crate) async fn replace(
        &self,
        collection: &Collection,
        old_id: VectorId,
        record: VectorRecord,
    ) -> VectorResult<IngestReport> {
        self.validate(collection, std::slice::from_ref(&record))?;
        let existing = with_deadline(
            "get_vector",
            self.request_timeout,
            self.backend.get_vector(collection, &old_id),
        )
        .await?;
        if existing.is_none() {
            return Err(VectorError::VectorNotFound {
                id: old_id.to_string(),
            });
        }
        self.delete_vectors(collection, &[old_id]).await?;
        self.add(collection, vec![record]).await
    }

    pub(crate) async fn delete_vectors(
        &self,
        collection: &Collection,
        ids: &[VectorId],
    ) -> VectorResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        with_deadline(
            "delete_vectors",
            self.request_timeout,
            self.backend.delete_vectors(collection, ids),
        )
        .await?;
        debug!(collection = %collection.id, ids = ids.len(), "vectors deleted");
        Ok(())
    }
}
