//! k-NN query execution
//!
//! Validates the query against the collection, asks the backend for a few
//! more candidates than requested, then re-ranks locally so ordering does
//! not depend on how a backend breaks ties.
//!
//! The `top_k` ceiling is the configured maximum, lowered to the backend's
//! own cap when it advertises one.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use vectorhub_backends::{with_deadline, BackendQuery, VectorBackend};
use vectorhub_core::validate::{validate_embedding, validate_top_k};
use vectorhub_core::{rank_results, Collection, SearchQuery, SearchResult, VectorResult};

pub(crate) struct QueryEngine {
    backend: Arc<dyn VectorBackend>,
    request_timeout: Duration,
    max_top_k: usize,
    tie_overfetch: usize,
}

impl QueryEngine {
    pub(crate) fn new(
        backend: Arc<dyn VectorBackend>,
        request_timeout: Duration,
        max_top_k: usize,
        tie_overfetch: usize,
    ) -> Self {
        let max_top_k = match backend.capabilities().max_top_k {
            Some(cap) if cap < max_top_k => {
                debug!(
                    configured = max_top_k,
                    backend_cap = cap,
                    "top_k ceiling lowered to backend cap"
                );
                cap
            }
            _ => max_top_k,
        };
        QueryEngine {
            backend,
            request_timeout,
            max_top_k,
            tie_overfetch,
        }
    }

    /// Effective `top_k` ceiling
    pub(crate) fn max_top_k(&self) -> usize {
        self.max_top_k
    }

    /// Translate a validated query into what the adapter sees
    pub(crate) fn plan(
        &self,
        collection: &Collection,
        query: &SearchQuery,
    ) -> VectorResult<BackendQuery> {
        validate_embedding(&query.vector, collection.dimensions, None)?;
        validate_top_k(query.top_k, self.max_top_k)?;
        let filter = query.filter.to_equality()?;

        Ok(BackendQuery {
            vector: query.vector.clone(),
            limit: query
                .top_k
                .saturating_add(self.tie_overfetch)
                .min(self.max_top_k.max(query.top_k)),
            filter,
            include_vectors: query.include_vectors,
        })
    }

    pub(crate) async fn search(
        &self,
        collection: &Collection,
        query: &SearchQuery,
    ) -> VectorResult<Vec<SearchResult>> {
        let plan = self.plan(collection, query)?;
        let candidates = with_deadline(
            "search",
            self.request_timeout,
            self.backend.search(collection, &plan),
        )
        .await?;

        let fetched = candidates.len();
        let mut results = rank_results(candidates, query.top_k);
        if !query.include_vectors {
            for result in &mut results {
                result.embedding = None;
            }
        }
        debug!(
            collection = %collection.id,
            top_k = query.top_k,
            filters = plan.filter.len(),
            fetched,
            returned = results.len(),
            "search executed"
        );
        Ok(results)
    }
}
