//! Collection registry
//!
//! Maps `(owner, name)` to a [`Collection`] and keeps the backend's physical
//! collections in step with it.
//!
//! ## Ordering
//!
//! - create: reserve name, allocate id, backend create, then persist record
//! - delete: unregister, backend drop, restore record if the drop fails
//! - update: rename and edit description/metadata, no backend call
//!
//! Ids are persisted as soon as they are allocated so they are never handed
//! out twice, even if the process dies between the backend call and the
//! final save.
//!
//! ## Locking
//!
//! One `parking_lot::Mutex` guards the in-memory state and is never held
//! across an `.await` or a file write. Every change that must be persisted
//! runs under the async `persist` lock: mutate state, take a snapshot, write
//! it on the blocking pool, revert on failure. Snapshots therefore reach the
//! store in mutation order. A name that is being created, renamed or deleted
//! is held in `reserved` for the duration of the backend call.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use vectorhub_backends::{with_deadline, VectorBackend};
use vectorhub_core::validate::{validate_collection_name, validate_dimensions, validate_metadata};
use vectorhub_core::{
    BackendType, Collection, CollectionId, CollectionOptions, CollectionRef, CollectionUpdate,
    OwnerId, Page, VectorError, VectorResult,
};

use crate::store::{MetadataStore, RegistrySnapshot};

type NameKey = (OwnerId, String);

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    collections: BTreeMap<CollectionId, Collection>,
    reserved: HashSet<NameKey>,
}

impl RegistryState {
    fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let collections: BTreeMap<_, _> = snapshot
            .collections
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        let after_last = collections.keys().next_back().map_or(1, |id| id.0 + 1);
        RegistryState {
            next_id: snapshot.next_id.max(after_last).max(1),
            collections,
            reserved: HashSet::new(),
        }
    }

    fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            next_id: self.next_id,
            collections: self.collections.values().cloned().collect(),
        }
    }

    fn find_by_name(&self, owner: &OwnerId, name: &str) -> Option<&Collection> {
        self.collections
            .values()
            .find(|c| &c.owner == owner && c.name == name)
    }

    fn name_taken(&self, key: &NameKey) -> bool {
        self.reserved.contains(key) || self.find_by_name(&key.0, &key.1).is_some()
    }
}

/// Registry of collections for one backend
pub struct CollectionRegistry {
    backend: Arc<dyn VectorBackend>,
    store: Arc<dyn MetadataStore>,
    state: Mutex<RegistryState>,
    persist: tokio::sync::Mutex<()>,
    request_timeout: Duration,
}

/// Releases a name reservation when dropped, including on cancellation
struct Reservation<'a> {
    state: &'a Mutex<RegistryState>,
    key: NameKey,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.state.lock().reserved.remove(&self.key);
    }
}

impl std::fmt::Debug for CollectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CollectionRegistry")
            .field("backend", &self.backend.backend_type())
            .field("collections", &state.collections.len())
            .field("next_id", &state.next_id)
            .finish()
    }
}

impl CollectionRegistry {
    /// Load the registry from `store`
    ///
    /// # Errors
    ///
    /// Whatever the store reports: `Storage`, `Corruption` or
    /// `Serialization`.
    pub fn open(
        backend: Arc<dyn VectorBackend>,
        store: Arc<dyn MetadataStore>,
        request_timeout: Duration,
    ) -> VectorResult<Self> {
        let state = RegistryState::from_snapshot(store.load()?);
        info!(
            backend = %backend.backend_type(),
            collections = state.collections.len(),
            next_id = state.next_id,
            "collection registry opened"
        );
        Ok(CollectionRegistry {
            backend,
            store,
            state: Mutex::new(state),
            persist: tokio::sync::Mutex::new(()),
            request_timeout,
        })
    }

    /// Backend this registry manages collections on
    pub fn backend(&self) -> &Arc<dyn VectorBackend> {
        &self.backend
    }

    /// Backend type of the running adapter
    pub fn backend_type(&self) -> BackendType {
        self.backend.backend_type()
    }

    /// Write a snapshot on the blocking pool
    ///
    /// Callers hold the `persist` lock.
    async fn save(&self, snapshot: RegistrySnapshot) -> VectorResult<()> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|e| VectorError::Internal(format!("registry save task failed: {}", e)))?
    }

    /// Register a collection and create it in the backend
    ///
    /// Shorthand for [`CollectionRegistry::create_with`] with default
    /// options.
    pub async fn create(
        &self,
        owner: &OwnerId,
        name: &str,
        dimensions: usize,
    ) -> VectorResult<Collection> {
        self.create_with(owner, name, dimensions, CollectionOptions::default())
            .await
    }

    /// Register a collection with a description and metadata
    ///
    /// # Errors
    ///
    /// - `InvalidCollectionName`, `InvalidDimensions`, `InvalidMetadata`
    ///   before anything else
    /// - `CollectionAlreadyExists` if the owner already has (or is creating)
    ///   a collection with this name
    /// - backend errors from the physical create
    /// - store errors; the physical collection is then dropped best-effort
    pub async fn create_with(
        &self,
        owner: &OwnerId,
        name: &str,
        dimensions: usize,
        options: CollectionOptions,
    ) -> VectorResult<Collection> {
        validate_collection_name(name)?;
        validate_dimensions(dimensions, self.backend_type())?;
        validate_metadata(&options.metadata)?;

        let key: NameKey = (owner.clone(), name.to_string());
        let (collection, _reservation) = {
            let _persist = self.persist.lock().await;
            let (collection, reservation, snapshot) = {
                let mut state = self.state.lock();
                if state.name_taken(&key) {
                    return Err(VectorError::CollectionAlreadyExists {
                        name: name.to_string(),
                    });
                }

                let id = CollectionId(state.next_id);
                state.next_id += 1;
                state.reserved.insert(key.clone());

                let collection = Collection {
                    id,
                    owner: owner.clone(),
                    name: name.to_string(),
                    dimensions,
                    backend_type: self.backend_type(),
                    created_at: Utc::now(),
                    description: options.description,
                    metadata: options.metadata,
                };
                let reservation = Reservation {
                    state: &self.state,
                    key,
                };
                (collection, reservation, state.snapshot())
            };
            // On failure the reservation is released and the id stays
            // burned in memory only.
            self.save(snapshot).await?;
            (collection, reservation)
        };

        with_deadline(
            "create_collection",
            self.request_timeout,
            self.backend.create_collection(&collection),
        )
        .await?;

        let saved = {
            let _persist = self.persist.lock().await;
            let snapshot = {
                let mut state = self.state.lock();
                state.collections.insert(collection.id, collection.clone());
                state.snapshot()
            };
            let saved = self.save(snapshot).await;
            if saved.is_err() {
                self.state.lock().collections.remove(&collection.id);
            }
            saved
        };

        if let Err(e) = saved {
            warn!(
                collection = %collection.id,
                error = %e,
                "failed to persist new collection, dropping physical collection"
            );
            if let Err(drop_err) = with_deadline(
                "drop_collection",
                self.request_timeout,
                self.backend.drop_collection(&collection),
            )
            .await
            {
                warn!(
                    collection = %collection.id,
                    error = %drop_err,
                    "best-effort cleanup of physical collection failed"
                );
            }
            return Err(e);
        }

        info!(
            collection = %collection.id,
            owner = %collection.owner,
            name = %collection.name,
            dimensions = collection.dimensions,
            backend = %collection.backend_type,
            "collection created"
        );
        Ok(collection)
    }

    /// Look up a collection owned by `owner`
    ///
    /// # Errors
    ///
    /// - `CollectionNotFound` if it does not exist or belongs to someone else
    /// - `BackendMismatch` if it was registered under another backend type
    pub fn get(&self, owner: &OwnerId, collection: &CollectionRef) -> VectorResult<Collection> {
        let found = {
            let state = self.state.lock();
            match collection {
                CollectionRef::Id(id) => state
                    .collections
                    .get(id)
                    .filter(|c| &c.owner == owner)
                    .cloned(),
                CollectionRef::Name(name) => state.find_by_name(owner, name).cloned(),
            }
        };

        let found = found.ok_or_else(|| VectorError::CollectionNotFound {
            name: collection.to_string(),
        })?;
        if found.backend_type != self.backend_type() {
            return Err(VectorError::BackendMismatch {
                id: found.id,
                expected: self.backend_type(),
                actual: found.backend_type,
            });
        }
        Ok(found)
    }

    /// All collections of `owner`, sorted by name
    pub fn list(&self, owner: &OwnerId) -> Vec<Collection> {
        let mut owned: Vec<Collection> = self
            .state
            .lock()
            .collections
            .values()
            .filter(|c| &c.owner == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        owned
    }

    /// One page of [`CollectionRegistry::list`]
    ///
    /// # Errors
    ///
    /// `BadRequest` for a limit outside `1..=MAX_PAGE_LIMIT`.
    pub fn list_page(&self, owner: &OwnerId, page: Page) -> VectorResult<Vec<Collection>> {
        page.validate()?;
        Ok(self
            .list(owner)
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    /// Rename a collection or change its description or metadata
    ///
    /// # Errors
    ///
    /// - `CollectionNotFound`/`BackendMismatch` as for [`CollectionRegistry::get`]
    /// - `InvalidCollectionName`, `InvalidMetadata` for bad new values
    /// - `CollectionAlreadyExists` if the new name is taken
    /// - store errors; the previous record is then restored
    pub async fn update(
        &self,
        owner: &OwnerId,
        id: CollectionId,
        update: CollectionUpdate,
    ) -> VectorResult<Collection> {
        if let Some(name) = &update.name {
            validate_collection_name(name)?;
        }
        if let Some(metadata) = &update.metadata {
            validate_metadata(metadata)?;
        }

        // Holding `persist` keeps deletes and other renames out until the
        // new record is saved.
        let _persist = self.persist.lock().await;
        let current = self.get(owner, &CollectionRef::Id(id))?;
        if update.is_empty() {
            return Ok(current);
        }

        let mut updated = current.clone();
        if let Some(name) = update.name {
            if name != current.name && self.state.lock().name_taken(&(owner.clone(), name.clone())) {
                return Err(VectorError::CollectionAlreadyExists { name });
            }
            updated.name = name;
        }
        if let Some(description) = update.description {
            updated.description = Some(description);
        }
        if let Some(metadata) = update.metadata {
            updated.metadata = metadata;
        }

        let snapshot = {
            let mut state = self.state.lock();
            state.collections.insert(id, updated.clone());
            state.snapshot()
        };
        if let Err(e) = self.save(snapshot).await {
            self.state.lock().collections.insert(id, current);
            return Err(e);
        }

        info!(collection = %id, owner = %owner, name = %updated.name, "collection updated");
        Ok(updated)
    }

    /// Unregister a collection and drop it in the backend
    ///
    /// If the backend drop fails the record is restored and the error
    /// returned, so the collection stays addressable.
    pub async fn delete(&self, owner: &OwnerId, id: CollectionId) -> VectorResult<()> {
        let collection = self.get(owner, &CollectionRef::Id(id))?;
        let key: NameKey = (owner.clone(), collection.name.clone());

        let _reservation = {
            let _persist = self.persist.lock().await;
            let (removed, snapshot) = {
                let mut state = self.state.lock();
                if state.reserved.contains(&key) {
                    return Err(VectorError::CollectionNotFound {
                        name: id.to_string(),
                    });
                }
                let Some(removed) = state.collections.remove(&id) else {
                    return Err(VectorError::CollectionNotFound {
                        name: id.to_string(),
                    });
                };
                (removed, state.snapshot())
            };
            if let Err(e) = self.save(snapshot).await {
                self.state.lock().collections.insert(id, removed);
                return Err(e);
            }
            let mut state = self.state.lock();
            state.reserved.insert(key.clone());
            Reservation {
                state: &self.state,
                key,
            }
        };

        let dropped = with_deadline(
            "drop_collection",
            self.request_timeout,
            self.backend.drop_collection(&collection),
        )
        .await;

        if let Err(e) = dropped {
            warn!(
                collection = %id,
                error = %e,
                "backend drop failed, restoring collection record"
            );
            let _persist = self.persist.lock().await;
            let snapshot = {
                let mut state = self.state.lock();
                state.collections.insert(id, collection);
                state.snapshot()
            };
            if let Err(save_err) = self.save(snapshot).await {
                error!(
                    collection = %id,
                    error = %save_err,
                    "failed to persist restored collection record"
                );
            }
            return Err(e);
        }

        info!(collection = %id, owner = %owner, "collection deleted");
        Ok(())
    }
}
