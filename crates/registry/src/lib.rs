//! Collection registry for vectorhub
//!
//! The registry owns the logical side of a collection: its id, owner, name,
//! dimensions, backend type, description and collection metadata. Vector
//! data lives only in the backend.
//!
//! - [`CollectionRegistry`]: create/get/list/update/delete with backend side
//!   effects
//! - [`MetadataStore`]: where registry snapshots are persisted
//!   - [`FileMetadataStore`]: single checksummed file, replaced atomically
//!   - [`MemoryMetadataStore`]: process-local, for ephemeral stores and tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod registry;
pub mod store;

pub use registry::CollectionRegistry;
pub use store::{FileMetadataStore, MemoryMetadataStore, MetadataStore, RegistrySnapshot};
