//! Registry persistence
//!
//! # File format
//!
//! ```text
//! +---------------------+
//! | Magic: "VHRG"       | 4 bytes
//! | Format version      | 1 byte
//! | Payload checksum    | 8 bytes (u64 LE, xxh3-64)
//! | Payload length      | 4 bytes (u32 LE)
//! | Payload             | MessagePack RegistrySnapshot
//! +---------------------+
//! ```
//!
//! The file is always replaced whole: written to a temp file in the same
//! directory, fsynced, then renamed over the previous snapshot.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use vectorhub_core::{Collection, VectorError, VectorResult};
use xxhash_rust::xxh3::xxh3_64;

/// Registry file magic bytes
pub const REGISTRY_MAGIC: [u8; 4] = *b"VHRG";

/// Current registry file format version
pub const REGISTRY_FORMAT_VERSION: u8 = 1;

/// magic(4) + version(1) + checksum(8) + length(4)
const HEADER_SIZE: usize = 17;

/// Everything the registry needs to come back after a restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Next collection id to hand out
    pub next_id: u64,
    /// Registered collections
    pub collections: Vec<Collection>,
}

impl RegistrySnapshot {
    /// Encode to the on-disk format
    pub fn to_bytes(&self) -> VectorResult<Vec<u8>> {
        let payload = rmp_serde::to_vec_named(self)
            .map_err(|e| VectorError::Serialization(format!("registry snapshot: {}", e)))?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            VectorError::Serialization(format!(
                "registry snapshot too large: {} bytes",
                payload.len()
            ))
        })?;

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(&REGISTRY_MAGIC);
        bytes.push(REGISTRY_FORMAT_VERSION);
        bytes
            .write_u64::<LittleEndian>(xxh3_64(&payload))
            .map_err(storage)?;
        bytes.write_u32::<LittleEndian>(len).map_err(storage)?;
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode from the on-disk format
    ///
    /// # Errors
    ///
    /// `Corruption` for a short file, bad magic, unknown version, length or
    /// checksum mismatch. `Serialization` if a verified payload does not
    /// decode.
    pub fn from_bytes(bytes: &[u8]) -> VectorResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(VectorError::Corruption(format!(
                "registry file too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0..4] != REGISTRY_MAGIC {
            return Err(VectorError::Corruption("bad registry magic".to_string()));
        }
        if bytes[4] != REGISTRY_FORMAT_VERSION {
            return Err(VectorError::Corruption(format!(
                "unsupported registry format version {}",
                bytes[4]
            )));
        }

        let mut header = &bytes[5..HEADER_SIZE];
        let stored = header.read_u64::<LittleEndian>().map_err(storage)?;
        let len = header.read_u32::<LittleEndian>().map_err(storage)? as usize;

        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != len {
            return Err(VectorError::Corruption(format!(
                "registry payload length mismatch: header says {}, found {}",
                len,
                payload.len()
            )));
        }
        let computed = xxh3_64(payload);
        if stored != computed {
            return Err(VectorError::Corruption(format!(
                "registry checksum mismatch: stored {:016x}, computed {:016x}",
                stored, computed
            )));
        }

        rmp_serde::from_slice(payload)
            .map_err(|e| VectorError::Serialization(format!("registry snapshot: {}", e)))
    }
}

fn storage(err: io::Error) -> VectorError {
    VectorError::Storage(err.to_string())
}

/// Where registry snapshots live
///
/// Both methods are synchronous and may block on disk I/O. The registry
/// calls `save` from the blocking thread pool.
pub trait MetadataStore: Send + Sync {
    /// Load the last saved snapshot, or an empty one if nothing was saved
    fn load(&self) -> VectorResult<RegistrySnapshot>;

    /// Replace the saved snapshot
    fn save(&self, snapshot: &RegistrySnapshot) -> VectorResult<()>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Snapshot held in process memory
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    snapshot: Mutex<RegistrySnapshot>,
}

impl MemoryMetadataStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn load(&self) -> VectorResult<RegistrySnapshot> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&self, snapshot: &RegistrySnapshot) -> VectorResult<()> {
        *self.snapshot.lock() = snapshot.clone();
        Ok(())
    }
}

// =============================================================================
// File store
// =============================================================================

/// Snapshot in a single file
#[derive(Debug)]
pub struct FileMetadataStore {
    path: PathBuf,
    /// Serializes writers within the process
    write_lock: Mutex<()>,
}

impl FileMetadataStore {
    /// Store at `path`. The parent directory is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileMetadataStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Snapshot file location
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetadataStore for FileMetadataStore {
    fn load(&self) -> VectorResult<RegistrySnapshot> {
        match std::fs::read(&self.path) {
            Ok(bytes) => RegistrySnapshot::from_bytes(&bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(RegistrySnapshot::default()),
            Err(e) => Err(storage(e)),
        }
    }

    fn save(&self, snapshot: &RegistrySnapshot) -> VectorResult<()> {
        let bytes = snapshot.to_bytes()?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let _guard = self.write_lock.lock();
        std::fs::create_dir_all(&dir).map_err(storage)?;

        // Atomic write: temp + fsync + rename
        let mut tmp = NamedTempFile::new_in(&dir).map_err(storage)?;
        tmp.write_all(&bytes).map_err(storage)?;
        tmp.as_file().sync_all().map_err(storage)?;
        tmp.persist(&self.path).map_err(|e| storage(e.error))?;

        debug!(
            path = %self.path.display(),
            collections = snapshot.collections.len(),
            bytes = bytes.len(),
            "registry snapshot saved"
        );
        Ok(())
    }
}
