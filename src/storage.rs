//! Chunk storage ([stores](store) and [storage adapters](storage_adapter)).
//!
//! A store persists *records*, opaque encoded chunks, and a *header* describing how to interpret them.
//! Stores implement [`ChunkStorageTraits`], and the [`ChunkStore`](crate::array::ChunkStore) layers the block codec and the chunk index on top.
//!
//! A record is only ever written once.
//! Replacing a chunk writes a new record, and the old record is erased once a new header no longer references it.
//! This keeps the last written header consistent with the records it references, whatever happens to later writes.
//!
//! A [`StorageBackend`] selects a store: in memory, a single contiguous file, or a directory of chunk files.

pub mod storage_adapter;
pub mod store;

use std::path::{Path, PathBuf};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::array::{
    codec::{CodecConfiguration, CodecError},
    ArrayErrorKind,
};

use self::store::{ContiguousFileStore, DirectoryStore, MemoryStore};

/// The location of a record within a store.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(deny_unknown_fields)]
pub struct ChunkRecord {
    /// The store-specific key of the record.
    pub key: u64,
    /// The size in bytes of the record.
    pub size: u64,
}

/// The header of a store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StoreHeader {
    /// The codec configuration of the records.
    pub codec: CodecConfiguration,
    /// Opaque metadata stored alongside the chunks.
    pub metadata: serde_json::Value,
    /// The chunk index, a record for each chunk in order of chunk id.
    pub chunks: Vec<ChunkRecord>,
}

/// Record-level storage traits.
pub trait ChunkStorageTraits: Send + Sync + core::fmt::Debug {
    /// Read the record `record`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the record does not exist or cannot be read.
    fn read_record(&self, record: &ChunkRecord) -> Result<Vec<u8>, StorageError>;

    /// Write `bytes` to a new record.
    ///
    /// A new record never overwrites an existing record.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the record cannot be written.
    fn write_record(&mut self, bytes: &[u8]) -> Result<ChunkRecord, StorageError>;

    /// Erase the record `record`.
    ///
    /// Stores that cannot reclaim space may ignore the request.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the record exists but cannot be erased.
    fn erase_record(&mut self, record: &ChunkRecord) -> Result<(), StorageError>;

    /// Read the header.
    ///
    /// # Errors
    /// Returns [`StorageError::MissingHeader`] if no header has been written, or another [`StorageError`] if it cannot be read or parsed.
    fn read_header(&self) -> Result<StoreHeader, StorageError>;

    /// Write the header, replacing any previous header.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the header cannot be written.
    fn write_header(&mut self, header: &StoreHeader) -> Result<(), StorageError>;

    /// Flush written data to the underlying medium.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if flushing fails.
    fn flush(&mut self) -> Result<(), StorageError>;
}

/// A storage backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum StorageBackend {
    /// An in-memory store that is released with its array.
    #[display("memory")]
    Memory,
    /// A single file holding every record and the header.
    #[display("contiguous file {}", _0.display())]
    ContiguousFile(PathBuf),
    /// A directory with a file per record and a header file.
    #[display("directory {}", _0.display())]
    Directory(PathBuf),
}

impl StorageBackend {
    /// Returns true if the backend persists data beyond the lifetime of an array.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Self::Memory)
    }

    /// Return the path of a persistent backend.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Memory => None,
            Self::ContiguousFile(path) | Self::Directory(path) => Some(path),
        }
    }
}

/// Create a new, empty store for `backend`.
///
/// If a persistent backend path already exists, it is removed if `remove_existing` is true.
///
/// # Errors
/// Returns [`StorageError::PathExists`] if the path exists and `remove_existing` is false, or [`StorageError::IOError`] if the path cannot be created.
pub fn create_storage(
    backend: &StorageBackend,
    remove_existing: bool,
) -> Result<Box<dyn ChunkStorageTraits>, StorageError> {
    log::debug!("creating {backend} store");
    Ok(match backend {
        StorageBackend::Memory => Box::new(MemoryStore::new()),
        StorageBackend::ContiguousFile(path) => {
            Box::new(ContiguousFileStore::create(path, remove_existing)?)
        }
        StorageBackend::Directory(path) => Box::new(DirectoryStore::create(path, remove_existing)?),
    })
}

/// Open an existing store at a persistent `backend`.
///
/// # Errors
/// Returns [`StorageError::NotPersistent`] for [`StorageBackend::Memory`], or a [`StorageError`] if the store cannot be opened.
pub fn open_storage(backend: &StorageBackend) -> Result<Box<dyn ChunkStorageTraits>, StorageError> {
    log::debug!("opening {backend} store");
    Ok(match backend {
        StorageBackend::Memory => return Err(StorageError::NotPersistent),
        StorageBackend::ContiguousFile(path) => Box::new(ContiguousFileStore::open(path)?),
        StorageBackend::Directory(path) => Box::new(DirectoryStore::open(path)?),
    })
}

/// Remove whatever exists at `path` if `remove_existing` is true.
///
/// # Errors
/// Returns [`StorageError::PathExists`] if `path` exists and `remove_existing` is false.
pub(crate) fn prepare_path(path: &Path, remove_existing: bool) -> Result<(), StorageError> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    if !remove_existing {
        return Err(StorageError::PathExists(path.to_path_buf()));
    }
    log::debug!("removing existing {}", path.display());
    if metadata.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// A storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// A codec error.
    #[error(transparent)]
    CodecError(#[from] CodecError),
    /// A chunk id is not in the chunk index.
    #[error("chunk {0} does not exist")]
    ChunkNotFound(u64),
    /// A record referenced by the chunk index is missing or truncated.
    #[error("record {0:?} is missing or truncated")]
    RecordNotFound(ChunkRecord),
    /// A persistent path exists and was not allowed to be removed.
    #[error("path {} already exists", .0.display())]
    PathExists(PathBuf),
    /// The store has no header.
    #[error("the store has no header")]
    MissingHeader,
    /// The store header is invalid.
    #[error("invalid store header: {0}")]
    InvalidHeader(String),
    /// The store header could not be (de)serialised.
    #[error(transparent)]
    HeaderSerializationError(#[from] serde_json::Error),
    /// The size of a raw chunk does not match the chunk size of the store.
    #[error("raw chunk has {0} bytes, expected {1} bytes")]
    InvalidChunkSize(usize, usize),
    /// Attempted to open a non-persistent backend.
    #[error("only persistent backends can be opened")]
    NotPersistent,
    /// A buffer could not be allocated.
    #[error(transparent)]
    AllocationError(#[from] std::collections::TryReserveError),
}

impl StorageError {
    /// Return the [`ArrayErrorKind`] of the error.
    #[must_use]
    pub fn kind(&self) -> ArrayErrorKind {
        match self {
            Self::CodecError(err) => err.kind(),
            Self::ChunkNotFound(_) => ArrayErrorKind::NotFound,
            Self::PathExists(_) | Self::InvalidChunkSize(_, _) | Self::NotPersistent => {
                ArrayErrorKind::InvalidArgument
            }
            Self::AllocationError(_) => ArrayErrorKind::OutOfMemory,
            Self::IOError(_)
            | Self::RecordNotFound(_)
            | Self::MissingHeader
            | Self::InvalidHeader(_)
            | Self::HeaderSerializationError(_) => ArrayErrorKind::IOError,
        }
    }
}
