//! A directory store.

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use crate::storage::{prepare_path, ChunkRecord, ChunkStorageTraits, StorageError, StoreHeader};

const HEADER_FILE: &str = "header.json";
const RECORD_EXTENSION: &str = "chunk";

/// A store with a file per record in a directory.
///
/// Records are named `XXXXXXXX.chunk` after their key in upper-case hexadecimal, and the header is `header.json`.
/// Files are written to a temporary file, synced, and renamed into place.
/// [`flush`](ChunkStorageTraits::flush) syncs the directory so the renames are durable.
#[derive(Debug)]
pub struct DirectoryStore {
    base_directory: PathBuf,
    next_key: u64,
}

impl DirectoryStore {
    /// Create a new directory store at `base_directory`.
    ///
    /// # Errors
    /// Returns [`StorageError::PathExists`] if `base_directory` exists and `remove_existing` is false, or [`StorageError::IOError`] if the directory cannot be created.
    pub fn create<P: AsRef<Path>>(
        base_directory: P,
        remove_existing: bool,
    ) -> Result<Self, StorageError> {
        let base_directory = base_directory.as_ref();
        prepare_path(base_directory, remove_existing)?;
        std::fs::create_dir_all(base_directory)?;
        Ok(Self {
            base_directory: base_directory.to_path_buf(),
            next_key: 0,
        })
    }

    /// Open an existing directory store at `base_directory`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the header cannot be read.
    pub fn open<P: AsRef<Path>>(base_directory: P) -> Result<Self, StorageError> {
        let mut store = Self {
            base_directory: base_directory.as_ref().to_path_buf(),
            next_key: 0,
        };
        let header = store.read_header()?;
        store.next_key = header
            .chunks
            .iter()
            .map(|record| record.key + 1)
            .max()
            .unwrap_or_default();
        Ok(store)
    }

    /// Return the base directory.
    #[must_use]
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Return the path of the file holding record `key`.
    #[must_use]
    pub fn record_path(&self, key: u64) -> PathBuf {
        self.base_directory
            .join(format!("{key:08X}.{RECORD_EXTENSION}"))
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
        let mut temp_path = path.as_os_str().to_owned();
        temp_path.push(".tmp");
        let result = File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.sync_all()
            })
            .and_then(|()| std::fs::rename(&temp_path, path));
        if result.is_err() {
            if let Err(err) = std::fs::remove_file(&temp_path) {
                log::warn!(
                    "failed to remove {} after a failed write: {err}",
                    Path::new(&temp_path).display()
                );
            }
        }
        result
    }
}

impl ChunkStorageTraits for DirectoryStore {
    fn read_record(&self, record: &ChunkRecord) -> Result<Vec<u8>, StorageError> {
        match std::fs::read(self.record_path(record.key)) {
            Ok(bytes) if bytes.len() as u64 == record.size => Ok(bytes),
            Ok(_) => Err(StorageError::RecordNotFound(*record)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::RecordNotFound(*record))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn write_record(&mut self, bytes: &[u8]) -> Result<ChunkRecord, StorageError> {
        let key = self.next_key;
        Self::write_atomic(&self.record_path(key), bytes)?;
        self.next_key += 1;
        Ok(ChunkRecord {
            key,
            size: bytes.len() as u64,
        })
    }

    fn erase_record(&mut self, record: &ChunkRecord) -> Result<(), StorageError> {
        match std::fs::remove_file(self.record_path(record.key)) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn read_header(&self) -> Result<StoreHeader, StorageError> {
        match std::fs::read(self.base_directory.join(HEADER_FILE)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::MissingHeader)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn write_header(&mut self, header: &StoreHeader) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(header)?;
        Self::write_atomic(&self.base_directory.join(HEADER_FILE), &bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        // directories cannot be opened as files on windows
        #[cfg(unix)]
        File::open(&self.base_directory)?.sync_all()?;
        Ok(())
    }
}
