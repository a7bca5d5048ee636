//! A contiguous file store.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;

use crate::storage::{prepare_path, ChunkRecord, ChunkStorageTraits, StorageError, StoreHeader};

const FOOTER_MAGIC: &[u8; 8] = b"NDCHUNK1";
const FOOTER_SIZE: u64 = 16;

/// A store holding every record and header in a single append-only file.
///
/// Records are appended to the end of the file, and the key of a record is its byte offset.
/// Writing a header appends the JSON header followed by a 16 byte footer: the `u64` LE offset of the header and an 8 byte magic.
/// Opening a store reads the footer at the end of the file, so the last header written is the live one.
///
/// Space held by replaced records is never reclaimed.
/// Erasing a record written after the last header truncates the file back to the end of that header, so the footer stays last.
#[derive(Debug)]
pub struct ContiguousFileStore {
    path: PathBuf,
    file: Mutex<File>,
    end: u64,
    /// The end of the last header written or read.
    committed_end: u64,
}

impl ContiguousFileStore {
    /// Create a new contiguous file store at `path`.
    ///
    /// # Errors
    /// Returns [`StorageError::PathExists`] if `path` exists and `remove_existing` is false, or [`StorageError::IOError`] if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, remove_existing: bool) -> Result<Self, StorageError> {
        let path = path.as_ref();
        prepare_path(path, remove_existing)?;
        let file = File::options()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            end: 0,
            committed_end: 0,
        })
    }

    /// Open an existing contiguous file store at `path`.
    ///
    /// # Errors
    /// Returns [`StorageError::IOError`] if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let file = File::options().read(true).write(true).open(path)?;
        let end = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            end,
            committed_end: end,
        })
    }

    /// Return the path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `bytes` to the end of the file and return their offset.
    ///
    /// A failed write truncates the file back to its previous length.
    fn append(&mut self, bytes: &[u8]) -> Result<u64, StorageError> {
        let offset = self.end;
        let file = self.file.get_mut();
        let result = file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(bytes));
        if let Err(err) = result {
            if let Err(truncate_err) = file.set_len(offset) {
                log::warn!(
                    "failed to truncate {} after a failed write: {truncate_err}",
                    self.path.display()
                );
            }
            return Err(err.into());
        }
        self.end += bytes.len() as u64;
        Ok(offset)
    }

    fn read_at(&self, offset: u64, size: u64) -> Result<Vec<u8>, std::io::Error> {
        let size = usize::try_from(size).map_err(|_| std::io::ErrorKind::InvalidInput)?;
        let mut bytes = vec![0; size];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut bytes)?;
        Ok(bytes)
    }
}

impl ChunkStorageTraits for ContiguousFileStore {
    fn read_record(&self, record: &ChunkRecord) -> Result<Vec<u8>, StorageError> {
        match record.key.checked_add(record.size) {
            Some(end) if end <= self.end => Ok(self.read_at(record.key, record.size)?),
            _ => Err(StorageError::RecordNotFound(*record)),
        }
    }

    fn write_record(&mut self, bytes: &[u8]) -> Result<ChunkRecord, StorageError> {
        let key = self.append(bytes)?;
        Ok(ChunkRecord {
            key,
            size: bytes.len() as u64,
        })
    }

    fn erase_record(&mut self, record: &ChunkRecord) -> Result<(), StorageError> {
        if record.key >= self.committed_end && self.end > self.committed_end {
            self.file.get_mut().set_len(self.committed_end)?;
            log::debug!(
                "truncated {} uncommitted bytes from {}",
                self.end - self.committed_end,
                self.path.display()
            );
            self.end = self.committed_end;
        }
        Ok(())
    }

    fn read_header(&self) -> Result<StoreHeader, StorageError> {
        if self.end < FOOTER_SIZE {
            return Err(StorageError::MissingHeader);
        }
        let footer = self.read_at(self.end - FOOTER_SIZE, FOOTER_SIZE)?;
        let (offset, magic) = footer.split_at(8);
        if magic != FOOTER_MAGIC {
            return Err(StorageError::MissingHeader);
        }
        let mut offset_bytes = [0; 8];
        offset_bytes.copy_from_slice(offset);
        let offset = u64::from_le_bytes(offset_bytes);
        let header_end = self.end - FOOTER_SIZE;
        if offset > header_end {
            return Err(StorageError::InvalidHeader(format!(
                "header offset {offset} is beyond the end of the file"
            )));
        }
        let header = self.read_at(offset, header_end - offset)?;
        Ok(serde_json::from_slice(&header)?)
    }

    fn write_header(&mut self, header: &StoreHeader) -> Result<(), StorageError> {
        let mut bytes = serde_json::to_vec(header)?;
        let offset = self.end;
        bytes.extend_from_slice(&offset.to_le_bytes());
        bytes.extend_from_slice(FOOTER_MAGIC);
        self.append(&bytes)?;
        self.committed_end = self.end;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.file.get_mut().sync_data()?;
        Ok(())
    }
}
