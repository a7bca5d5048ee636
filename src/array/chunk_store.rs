//! The chunk store.
//!
//! A [`ChunkStore`] combines a [`BlockCodec`] with a [`ChunkStorageTraits`] store and keeps the chunk index, the ordered list of records holding each chunk.
//! Chunks are addressed by their linear chunk id and exchanged as raw (decoded) chunks of a fixed size.
//!
//! Modifications are staged in a [`ChunkStoreTransaction`].
//! A transaction writes new records without touching the live index, and [`commit`](ChunkStoreTransaction::commit) persists a new header and swaps the index in one step.
//! Records reachable from the live index are never overwritten, so a failed or abandoned transaction leaves the store as it was.

use std::collections::HashSet;

use crate::storage::{
    create_storage, storage_adapter::UsageLogStorageAdapter, ChunkRecord, ChunkStorageTraits,
    StorageError, StoreHeader,
};

use super::{
    codec::{BlockCodec, CodecConfiguration},
    StorageSpec,
};

/// An encoded chunk, ready to be stored as many times as needed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedChunk(Vec<u8>);

impl EncodedChunk {
    /// Return the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A store of encoded chunks.
#[derive(Debug)]
pub struct ChunkStore {
    codec: BlockCodec,
    storage: Box<dyn ChunkStorageTraits>,
    chunks: Vec<ChunkRecord>,
    metadata: serde_json::Value,
    closed: bool,
}

impl ChunkStore {
    /// Create a new, empty chunk store for raw chunks of `chunk_size` bytes with elements of `element_size` bytes.
    ///
    /// The block size is derived from the block shape of `storage_spec` and is fixed for the lifetime of the store.
    /// The header is written when the first transaction commits.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if
    ///  - the block size is zero or does not divide `chunk_size`,
    ///  - a persistent path exists and `remove_existing` is not set, or
    ///  - the store cannot be created.
    pub fn create(
        storage_spec: &StorageSpec,
        element_size: usize,
        metadata: serde_json::Value,
    ) -> Result<Self, StorageError> {
        let chunk_grid = storage_spec.chunk_grid();
        let to_size = |num_elements: u64| {
            usize::try_from(num_elements)
                .ok()
                .and_then(|num_elements| num_elements.checked_mul(element_size))
        };
        let (Some(block_size), Some(chunk_size)) = (
            to_size(chunk_grid.block_num_elements()),
            to_size(chunk_grid.chunk_num_elements()),
        ) else {
            return Err(StorageError::InvalidChunkSize(usize::MAX, usize::MAX));
        };
        let configuration = CodecConfiguration {
            compressor: storage_spec.compressor(),
            element_size,
            block_size,
            chunk_size,
        };
        let codec = BlockCodec::new(configuration, storage_spec.num_threads())?;

        let storage = create_storage(storage_spec.backend(), storage_spec.remove_existing())?;
        let storage: Box<dyn ChunkStorageTraits> = match storage_spec.usage_log() {
            Some(usage_log) => Box::new(UsageLogStorageAdapter::new(storage, usage_log.clone())),
            None => storage,
        };
        log::debug!(
            "created chunk store with {:?} on {}",
            codec.configuration(),
            storage_spec.backend()
        );
        Ok(Self {
            codec,
            storage,
            chunks: Vec::new(),
            metadata,
            closed: false,
        })
    }

    /// Open a chunk store from `storage`, reading its header.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the header is missing or invalid.
    pub fn open(
        storage: Box<dyn ChunkStorageTraits>,
        num_threads: usize,
    ) -> Result<Self, StorageError> {
        let StoreHeader {
            codec,
            metadata,
            chunks,
        } = storage.read_header()?;
        let codec = BlockCodec::new(codec, num_threads)?;
        log::debug!(
            "opened chunk store with {:?} and {} chunks",
            codec.configuration(),
            chunks.len()
        );
        Ok(Self {
            codec,
            storage,
            chunks,
            metadata,
            closed: false,
        })
    }

    /// Return the block codec.
    #[must_use]
    pub fn codec(&self) -> &BlockCodec {
        &self.codec
    }

    /// Return the size in bytes of a raw chunk.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.codec.configuration().chunk_size
    }

    /// Return the number of chunks.
    #[must_use]
    pub fn num_chunks(&self) -> u64 {
        self.chunks.len() as u64
    }

    /// Return the metadata stored in the header.
    #[must_use]
    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// Encode a raw chunk.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidChunkSize`] if `raw` is not the chunk size, or a [`StorageError::CodecError`] if encoding fails.
    pub fn encode_chunk(&self, raw: &[u8]) -> Result<EncodedChunk, StorageError> {
        self.check_chunk_size(raw.len())?;
        Ok(EncodedChunk(self.codec.encode(raw)?))
    }

    /// Load chunk `chunk_id` into `dest`, which must be exactly the chunk size.
    ///
    /// # Errors
    /// Returns [`StorageError::ChunkNotFound`] if the chunk does not exist, [`StorageError::InvalidChunkSize`] if `dest` is not the chunk size, or a [`StorageError`] if the chunk cannot be read or decoded.
    pub fn load_chunk(&self, chunk_id: u64, dest: &mut [u8]) -> Result<(), StorageError> {
        load_chunk(self, &self.chunks, chunk_id, dest)
    }

    /// Append a raw chunk, returning its chunk id.
    ///
    /// # Errors
    /// Returns [`StorageError::InvalidChunkSize`] if `raw` is not the chunk size, or a [`StorageError`] if the chunk cannot be stored.
    /// The number of chunks is unchanged on error.
    pub fn append_chunk(&mut self, raw: &[u8]) -> Result<u64, StorageError> {
        let mut transaction = self.transaction();
        let chunk_id = transaction.append_chunk(raw)?;
        transaction.commit(None)?;
        Ok(chunk_id)
    }

    /// Replace chunk `chunk_id` with a raw chunk.
    ///
    /// # Errors
    /// Returns [`StorageError::ChunkNotFound`] if the chunk does not exist, [`StorageError::InvalidChunkSize`] if `raw` is not the chunk size, or a [`StorageError`] if the chunk cannot be stored.
    pub fn rewrite_chunk(&mut self, chunk_id: u64, raw: &[u8]) -> Result<(), StorageError> {
        let mut transaction = self.transaction();
        transaction.rewrite_chunk(chunk_id, raw)?;
        transaction.commit(None)
    }

    /// Start a transaction.
    pub fn transaction(&mut self) -> ChunkStoreTransaction<'_> {
        ChunkStoreTransaction {
            chunks: self.chunks.clone(),
            staged: Vec::new(),
            store: self,
        }
    }

    /// Flush the store.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if flushing fails.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.storage.flush()
    }

    /// Flush and close the store.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if flushing fails.
    pub fn close(mut self) -> Result<(), StorageError> {
        self.closed = true;
        log::debug!("closing chunk store with {} chunks", self.chunks.len());
        self.storage.flush()
    }

    /// Replace the underlying storage with `f` applied to it.
    #[cfg(test)]
    pub(crate) fn map_storage(
        &mut self,
        f: impl FnOnce(Box<dyn ChunkStorageTraits>) -> Box<dyn ChunkStorageTraits>,
    ) {
        let storage = std::mem::replace(
            &mut self.storage,
            Box::new(crate::storage::store::MemoryStore::new()),
        );
        self.storage = f(storage);
    }

    fn header(&self, chunks: &[ChunkRecord], metadata: &serde_json::Value) -> StoreHeader {
        StoreHeader {
            codec: self.codec.configuration().clone(),
            metadata: metadata.clone(),
            chunks: chunks.to_vec(),
        }
    }

    fn check_chunk_size(&self, size: usize) -> Result<(), StorageError> {
        if size == self.chunk_size() {
            Ok(())
        } else {
            Err(StorageError::InvalidChunkSize(size, self.chunk_size()))
        }
    }

    fn write_encoded(&mut self, encoded: &[u8]) -> Result<ChunkRecord, StorageError> {
        self.storage.write_record(encoded)
    }

    fn erase_records(&mut self, records: impl IntoIterator<Item = ChunkRecord>) {
        for record in records {
            if let Err(err) = self.storage.erase_record(&record) {
                log::warn!("failed to erase record {record:?}: {err}");
            }
        }
    }
}

impl Drop for ChunkStore {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.storage.flush() {
                log::warn!("failed to flush chunk store on drop: {err}");
            }
        }
    }
}

fn load_chunk(
    store: &ChunkStore,
    chunks: &[ChunkRecord],
    chunk_id: u64,
    dest: &mut [u8],
) -> Result<(), StorageError> {
    store.check_chunk_size(dest.len())?;
    let record = usize::try_from(chunk_id)
        .ok()
        .and_then(|chunk_id| chunks.get(chunk_id))
        .ok_or(StorageError::ChunkNotFound(chunk_id))?;
    log::trace!("loading chunk {chunk_id} from {record:?}");
    let encoded = store.storage.read_record(record)?;
    store.codec.decode_into(&encoded, dest)?;
    Ok(())
}

/// A staged batch of chunk modifications.
///
/// Records written by a transaction are erased if it is dropped without being committed.
#[derive(Debug)]
pub struct ChunkStoreTransaction<'a> {
    store: &'a mut ChunkStore,
    chunks: Vec<ChunkRecord>,
    staged: Vec<ChunkRecord>,
}

impl ChunkStoreTransaction<'_> {
    /// Return the number of chunks in the staged index.
    #[must_use]
    pub fn num_chunks(&self) -> u64 {
        self.chunks.len() as u64
    }

    /// Return the size in bytes of a raw chunk.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.store.chunk_size()
    }

    /// Encode a raw chunk.
    ///
    /// # Errors
    /// See [`ChunkStore::encode_chunk`].
    pub fn encode_chunk(&self, raw: &[u8]) -> Result<EncodedChunk, StorageError> {
        self.store.encode_chunk(raw)
    }

    /// Load chunk `chunk_id` of the staged index into `dest`.
    ///
    /// # Errors
    /// See [`ChunkStore::load_chunk`].
    pub fn load_chunk(&self, chunk_id: u64, dest: &mut [u8]) -> Result<(), StorageError> {
        load_chunk(self.store, &self.chunks, chunk_id, dest)
    }

    /// Stage a raw chunk at the end of the index, returning its chunk id.
    ///
    /// # Errors
    /// See [`ChunkStore::append_chunk`].
    pub fn append_chunk(&mut self, raw: &[u8]) -> Result<u64, StorageError> {
        let chunk_id = self.num_chunks();
        self.insert_chunk(chunk_id, raw)?;
        Ok(chunk_id)
    }

    /// Stage an encoded chunk at the end of the index, returning its chunk id.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the chunk cannot be stored.
    pub fn append_encoded(&mut self, encoded: &EncodedChunk) -> Result<u64, StorageError> {
        let chunk_id = self.num_chunks();
        let record = self.write_encoded(encoded)?;
        self.chunks.push(record);
        Ok(chunk_id)
    }

    /// Stage a raw chunk at `chunk_id`, shifting the chunks at and after `chunk_id` up by one.
    ///
    /// # Errors
    /// Returns [`StorageError::ChunkNotFound`] if `chunk_id` exceeds the number of chunks, otherwise see [`ChunkStore::append_chunk`].
    pub fn insert_chunk(&mut self, chunk_id: u64, raw: &[u8]) -> Result<(), StorageError> {
        let index = self.index(chunk_id, self.chunks.len() + 1)?;
        let record = self.encode_and_write(chunk_id, raw)?;
        self.chunks.insert(index, record);
        Ok(())
    }

    /// Stage the replacement of chunk `chunk_id` with a raw chunk.
    ///
    /// # Errors
    /// See [`ChunkStore::rewrite_chunk`].
    pub fn rewrite_chunk(&mut self, chunk_id: u64, raw: &[u8]) -> Result<(), StorageError> {
        let index = self.index(chunk_id, self.chunks.len())?;
        let record = self.encode_and_write(chunk_id, raw)?;
        self.chunks[index] = record;
        Ok(())
    }

    /// Commit the transaction, writing a header with the staged index and `metadata` (or the current metadata if [`None`]).
    ///
    /// Records no longer referenced by the index are erased after the header is written.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the header cannot be written, in which case the store is unchanged.
    pub fn commit(mut self, metadata: Option<serde_json::Value>) -> Result<(), StorageError> {
        let metadata = metadata.unwrap_or_else(|| self.store.metadata.clone());
        let header = self.store.header(&self.chunks, &metadata);
        self.store.storage.write_header(&header)?;

        let chunks = std::mem::take(&mut self.chunks);
        self.staged.clear();
        let live: HashSet<ChunkRecord> = chunks.iter().copied().collect();
        let replaced: Vec<ChunkRecord> = self
            .store
            .chunks
            .iter()
            .filter(|record| !live.contains(record))
            .copied()
            .collect();
        log::trace!(
            "committed {} chunks, erasing {} replaced records",
            chunks.len(),
            replaced.len()
        );
        self.store.chunks = chunks;
        self.store.metadata = metadata;
        self.store.erase_records(replaced);
        Ok(())
    }

    fn index(&self, chunk_id: u64, limit: usize) -> Result<usize, StorageError> {
        usize::try_from(chunk_id)
            .ok()
            .filter(|&index| index < limit)
            .ok_or(StorageError::ChunkNotFound(chunk_id))
    }

    fn encode_and_write(&mut self, chunk_id: u64, raw: &[u8]) -> Result<ChunkRecord, StorageError> {
        let encoded = self.store.encode_chunk(raw)?;
        log::trace!(
            "staging chunk {chunk_id} ({} bytes encoded)",
            encoded.as_bytes().len()
        );
        self.write_encoded(&encoded)
    }

    fn write_encoded(&mut self, encoded: &EncodedChunk) -> Result<ChunkRecord, StorageError> {
        let record = self.store.write_encoded(encoded.as_bytes())?;
        self.staged.push(record);
        Ok(record)
    }
}

impl Drop for ChunkStoreTransaction<'_> {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            log::debug!(
                "discarding uncommitted transaction with {} staged records",
                self.staged.len()
            );
            let staged = std::mem::take(&mut self.staged);
            self.store.erase_records(staged);
        }
    }
}
