//! An in-memory store.

use std::collections::BTreeMap;

use crate::storage::{ChunkRecord, ChunkStorageTraits, StorageError, StoreHeader};

/// An in-memory store.
///
/// Records live in a map keyed by an increasing counter, and the header is kept serialised.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<u64, Vec<u8>>,
    next_key: u64,
    header: Option<Vec<u8>>,
}

impl MemoryStore {
    /// Create a new, empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the number of records held by the store.
    #[must_use]
    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    /// Return the total size in bytes of the records held by the store.
    #[must_use]
    pub fn size(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }
}

impl ChunkStorageTraits for MemoryStore {
    fn read_record(&self, record: &ChunkRecord) -> Result<Vec<u8>, StorageError> {
        match self.records.get(&record.key) {
            Some(bytes) if bytes.len() as u64 == record.size => Ok(bytes.clone()),
            _ => Err(StorageError::RecordNotFound(*record)),
        }
    }

    fn write_record(&mut self, bytes: &[u8]) -> Result<ChunkRecord, StorageError> {
        let key = self.next_key;
        self.next_key += 1;
        self.records.insert(key, bytes.to_vec());
        Ok(ChunkRecord {
            key,
            size: bytes.len() as u64,
        })
    }

    fn erase_record(&mut self, record: &ChunkRecord) -> Result<(), StorageError> {
        self.records.remove(&record.key);
        Ok(())
    }

    fn read_header(&self) -> Result<StoreHeader, StorageError> {
        let header = self.header.as_ref().ok_or(StorageError::MissingHeader)?;
        Ok(serde_json::from_slice(header)?)
    }

    fn write_header(&mut self, header: &StoreHeader) -> Result<(), StorageError> {
        self.header = Some(serde_json::to_vec(header)?);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::codec::{CodecConfiguration, Compressor};

    #[test]
    fn memory_store() -> Result<(), Box<dyn std::error::Error>> {
        let mut store = MemoryStore::new();
        assert!(matches!(store.read_header(), Err(StorageError::MissingHeader)));

        let a = store.write_record(b"abc")?;
        let b = store.write_record(b"de")?;
        assert_ne!(a.key, b.key);
        assert_eq!(store.read_record(&a)?, b"abc");
        assert_eq!(store.read_record(&b)?, b"de");
        assert_eq!(store.num_records(), 2);
        assert_eq!(store.size(), 5);

        store.erase_record(&a)?;
        assert!(matches!(
            store.read_record(&a),
            Err(StorageError::RecordNotFound(_))
        ));

        let header = StoreHeader {
            codec: CodecConfiguration {
                compressor: Compressor::None,
                element_size: 1,
                block_size: 2,
                chunk_size: 4,
            },
            metadata: serde_json::json!({"shape": [4]}),
            chunks: vec![b],
        };
        store.write_header(&header)?;
        assert_eq!(store.read_header()?, header);
        Ok(())
    }
}
