//! A storage adapter which logs function calls.

use std::{
    io::Write,
    sync::{Arc, Mutex, PoisonError},
};

use itertools::Itertools;

use crate::storage::{ChunkRecord, ChunkStorageTraits, StorageError, StoreHeader};

/// A usage log: a shared writer and a line prefix function.
///
/// ### Example (log to stdout)
/// ```rust
/// # use std::sync::{Arc, Mutex};
/// use ndchunk::storage::storage_adapter::UsageLog;
/// let usage_log = UsageLog::new(Arc::new(Mutex::new(std::io::stdout())), || {
///     chrono::Utc::now().format("[%T%.3f] ").to_string()
/// });
/// ```
///
/// Attached to a [`StorageSpec`](crate::array::StorageSpec), array operations print lines like:
/// ```text
/// [12:00:00.000] write_record(len=52) -> Ok(key=3, size=52)
/// [12:00:00.001] write_header(chunks=[0, 1, 2, 3]) -> Ok(())
/// [12:00:00.001] read_record(key=3, size=52) -> len=Ok(52)
/// [12:00:00.002] erase_record(key=1, size=52) -> Ok(())
/// ```
#[derive(Clone)]
pub struct UsageLog {
    handle: Arc<Mutex<dyn Write + Send + Sync>>,
    prefix_func: fn() -> String,
}

impl core::fmt::Debug for UsageLog {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "usage log")
    }
}

impl UsageLog {
    /// Create a new usage log writing to `handle`, prefixing every line with the output of `prefix_func`.
    pub fn new(handle: Arc<Mutex<dyn Write + Send + Sync>>, prefix_func: fn() -> String) -> Self {
        Self {
            handle,
            prefix_func,
        }
    }

    fn log(&self, args: core::fmt::Arguments) {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writeln!(handle, "{}{args}", (self.prefix_func)()) {
            log::warn!("failed to write to the usage log: {err}");
        }
    }
}

/// The usage log storage adapter. Logs storage method calls.
///
/// It is intended to aid in debugging and optimising performance by revealing storage access patterns.
#[derive(Debug)]
pub struct UsageLogStorageAdapter {
    storage: Box<dyn ChunkStorageTraits>,
    usage_log: UsageLog,
}

impl UsageLogStorageAdapter {
    /// Wrap `storage`, logging its calls to `usage_log`.
    #[must_use]
    pub fn new(storage: Box<dyn ChunkStorageTraits>, usage_log: UsageLog) -> Self {
        Self { storage, usage_log }
    }
}

impl ChunkStorageTraits for UsageLogStorageAdapter {
    fn read_record(&self, record: &ChunkRecord) -> Result<Vec<u8>, StorageError> {
        let result = self.storage.read_record(record);
        self.usage_log.log(format_args!(
            "read_record(key={}, size={}) -> len={:?}",
            record.key,
            record.size,
            result.as_ref().map(Vec::len)
        ));
        result
    }

    fn write_record(&mut self, bytes: &[u8]) -> Result<ChunkRecord, StorageError> {
        let result = self.storage.write_record(bytes);
        self.usage_log.log(format_args!(
            "write_record(len={}) -> {}",
            bytes.len(),
            match &result {
                Ok(record) => format!("Ok(key={}, size={})", record.key, record.size),
                Err(err) => format!("Err({err})"),
            }
        ));
        result
    }

    fn erase_record(&mut self, record: &ChunkRecord) -> Result<(), StorageError> {
        let result = self.storage.erase_record(record);
        self.usage_log.log(format_args!(
            "erase_record(key={}, size={}) -> {result:?}",
            record.key, record.size
        ));
        result
    }

    fn read_header(&self) -> Result<StoreHeader, StorageError> {
        let result = self.storage.read_header();
        self.usage_log.log(format_args!(
            "read_header() -> chunks={:?}",
            result.as_ref().map(|header| header.chunks.len())
        ));
        result
    }

    fn write_header(&mut self, header: &StoreHeader) -> Result<(), StorageError> {
        let result = self.storage.write_header(header);
        self.usage_log.log(format_args!(
            "write_header(chunks=[{}]) -> {result:?}",
            header.chunks.iter().map(|record| record.key).format(", ")
        ));
        result
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        let result = self.storage.flush();
        self.usage_log
            .log(format_args!("flush() -> {result:?}"));
        result
    }
}
