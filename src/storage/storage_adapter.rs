//! Storage adapters.
//!
//! An adapter wraps any [`ChunkStorageTraits`](crate::storage::ChunkStorageTraits) store and is itself a store.

mod usage_log;

pub use usage_log::{UsageLog, UsageLogStorageAdapter};
