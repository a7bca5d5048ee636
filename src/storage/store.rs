//! Chunk stores.
//!
//! A store implements [`ChunkStorageTraits`](crate::storage::ChunkStorageTraits) over some medium:
//!  - [`MemoryStore`]: records in memory,
//!  - [`ContiguousFileStore`]: an append-only file holding records and headers, or
//!  - [`DirectoryStore`]: a directory with a file per record and a header file.

mod contiguous;
mod directory;
mod memory;

pub use contiguous::ContiguousFileStore;
pub use directory::DirectoryStore;
pub use memory::MemoryStore;
