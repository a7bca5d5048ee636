use crate::{
    config::global_config,
    storage::{storage_adapter::UsageLog, StorageBackend},
};

use super::{codec::Compressor, ArrayCreateError, ArrayShape, ChunkGrid, ChunkShape};

/// The physical layout and storage of an array.
///
/// A storage specification fixes the chunk shape (the unit of storage), the block shape (the unit of compression), and where and how chunks are stored.
///
/// Defaults:
///  - existing data at a persistent path is not removed,
///  - the compressor is the [default compressor](crate::config::Config#default-compressor),
///  - the block codec uses the [codec concurrent limit](crate::config::Config#codec-concurrent-limit) worker threads, and
///  - storage calls are not logged.
#[derive(Clone, Debug)]
pub struct StorageSpec {
    chunk_grid: ChunkGrid,
    backend: StorageBackend,
    remove_existing: bool,
    compressor: Compressor,
    num_threads: usize,
    usage_log: Option<UsageLog>,
}

impl StorageSpec {
    /// Create a new storage specification.
    ///
    /// # Errors
    /// Returns an [`ArrayCreateError`] if
    ///  - any component of `chunk_shape` or `block_shape` is zero,
    ///  - the dimensionality is zero or exceeds [`MAX_DIM`](super::MAX_DIM),
    ///  - the dimensionality of `chunk_shape` and `block_shape` differ, or
    ///  - a block shape component exceeds the corresponding chunk shape component.
    pub fn new(
        chunk_shape: ArrayShape,
        block_shape: ArrayShape,
        backend: StorageBackend,
    ) -> Result<Self, ArrayCreateError> {
        let chunk_shape_nonzero = ChunkShape::try_from(chunk_shape.as_slice())
            .map_err(|_| ArrayCreateError::InvalidChunkShape(chunk_shape))?;
        let block_shape_nonzero = ChunkShape::try_from(block_shape.as_slice())
            .map_err(|_| ArrayCreateError::InvalidBlockShape(block_shape))?;
        Ok(Self::new_with_chunk_grid(
            ChunkGrid::new(chunk_shape_nonzero, block_shape_nonzero)?,
            backend,
        ))
    }

    /// Create a new storage specification from a [`ChunkGrid`].
    #[must_use]
    pub fn new_with_chunk_grid(chunk_grid: ChunkGrid, backend: StorageBackend) -> Self {
        let (compressor, num_threads) = {
            let config = global_config();
            (config.default_compressor(), config.codec_concurrent_limit())
        };
        Self {
            chunk_grid,
            backend,
            remove_existing: false,
            compressor,
            num_threads,
            usage_log: None,
        }
    }

    /// Set whether existing data at a persistent backend path is removed on creation.
    pub fn set_remove_existing(&mut self, remove_existing: bool) -> &mut Self {
        self.remove_existing = remove_existing;
        self
    }

    /// Set the block compressor.
    pub fn set_compressor(&mut self, compressor: Compressor) -> &mut Self {
        self.compressor = compressor;
        self
    }

    /// Set the number of block codec worker threads (at least one).
    pub fn set_num_threads(&mut self, num_threads: usize) -> &mut Self {
        self.num_threads = num_threads.max(1);
        self
    }

    /// Log storage calls to `usage_log`.
    pub fn set_usage_log(&mut self, usage_log: Option<UsageLog>) -> &mut Self {
        self.usage_log = usage_log;
        self
    }

    /// Return the chunk grid.
    #[must_use]
    pub fn chunk_grid(&self) -> &ChunkGrid {
        &self.chunk_grid
    }

    /// Return the chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &ChunkShape {
        self.chunk_grid.chunk_shape()
    }

    /// Return the block shape.
    #[must_use]
    pub fn block_shape(&self) -> &ChunkShape {
        self.chunk_grid.block_shape()
    }

    /// Return the storage backend.
    #[must_use]
    pub fn backend(&self) -> &StorageBackend {
        &self.backend
    }

    /// Return whether existing data at a persistent backend path is removed on creation.
    #[must_use]
    pub fn remove_existing(&self) -> bool {
        self.remove_existing
    }

    /// Return the block compressor.
    #[must_use]
    pub fn compressor(&self) -> Compressor {
        self.compressor
    }

    /// Return the number of block codec worker threads.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Return the usage log, if any.
    #[must_use]
    pub fn usage_log(&self) -> Option<&UsageLog> {
        self.usage_log.as_ref()
    }
}
