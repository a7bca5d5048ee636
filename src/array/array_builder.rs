use crate::storage::{storage_adapter::UsageLog, StorageBackend};

use super::{
    array_bytes::{try_zeroed_bytes, update_chunk, RegionLayout},
    unravel_index, Array, ArrayCreateError, ArrayMetadata, ArrayParams, ArrayShape, ChunkGrid,
    ChunkStore, Compressor, FillValue, StorageSpec,
};

impl Array {
    /// Create an array with every element zero.
    ///
    /// # Errors
    /// See [`Array::new_full`].
    pub fn new_empty(params: &ArrayParams, storage: &StorageSpec) -> Result<Self, ArrayCreateError> {
        Self::new_full(params, storage, &FillValue::zero(params.element_size()))
    }

    /// Create an array with every element equal to `fill_value`.
    ///
    /// A single raw chunk is filled and encoded once, and the encoded chunk is stored for every chunk of the grid.
    ///
    /// # Errors
    /// Returns an [`ArrayCreateError`] if
    ///  - the size of `fill_value` does not match the element size,
    ///  - the dimensionality of `storage` does not match `params`, or
    ///  - the chunk store cannot be created or written.
    pub fn new_full(
        params: &ArrayParams,
        storage: &StorageSpec,
        fill_value: &FillValue,
    ) -> Result<Self, ArrayCreateError> {
        if fill_value.size() != params.element_size() {
            return Err(ArrayCreateError::InvalidFillValue(
                fill_value.size(),
                params.element_size(),
            ));
        }
        let mut store = create_store(params, storage)?;
        let chunk_grid = storage.chunk_grid();
        let num_chunks = chunk_grid.num_chunks(params.shape());

        let mut chunk = try_zeroed_bytes(store.chunk_size())?;
        fill_value.repeat_into(&mut chunk);
        let encoded = store.encode_chunk(&chunk)?;
        log::debug!(
            "filling {num_chunks} chunks with {fill_value} ({} bytes per encoded chunk)",
            encoded.as_bytes().len()
        );
        let mut transaction = store.transaction();
        for _ in 0..num_chunks {
            transaction.append_encoded(&encoded)?;
        }
        transaction.commit(None)?;

        Ok(Self::new_with_store(
            params.shape().to_vec(),
            params.element_size(),
            chunk_grid.clone(),
            store,
        ))
    }

    /// Create an array from `bytes`, the row-major bytes of every element.
    ///
    /// # Errors
    /// Returns an [`ArrayCreateError`] if
    ///  - the length of `bytes` is not the size of the array,
    ///  - the dimensionality of `storage` does not match `params`, or
    ///  - the chunk store cannot be created or written.
    pub fn new_from_bytes(
        params: &ArrayParams,
        storage: &StorageSpec,
        bytes: &[u8],
    ) -> Result<Self, ArrayCreateError> {
        if bytes.len() as u64 != params.size_bytes() {
            return Err(ArrayCreateError::InvalidBytesInputSize(
                bytes.len(),
                params.size_bytes(),
            ));
        }
        let mut store = create_store(params, storage)?;
        let chunk_grid = storage.chunk_grid();
        let grid_shape = chunk_grid.grid_shape(params.shape());
        let num_chunks = chunk_grid.num_chunks(params.shape());

        let mut chunk = try_zeroed_bytes(store.chunk_size())?;
        let mut transaction = store.transaction();
        for chunk_id in 0..num_chunks {
            let chunk_indices = unravel_index(chunk_id, &grid_shape);
            let Some(chunk_subset) = chunk_grid.chunk_subset_bounded(&chunk_indices, params.shape())
            else {
                continue;
            };
            chunk.fill(0);
            update_chunk(
                chunk_grid,
                &mut chunk,
                &chunk_subset.relative_to_unchecked(&chunk_grid.chunk_origin(&chunk_indices)),
                bytes,
                RegionLayout {
                    shape: params.shape(),
                    start: chunk_subset.start(),
                },
                params.element_size(),
            );
            transaction.append_chunk(&chunk)?;
        }
        transaction.commit(None)?;
        log::debug!("stored {num_chunks} chunks from bytes");

        Ok(Self::new_with_store(
            params.shape().to_vec(),
            params.element_size(),
            chunk_grid.clone(),
            store,
        ))
    }
}

fn create_store(params: &ArrayParams, storage: &StorageSpec) -> Result<ChunkStore, ArrayCreateError> {
    params.validate_chunk_grid(storage.chunk_grid())?;
    let metadata = serde_json::to_value(ArrayMetadata {
        shape: params.shape().to_vec(),
        element_size: params.element_size(),
        chunk_shape: storage.chunk_shape().clone(),
        block_shape: storage.block_shape().clone(),
    })?;
    log::debug!(
        "creating array with shape {:?}, element size {}, chunk shape {:?} and block shape {:?} on {}",
        params.shape(),
        params.element_size(),
        storage.chunk_shape().to_array_shape(),
        storage.block_shape().to_array_shape(),
        storage.backend()
    );
    Ok(ChunkStore::create(storage, params.element_size(), metadata)?)
}

/// An [`Array`] builder.
///
/// The array builder is initialised from an array shape, element size, chunk grid, and fill value.
///  - The compressor is the [default compressor](crate::config::Config#default-compressor).
///  - The block codec uses the [codec concurrent limit](crate::config::Config#codec-concurrent-limit) worker threads.
///  - Existing data at a persistent backend path is not removed.
///
/// Use the methods in the array builder to change the configuration away from these defaults, and then build the array in a backend with [`ArrayBuilder::build`] or [`ArrayBuilder::build_from_bytes`].
///
/// For example:
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use ndchunk::array::{ArrayBuilder, ChunkGrid, Compressor, FillValue};
/// use ndchunk::storage::StorageBackend;
/// let array = ArrayBuilder::new(
///     vec![12, 10, 14], // array shape
///     4, // element size
///     ChunkGrid::new(vec![3, 5, 9].try_into()?, vec![3, 4, 4].try_into()?)?,
///     FillValue::from(1.0f32),
/// )
/// .compressor(Compressor::None)
/// .num_threads(2)
/// .build(StorageBackend::Memory)?;
/// assert_eq!(array.num_chunks(), 16);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ArrayBuilder {
    /// Array shape.
    pub shape: ArrayShape,
    /// Element size in bytes.
    pub element_size: usize,
    /// Chunk grid.
    pub chunk_grid: ChunkGrid,
    /// Fill value.
    pub fill_value: FillValue,
    /// Block compressor.
    pub compressor: Option<Compressor>,
    /// Number of block codec worker threads.
    pub num_threads: Option<usize>,
    /// Remove existing data at a persistent backend path.
    pub remove_existing: bool,
    /// Storage call log.
    pub usage_log: Option<UsageLog>,
}

impl ArrayBuilder {
    /// Create a new array builder.
    #[must_use]
    pub fn new(
        shape: ArrayShape,
        element_size: usize,
        chunk_grid: ChunkGrid,
        fill_value: FillValue,
    ) -> Self {
        Self {
            shape,
            element_size,
            chunk_grid,
            fill_value,
            compressor: None,
            num_threads: None,
            remove_existing: false,
            usage_log: None,
        }
    }

    /// Create a new builder copying the configuration of an existing array.
    ///
    /// The fill value is zero.
    #[must_use]
    pub fn from_array(array: &Array) -> Self {
        let mut builder = Self::new(
            array.shape().to_vec(),
            array.element_size(),
            array.chunk_grid().clone(),
            FillValue::zero(array.element_size()),
        );
        builder
            .compressor(array.compressor())
            .num_threads(array.store().codec().num_threads());
        builder
    }

    /// Set the shape.
    pub fn shape(&mut self, shape: ArrayShape) -> &mut Self {
        self.shape = shape;
        self
    }

    /// Set the element size.
    pub fn element_size(&mut self, element_size: usize) -> &mut Self {
        self.element_size = element_size;
        self
    }

    /// Set the chunk grid.
    pub fn chunk_grid(&mut self, chunk_grid: ChunkGrid) -> &mut Self {
        self.chunk_grid = chunk_grid;
        self
    }

    /// Set the fill value.
    pub fn fill_value(&mut self, fill_value: FillValue) -> &mut Self {
        self.fill_value = fill_value;
        self
    }

    /// Set the block compressor.
    ///
    /// If left unmodified, the array uses the [default compressor](crate::config::Config#default-compressor).
    pub fn compressor(&mut self, compressor: Compressor) -> &mut Self {
        self.compressor = Some(compressor);
        self
    }

    /// Set the number of block codec worker threads.
    pub fn num_threads(&mut self, num_threads: usize) -> &mut Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set whether existing data at a persistent backend path is removed.
    pub fn remove_existing(&mut self, remove_existing: bool) -> &mut Self {
        self.remove_existing = remove_existing;
        self
    }

    /// Log storage calls to `usage_log`.
    pub fn usage_log(&mut self, usage_log: UsageLog) -> &mut Self {
        self.usage_log = Some(usage_log);
        self
    }

    /// Return the array parameters and storage specification for `backend`.
    ///
    /// # Errors
    /// Returns an [`ArrayCreateError`] if the array shape or element size is invalid.
    pub fn to_params_storage(
        &self,
        backend: StorageBackend,
    ) -> Result<(ArrayParams, StorageSpec), ArrayCreateError> {
        let params = ArrayParams::new(self.shape.clone(), self.element_size)?;
        let mut storage = StorageSpec::new_with_chunk_grid(self.chunk_grid.clone(), backend);
        storage
            .set_remove_existing(self.remove_existing)
            .set_usage_log(self.usage_log.clone());
        if let Some(compressor) = self.compressor {
            storage.set_compressor(compressor);
        }
        if let Some(num_threads) = self.num_threads {
            storage.set_num_threads(num_threads);
        }
        Ok((params, storage))
    }

    /// Build into an [`Array`] with every element equal to the fill value.
    ///
    /// # Errors
    /// Returns an [`ArrayCreateError`] if there is an error creating the array.
    /// See [`Array::new_full`].
    pub fn build(&self, backend: StorageBackend) -> Result<Array, ArrayCreateError> {
        let (params, storage) = self.to_params_storage(backend)?;
        Array::new_full(&params, &storage, &self.fill_value)
    }

    /// Build into an [`Array`] holding `bytes`.
    ///
    /// # Errors
    /// Returns an [`ArrayCreateError`] if there is an error creating the array.
    /// See [`Array::new_from_bytes`].
    pub fn build_from_bytes(
        &self,
        backend: StorageBackend,
        bytes: &[u8],
    ) -> Result<Array, ArrayCreateError> {
        let (params, storage) = self.to_params_storage(backend)?;
        Array::new_from_bytes(&params, &storage, bytes)
    }
}
