//! Chunked, block-compressed N-dimensional arrays.
//!
//! An [`Array`] is defined logically by its shape and element size ([`ArrayParams`]), and physically by a [`StorageSpec`]:
//!  - the array is partitioned into chunks of a fixed shape, the unit of storage,
//!  - each chunk is partitioned into blocks of a fixed shape, the unit of compression, and
//!  - the encoded chunks live in a [`StorageBackend`](crate::storage::StorageBackend): memory, a single contiguous file, or a directory of chunk files.
//!
//! Reading or writing a hyperrectangular region with [`Array::get_slice`] or [`Array::set_slice`] only touches the chunks and blocks intersecting the region.
//! An array can grow along any axis with [`Array::append`].
//!
//! Arrays are created with [`Array::new_empty`], [`Array::new_full`], [`Array::new_from_bytes`] or an [`ArrayBuilder`], and persisted arrays are reopened with [`Array::open`].

mod array_append;
mod array_builder;
mod array_bytes;
mod array_errors;
mod array_metadata;
mod array_params;
mod array_sync_readable;
mod array_sync_writable;
pub mod chunk_grid;
mod chunk_shape;
pub mod chunk_store;
pub mod codec;
mod fill_value;
mod storage_spec;

use self::chunk_grid::InvalidChunkGridIndicesError;

pub use self::{
    array_builder::ArrayBuilder,
    array_errors::{ArrayCreateError, ArrayError, ArrayErrorKind},
    array_metadata::ArrayMetadata,
    array_params::ArrayParams,
    chunk_grid::ChunkGrid,
    chunk_shape::{chunk_shape_to_array_shape, ChunkShape, NonZeroError},
    chunk_store::ChunkStore,
    codec::Compressor,
    fill_value::FillValue,
    storage_spec::StorageSpec,
};

use crate::{
    array_subset::{ArraySubset, IncompatibleDimensionalityError},
    config::global_config,
    storage::{open_storage, StorageBackend},
};

/// An ND index to an element in an array.
pub type ArrayIndices = Vec<u64>;

/// The shape of an array.
pub type ArrayShape = Vec<u64>;

/// The maximum dimensionality of an array.
pub const MAX_DIM: usize = 8;

/// A chunked, block-compressed N-dimensional array.
///
/// An array exclusively owns the [`ChunkStore`] holding its encoded chunks.
/// Its shape only changes through [`append`](Array::append), and its chunk and block shapes are fixed at creation.
///
/// Elements are opaque fixed-size byte strings.
/// Buffers passed to and returned from an array are row-major with the element size given at creation.
/// The `_elements` methods reinterpret buffers as any [`bytemuck::Pod`] type of the same size.
///
/// An array releases its store when dropped.
/// Dropping flushes the store on a best-effort basis, use [`free`](Array::free) to observe the result.
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use ndchunk::{array::{Array, ArrayParams, FillValue, StorageSpec}, storage::StorageBackend};
///
/// let params = ArrayParams::new(vec![18, 6], 4)?;
/// let storage = StorageSpec::new(vec![6, 6], vec![3, 3], StorageBackend::Memory)?;
/// let mut array = Array::new_full(&params, &storage, &FillValue::from(1u32))?;
///
/// let column: Vec<u32> = (0..18 * 6).collect();
/// array.append_elements(&column, 1)?;
/// assert_eq!(array.shape(), &[18, 12]);
///
/// let subset = ndchunk::array_subset::ArraySubset::new_with_ranges(&[0..18, 6..12]);
/// assert_eq!(array.retrieve_array_subset_elements::<u32>(&subset)?, column);
/// array.free()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Array {
    /// The array shape.
    shape: ArrayShape,
    /// The size in bytes of an element.
    element_size: usize,
    /// The chunk and block geometry.
    chunk_grid: ChunkGrid,
    /// The encoded chunks.
    store: ChunkStore,
}

impl Array {
    pub(crate) fn new_with_store(
        shape: ArrayShape,
        element_size: usize,
        chunk_grid: ChunkGrid,
        store: ChunkStore,
    ) -> Self {
        Self {
            shape,
            element_size,
            chunk_grid,
            store,
        }
    }

    /// Open an array persisted in `backend`.
    ///
    /// The block codec uses the [codec concurrent limit](crate::config::Config#codec-concurrent-limit) worker threads.
    ///
    /// # Errors
    /// Returns an [`ArrayCreateError`] if the backend cannot be opened or the stored metadata is invalid or inconsistent with the stored chunks.
    pub fn open(backend: &StorageBackend) -> Result<Self, ArrayCreateError> {
        let num_threads = global_config().codec_concurrent_limit();
        Self::open_with_threads(backend, num_threads)
    }

    /// Open an array persisted in `backend` with a block codec using `num_threads` worker threads.
    ///
    /// # Errors
    /// See [`Array::open`].
    pub fn open_with_threads(
        backend: &StorageBackend,
        num_threads: usize,
    ) -> Result<Self, ArrayCreateError> {
        let store = ChunkStore::open(open_storage(backend)?, num_threads)?;
        let metadata: ArrayMetadata = serde_json::from_value(store.metadata().clone())?;
        let ArrayMetadata {
            shape,
            element_size,
            chunk_shape,
            block_shape,
        } = metadata;
        let params = ArrayParams::new(shape, element_size)?;
        let chunk_grid = ChunkGrid::new(chunk_shape, block_shape)?;
        params.validate_chunk_grid(&chunk_grid)?;

        let configuration = store.codec().configuration();
        let chunk_size = chunk_grid.chunk_num_elements() * element_size as u64;
        let block_size = chunk_grid.block_num_elements() * element_size as u64;
        if configuration.element_size != element_size
            || configuration.chunk_size as u64 != chunk_size
            || configuration.block_size as u64 != block_size
        {
            return Err(ArrayCreateError::InconsistentStore(format!(
                "codec configuration {configuration:?} does not match element size {element_size}, chunk size {chunk_size} and block size {block_size}"
            )));
        }
        let expected_chunks = chunk_grid.num_chunks(params.shape());
        if store.num_chunks() != expected_chunks {
            return Err(ArrayCreateError::InconsistentStore(format!(
                "store has {} chunks, expected {expected_chunks}",
                store.num_chunks()
            )));
        }

        log::debug!(
            "opened array with shape {:?} and element size {element_size} from {backend}",
            params.shape()
        );
        Ok(Self::new_with_store(
            params.shape().to_vec(),
            element_size,
            chunk_grid,
            store,
        ))
    }

    /// Close the array, flushing its store.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the store cannot be flushed.
    pub fn free(self) -> Result<(), ArrayError> {
        log::debug!("freeing array with shape {:?}", self.shape);
        Ok(self.store.close()?)
    }

    /// Get the array shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Get the array dimensionality.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.shape.len()
    }

    /// Get the size in bytes of an element.
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Get the number of elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Get the size in bytes of the array when decoded.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.num_elements() * self.element_size as u64
    }

    /// Get the chunk grid.
    #[must_use]
    pub fn chunk_grid(&self) -> &ChunkGrid {
        &self.chunk_grid
    }

    /// Get the chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &ChunkShape {
        self.chunk_grid.chunk_shape()
    }

    /// Get the block shape.
    #[must_use]
    pub fn block_shape(&self) -> &ChunkShape {
        self.chunk_grid.block_shape()
    }

    /// Get the number of chunks along each dimension.
    #[must_use]
    pub fn chunk_grid_shape(&self) -> ArrayShape {
        self.chunk_grid.grid_shape(&self.shape)
    }

    /// Get the array shape rounded up to a multiple of the chunk shape.
    #[must_use]
    pub fn padded_shape(&self) -> ArrayShape {
        self.chunk_grid.padded_shape(&self.shape)
    }

    /// Get the number of chunks.
    #[must_use]
    pub fn num_chunks(&self) -> u64 {
        self.chunk_grid.num_chunks(&self.shape)
    }

    /// Get the block compressor.
    #[must_use]
    pub fn compressor(&self) -> Compressor {
        self.store.codec().configuration().compressor
    }

    /// Get the chunk store.
    #[must_use]
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Get the metadata describing the array.
    #[must_use]
    pub fn metadata(&self) -> ArrayMetadata {
        ArrayMetadata {
            shape: self.shape.clone(),
            element_size: self.element_size,
            chunk_shape: self.chunk_grid.chunk_shape().clone(),
            block_shape: self.chunk_grid.block_shape().clone(),
        }
    }

    /// Return the subset covering the whole array.
    #[must_use]
    pub fn subset_all(&self) -> ArraySubset {
        ArraySubset::new_with_shape(self.shape.clone())
    }

    /// Return the size in bytes of a raw (decoded) chunk.
    pub(crate) fn chunk_size_bytes(&self) -> usize {
        self.store.chunk_size()
    }

    /// Return the size in bytes of `array_subset`, saturating at [`usize::MAX`].
    pub(crate) fn subset_size_bytes(&self, array_subset: &ArraySubset) -> usize {
        array_subset
            .num_elements()
            .checked_mul(self.element_size as u64)
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(usize::MAX)
    }

    /// Return the valid footprint of the chunk at `chunk_indices`.
    pub(crate) fn chunk_subset_bounded(
        &self,
        chunk_indices: &[u64],
    ) -> Result<ArraySubset, ArrayError> {
        if chunk_indices.len() != self.dimensionality() {
            return Err(
                IncompatibleDimensionalityError::new(chunk_indices.len(), self.dimensionality())
                    .into(),
            );
        }
        self.chunk_grid
            .chunk_subset_bounded(chunk_indices, &self.shape)
            .ok_or_else(|| {
                InvalidChunkGridIndicesError(chunk_indices.to_vec(), self.chunk_grid_shape())
                    .into()
            })
    }

    /// Check that `array_subset` matches the dimensionality of the array and lies within its shape.
    pub(crate) fn validate_array_subset(&self, array_subset: &ArraySubset) -> Result<(), ArrayError> {
        if array_subset.dimensionality() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                array_subset.dimensionality(),
                self.dimensionality(),
            )
            .into());
        }
        if array_subset.inbounds(&self.shape) {
            Ok(())
        } else {
            Err(ArrayError::InvalidArraySubset(
                array_subset.clone(),
                self.shape.clone(),
            ))
        }
    }

    /// Validate the slice `[start, stop)` and a buffer of `buffer_len` bytes with shape `buffer_shape`, returning the slice as a subset.
    ///
    /// Checks run in order: dimensionality, bounds ordering, array bounds, buffer shape, buffer size.
    pub(crate) fn slice_subset(
        &self,
        start: &[u64],
        stop: &[u64],
        buffer_len: usize,
        buffer_shape: &[u64],
    ) -> Result<ArraySubset, ArrayError> {
        let dimensionality = self.dimensionality();
        for len in [start.len(), stop.len(), buffer_shape.len()] {
            if len != dimensionality {
                return Err(IncompatibleDimensionalityError::new(len, dimensionality).into());
            }
        }
        if std::iter::zip(start, stop).any(|(start, stop)| stop < start) {
            return Err(ArrayError::InvalidSliceBounds(start.to_vec(), stop.to_vec()));
        }
        let array_subset = ArraySubset::new_with_ranges(
            &std::iter::zip(start, stop)
                .map(|(&start, &stop)| start..stop)
                .collect::<Vec<_>>(),
        );
        if !array_subset.inbounds(&self.shape) {
            return Err(ArrayError::InvalidArraySubset(
                array_subset,
                self.shape.clone(),
            ));
        }
        if array_subset.shape() != buffer_shape {
            return Err(ArrayError::UnexpectedBufferShape(
                buffer_shape.to_vec(),
                array_subset.shape().to_vec(),
            ));
        }
        let size = self.subset_size_bytes(&array_subset);
        if buffer_len < size {
            return Err(ArrayError::InvalidBytesInputSize(buffer_len, size as u64));
        }
        Ok(array_subset)
    }
}

/// Reinterpret bytes as a vector of elements.
///
/// The bytes are copied if they are not suitably aligned for `T`.
#[must_use]
pub fn transmute_from_bytes_vec<T: bytemuck::Pod>(from: Vec<u8>) -> Vec<T> {
    bytemuck::allocation::try_cast_vec(from)
        .unwrap_or_else(|(_err, from)| bytemuck::allocation::pod_collect_to_vec(&from))
}

/// Reinterpret a slice of elements as bytes.
#[must_use]
pub fn transmute_to_bytes<T: bytemuck::NoUninit>(from: &[T]) -> &[u8] {
    bytemuck::must_cast_slice(from)
}

fn validate_element_size<T>(element_size: usize) -> Result<(), ArrayError> {
    if element_size == core::mem::size_of::<T>() {
        Ok(())
    } else {
        Err(ArrayError::IncompatibleElementSize(
            core::mem::size_of::<T>(),
            element_size,
        ))
    }
}

#[cfg(feature = "ndarray")]
fn elements_to_ndarray<T>(
    shape: &[u64],
    elements: Vec<T>,
) -> Result<ndarray::ArrayD<T>, ArrayError> {
    let shape = iter_u64_to_usize(shape.iter());
    Ok(ndarray::ArrayD::<T>::from_shape_vec(shape, elements)?)
}

/// Unravel a linearised index to ND indices.
#[must_use]
pub fn unravel_index(mut index: u64, shape: &[u64]) -> ArrayIndices {
    let mut indices = vec![0; shape.len()];
    for (indices_i, &dim) in std::iter::zip(indices.iter_mut().rev(), shape.iter().rev()) {
        *indices_i = index % dim;
        index /= dim;
    }
    indices
}

/// Ravel ND indices to a linearised index.
///
/// The last dimension varies fastest.
#[must_use]
pub fn ravel_indices(indices: &[u64], shape: &[u64]) -> u64 {
    let mut index: u64 = 0;
    let mut count = 1;
    for (i, s) in std::iter::zip(indices, shape).rev() {
        index += i * count;
        count *= s;
    }
    index
}

#[cfg(feature = "ndarray")]
fn iter_u64_to_usize<'a, I: Iterator<Item = &'a u64>>(iter: I) -> Vec<usize> {
    iter.map(|v| usize::try_from(*v).unwrap())
        .collect::<Vec<_>>()
}
