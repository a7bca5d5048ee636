//! The chunk grid.
//!
//! A [`ChunkGrid`] partitions an array into chunks of a fixed shape, and each chunk into blocks of a fixed shape.
//! It is pure geometry and performs no I/O.
//!
//! Chunks at the upper edge of an array may be *ragged*: their valid footprint is the intersection of their nominal extent with the array shape.
//! Chunks are identified by their chunk grid indices or by a linear chunk id, the row-major ravel of the indices over the chunk grid shape.
//!
//! Inside a stored chunk, elements are laid out block-major.
//! The chunk shape is rounded up to a multiple of the block shape (the *padded chunk shape*), the blocks are stored in row-major block order, and each block is stored row-major over the block shape.

use itertools::izip;
use thiserror::Error;

use crate::array_subset::{ArraySubset, ChunksIterator, IncompatibleDimensionalityError};

use super::{
    ravel_indices, unravel_index, ArrayIndices, ArrayShape, ChunkShape, MAX_DIM,
};

/// The chunk and block geometry of an array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkGrid {
    chunk_shape: ChunkShape,
    block_shape: ChunkShape,
}

/// A chunk grid creation error.
#[derive(Clone, Debug, Error)]
pub enum ChunkGridCreateError {
    /// The dimensionality is zero or exceeds [`MAX_DIM`].
    #[error("invalid chunk grid dimensionality {0}, must be in 1..={}", MAX_DIM)]
    InvalidDimensionality(usize),
    /// The block shape and chunk shape have different dimensionality.
    #[error(transparent)]
    IncompatibleDimensionalityError(#[from] IncompatibleDimensionalityError),
    /// A block shape component exceeds the chunk shape.
    #[error("block shape {0:?} exceeds chunk shape {1:?}")]
    BlockShapeExceedsChunkShape(ArrayShape, ArrayShape),
    /// The number of elements of a chunk padded to whole blocks overflows a [`u64`].
    #[error("chunk shape {0:?} padded to whole blocks of {1:?} overflows the addressable size")]
    ChunkSizeOverflow(ArrayShape, ArrayShape),
}

/// An invalid array indices error.
#[derive(Clone, Debug, Error)]
#[error("array indices {0:?} are out of bounds of array shape {1:?}")]
pub struct InvalidArrayIndicesError(pub(crate) ArrayIndices, pub(crate) ArrayShape);

/// An invalid chunk indices error.
#[derive(Clone, Debug, Error)]
#[error("chunk grid indices {0:?} are invalid for array with shape {1:?}")]
pub struct InvalidChunkGridIndicesError(pub(crate) ArrayIndices, pub(crate) ArrayShape);

/// The extent of chunk `chunk_index` along a dimension of size `array_size` divided into chunks of `chunk_size`.
///
/// Returns [`None`] if the chunk lies entirely outside of the dimension.
#[must_use]
pub fn chunk_extent_dim(chunk_index: u64, chunk_size: u64, array_size: u64) -> Option<u64> {
    let origin = chunk_index.checked_mul(chunk_size)?;
    (origin < array_size).then(|| std::cmp::min(chunk_size, array_size - origin))
}

impl ChunkGrid {
    /// Create a new chunk grid.
    ///
    /// # Errors
    /// Returns a [`ChunkGridCreateError`] if
    ///  - the dimensionality is zero or exceeds [`MAX_DIM`],
    ///  - `block_shape` and `chunk_shape` have different dimensionality,
    ///  - any component of `block_shape` exceeds the corresponding component of `chunk_shape`, or
    ///  - the number of elements of a chunk padded to whole blocks overflows a [`u64`].
    pub fn new(
        chunk_shape: ChunkShape,
        block_shape: ChunkShape,
    ) -> Result<Self, ChunkGridCreateError> {
        if chunk_shape.is_empty() || chunk_shape.len() > MAX_DIM {
            return Err(ChunkGridCreateError::InvalidDimensionality(
                chunk_shape.len(),
            ));
        }
        if block_shape.len() != chunk_shape.len() {
            return Err(IncompatibleDimensionalityError::new(
                block_shape.len(),
                chunk_shape.len(),
            )
            .into());
        }
        if std::iter::zip(block_shape.iter(), chunk_shape.iter()).any(|(b, c)| b > c) {
            return Err(ChunkGridCreateError::BlockShapeExceedsChunkShape(
                block_shape.to_array_shape(),
                chunk_shape.to_array_shape(),
            ));
        }
        let padded_num_elements = std::iter::zip(chunk_shape.iter(), block_shape.iter())
            .try_fold(1u64, |num_elements, (chunk, block)| {
                chunk
                    .get()
                    .div_ceil(block.get())
                    .checked_mul(block.get())
                    .and_then(|padded| num_elements.checked_mul(padded))
            });
        if padded_num_elements.is_none() {
            return Err(ChunkGridCreateError::ChunkSizeOverflow(
                chunk_shape.to_array_shape(),
                block_shape.to_array_shape(),
            ));
        }
        Ok(Self {
            chunk_shape,
            block_shape,
        })
    }

    /// Return the dimensionality of the chunk grid.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.chunk_shape.len()
    }

    /// Return the chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &ChunkShape {
        &self.chunk_shape
    }

    /// Return the block shape.
    #[must_use]
    pub fn block_shape(&self) -> &ChunkShape {
        &self.block_shape
    }

    /// Return the number of chunks along each dimension of an array with `array_shape`.
    #[must_use]
    pub fn grid_shape(&self, array_shape: &[u64]) -> ArrayShape {
        std::iter::zip(array_shape, self.chunk_shape.iter())
            .map(|(&size, chunk)| size.div_ceil(chunk.get()))
            .collect()
    }

    /// Return `array_shape` rounded up to a multiple of the chunk shape.
    ///
    /// Components saturate at [`u64::MAX`].
    #[must_use]
    pub fn padded_shape(&self, array_shape: &[u64]) -> ArrayShape {
        std::iter::zip(array_shape, self.chunk_shape.iter())
            .map(|(&size, chunk)| size.div_ceil(chunk.get()).saturating_mul(chunk.get()))
            .collect()
    }

    /// Return the number of chunks of an array with `array_shape`.
    #[must_use]
    pub fn num_chunks(&self, array_shape: &[u64]) -> u64 {
        self.grid_shape(array_shape).iter().product()
    }

    /// Return the indices of the chunk containing the element at `array_indices`.
    ///
    /// # Errors
    /// Returns [`InvalidArrayIndicesError`] if `array_indices` does not match the dimensionality of the chunk grid or is not within `array_shape`.
    pub fn chunk_indices(
        &self,
        array_indices: &[u64],
        array_shape: &[u64],
    ) -> Result<ArrayIndices, InvalidArrayIndicesError> {
        if array_indices.len() == self.dimensionality()
            && array_shape.len() == self.dimensionality()
            && std::iter::zip(array_indices, array_shape).all(|(i, s)| i < s)
        {
            Ok(std::iter::zip(array_indices, self.chunk_shape.iter())
                .map(|(i, chunk)| i / chunk.get())
                .collect())
        } else {
            Err(InvalidArrayIndicesError(
                array_indices.to_vec(),
                array_shape.to_vec(),
            ))
        }
    }

    /// Return true if `chunk_indices` addresses a chunk of an array with `array_shape`.
    #[must_use]
    pub fn chunk_indices_inbounds(&self, chunk_indices: &[u64], array_shape: &[u64]) -> bool {
        chunk_indices.len() == self.dimensionality()
            && array_shape.len() == self.dimensionality()
            && izip!(chunk_indices, self.chunk_shape.iter(), array_shape)
                .all(|(&i, c, &s)| chunk_extent_dim(i, c.get(), s).is_some())
    }

    /// Return the origin (the first element) of the chunk at `chunk_indices`.
    #[must_use]
    pub fn chunk_origin(&self, chunk_indices: &[u64]) -> ArrayIndices {
        std::iter::zip(chunk_indices, self.chunk_shape.iter())
            .map(|(i, chunk)| i * chunk.get())
            .collect()
    }

    /// Return the nominal subset of the chunk at `chunk_indices`, ignoring the array bounds.
    #[must_use]
    pub fn chunk_subset(&self, chunk_indices: &[u64]) -> ArraySubset {
        ArraySubset::new_with_ranges(
            &std::iter::zip(chunk_indices, self.chunk_shape.iter())
                .map(|(i, chunk)| i * chunk.get()..(i + 1) * chunk.get())
                .collect::<Vec<_>>(),
        )
    }

    /// Return the valid extent of the chunk at `chunk_indices` within an array with `array_shape`.
    ///
    /// Returns [`None`] if the chunk does not exist.
    #[must_use]
    pub fn chunk_extent(&self, chunk_indices: &[u64], array_shape: &[u64]) -> Option<ArrayShape> {
        if chunk_indices.len() != self.dimensionality() || array_shape.len() != self.dimensionality()
        {
            return None;
        }
        izip!(chunk_indices, self.chunk_shape.iter(), array_shape)
            .map(|(&i, c, &s)| chunk_extent_dim(i, c.get(), s))
            .collect()
    }

    /// Return the valid footprint of the chunk at `chunk_indices` within an array with `array_shape`.
    ///
    /// Returns [`None`] if the chunk does not exist.
    #[must_use]
    pub fn chunk_subset_bounded(
        &self,
        chunk_indices: &[u64],
        array_shape: &[u64],
    ) -> Option<ArraySubset> {
        let shape = self.chunk_extent(chunk_indices, array_shape)?;
        ArraySubset::new_with_start_shape(self.chunk_origin(chunk_indices), shape).ok()
    }

    /// Return the linear chunk id of the chunk at `chunk_indices` within an array with `array_shape`.
    ///
    /// # Errors
    /// Returns [`InvalidChunkGridIndicesError`] if the chunk does not exist.
    pub fn linear_chunk_id(
        &self,
        chunk_indices: &[u64],
        array_shape: &[u64],
    ) -> Result<u64, InvalidChunkGridIndicesError> {
        if self.chunk_indices_inbounds(chunk_indices, array_shape) {
            Ok(ravel_indices(chunk_indices, &self.grid_shape(array_shape)))
        } else {
            Err(InvalidChunkGridIndicesError(
                chunk_indices.to_vec(),
                array_shape.to_vec(),
            ))
        }
    }

    /// Return the chunk grid indices of the chunk with linear id `chunk_id` within an array with `array_shape`.
    ///
    /// Returns [`None`] if the chunk does not exist.
    #[must_use]
    pub fn chunk_indices_from_id(&self, chunk_id: u64, array_shape: &[u64]) -> Option<ArrayIndices> {
        let grid_shape = self.grid_shape(array_shape);
        (chunk_id < grid_shape.iter().product()).then(|| unravel_index(chunk_id, &grid_shape))
    }

    /// Return the chunk shape rounded up to a multiple of the block shape.
    #[must_use]
    pub fn padded_chunk_shape(&self) -> ArrayShape {
        std::iter::zip(self.chunk_shape.iter(), self.block_shape.iter())
            .map(|(chunk, block)| chunk.get().div_ceil(block.get()) * block.get())
            .collect()
    }

    /// Return the number of blocks along each dimension of a chunk.
    #[must_use]
    pub fn blocks_per_chunk(&self) -> ArrayShape {
        std::iter::zip(self.chunk_shape.iter(), self.block_shape.iter())
            .map(|(chunk, block)| chunk.get().div_ceil(block.get()))
            .collect()
    }

    /// Return the number of blocks in a chunk.
    #[must_use]
    pub fn num_blocks(&self) -> u64 {
        self.blocks_per_chunk().iter().product()
    }

    /// Return the number of elements in a block.
    #[must_use]
    pub fn block_num_elements(&self) -> u64 {
        self.block_shape.num_elements()
    }

    /// Return the number of elements of a stored chunk, including block padding.
    #[must_use]
    pub fn chunk_num_elements(&self) -> u64 {
        self.padded_chunk_shape().iter().product()
    }

    /// Return an iterator over the blocks intersecting `chunk_region`, a region in chunk-local coordinates.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `chunk_region` does not match the dimensionality of the chunk grid.
    pub fn iter_block_overlaps(
        &self,
        chunk_region: &ArraySubset,
    ) -> Result<BlockOverlaps, IncompatibleDimensionalityError> {
        Ok(BlockOverlaps {
            inner: chunk_region.iter_chunks(&self.block_shape)?,
            chunk_region: chunk_region.clone(),
            blocks_per_chunk: self.blocks_per_chunk(),
        })
    }
}

/// The intersection of a chunk-local region with one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockOverlap {
    /// The linear id of the block within its chunk.
    pub block_id: u64,
    /// The overlap in block-local coordinates.
    pub block_subset: ArraySubset,
    /// The overlap in chunk-local coordinates.
    pub chunk_subset: ArraySubset,
}

/// An iterator over the blocks intersecting a chunk-local region, in row-major block order.
///
/// See [`ChunkGrid::iter_block_overlaps`].
pub struct BlockOverlaps {
    inner: ChunksIterator,
    chunk_region: ArraySubset,
    blocks_per_chunk: ArrayShape,
}

impl Iterator for BlockOverlaps {
    type Item = BlockOverlap;

    fn next(&mut self) -> Option<Self::Item> {
        let (block_indices, block) = self.inner.next()?;
        let chunk_subset = self.chunk_region.overlap_unchecked(&block);
        Some(BlockOverlap {
            block_id: ravel_indices(&block_indices, &self.blocks_per_chunk),
            block_subset: chunk_subset.relative_to_unchecked(block.start()),
            chunk_subset,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(chunk_shape: &[u64], block_shape: &[u64]) -> ChunkGrid {
        ChunkGrid::new(
            chunk_shape.try_into().unwrap(),
            block_shape.try_into().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn chunk_grid_create() {
        assert!(ChunkGrid::new(
            vec![4, 4].try_into().unwrap(),
            vec![5, 4].try_into().unwrap()
        )
        .is_err());
        assert!(ChunkGrid::new(vec![4, 4].try_into().unwrap(), vec![4].try_into().unwrap()).is_err());
        assert!(ChunkGrid::new(
            vec![1; MAX_DIM + 1].try_into().unwrap(),
            vec![1; MAX_DIM + 1].try_into().unwrap()
        )
        .is_err());
        assert!(ChunkGrid::new(
            vec![1; MAX_DIM].try_into().unwrap(),
            vec![1; MAX_DIM].try_into().unwrap()
        )
        .is_ok());
    }

    #[test]
    fn chunk_grid_size_overflow() {
        assert!(matches!(
            ChunkGrid::new(
                vec![1 << 32, 1 << 32].try_into().unwrap(),
                vec![1, 1].try_into().unwrap()
            ),
            Err(ChunkGridCreateError::ChunkSizeOverflow(_, _))
        ));
        // padding to whole blocks overflows before the chunk shape does
        assert!(ChunkGrid::new(
            vec![u64::MAX - 1].try_into().unwrap(),
            vec![1 << 32].try_into().unwrap()
        )
        .is_err());
        assert!(ChunkGrid::new(
            vec![1 << 31, 1 << 32].try_into().unwrap(),
            vec![1, 1].try_into().unwrap()
        )
        .is_ok());
        let chunk_grid = grid(&[1 << 63], &[1]);
        assert_eq!(chunk_grid.padded_shape(&[u64::MAX]), vec![u64::MAX]);
    }

    #[test]
    fn chunk_grid_divisible() {
        let chunk_grid = grid(&[5, 5], &[5, 5]);
        let shape = [10, 20];
        assert_eq!(chunk_grid.grid_shape(&shape), vec![2, 4]);
        assert_eq!(chunk_grid.padded_shape(&shape), vec![10, 20]);
        assert_eq!(chunk_grid.num_chunks(&shape), 8);
        assert_eq!(chunk_grid.chunk_extent(&[1, 3], &shape), Some(vec![5, 5]));
        assert_eq!(chunk_grid.chunk_extent(&[2, 0], &shape), None);
    }

    #[test]
    fn chunk_grid_ragged() {
        let chunk_grid = grid(&[3], &[2]);
        let shape = [5];
        assert_eq!(chunk_grid.grid_shape(&shape), vec![2]);
        assert_eq!(chunk_grid.padded_shape(&shape), vec![6]);
        assert_eq!(chunk_grid.chunk_extent(&[0], &shape), Some(vec![3]));
        assert_eq!(chunk_grid.chunk_extent(&[1], &shape), Some(vec![2]));
        assert_eq!(
            chunk_grid.chunk_subset_bounded(&[1], &shape),
            Some(ArraySubset::new_with_ranges(&[3..5]))
        );
        assert_eq!(chunk_grid.padded_chunk_shape(), vec![4]);
        assert_eq!(chunk_grid.blocks_per_chunk(), vec![2]);
        assert_eq!(chunk_grid.chunk_num_elements(), 4);

        // one less than a multiple
        let chunk_grid = grid(&[6, 6], &[3, 3]);
        let shape = [17, 5];
        assert_eq!(chunk_grid.grid_shape(&shape), vec![3, 1]);
        assert_eq!(chunk_grid.chunk_extent(&[2, 0], &shape), Some(vec![5, 5]));
    }

    #[test]
    fn chunk_grid_single_chunk() {
        let chunk_grid = grid(&[8, 8, 8], &[4, 4, 4]);
        let shape = [2, 3, 4];
        assert_eq!(chunk_grid.num_chunks(&shape), 1);
        assert_eq!(chunk_grid.chunk_extent(&[0, 0, 0], &shape), Some(vec![2, 3, 4]));
        assert_eq!(chunk_grid.linear_chunk_id(&[0, 0, 0], &shape).unwrap(), 0);
        assert!(chunk_grid.linear_chunk_id(&[0, 1, 0], &shape).is_err());
    }

    #[test]
    fn chunk_grid_extent_dim() {
        assert_eq!(chunk_extent_dim(0, 3, 5), Some(3));
        assert_eq!(chunk_extent_dim(1, 3, 5), Some(2));
        assert_eq!(chunk_extent_dim(2, 3, 5), None);
        assert_eq!(chunk_extent_dim(0, 3, 0), None);
        assert_eq!(chunk_extent_dim(u64::MAX, 3, 5), None);
    }

    #[test]
    fn chunk_grid_chunk_indices() {
        let chunk_grid = grid(&[3, 5, 9], &[3, 4, 4]);
        let shape = [12, 10, 14];
        assert_eq!(
            chunk_grid.chunk_indices(&[11, 5, 9], &shape).unwrap(),
            vec![3, 1, 1]
        );
        assert!(chunk_grid.chunk_indices(&[12, 0, 0], &shape).is_err());
        assert!(chunk_grid.chunk_indices(&[0, 0], &shape).is_err());
    }

    #[test]
    fn chunk_grid_linear_ids() {
        let chunk_grid = grid(&[5, 7, 3, 3], &[2, 2, 1, 1]);
        let shape = [10, 10, 5, 5];
        let grid_shape = chunk_grid.grid_shape(&shape);
        assert_eq!(grid_shape, vec![2, 2, 2, 2]);
        for chunk_id in 0..chunk_grid.num_chunks(&shape) {
            let chunk_indices = chunk_grid.chunk_indices_from_id(chunk_id, &shape).unwrap();
            assert_eq!(
                chunk_grid.linear_chunk_id(&chunk_indices, &shape).unwrap(),
                chunk_id
            );
        }
        assert_eq!(chunk_grid.linear_chunk_id(&[0, 0, 1, 0], &shape).unwrap(), 2);
        assert!(chunk_grid.chunk_indices_from_id(16, &shape).is_none());
    }

    #[test]
    fn chunk_grid_footprints_sum() {
        let cases: [(&[u64], &[u64], &[u64]); 5] = [
            (&[5], &[3], &[2]),
            (&[18, 6], &[6, 6], &[3, 3]),
            (&[12, 10, 14], &[3, 5, 9], &[3, 4, 4]),
            (&[10, 10, 5, 5], &[5, 7, 3, 3], &[2, 2, 1, 1]),
            (&[1, 1], &[4, 4], &[4, 4]),
        ];
        for (shape, chunk_shape, block_shape) in cases {
            let chunk_grid = grid(chunk_shape, block_shape);
            let total: u64 = (0..chunk_grid.num_chunks(shape))
                .map(|chunk_id| {
                    let chunk_indices = chunk_grid.chunk_indices_from_id(chunk_id, shape).unwrap();
                    chunk_grid
                        .chunk_subset_bounded(&chunk_indices, shape)
                        .unwrap()
                        .num_elements()
                })
                .sum();
            assert_eq!(total, shape.iter().product::<u64>());
        }
    }

    #[test]
    fn chunk_grid_block_overlaps() {
        let chunk_grid = grid(&[6, 6], &[3, 3]);
        assert_eq!(chunk_grid.num_blocks(), 4);
        assert_eq!(chunk_grid.block_num_elements(), 9);
        let region = ArraySubset::new_with_ranges(&[2..4, 1..2]);
        let overlaps: Vec<_> = chunk_grid.iter_block_overlaps(&region).unwrap().collect();
        assert_eq!(
            overlaps,
            vec![
                BlockOverlap {
                    block_id: 0,
                    block_subset: ArraySubset::new_with_ranges(&[2..3, 1..2]),
                    chunk_subset: ArraySubset::new_with_ranges(&[2..3, 1..2]),
                },
                BlockOverlap {
                    block_id: 2,
                    block_subset: ArraySubset::new_with_ranges(&[0..1, 1..2]),
                    chunk_subset: ArraySubset::new_with_ranges(&[3..4, 1..2]),
                },
            ]
        );

        // ragged blocks
        let chunk_grid = grid(&[3, 5, 9], &[3, 4, 4]);
        assert_eq!(chunk_grid.padded_chunk_shape(), vec![3, 8, 12]);
        let region = ArraySubset::new_with_shape(vec![3, 5, 9]);
        let overlaps: Vec<_> = chunk_grid.iter_block_overlaps(&region).unwrap().collect();
        assert_eq!(overlaps.len(), 6);
        assert_eq!(
            overlaps.iter().map(|o| o.chunk_subset.num_elements()).sum::<u64>(),
            region.num_elements()
        );
        assert_eq!(
            overlaps[5].block_subset,
            ArraySubset::new_with_ranges(&[0..3, 0..1, 0..1])
        );
    }
}
