use std::{iter::FusedIterator, num::NonZeroU64};

use crate::{
    array::{chunk_shape_to_array_shape, ArrayIndices},
    array_subset::{ArraySubset, IncompatibleDimensionalityError},
};

use super::IndicesIterator;

/// Iterates over the regular sized chunks overlapping an array subset.
/// All chunks have the same size, and may extend over the bounds of the array subset.
///
/// The iterator item is a ([`ArrayIndices`], [`ArraySubset`]) tuple corresponding to the chunk indices and array subset.
/// Chunks are visited in row-major order of their chunk indices.
pub struct ChunksIterator {
    inner: IndicesIterator,
    chunk_shape: Vec<u64>,
}

impl ChunksIterator {
    /// Create a new chunks iterator.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if `chunk_shape` does not match the dimensionality of `subset`.
    pub fn new(
        subset: &ArraySubset,
        chunk_shape: &[NonZeroU64],
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if subset.dimensionality() != chunk_shape.len() {
            return Err(IncompatibleDimensionalityError::new(
                chunk_shape.len(),
                subset.dimensionality(),
            ));
        }
        let chunk_shape = chunk_shape_to_array_shape(chunk_shape);
        let subset_chunks = if subset.is_empty() {
            ArraySubset::new_with_shape(vec![0; subset.dimensionality()])
        } else {
            let chunk_start: ArrayIndices = std::iter::zip(subset.start(), &chunk_shape)
                .map(|(s, c)| s / c)
                .collect();
            let chunk_shape_grid: ArrayIndices =
                itertools::izip!(subset.start(), subset.shape(), &chunk_shape, &chunk_start)
                    .map(|(s, n, c, first)| (s + n - 1) / c - first + 1)
                    .collect();
            ArraySubset {
                start: chunk_start,
                shape: chunk_shape_grid,
            }
        };
        Ok(Self {
            inner: IndicesIterator::new(subset_chunks),
            chunk_shape,
        })
    }
}

impl Iterator for ChunksIterator {
    type Item = (ArrayIndices, ArraySubset);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|chunk_indices| {
            let start = std::iter::zip(&chunk_indices, &self.chunk_shape)
                .map(|(i, c)| i * c)
                .collect();
            let chunk_subset = ArraySubset {
                start,
                shape: self.chunk_shape.clone(),
            };
            (chunk_indices, chunk_subset)
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ChunksIterator {}

impl FusedIterator for ChunksIterator {}
