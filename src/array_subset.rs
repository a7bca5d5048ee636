//! Array subsets.
//!
//! An [`ArraySubset`] is an axis-aligned hyperrectangle of an array, described by its start and shape.
//! It is used throughout this library when reading or writing a region of an array.
//! It can produce convenient iterators over the indices of its elements, runs of contiguous elements, and the chunks that it overlaps.

mod iterators;

pub use iterators::{ChunksIterator, IndicesIterator};

use std::{num::NonZeroU64, ops::Range};

use derive_more::Display;
use itertools::izip;
use thiserror::Error;

use crate::array::{ArrayIndices, ArrayShape};

/// An array subset.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Default)]
#[display("start {start:?} shape {shape:?}")]
pub struct ArraySubset {
    /// The start of the array subset.
    start: ArrayIndices,
    /// The shape of the array subset.
    shape: ArrayShape,
}

impl ArraySubset {
    /// Create a new array subset with `shape` starting at the origin.
    #[must_use]
    pub fn new_with_shape(shape: ArrayShape) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape,
        }
    }

    /// Create a new array subset from a list of [`Range`]s.
    ///
    /// Reversed ranges are treated as empty.
    #[must_use]
    pub fn new_with_ranges(ranges: &[Range<u64>]) -> Self {
        let start = ranges.iter().map(|range| range.start).collect();
        let shape = ranges
            .iter()
            .map(|range| range.end.saturating_sub(range.start))
            .collect();
        Self { start, shape }
    }

    /// Create a new array subset.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the lengths of `start` and `shape` do not match.
    pub fn new_with_start_shape(
        start: ArrayIndices,
        shape: ArrayShape,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() == shape.len() {
            Ok(Self { start, shape })
        } else {
            Err(IncompatibleDimensionalityError::new(
                start.len(),
                shape.len(),
            ))
        }
    }

    /// Create a new array subset from a start and end (exclusive).
    ///
    /// # Errors
    /// Returns [`ArraySubsetError`] if the lengths of `start` and `end` do not match or any `end` precedes its `start`.
    pub fn new_with_start_end_exc(
        start: ArrayIndices,
        end: ArrayIndices,
    ) -> Result<Self, ArraySubsetError> {
        if start.len() != end.len() {
            return Err(IncompatibleDimensionalityError::new(end.len(), start.len()).into());
        }
        if std::iter::zip(&start, &end).any(|(start, end)| end < start) {
            return Err(ArraySubsetError::EndBeforeStart(start, end));
        }
        let shape = std::iter::zip(&start, &end)
            .map(|(start, end)| end - start)
            .collect();
        Ok(Self { start, shape })
    }

    /// Return the start of the array subset.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// Return the shape of the array subset.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the dimensionality of the array subset.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// Return the end (exclusive) of the array subset.
    #[must_use]
    pub fn end_exc(&self) -> ArrayIndices {
        std::iter::zip(&self.start, &self.shape)
            .map(|(start, size)| start + size)
            .collect()
    }

    /// Return the number of elements of the array subset.
    ///
    /// Equal to the product of the components of its shape.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Return the number of elements of the array subset as a `usize`.
    ///
    /// # Panics
    /// Panics if [`num_elements()`](Self::num_elements()) is greater than [`usize::MAX`].
    #[must_use]
    pub fn num_elements_usize(&self) -> usize {
        usize::try_from(self.num_elements()).unwrap()
    }

    /// Returns true if the array subset contains no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shape.iter().any(|&size| size == 0)
    }

    /// Returns true if the array subset is within the bounds of `array_shape`.
    #[must_use]
    pub fn inbounds(&self, array_shape: &[u64]) -> bool {
        self.dimensionality() == array_shape.len()
            && izip!(self.start(), self.shape(), array_shape)
                .all(|(start, size, shape)| start + size <= *shape)
    }

    /// Return the overlapping subset between this array subset and `subset_other`.
    ///
    /// The result is empty (with a start clamped to the overlap boundary) if the subsets are disjoint.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the dimensionality of `subset_other` does not match the dimensionality of this array subset.
    pub fn overlap(&self, subset_other: &Self) -> Result<Self, IncompatibleDimensionalityError> {
        if subset_other.dimensionality() != self.dimensionality() {
            return Err(IncompatibleDimensionalityError::new(
                subset_other.dimensionality(),
                self.dimensionality(),
            ));
        }
        Ok(self.overlap_unchecked(subset_other))
    }

    /// Return the overlapping subset between this array subset and `subset_other`.
    ///
    /// The dimensionality of `subset_other` must match this array subset.
    #[must_use]
    pub(crate) fn overlap_unchecked(&self, subset_other: &Self) -> Self {
        debug_assert_eq!(subset_other.dimensionality(), self.dimensionality());
        let mut start = Vec::with_capacity(self.dimensionality());
        let mut shape = Vec::with_capacity(self.dimensionality());
        for (start_a, size_a, start_b, size_b) in izip!(
            &self.start,
            &self.shape,
            subset_other.start(),
            subset_other.shape()
        ) {
            let overlap_start = *std::cmp::max(start_a, start_b);
            let overlap_end = std::cmp::min(start_a + size_a, start_b + size_b);
            start.push(overlap_start);
            shape.push(overlap_end.saturating_sub(overlap_start));
        }
        Self { start, shape }
    }

    /// Return this array subset with its start offset by `-offset`.
    ///
    /// # Errors
    /// Returns [`ArraySubsetError`] if the dimensionality of `offset` does not match, or any component of `offset` exceeds the start.
    pub fn relative_to(&self, offset: &[u64]) -> Result<Self, ArraySubsetError> {
        if offset.len() != self.dimensionality() {
            return Err(
                IncompatibleDimensionalityError::new(offset.len(), self.dimensionality()).into(),
            );
        }
        let start = std::iter::zip(&self.start, offset)
            .map(|(start, offset)| start.checked_sub(*offset))
            .collect::<Option<ArrayIndices>>()
            .ok_or_else(|| ArraySubsetError::EndBeforeStart(offset.to_vec(), self.start.clone()))?;
        Ok(Self {
            start,
            shape: self.shape.clone(),
        })
    }

    /// Return this array subset with its start offset by `-offset`.
    ///
    /// `offset` must have the dimensionality of this array subset and not exceed its start.
    #[must_use]
    pub(crate) fn relative_to_unchecked(&self, offset: &[u64]) -> Self {
        debug_assert_eq!(offset.len(), self.dimensionality());
        Self {
            start: std::iter::zip(&self.start, offset)
                .map(|(start, offset)| start - offset)
                .collect(),
            shape: self.shape.clone(),
        }
    }

    /// Returns an iterator over the indices of elements within the subset.
    #[must_use]
    pub fn iter_indices(&self) -> IndicesIterator {
        IndicesIterator::new(self.clone())
    }

    /// Returns an iterator over chunks with shape `chunk_shape` in the array subset.
    ///
    /// All chunks overlapping the array subset are returned, and they all have the same shape `chunk_shape`.
    /// Thus, the subsets of the chunks may extend out over the subset.
    ///
    /// # Errors
    /// Returns an error if `chunk_shape` does not match the array subset dimensionality.
    pub fn iter_chunks(
        &self,
        chunk_shape: &[NonZeroU64],
    ) -> Result<ChunksIterator, IncompatibleDimensionalityError> {
        ChunksIterator::new(self, chunk_shape)
    }
}

/// An incompatible dimensionality error.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("incompatible dimensionality {0}, expected {1}")]
pub struct IncompatibleDimensionalityError(usize, usize);

impl IncompatibleDimensionalityError {
    /// Create a new incompatible dimensionality error.
    #[must_use]
    pub const fn new(got: usize, expected: usize) -> Self {
        Self(got, expected)
    }
}

/// An array subset creation error.
#[derive(Clone, Debug, Error)]
pub enum ArraySubsetError {
    /// Incompatible dimensionality.
    #[error(transparent)]
    IncompatibleDimensionalityError(#[from] IncompatibleDimensionalityError),
    /// An end precedes its start.
    #[error("end {1:?} precedes start {0:?}")]
    EndBeforeStart(ArrayIndices, ArrayIndices),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_subset() {
        assert!(ArraySubset::new_with_start_shape(vec![0, 0], vec![10, 10]).is_ok());
        assert!(ArraySubset::new_with_start_shape(vec![0, 0], vec![10]).is_err());
        assert!(ArraySubset::new_with_start_end_exc(vec![0, 0], vec![10, 10]).is_ok());
        assert!(ArraySubset::new_with_start_end_exc(vec![0, 0], vec![10]).is_err());
        assert!(ArraySubset::new_with_start_end_exc(vec![5, 0], vec![4, 10]).is_err());

        let array_subset = ArraySubset::new_with_ranges(&[1..5, 2..4]);
        assert_eq!(array_subset.start(), &[1, 2]);
        assert_eq!(array_subset.shape(), &[4, 2]);
        assert_eq!(array_subset.end_exc(), &[5, 4]);
        assert_eq!(array_subset.num_elements(), 8);
        assert!(array_subset.inbounds(&[5, 4]));
        assert!(!array_subset.inbounds(&[4, 4]));
        assert!(!array_subset.inbounds(&[5, 4, 1]));
        assert_eq!(array_subset.to_string(), "start [1, 2] shape [4, 2]");
    }

    #[test]
    fn array_subset_empty() {
        let array_subset = ArraySubset::new_with_ranges(&[1..1, 2..4]);
        assert!(array_subset.is_empty());
        assert_eq!(array_subset.num_elements(), 0);
        assert!(!ArraySubset::new_with_ranges(&[0..1, 2..4]).is_empty());
    }

    #[test]
    fn array_subset_overlap() {
        let array_subset0 = ArraySubset::new_with_ranges(&[0..5, 0..5]);
        let array_subset1 = ArraySubset::new_with_ranges(&[3..6, 4..7]);
        assert_eq!(
            array_subset0.overlap(&array_subset1).unwrap(),
            ArraySubset::new_with_ranges(&[3..5, 4..5])
        );
        let disjoint = ArraySubset::new_with_ranges(&[6..8, 0..5]);
        assert!(array_subset0.overlap(&disjoint).unwrap().is_empty());
        assert!(array_subset0
            .overlap(&ArraySubset::new_with_ranges(&[0..1]))
            .is_err());
    }

    #[test]
    fn array_subset_relative_to() {
        let array_subset = ArraySubset::new_with_ranges(&[3..5, 4..5]);
        assert_eq!(
            array_subset.relative_to(&[3, 2]).unwrap(),
            ArraySubset::new_with_ranges(&[0..2, 2..3])
        );
        assert!(array_subset.relative_to(&[4, 0]).is_err());
        assert!(array_subset.relative_to(&[0]).is_err());
    }
}
