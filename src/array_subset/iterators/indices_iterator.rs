use std::iter::FusedIterator;

use itertools::izip;

use crate::{array::ArrayIndices, array_subset::ArraySubset};

/// Iterates over element indices in an array subset.
///
/// Indices are visited in row-major order (the last dimension varies fastest).
pub struct IndicesIterator {
    subset: ArraySubset,
    index: u64,
    num_elements: u64,
}

impl IndicesIterator {
    /// Create a new indices iterator.
    #[must_use]
    pub fn new(subset: ArraySubset) -> Self {
        let num_elements = subset.num_elements();
        Self {
            subset,
            index: 0,
            num_elements,
        }
    }
}

impl Iterator for IndicesIterator {
    type Item = ArrayIndices;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.num_elements {
            return None;
        }
        let mut current = self.index;
        let mut indices = vec![0; self.subset.dimensionality()];
        for (out, &subset_start, &subset_size) in izip!(
            indices.iter_mut().rev(),
            self.subset.start().iter().rev(),
            self.subset.shape().iter().rev(),
        ) {
            *out = current % subset_size + subset_start;
            current /= subset_size;
        }
        self.index += 1;
        Some(indices)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.num_elements - self.index).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for IndicesIterator {}

impl FusedIterator for IndicesIterator {}
