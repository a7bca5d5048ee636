use crate::array_subset::IncompatibleDimensionalityError;

use super::{ArrayCreateError, ArrayShape, ChunkGrid, MAX_DIM};

/// The logical description of an array: its shape and element size.
///
/// Validated on creation and immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayParams {
    shape: ArrayShape,
    element_size: usize,
}

impl ArrayParams {
    /// Create array parameters for an array of `shape` with elements of `element_size` bytes.
    ///
    /// Zero-sized dimensions are permitted.
    ///
    /// # Errors
    /// Returns an [`ArrayCreateError`] if
    ///  - the dimensionality is zero or exceeds [`MAX_DIM`],
    ///  - `element_size` is zero, or
    ///  - the size in bytes of the array is not representable as a [`u64`].
    pub fn new(shape: ArrayShape, element_size: usize) -> Result<Self, ArrayCreateError> {
        if shape.is_empty() || shape.len() > MAX_DIM {
            return Err(ArrayCreateError::InvalidDimensionality(shape.len()));
        }
        if element_size == 0 {
            return Err(ArrayCreateError::ZeroElementSize);
        }
        if checked_size_bytes(&shape, element_size).is_none() {
            return Err(ArrayCreateError::SizeOverflow(shape, element_size));
        }
        Ok(Self {
            shape,
            element_size,
        })
    }

    /// Return the array shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the dimensionality.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.shape.len()
    }

    /// Return the size in bytes of an element.
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Return the number of elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Return the size in bytes of the array.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.num_elements() * self.element_size as u64
    }

    pub(crate) fn validate_chunk_grid(
        &self,
        chunk_grid: &ChunkGrid,
    ) -> Result<(), IncompatibleDimensionalityError> {
        if chunk_grid.dimensionality() == self.dimensionality() {
            Ok(())
        } else {
            Err(IncompatibleDimensionalityError::new(
                chunk_grid.dimensionality(),
                self.dimensionality(),
            ))
        }
    }
}

/// Return the size in bytes of an array with `shape` and `element_size`, or [`None`] if any partial product overflows.
pub(crate) fn checked_size_bytes(shape: &[u64], element_size: usize) -> Option<u64> {
    shape
        .iter()
        .try_fold(u64::try_from(element_size).ok()?, |size, &extent| {
            size.checked_mul(extent)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_params() {
        let params = ArrayParams::new(vec![10, 0, 3], 4).unwrap();
        assert_eq!(params.dimensionality(), 3);
        assert_eq!(params.num_elements(), 0);
        assert_eq!(ArrayParams::new(vec![5], 8).unwrap().size_bytes(), 40);
        assert!(matches!(
            ArrayParams::new(vec![], 1),
            Err(ArrayCreateError::InvalidDimensionality(0))
        ));
        assert!(matches!(
            ArrayParams::new(vec![1; MAX_DIM + 1], 1),
            Err(ArrayCreateError::InvalidDimensionality(_))
        ));
        assert!(matches!(
            ArrayParams::new(vec![1], 0),
            Err(ArrayCreateError::ZeroElementSize)
        ));
    }

    #[test]
    fn array_params_size_overflow() {
        let err = ArrayParams::new(vec![1 << 62, 8], 1).unwrap_err();
        assert!(matches!(err, ArrayCreateError::SizeOverflow(_, 1)));
        assert_eq!(err.kind(), crate::array::ArrayErrorKind::InvalidArgument);
        assert!(ArrayParams::new(vec![1 << 61, 4], 2).is_err());
        assert!(ArrayParams::new(vec![1 << 40, 1 << 40, 0], 1).is_err());
        assert!(ArrayParams::new(vec![1 << 60, 4], 4).is_err());
        assert_eq!(
            ArrayParams::new(vec![1 << 60, 3], 4).unwrap().size_bytes(),
            3 << 62
        );
    }
}
