use crate::array_subset::ArraySubset;

use super::{
    array_bytes::{try_zeroed_bytes, update_chunk, RegionLayout},
    ravel_indices, transmute_to_bytes, validate_element_size, Array, ArrayError,
};

impl Array {
    /// Write `src`, a row-major buffer of shape `src_shape`, to the region `[start, stop)`.
    ///
    /// Every chunk intersecting the region is loaded, merged and stored again, except chunks covered entirely by the region which are not loaded.
    /// All modified chunks are committed together: on error the array is unchanged.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - `start`, `stop` or `src_shape` do not match the array dimensionality,
    ///  - any component of `stop` precedes `start`,
    ///  - the region extends beyond the array shape,
    ///  - `src_shape` is not the shape of the region,
    ///  - `src` is smaller than the region, or
    ///  - a chunk cannot be loaded or stored.
    pub fn set_slice(
        &mut self,
        start: &[u64],
        stop: &[u64],
        src: &[u8],
        src_shape: &[u64],
    ) -> Result<(), ArrayError> {
        let array_subset = self.slice_subset(start, stop, src.len(), src_shape)?;
        let len = self.subset_size_bytes(&array_subset);
        self.store_array_subset_unchecked(&array_subset, &src[..len])
    }

    /// Encode `subset_bytes` and store in `array_subset`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - the dimensionality of `array_subset` does not match the array,
    ///  - `array_subset` extends beyond the array shape,
    ///  - the length of `subset_bytes` does not match the size of `array_subset`, or
    ///  - a chunk cannot be loaded or stored.
    pub fn store_array_subset(
        &mut self,
        array_subset: &ArraySubset,
        subset_bytes: &[u8],
    ) -> Result<(), ArrayError> {
        self.validate_array_subset(array_subset)?;
        let len = self.subset_size_bytes(array_subset);
        if subset_bytes.len() != len {
            return Err(ArrayError::InvalidBytesInputSize(
                subset_bytes.len(),
                len as u64,
            ));
        }
        self.store_array_subset_unchecked(array_subset, subset_bytes)
    }

    /// Encode `subset_elements` and store in `array_subset`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the size of `T` does not match the element size or an error condition in [`Array::store_array_subset`].
    pub fn store_array_subset_elements<T: bytemuck::Pod>(
        &mut self,
        array_subset: &ArraySubset,
        subset_elements: &[T],
    ) -> Result<(), ArrayError> {
        validate_element_size::<T>(self.element_size())?;
        self.store_array_subset(array_subset, transmute_to_bytes(subset_elements))
    }

    #[cfg(feature = "ndarray")]
    /// Encode `subset_array` and store in the array subset starting at `subset_start`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the size of `T` does not match the element size or an error condition in [`Array::store_array_subset`].
    pub fn store_array_subset_ndarray<T: bytemuck::Pod>(
        &mut self,
        subset_start: &[u64],
        subset_array: ndarray::ArrayViewD<T>,
    ) -> Result<(), ArrayError> {
        let subset_shape: Vec<u64> = subset_array.shape().iter().map(|&s| s as u64).collect();
        if subset_shape.len() != subset_start.len() {
            return Err(crate::array_subset::IncompatibleDimensionalityError::new(
                subset_start.len(),
                subset_shape.len(),
            )
            .into());
        }
        let array_subset = ArraySubset::new_with_ranges(
            &std::iter::zip(subset_start, &subset_shape)
                .map(|(&start, &size)| start..start + size)
                .collect::<Vec<_>>(),
        );
        let elements: Vec<T> = subset_array.iter().copied().collect();
        self.store_array_subset_elements(&array_subset, &elements)
    }

    /// Store `chunk_bytes`, the row-major bytes of the valid footprint of the chunk at `chunk_indices`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `chunk_indices` are invalid or an error condition in [`Array::store_array_subset`].
    pub fn store_chunk(
        &mut self,
        chunk_indices: &[u64],
        chunk_bytes: &[u8],
    ) -> Result<(), ArrayError> {
        let chunk_subset = self.chunk_subset_bounded(chunk_indices)?;
        self.store_array_subset(&chunk_subset, chunk_bytes)
    }

    /// Store `src`, a buffer of exactly `array_subset`, in one transaction.
    fn store_array_subset_unchecked(
        &mut self,
        array_subset: &ArraySubset,
        src: &[u8],
    ) -> Result<(), ArrayError> {
        if array_subset.is_empty() {
            return Ok(());
        }
        let grid_shape = self.chunk_grid_shape();
        let mut chunk = try_zeroed_bytes(self.chunk_size_bytes())?;
        let chunks = array_subset.iter_chunks(self.chunk_shape())?;

        let chunk_grid = &self.chunk_grid;
        let shape = &self.shape;
        let element_size = self.element_size;
        let mut transaction = self.store.transaction();
        for (chunk_indices, chunk_subset) in chunks {
            let chunk_id = ravel_indices(&chunk_indices, &grid_shape);
            let overlap = array_subset.overlap_unchecked(&chunk_subset);
            if chunk_grid.chunk_subset_bounded(&chunk_indices, shape).as_ref() == Some(&overlap) {
                log::trace!("overwriting chunk {chunk_id}");
                chunk.fill(0);
            } else {
                log::trace!("writing {overlap} to chunk {chunk_id}");
                transaction.load_chunk(chunk_id, &mut chunk)?;
            }
            let src_start = overlap.relative_to_unchecked(array_subset.start());
            update_chunk(
                chunk_grid,
                &mut chunk,
                &overlap.relative_to_unchecked(chunk_subset.start()),
                src,
                RegionLayout {
                    shape: array_subset.shape(),
                    start: src_start.start(),
                },
                element_size,
            );
            transaction.rewrite_chunk(chunk_id, &chunk)?;
        }
        transaction.commit(None)?;
        Ok(())
    }
}
