use crate::array_subset::ArraySubset;

use super::{
    array_bytes::{extract_from_chunk, try_zeroed_bytes, RegionLayout},
    transmute_from_bytes_vec, validate_element_size, Array, ArrayError,
};

#[cfg(feature = "ndarray")]
use super::elements_to_ndarray;

impl Array {
    /// Read the region `[start, stop)` into `dest`, a row-major buffer of shape `dest_shape`.
    ///
    /// Only the chunks and blocks intersecting the region are loaded.
    /// A region with no elements succeeds without writing to `dest`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - `start`, `stop` or `dest_shape` do not match the array dimensionality,
    ///  - any component of `stop` precedes `start`,
    ///  - the region extends beyond the array shape,
    ///  - `dest_shape` is not the shape of the region,
    ///  - `dest` is smaller than the region, or
    ///  - a chunk cannot be loaded.
    pub fn get_slice(
        &self,
        start: &[u64],
        stop: &[u64],
        dest: &mut [u8],
        dest_shape: &[u64],
    ) -> Result<(), ArrayError> {
        let array_subset = self.slice_subset(start, stop, dest.len(), dest_shape)?;
        let len = self.subset_size_bytes(&array_subset);
        self.retrieve_array_subset_into_unchecked(&array_subset, &mut dest[..len])
    }

    /// Read and decode the `array_subset` of the array into its bytes.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - the dimensionality of `array_subset` does not match the array,
    ///  - `array_subset` extends beyond the array shape,
    ///  - the output cannot be allocated, or
    ///  - a chunk cannot be loaded.
    pub fn retrieve_array_subset(&self, array_subset: &ArraySubset) -> Result<Vec<u8>, ArrayError> {
        self.validate_array_subset(array_subset)?;
        let mut bytes = try_zeroed_bytes(self.subset_size_bytes(array_subset))?;
        self.retrieve_array_subset_into_unchecked(array_subset, &mut bytes)?;
        Ok(bytes)
    }

    /// Read and decode the `array_subset` of the array into `dest`, which must be exactly the size of the subset.
    ///
    /// # Errors
    /// See [`Array::retrieve_array_subset`].
    /// Also errors if `dest` is not the size of the subset.
    pub fn retrieve_array_subset_into(
        &self,
        array_subset: &ArraySubset,
        dest: &mut [u8],
    ) -> Result<(), ArrayError> {
        self.validate_array_subset(array_subset)?;
        let len = self.subset_size_bytes(array_subset);
        if dest.len() != len {
            return Err(ArrayError::InvalidBytesInputSize(dest.len(), len as u64));
        }
        self.retrieve_array_subset_into_unchecked(array_subset, dest)
    }

    /// Read and decode the `array_subset` of the array into a vector of its elements.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the size of `T` does not match the element size or an error condition in [`Array::retrieve_array_subset`].
    pub fn retrieve_array_subset_elements<T: bytemuck::Pod>(
        &self,
        array_subset: &ArraySubset,
    ) -> Result<Vec<T>, ArrayError> {
        validate_element_size::<T>(self.element_size())?;
        let bytes = self.retrieve_array_subset(array_subset)?;
        Ok(transmute_from_bytes_vec::<T>(bytes))
    }

    #[cfg(feature = "ndarray")]
    /// Read and decode the `array_subset` of the array into an [`ndarray::ArrayD`].
    ///
    /// # Errors
    /// See [`Array::retrieve_array_subset_elements`].
    ///
    /// # Panics
    /// Will panic if any dimension in `array_subset` is `usize::MAX` or larger.
    pub fn retrieve_array_subset_ndarray<T: bytemuck::Pod>(
        &self,
        array_subset: &ArraySubset,
    ) -> Result<ndarray::ArrayD<T>, ArrayError> {
        let elements = self.retrieve_array_subset_elements::<T>(array_subset)?;
        elements_to_ndarray(array_subset.shape(), elements)
    }

    /// Read and decode the chunk at `chunk_indices` into the bytes of its valid footprint.
    ///
    /// The output is row-major over the [chunk extent](super::ChunkGrid::chunk_extent), which is smaller than the chunk shape for a ragged chunk.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `chunk_indices` are invalid or the chunk cannot be loaded.
    pub fn retrieve_chunk(&self, chunk_indices: &[u64]) -> Result<Vec<u8>, ArrayError> {
        let chunk_subset = self.chunk_subset_bounded(chunk_indices)?;
        self.retrieve_array_subset(&chunk_subset)
    }

    /// Read and decode the chunk at `chunk_indices` into a vector of its elements.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the size of `T` does not match the element size or an error condition in [`Array::retrieve_chunk`].
    pub fn retrieve_chunk_elements<T: bytemuck::Pod>(
        &self,
        chunk_indices: &[u64],
    ) -> Result<Vec<T>, ArrayError> {
        validate_element_size::<T>(self.element_size())?;
        let bytes = self.retrieve_chunk(chunk_indices)?;
        Ok(transmute_from_bytes_vec::<T>(bytes))
    }

    /// Copy `array_subset` into `dest`, a buffer of exactly the subset.
    ///
    /// Chunks are visited in row-major chunk order and decoded into one scratch buffer.
    fn retrieve_array_subset_into_unchecked(
        &self,
        array_subset: &ArraySubset,
        dest: &mut [u8],
    ) -> Result<(), ArrayError> {
        if array_subset.is_empty() {
            return Ok(());
        }
        let grid_shape = self.chunk_grid_shape();
        let mut chunk = try_zeroed_bytes(self.chunk_size_bytes())?;
        for (chunk_indices, chunk_subset) in array_subset.iter_chunks(self.chunk_shape())? {
            let chunk_id = super::ravel_indices(&chunk_indices, &grid_shape);
            let overlap = array_subset.overlap_unchecked(&chunk_subset);
            log::trace!("reading {overlap} from chunk {chunk_id}");
            self.store.load_chunk(chunk_id, &mut chunk)?;
            let dest_start = overlap.relative_to_unchecked(array_subset.start());
            extract_from_chunk(
                &self.chunk_grid,
                &chunk,
                &overlap.relative_to_unchecked(chunk_subset.start()),
                dest,
                RegionLayout {
                    shape: array_subset.shape(),
                    start: dest_start.start(),
                },
                self.element_size,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        array::{ArrayErrorKind, ArrayParams, Compressor, FillValue, StorageSpec},
        storage::StorageBackend,
    };

    use super::*;

    fn array_sequential() -> Array {
        // 7x5 u16 elements, 3x2 chunks, 2x2 blocks
        let params = ArrayParams::new(vec![7, 5], 2).unwrap();
        let mut storage = StorageSpec::new(vec![3, 2], vec![2, 2], StorageBackend::Memory).unwrap();
        storage.set_compressor(Compressor::None).set_num_threads(2);
        let elements: Vec<u16> = (0..35).collect();
        Array::new_from_bytes(&params, &storage, bytemuck::cast_slice(&elements)).unwrap()
    }

    #[test]
    fn array_get_slice() -> Result<(), Box<dyn std::error::Error>> {
        let array = array_sequential();
        let mut dest = vec![0u8; 2 * 3 * 2];
        array.get_slice(&[2, 1], &[5, 3], &mut dest, &[3, 2])?;
        let elements: Vec<u16> = bytemuck::pod_collect_to_vec(&dest);
        assert_eq!(elements, [11, 12, 16, 17, 21, 22]);

        // idempotent
        let mut again = vec![0u8; dest.len()];
        array.get_slice(&[2, 1], &[5, 3], &mut again, &[3, 2])?;
        assert_eq!(dest, again);

        // a larger destination is permitted, the tail is untouched
        let mut dest = vec![0xFFu8; 6];
        array.get_slice(&[6, 4], &[7, 5], &mut dest, &[1, 1])?;
        assert_eq!(&dest[..2], 34u16.to_ne_bytes());
        assert_eq!(&dest[2..], [0xFF; 4]);
        Ok(())
    }

    #[test]
    fn array_get_slice_empty() -> Result<(), Box<dyn std::error::Error>> {
        let array = array_sequential();
        let mut dest = vec![0xAAu8; 4];
        array.get_slice(&[3, 0], &[3, 5], &mut dest, &[0, 5])?;
        assert_eq!(dest, [0xAA; 4]);
        array.get_slice(&[7, 5], &[7, 5], &mut [], &[0, 0])?;
        Ok(())
    }

    #[test]
    fn array_get_slice_invalid() {
        let array = array_sequential();
        let mut dest = vec![0u8; 100];
        let kind = |result: Result<(), ArrayError>| result.unwrap_err().kind();
        assert_eq!(
            kind(array.get_slice(&[0], &[1], &mut dest, &[1])),
            ArrayErrorKind::InvalidArgument
        );
        assert_eq!(
            kind(array.get_slice(&[2, 0], &[1, 1], &mut dest, &[1, 1])),
            ArrayErrorKind::InvalidArgument
        );
        assert_eq!(
            kind(array.get_slice(&[0, 0], &[8, 1], &mut dest, &[8, 1])),
            ArrayErrorKind::OutOfBounds
        );
        assert_eq!(
            kind(array.get_slice(&[0, 0], &[2, 2], &mut dest, &[4, 1])),
            ArrayErrorKind::InvalidArgument
        );
        assert_eq!(
            kind(array.get_slice(&[0, 0], &[2, 2], &mut dest[..7], &[2, 2])),
            ArrayErrorKind::InvalidArgument
        );
    }

    #[test]
    fn array_retrieve() -> Result<(), Box<dyn std::error::Error>> {
        let array = array_sequential();
        let subset = ArraySubset::new_with_ranges(&[5..7, 3..5]);
        assert_eq!(
            array.retrieve_array_subset_elements::<u16>(&subset)?,
            [28, 29, 33, 34]
        );
        assert!(array.retrieve_array_subset_elements::<u32>(&subset).is_err());
        assert!(array
            .retrieve_array_subset(&ArraySubset::new_with_ranges(&[5..8, 3..5]))
            .is_err());

        let mut dest = vec![0u8; 8];
        array.retrieve_array_subset_into(&subset, &mut dest)?;
        assert_eq!(bytemuck::pod_collect_to_vec::<u8, u16>(&dest), [28, 29, 33, 34]);
        assert!(array
            .retrieve_array_subset_into(&subset, &mut dest[..6])
            .is_err());

        // ragged chunk
        assert_eq!(array.retrieve_chunk_elements::<u16>(&[2, 2])?, [34]);
        assert_eq!(
            array.retrieve_chunk_elements::<u16>(&[0, 1])?,
            [2, 3, 7, 8, 12, 13]
        );
        assert_eq!(
            array.retrieve_chunk(&[3, 0]).unwrap_err().kind(),
            ArrayErrorKind::OutOfBounds
        );
        Ok(())
    }

    #[cfg(feature = "ndarray")]
    #[test]
    fn array_retrieve_ndarray() -> Result<(), Box<dyn std::error::Error>> {
        let array = array_sequential();
        let subset = ArraySubset::new_with_ranges(&[0..2, 0..3]);
        let elements = array.retrieve_array_subset_ndarray::<u16>(&subset)?;
        assert_eq!(elements, ndarray::array![[0, 1, 2], [5, 6, 7]].into_dyn());
        Ok(())
    }

    #[test]
    fn array_new_full_read() -> Result<(), Box<dyn std::error::Error>> {
        let params = ArrayParams::new(vec![4, 4, 4], 8)?;
        let storage = StorageSpec::new(vec![3, 3, 3], vec![2, 2, 2], StorageBackend::Memory)?;
        let array = Array::new_full(&params, &storage, &FillValue::from(1.5f64))?;
        let elements = array.retrieve_array_subset_elements::<f64>(&array.subset_all())?;
        assert_eq!(elements, vec![1.5; 64]);
        Ok(())
    }
}
