//! Array growth.
//!
//! Appending along an axis happens in two steps staged in one transaction:
//!  1. [`Growth::merge_into_tail`] writes the leading part of the new data into the spare space of the tail chunks along the axis, and
//!  2. [`Growth::allocate_chunks`] stores the remainder in new chunks, inserted at their linear ids in the grown chunk grid.
//!
//! The array shape changes only once the transaction is committed.

use crate::array_subset::ArraySubset;

use super::{
    array_bytes::{try_zeroed_bytes, update_chunk, RegionLayout},
    array_params::checked_size_bytes,
    chunk_store::ChunkStoreTransaction,
    ravel_indices, transmute_to_bytes, validate_element_size, Array, ArrayError, ArrayMetadata,
    ArrayShape, ChunkGrid,
};

impl Array {
    /// Append `bytes` along `axis`.
    ///
    /// `bytes` is a row-major buffer with the array shape, except along `axis` where its extent is the number of appended elements.
    /// That extent is inferred from the length of `bytes`, and appending zero elements is a no-op.
    ///
    /// On error the array is unchanged.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if
    ///  - `axis` is not less than the array dimensionality,
    ///  - the cross-section perpendicular to `axis` has no elements,
    ///  - the length of `bytes` is not a multiple of the cross-section size in bytes,
    ///  - the cross-section or the grown array overflows the addressable size, or
    ///  - a chunk cannot be loaded or stored.
    pub fn append(&mut self, bytes: &[u8], axis: usize) -> Result<(), ArrayError> {
        let dimensionality = self.dimensionality();
        if axis >= dimensionality {
            return Err(ArrayError::InvalidAxis(axis, dimensionality));
        }
        let mut cross_section_shape = self.shape.clone();
        cross_section_shape[axis] = 1;
        let cross_section = checked_size_bytes(&cross_section_shape, self.element_size)
            .ok_or(ArrayError::ShapeOverflow(1, axis))?;
        if cross_section == 0 {
            return Err(ArrayError::EmptyAppendCrossSection(axis));
        }
        if bytes.len() as u64 % cross_section != 0 {
            return Err(ArrayError::InvalidAppendBytes(bytes.len(), cross_section));
        }
        let grow_len = bytes.len() as u64 / cross_section;
        if grow_len == 0 {
            return Ok(());
        }
        let extent = self.shape[axis]
            .checked_add(grow_len)
            .ok_or(ArrayError::ShapeOverflow(grow_len, axis))?;
        let mut shape = self.shape.clone();
        shape[axis] = extent;
        if checked_size_bytes(&shape, self.element_size).is_none() {
            return Err(ArrayError::ShapeOverflow(grow_len, axis));
        }
        let metadata = serde_json::to_value(ArrayMetadata {
            shape: shape.clone(),
            element_size: self.element_size,
            chunk_shape: self.chunk_grid.chunk_shape().clone(),
            block_shape: self.chunk_grid.block_shape().clone(),
        })?;

        let growth = Growth {
            chunk_grid: &self.chunk_grid,
            element_size: self.element_size,
            shape_old: &self.shape,
            shape_new: &shape,
            axis,
            bytes,
        };
        let mut transaction = self.store.transaction();
        let merged = growth.merge_into_tail(&mut transaction)?;
        let allocated = growth.allocate_chunks(&mut transaction, merged)?;
        transaction.commit(Some(metadata))?;
        log::debug!(
            "appended {grow_len} elements along axis {axis} ({merged} merged, {allocated} new chunks), shape {:?} -> {shape:?}",
            self.shape
        );
        self.shape = shape;
        Ok(())
    }

    /// Append `elements` along `axis`.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the size of `T` does not match the element size or an error condition in [`Array::append`].
    pub fn append_elements<T: bytemuck::Pod>(
        &mut self,
        elements: &[T],
        axis: usize,
    ) -> Result<(), ArrayError> {
        validate_element_size::<T>(self.element_size())?;
        self.append(transmute_to_bytes(elements), axis)
    }
}

/// The growth of an array along one axis.
struct Growth<'a> {
    chunk_grid: &'a ChunkGrid,
    element_size: usize,
    shape_old: &'a [u64],
    shape_new: &'a [u64],
    axis: usize,
    /// Row-major over `shape_old` with the `axis` extent replaced by the growth.
    bytes: &'a [u8],
}

impl Growth<'_> {
    fn grow_len(&self) -> u64 {
        self.shape_new[self.axis] - self.shape_old[self.axis]
    }

    fn bytes_shape(&self) -> ArrayShape {
        let mut shape = self.shape_old.to_vec();
        shape[self.axis] = self.grow_len();
        shape
    }

    /// Copy the part of the appended bytes within `region` (array coordinates) into `chunk`.
    fn copy_into_chunk(&self, chunk: &mut [u8], chunk_origin: &[u64], region: &ArraySubset) {
        let bytes_shape = self.bytes_shape();
        let mut bytes_start = region.start().to_vec();
        bytes_start[self.axis] -= self.shape_old[self.axis];
        update_chunk(
            self.chunk_grid,
            chunk,
            &region.relative_to_unchecked(chunk_origin),
            self.bytes,
            RegionLayout {
                shape: &bytes_shape,
                start: &bytes_start,
            },
            self.element_size,
        );
    }

    /// Merge the leading appended elements into the spare space of the tail chunks along the axis.
    ///
    /// Returns the number of merged elements along the axis.
    fn merge_into_tail(&self, transaction: &mut ChunkStoreTransaction) -> Result<u64, ArrayError> {
        let chunk_size = self.chunk_grid.chunk_shape()[self.axis].get();
        let extent_old = self.shape_old[self.axis];
        let used = extent_old % chunk_size;
        if used == 0 {
            return Ok(0);
        }
        let merged = (chunk_size - used).min(self.grow_len());

        let grid_shape_old = self.chunk_grid.grid_shape(self.shape_old);
        let mut tail_start = vec![0; grid_shape_old.len()];
        tail_start[self.axis] = extent_old / chunk_size;
        let mut tail_shape = grid_shape_old.clone();
        tail_shape[self.axis] = 1;
        let tail_chunks = ArraySubset::new_with_start_shape(tail_start, tail_shape)?;

        let merge_region = self.merge_region(merged);
        let mut chunk = try_zeroed_bytes(transaction.chunk_size())?;
        for chunk_indices in tail_chunks.iter_indices() {
            // ids of the old grid, the staged index is not yet grown
            let chunk_id = ravel_indices(&chunk_indices, &grid_shape_old);
            let chunk_subset = self.chunk_grid.chunk_subset(&chunk_indices);
            let region = chunk_subset.overlap_unchecked(&merge_region);
            log::trace!("merging {region} into tail chunk {chunk_id}");
            transaction.load_chunk(chunk_id, &mut chunk)?;
            self.copy_into_chunk(&mut chunk, chunk_subset.start(), &region);
            transaction.rewrite_chunk(chunk_id, &chunk)?;
        }
        Ok(merged)
    }

    /// The region of the grown array receiving the first `merged` appended elements along the axis.
    fn merge_region(&self, merged: u64) -> ArraySubset {
        let ranges: Vec<_> = self
            .shape_old
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                if i == self.axis {
                    size..size + merged
                } else {
                    0..size
                }
            })
            .collect();
        ArraySubset::new_with_ranges(&ranges)
    }

    /// Store the appended elements beyond the first `merged` in new chunks.
    ///
    /// New chunks span the full extent of every other axis and are inserted in ascending order of their linear id in the grown grid.
    /// Returns the number of new chunks.
    fn allocate_chunks(
        &self,
        transaction: &mut ChunkStoreTransaction,
        merged: u64,
    ) -> Result<u64, ArrayError> {
        if merged == self.grow_len() {
            return Ok(0);
        }
        let grid_shape_old = self.chunk_grid.grid_shape(self.shape_old);
        let grid_shape_new = self.chunk_grid.grid_shape(self.shape_new);
        let mut new_start = vec![0; grid_shape_new.len()];
        new_start[self.axis] = grid_shape_old[self.axis];
        let mut new_shape = grid_shape_new.clone();
        new_shape[self.axis] = grid_shape_new[self.axis] - grid_shape_old[self.axis];
        let new_chunks = ArraySubset::new_with_start_shape(new_start, new_shape)?;

        let mut chunk = try_zeroed_bytes(transaction.chunk_size())?;
        let mut allocated = 0;
        for chunk_indices in new_chunks.iter_indices() {
            let chunk_id = ravel_indices(&chunk_indices, &grid_shape_new);
            let Some(region) = self
                .chunk_grid
                .chunk_subset_bounded(&chunk_indices, self.shape_new)
            else {
                continue;
            };
            log::trace!("allocating chunk {chunk_id} for {region}");
            chunk.fill(0);
            self.copy_into_chunk(
                &mut chunk,
                &self.chunk_grid.chunk_origin(&chunk_indices),
                &region,
            );
            transaction.insert_chunk(chunk_id, &chunk)?;
            allocated += 1;
        }
        Ok(allocated)
    }
}
