//! Byte copies between row-major buffers and block-major chunks.

use std::collections::TryReserveError;

use crate::array_subset::ArraySubset;

use super::ChunkGrid;

/// Allocate `len` zeroed bytes, reporting allocation failure instead of aborting.
pub(crate) fn try_zeroed_bytes(len: usize) -> Result<Vec<u8>, TryReserveError> {
    let mut bytes = Vec::new();
    bytes.try_reserve_exact(len)?;
    bytes.resize(len, 0);
    Ok(bytes)
}

/// A row-major buffer layout: the buffer shape and the start of a region within it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RegionLayout<'a> {
    pub shape: &'a [u64],
    pub start: &'a [u64],
}

impl RegionLayout<'_> {
    /// The element offset of `indices` (relative to the region start) in the buffer.
    fn offset(&self, indices: &[u64]) -> u64 {
        let mut offset = 0;
        let mut stride = 1;
        for (dim, &size) in self.shape.iter().enumerate().rev() {
            let index = self.start[dim] + indices.get(dim).copied().unwrap_or_default();
            offset += index * stride;
            stride *= size;
        }
        offset
    }
}

/// Copy a region of `region_shape` elements from `src` to `dst`.
///
/// Trailing dimensions spanned fully by the region in both buffers are merged into one contiguous run.
pub(crate) fn copy_region(
    src: &[u8],
    src_layout: RegionLayout,
    dst: &mut [u8],
    dst_layout: RegionLayout,
    region_shape: &[u64],
    element_size: usize,
) {
    if region_shape.iter().any(|&size| size == 0) {
        return;
    }
    // the region is contiguous from dimension `split` onwards
    let mut split = region_shape.len();
    while split > 0 {
        split -= 1;
        let size = region_shape[split];
        if size != src_layout.shape[split] || size != dst_layout.shape[split] {
            break;
        }
    }
    let run = region_shape[split..].iter().product::<u64>() as usize * element_size;

    let mut copy_run = |outer: &[u64]| {
        let src_offset = src_layout.offset(outer) as usize * element_size;
        let dst_offset = dst_layout.offset(outer) as usize * element_size;
        dst[dst_offset..dst_offset + run].copy_from_slice(&src[src_offset..src_offset + run]);
    };
    if split == 0 {
        copy_run(&[]);
    } else {
        ArraySubset::new_with_shape(region_shape[..split].to_vec())
            .iter_indices()
            .for_each(|outer| copy_run(&outer));
    }
}

/// Copy the region `chunk_region` (chunk-local) of a block-major raw chunk to `dst`.
///
/// The region lands in `dst` at `dst_layout.start`.
pub(crate) fn extract_from_chunk(
    chunk_grid: &ChunkGrid,
    chunk: &[u8],
    chunk_region: &ArraySubset,
    dst: &mut [u8],
    dst_layout: RegionLayout,
    element_size: usize,
) {
    let block_shape = chunk_grid.block_shape().to_array_shape();
    let block_size = chunk_grid.block_num_elements() as usize * element_size;
    for_each_block_overlap(chunk_grid, chunk_region, |overlap, dst_start| {
        let block_offset = overlap.block_id as usize * block_size;
        let dst_start: Vec<u64> = std::iter::zip(dst_start, dst_layout.start)
            .map(|(a, b)| a + b)
            .collect();
        copy_region(
            &chunk[block_offset..block_offset + block_size],
            RegionLayout {
                shape: &block_shape,
                start: overlap.block_subset.start(),
            },
            dst,
            RegionLayout {
                shape: dst_layout.shape,
                start: &dst_start,
            },
            overlap.block_subset.shape(),
            element_size,
        );
    });
}

/// Copy from `src` into the region `chunk_region` (chunk-local) of a block-major raw chunk.
///
/// The region is read from `src` at `src_layout.start`.
pub(crate) fn update_chunk(
    chunk_grid: &ChunkGrid,
    chunk: &mut [u8],
    chunk_region: &ArraySubset,
    src: &[u8],
    src_layout: RegionLayout,
    element_size: usize,
) {
    let block_shape = chunk_grid.block_shape().to_array_shape();
    let block_size = chunk_grid.block_num_elements() as usize * element_size;
    for_each_block_overlap(chunk_grid, chunk_region, |overlap, src_start| {
        let block_offset = overlap.block_id as usize * block_size;
        let src_start: Vec<u64> = std::iter::zip(src_start, src_layout.start)
            .map(|(a, b)| a + b)
            .collect();
        copy_region(
            src,
            RegionLayout {
                shape: src_layout.shape,
                start: &src_start,
            },
            &mut chunk[block_offset..block_offset + block_size],
            RegionLayout {
                shape: &block_shape,
                start: overlap.block_subset.start(),
            },
            overlap.block_subset.shape(),
            element_size,
        );
    });
}

/// Visit every block overlapping `chunk_region` with the offset of the overlap relative to the region start.
fn for_each_block_overlap(
    chunk_grid: &ChunkGrid,
    chunk_region: &ArraySubset,
    mut f: impl FnMut(&super::chunk_grid::BlockOverlap, &[u64]),
) {
    if chunk_region.is_empty() {
        return;
    }
    let Ok(overlaps) = chunk_grid.iter_block_overlaps(chunk_region) else {
        return;
    };
    for overlap in overlaps {
        let relative: Vec<u64> = std::iter::zip(overlap.chunk_subset.start(), chunk_region.start())
            .map(|(a, b)| a - b)
            .collect();
        f(&overlap, &relative);
    }
}
