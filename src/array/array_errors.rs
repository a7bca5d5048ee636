use std::collections::TryReserveError;

use derive_more::Display;
use thiserror::Error;

use crate::{
    array_subset::{ArraySubset, IncompatibleDimensionalityError},
    storage::StorageError,
};

use super::{
    chunk_grid::{ChunkGridCreateError, InvalidArrayIndicesError, InvalidChunkGridIndicesError},
    ArrayIndices, ArrayShape, MAX_DIM,
};

/// The category of an error.
///
/// Every error of this crate maps to one kind through its `kind()` method.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum ArrayErrorKind {
    /// An argument was rejected before anything was modified.
    #[display("invalid argument")]
    InvalidArgument,
    /// A coordinate or region lies outside the array.
    #[display("out of bounds")]
    OutOfBounds,
    /// A chunk does not exist.
    #[display("not found")]
    NotFound,
    /// The storage backend or the codec failed.
    #[display("i/o error")]
    IOError,
    /// A buffer could not be allocated.
    #[display("out of memory")]
    OutOfMemory,
}

/// An array creation error.
#[derive(Debug, Error)]
pub enum ArrayCreateError {
    /// The dimensionality is zero or exceeds [`MAX_DIM`].
    #[error("invalid dimensionality {0}, must be in 1..={}", MAX_DIM)]
    InvalidDimensionality(usize),
    /// The element size is zero.
    #[error("the element size must be non-zero")]
    ZeroElementSize,
    /// A chunk shape has a zero component.
    #[error("invalid chunk shape {0:?}, all components must be non-zero")]
    InvalidChunkShape(ArrayShape),
    /// A block shape has a zero component.
    #[error("invalid block shape {0:?}, all components must be non-zero")]
    InvalidBlockShape(ArrayShape),
    /// The chunk and block shapes are incompatible.
    #[error(transparent)]
    ChunkGridCreateError(#[from] ChunkGridCreateError),
    /// The storage dimensionality does not match the array dimensionality.
    #[error(transparent)]
    IncompatibleDimensionalityError(#[from] IncompatibleDimensionalityError),
    /// The size in bytes of the array overflows a [`u64`].
    #[error("array with shape {0:?} and element size {1} overflows the addressable size")]
    SizeOverflow(ArrayShape, usize),
    /// The fill value size does not match the element size.
    #[error("fill value has {0} bytes, expected {1} bytes")]
    InvalidFillValue(usize, usize),
    /// The input buffer size does not match the array size.
    #[error("input buffer has {0} bytes, expected {1} bytes")]
    InvalidBytesInputSize(usize, u64),
    /// A storage error.
    #[error(transparent)]
    StorageError(#[from] StorageError),
    /// The stored array metadata could not be (de)serialised.
    #[error(transparent)]
    MetadataError(#[from] serde_json::Error),
    /// The stored array metadata is inconsistent with the stored chunks.
    #[error("inconsistent store: {0}")]
    InconsistentStore(String),
    /// A buffer could not be allocated.
    #[error(transparent)]
    AllocationError(#[from] TryReserveError),
}

impl ArrayCreateError {
    /// Return the [`ArrayErrorKind`] of the error.
    #[must_use]
    pub fn kind(&self) -> ArrayErrorKind {
        match self {
            Self::StorageError(err) => err.kind(),
            Self::MetadataError(_) | Self::InconsistentStore(_) => ArrayErrorKind::IOError,
            Self::AllocationError(_) => ArrayErrorKind::OutOfMemory,
            Self::InvalidDimensionality(_)
            | Self::ZeroElementSize
            | Self::SizeOverflow(_, _)
            | Self::InvalidChunkShape(_)
            | Self::InvalidBlockShape(_)
            | Self::ChunkGridCreateError(_)
            | Self::IncompatibleDimensionalityError(_)
            | Self::InvalidFillValue(_, _)
            | Self::InvalidBytesInputSize(_, _) => ArrayErrorKind::InvalidArgument,
        }
    }
}

/// Array errors.
#[derive(Debug, Error)]
pub enum ArrayError {
    /// A storage error.
    #[error(transparent)]
    StorageError(#[from] StorageError),
    /// An argument has the wrong dimensionality.
    #[error(transparent)]
    IncompatibleDimensionalityError(#[from] IncompatibleDimensionalityError),
    /// A slice stop precedes its start.
    #[error("slice stop {1:?} precedes start {0:?}")]
    InvalidSliceBounds(ArrayIndices, ArrayIndices),
    /// An array subset extends beyond the array shape.
    #[error("array subset {0} is out of bounds of array shape {1:?}")]
    InvalidArraySubset(ArraySubset, ArrayShape),
    /// Invalid array indices.
    #[error(transparent)]
    InvalidArrayIndicesError(#[from] InvalidArrayIndicesError),
    /// Invalid chunk grid indices.
    #[error(transparent)]
    InvalidChunkGridIndicesError(#[from] InvalidChunkGridIndicesError),
    /// The buffer shape does not match the shape of the region.
    #[error("got buffer shape {0:?}, expected {1:?}")]
    UnexpectedBufferShape(ArrayShape, ArrayShape),
    /// A buffer is too small for the region.
    #[error("got {0} bytes, expected at least {1} bytes")]
    InvalidBytesInputSize(usize, u64),
    /// An axis is beyond the dimensionality of the array.
    #[error("invalid axis {0} for an array with {1} dimensions")]
    InvalidAxis(usize, usize),
    /// The appended bytes are not a whole number of cross-sections.
    #[error("appended {0} bytes is not a multiple of the {1} byte cross-section")]
    InvalidAppendBytes(usize, u64),
    /// Appending along an axis whose cross-section has no elements.
    #[error("cannot append along axis {0}, the cross-section has no elements")]
    EmptyAppendCrossSection(usize),
    /// Appending would overflow the array shape.
    #[error("appending {0} elements along axis {1} overflows the array shape")]
    ShapeOverflow(u64, usize),
    /// The size of an element type does not match the element size of the array.
    #[error("element type has size {0}, the array element size is {1}")]
    IncompatibleElementSize(usize, usize),
    /// The array metadata could not be serialised.
    #[error(transparent)]
    MetadataError(#[from] serde_json::Error),
    /// A buffer could not be allocated.
    #[error(transparent)]
    AllocationError(#[from] TryReserveError),
    /// An ndarray could not be created from the retrieved elements.
    #[cfg(feature = "ndarray")]
    #[error(transparent)]
    NdarrayShapeError(#[from] ndarray::ShapeError),
}

impl ArrayError {
    /// Return the [`ArrayErrorKind`] of the error.
    #[must_use]
    pub fn kind(&self) -> ArrayErrorKind {
        match self {
            Self::StorageError(err) => err.kind(),
            Self::InvalidArraySubset(_, _)
            | Self::InvalidArrayIndicesError(_)
            | Self::InvalidChunkGridIndicesError(_) => ArrayErrorKind::OutOfBounds,
            Self::MetadataError(_) => ArrayErrorKind::IOError,
            Self::AllocationError(_) => ArrayErrorKind::OutOfMemory,
            Self::IncompatibleDimensionalityError(_)
            | Self::InvalidSliceBounds(_, _)
            | Self::UnexpectedBufferShape(_, _)
            | Self::InvalidBytesInputSize(_, _)
            | Self::InvalidAxis(_, _)
            | Self::InvalidAppendBytes(_, _)
            | Self::EmptyAppendCrossSection(_)
            | Self::ShapeOverflow(_, _)
            | Self::IncompatibleElementSize(_, _) => ArrayErrorKind::InvalidArgument,
            #[cfg(feature = "ndarray")]
            Self::NdarrayShapeError(_) => ArrayErrorKind::InvalidArgument,
        }
    }
}
