use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ArrayShape;

/// The shape of a chunk or a block. All dimensions must be non-zero.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash, Debug)]
#[serde(try_from = "ArrayShape", into = "ArrayShape")]
pub struct ChunkShape(Vec<NonZeroU64>);

/// A zero was found where a non-zero value was expected.
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("value must be non-zero")]
pub struct NonZeroError;

impl ChunkShape {
    /// Return the number of elements.
    ///
    /// Equal to the product of the components of its shape.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.0.iter().copied().map(NonZeroU64::get).product::<u64>()
    }

    /// Return the number of elements as a usize.
    ///
    /// # Panics
    /// Panics if the number of elements exceeds [`usize::MAX`].
    #[must_use]
    pub fn num_elements_usize(&self) -> usize {
        usize::try_from(self.num_elements()).unwrap()
    }

    /// Return the chunk shape as an [`ArrayShape`].
    #[must_use]
    pub fn to_array_shape(&self) -> ArrayShape {
        chunk_shape_to_array_shape(&self.0)
    }
}

impl From<ChunkShape> for Vec<NonZeroU64> {
    fn from(val: ChunkShape) -> Self {
        val.0
    }
}

impl From<ChunkShape> for ArrayShape {
    fn from(val: ChunkShape) -> Self {
        val.to_array_shape()
    }
}

impl std::ops::Deref for ChunkShape {
    type Target = [NonZeroU64];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<NonZeroU64>> for ChunkShape {
    fn from(value: Vec<NonZeroU64>) -> Self {
        ChunkShape(value)
    }
}

macro_rules! try_from_chunkshape {
    ( $t:ty ) => {
        impl TryFrom<$t> for ChunkShape {
            type Error = NonZeroError;
            fn try_from(value: $t) -> Result<Self, Self::Error> {
                value
                    .iter()
                    .map(|&i| NonZeroU64::new(i).ok_or(NonZeroError))
                    .collect::<Result<_, _>>()
                    .map(ChunkShape)
            }
        }
    };
    ( $t:ty, $g:ident ) => {
        impl<const $g: usize> TryFrom<$t> for ChunkShape {
            type Error = NonZeroError;
            fn try_from(value: $t) -> Result<Self, Self::Error> {
                value
                    .iter()
                    .map(|&i| NonZeroU64::new(i).ok_or(NonZeroError))
                    .collect::<Result<_, _>>()
                    .map(ChunkShape)
            }
        }
    };
}

try_from_chunkshape!(Vec<u64>);
try_from_chunkshape!(&[u64]);
try_from_chunkshape!([u64; N], N);
try_from_chunkshape!(&[u64; N], N);

/// Convert a chunk shape to an [`ArrayShape`].
#[must_use]
pub fn chunk_shape_to_array_shape(chunk_shape: &[NonZeroU64]) -> ArrayShape {
    chunk_shape.iter().map(|i| i.get()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_shape() {
        let chunk_shape: ChunkShape = [2, 3, 4].try_into().unwrap();
        assert_eq!(chunk_shape.len(), 3);
        assert_eq!(chunk_shape.num_elements(), 24);
        assert_eq!(chunk_shape.to_array_shape(), vec![2, 3, 4]);
        assert_eq!(ChunkShape::try_from(vec![2, 0]), Err(NonZeroError));
    }

    #[test]
    fn chunk_shape_serde() {
        let chunk_shape: ChunkShape = vec![6, 6].try_into().unwrap();
        let json = serde_json::to_string(&chunk_shape).unwrap();
        assert_eq!(json, "[6,6]");
        assert_eq!(serde_json::from_str::<ChunkShape>(&json).unwrap(), chunk_shape);
        assert!(serde_json::from_str::<ChunkShape>("[6,0]").is_err());
    }
}
