//! Array metadata.
//!
//! The metadata is stored in the chunk store header so that a persisted array can be reopened with [`Array::open`](super::Array::open).

use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::{ArrayShape, ChunkShape};

/// The metadata of an array.
///
/// An example `JSON` document:
/// ```json
/// {
///     "shape": [18, 12],
///     "element_size": 4,
///     "chunk_shape": [6, 6],
///     "block_shape": [3, 3]
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Display)]
#[serde(deny_unknown_fields)]
#[display("{}", serde_json::to_string(self).unwrap_or_default())]
pub struct ArrayMetadata {
    /// The array shape.
    pub shape: ArrayShape,
    /// The size in bytes of an element.
    pub element_size: usize,
    /// The chunk shape.
    pub chunk_shape: ChunkShape,
    /// The block shape.
    pub block_shape: ChunkShape,
}

impl TryFrom<&str> for ArrayMetadata {
    type Error = serde_json::Error;
    fn try_from(metadata_json: &str) -> Result<Self, Self::Error> {
        serde_json::from_str::<Self>(metadata_json)
    }
}
