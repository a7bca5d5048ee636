//! A rust library for chunked, block-compressed N-dimensional arrays.
//!
//! An array is described logically by its shape and element size, and is partitioned into fixed-size rectangular chunks.
//! Each chunk is further partitioned into blocks, the unit of compression.
//! Reading and writing arbitrary hyperrectangular regions touches only the chunks and blocks intersecting them, and the whole array is never materialised.
//!
//! ## Getting Started
//! [`array::Array`] and [`storage`] are good places to start.
//!
//! ## Example
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use ndchunk::array::{Array, ArrayParams, FillValue, StorageSpec};
//! use ndchunk::storage::StorageBackend;
//!
//! # let dir = tempfile::TempDir::new()?;
//! # let path = dir.path().join("array.ndc");
//! let params = ArrayParams::new(vec![5], 1)?; // shape, element size
//! let mut storage = StorageSpec::new(vec![3], vec![2], StorageBackend::ContiguousFile(path.clone()))?;
//! storage.set_remove_existing(true);
//! let mut array = Array::new_full(&params, &storage, &FillValue::from(1u8))?;
//!
//! let appended: Vec<u8> = (10..20).collect();
//! array.append(&appended, 0)?;
//!
//! let mut slice = vec![0u8; 10];
//! array.get_slice(&[5], &[15], &mut slice, &[10])?;
//! assert_eq!(slice, appended);
//! array.free()?;
//!
//! let array = Array::open(&StorageBackend::ContiguousFile(path))?;
//! assert_eq!(array.shape(), &[15]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Features
//! #### Default
//!  - `ndarray`: [`ndarray`] utility functions for [`Array`](crate::array::Array).
//!  - Compressors: `gzip`, `zstd`.
//!  - `crc32c`: checksums of encoded chunks.
//!
//! ## Logging
//! The [`log`] facade is used throughout: creation, opening and closing of stores and arrays at `debug`, per chunk operations at `trace`.
//! Storage calls can be traced with a [`UsageLogStorageAdapter`](crate::storage::storage_adapter::UsageLogStorageAdapter).
//!
//! ## Licence
//! `ndchunk` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
// #![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod array;
pub mod array_subset;
pub mod config;
pub mod storage;

/// Re-export [`bytemuck`].
pub use bytemuck;

#[cfg(feature = "ndarray")]
/// Re-export [`ndarray`].
pub use ndarray;
