//! The block codec.
//!
//! A raw chunk is a sequence of equally sized blocks.
//! The [`BlockCodec`] encodes every block independently, concurrently on a fixed pool of worker threads, and packs the encoded blocks into a chunk frame:
//!
//! | Field | Size |
//! |---|---|
//! | magic `NDCF` | 4 |
//! | format version | 1 |
//! | flags (bit 0: checksum present) | 1 |
//! | block count (`u32` LE) | 4 |
//! | per block: kind (`u8`) and payload length (`u32` LE) | 5 × block count |
//! | block payloads | variable |
//! | crc32c of all preceding bytes (`u32` LE, if flagged) | 4 |
//!
//! A block is stored in one of three forms:
//!  - *raw*: the block bytes,
//!  - *compressed*: the block bytes compressed with the configured [`Compressor`], used only if smaller than raw, or
//!  - *repeat*: a single element, for a block consisting of one element repeated.

#[cfg(feature = "gzip")]
use std::io::{Cursor, Read};

use derive_more::Display;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{fill_value::repeated_element, ArrayErrorKind};

const FRAME_MAGIC: &[u8; 4] = b"NDCF";
const FRAME_VERSION: u8 = 1;
const FRAME_FLAG_CHECKSUM: u8 = 0b1;
const FRAME_HEADER_SIZE: usize = 10;
const FRAME_BLOCK_ENTRY_SIZE: usize = 5;
const FRAME_CHECKSUM_SIZE: usize = 4;

/// A block compressor.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Compressor {
    /// No compression.
    #[display("none")]
    None,
    /// Zstandard compression.
    #[cfg(feature = "zstd")]
    #[display("zstd (level {level})")]
    Zstd {
        /// The compression level.
        level: i32,
    },
    /// Gzip compression.
    #[cfg(feature = "gzip")]
    #[display("gzip (level {level})")]
    Gzip {
        /// The compression level, 0 to 9.
        level: u32,
    },
}

impl Default for Compressor {
    fn default() -> Self {
        #[cfg(feature = "zstd")]
        {
            Self::Zstd { level: 5 }
        }
        #[cfg(not(feature = "zstd"))]
        {
            Self::None
        }
    }
}

/// The persistent configuration of a [`BlockCodec`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CodecConfiguration {
    /// The block compressor.
    pub compressor: Compressor,
    /// The size in bytes of an element.
    pub element_size: usize,
    /// The size in bytes of a raw block.
    pub block_size: usize,
    /// The size in bytes of a raw chunk.
    pub chunk_size: usize,
}

/// A codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The codec configuration is invalid.
    #[error("invalid codec configuration: {0}")]
    InvalidConfiguration(String),
    /// The size of a raw chunk does not match the configuration.
    #[error("the size of a raw chunk is {0}, expected {1}")]
    UnexpectedDecodedSize(usize, usize),
    /// An encoded chunk frame is malformed.
    #[error("invalid chunk frame: {0}")]
    InvalidChunkFrame(String),
    /// The checksum of an encoded chunk frame does not match.
    #[error("the chunk frame checksum is invalid")]
    InvalidChecksum,
    /// The worker pool could not be built.
    #[error(transparent)]
    ThreadPoolBuildError(#[from] rayon::ThreadPoolBuildError),
}

impl CodecError {
    /// Return the [`ArrayErrorKind`] of the error.
    #[must_use]
    pub fn kind(&self) -> ArrayErrorKind {
        match self {
            Self::InvalidConfiguration(_) | Self::UnexpectedDecodedSize(_, _) => {
                ArrayErrorKind::InvalidArgument
            }
            Self::IOError(_)
            | Self::InvalidChunkFrame(_)
            | Self::InvalidChecksum
            | Self::ThreadPoolBuildError(_) => ArrayErrorKind::IOError,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BlockKind {
    Raw = 0,
    Compressed = 1,
    Repeat = 2,
}

impl TryFrom<u8> for BlockKind {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Raw),
            1 => Ok(Self::Compressed),
            2 => Ok(Self::Repeat),
            _ => Err(CodecError::InvalidChunkFrame(format!(
                "unknown block kind {value}"
            ))),
        }
    }
}

struct EncodedBlock {
    kind: BlockKind,
    bytes: Vec<u8>,
}

/// Encodes and decodes raw chunks block by block on a fixed pool of worker threads.
pub struct BlockCodec {
    configuration: CodecConfiguration,
    thread_pool: rayon::ThreadPool,
}

impl core::fmt::Debug for BlockCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockCodec")
            .field("configuration", &self.configuration)
            .field("num_threads", &self.num_threads())
            .finish()
    }
}

impl BlockCodec {
    /// Create a new block codec with `num_threads` worker threads (at least one).
    ///
    /// # Errors
    /// Returns [`CodecError::InvalidConfiguration`] if
    ///  - the element size or block size is zero,
    ///  - the block size is not a multiple of the element size,
    ///  - the chunk size is not a multiple of the block size, or
    ///  - the block size or the number of blocks exceeds [`u32::MAX`].
    ///
    /// Returns [`CodecError::ThreadPoolBuildError`] if the worker pool cannot be built.
    pub fn new(configuration: CodecConfiguration, num_threads: usize) -> Result<Self, CodecError> {
        let CodecConfiguration {
            element_size,
            block_size,
            chunk_size,
            ..
        } = configuration;
        if element_size == 0 || block_size == 0 {
            return Err(CodecError::InvalidConfiguration(
                "the element size and block size must be non-zero".to_string(),
            ));
        }
        if block_size % element_size != 0 || chunk_size % block_size != 0 {
            return Err(CodecError::InvalidConfiguration(format!(
                "block size {block_size} must be a multiple of element size {element_size} and divide chunk size {chunk_size}"
            )));
        }
        if u32::try_from(block_size).is_err() || u32::try_from(chunk_size / block_size).is_err() {
            return Err(CodecError::InvalidConfiguration(format!(
                "block size {block_size} or block count {} is too large",
                chunk_size / block_size
            )));
        }
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|index| format!("ndchunk-codec-{index}"))
            .build()?;
        Ok(Self {
            configuration,
            thread_pool,
        })
    }

    /// Return the codec configuration.
    #[must_use]
    pub fn configuration(&self) -> &CodecConfiguration {
        &self.configuration
    }

    /// Return the number of worker threads.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.thread_pool.current_num_threads()
    }

    /// Return the number of blocks in a chunk.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.configuration.chunk_size / self.configuration.block_size
    }

    /// Encode a raw chunk into a chunk frame.
    ///
    /// # Errors
    /// Returns [`CodecError::UnexpectedDecodedSize`] if `decoded` is not the configured chunk size, or an error if compression fails.
    pub fn encode(&self, decoded: &[u8]) -> Result<Vec<u8>, CodecError> {
        if decoded.len() != self.configuration.chunk_size {
            return Err(CodecError::UnexpectedDecodedSize(
                decoded.len(),
                self.configuration.chunk_size,
            ));
        }
        let blocks = self.thread_pool.install(|| {
            decoded
                .par_chunks(self.configuration.block_size)
                .map(|block| self.encode_block(block))
                .collect::<Result<Vec<_>, _>>()
        })?;

        let payload_size: usize = blocks.iter().map(|block| block.bytes.len()).sum();
        let mut frame = Vec::with_capacity(
            FRAME_HEADER_SIZE
                + FRAME_BLOCK_ENTRY_SIZE * blocks.len()
                + payload_size
                + FRAME_CHECKSUM_SIZE,
        );
        frame.extend_from_slice(FRAME_MAGIC);
        frame.push(FRAME_VERSION);
        frame.push(if cfg!(feature = "crc32c") {
            FRAME_FLAG_CHECKSUM
        } else {
            0
        });
        // Sizes are bounded by the configuration checks in `new`.
        frame.extend_from_slice(&(blocks.len() as u32).to_le_bytes());
        for block in &blocks {
            frame.push(block.kind as u8);
            frame.extend_from_slice(&(block.bytes.len() as u32).to_le_bytes());
        }
        for block in &blocks {
            frame.extend_from_slice(&block.bytes);
        }
        #[cfg(feature = "crc32c")]
        {
            let checksum = crc32c::crc32c(&frame);
            frame.extend_from_slice(&checksum.to_le_bytes());
        }
        Ok(frame)
    }

    /// Decode a chunk frame into `decoded`, which must be exactly the configured chunk size.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `decoded` has the wrong size, the frame is malformed, its checksum is invalid, or decompression fails.
    pub fn decode_into(&self, encoded: &[u8], decoded: &mut [u8]) -> Result<(), CodecError> {
        if decoded.len() != self.configuration.chunk_size {
            return Err(CodecError::UnexpectedDecodedSize(
                decoded.len(),
                self.configuration.chunk_size,
            ));
        }
        let blocks = self.parse_frame(encoded)?;
        if blocks.len() != self.num_blocks() {
            return Err(CodecError::InvalidChunkFrame(format!(
                "frame has {} blocks, expected {}",
                blocks.len(),
                self.num_blocks()
            )));
        }
        self.thread_pool.install(|| {
            decoded
                .par_chunks_mut(self.configuration.block_size)
                .zip(blocks.par_iter())
                .try_for_each(|(block, (kind, payload))| self.decode_block(*kind, payload, block))
        })
    }

    /// Decode a chunk frame into a new buffer.
    ///
    /// # Errors
    /// See [`decode_into`](BlockCodec::decode_into).
    pub fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut decoded = vec![0; self.configuration.chunk_size];
        self.decode_into(encoded, &mut decoded)?;
        Ok(decoded)
    }

    fn encode_block(&self, block: &[u8]) -> Result<EncodedBlock, CodecError> {
        if let Some(element) = repeated_element(block, self.configuration.element_size) {
            return Ok(EncodedBlock {
                kind: BlockKind::Repeat,
                bytes: element.to_vec(),
            });
        }
        let compressed = match self.configuration.compressor {
            Compressor::None => None,
            #[cfg(feature = "zstd")]
            Compressor::Zstd { level } => Some(zstd::bulk::compress(block, level)?),
            #[cfg(feature = "gzip")]
            Compressor::Gzip { level } => {
                let mut encoder = flate2::bufread::GzEncoder::new(
                    Cursor::new(block),
                    flate2::Compression::new(level),
                );
                let mut out: Vec<u8> = Vec::new();
                encoder.read_to_end(&mut out)?;
                Some(out)
            }
        };
        Ok(match compressed {
            Some(bytes) if bytes.len() < block.len() => EncodedBlock {
                kind: BlockKind::Compressed,
                bytes,
            },
            _ => EncodedBlock {
                kind: BlockKind::Raw,
                bytes: block.to_vec(),
            },
        })
    }

    fn decode_block(
        &self,
        kind: BlockKind,
        payload: &[u8],
        block: &mut [u8],
    ) -> Result<(), CodecError> {
        match kind {
            BlockKind::Raw => {
                if payload.len() != block.len() {
                    return Err(CodecError::InvalidChunkFrame(format!(
                        "raw block has {} bytes, expected {}",
                        payload.len(),
                        block.len()
                    )));
                }
                block.copy_from_slice(payload);
            }
            BlockKind::Repeat => {
                if payload.len() != self.configuration.element_size {
                    return Err(CodecError::InvalidChunkFrame(format!(
                        "repeat block has {} bytes, expected {}",
                        payload.len(),
                        self.configuration.element_size
                    )));
                }
                block
                    .chunks_exact_mut(payload.len())
                    .for_each(|element| element.copy_from_slice(payload));
            }
            BlockKind::Compressed => match self.configuration.compressor {
                Compressor::None => {
                    return Err(CodecError::InvalidChunkFrame(
                        "compressed block without a compressor".to_string(),
                    ));
                }
                #[cfg(feature = "zstd")]
                Compressor::Zstd { .. } => {
                    let size = zstd::bulk::decompress_to_buffer(payload, block)?;
                    if size != block.len() {
                        return Err(CodecError::InvalidChunkFrame(format!(
                            "compressed block decoded to {size} bytes, expected {}",
                            block.len()
                        )));
                    }
                }
                #[cfg(feature = "gzip")]
                Compressor::Gzip { .. } => {
                    let mut decoder = flate2::bufread::GzDecoder::new(Cursor::new(payload));
                    decoder.read_exact(block)?;
                }
            },
        }
        Ok(())
    }

    /// Split a chunk frame into its blocks, validating its structure and checksum.
    fn parse_frame<'a>(&self, encoded: &'a [u8]) -> Result<Vec<(BlockKind, &'a [u8])>, CodecError> {
        let invalid = |message: &str| CodecError::InvalidChunkFrame(message.to_string());
        if encoded.len() < FRAME_HEADER_SIZE || &encoded[..4] != FRAME_MAGIC {
            return Err(invalid("missing frame header"));
        }
        if encoded[4] != FRAME_VERSION {
            return Err(CodecError::InvalidChunkFrame(format!(
                "unsupported frame version {}",
                encoded[4]
            )));
        }
        let has_checksum = encoded[5] & FRAME_FLAG_CHECKSUM != 0;
        let body = if has_checksum {
            let body_size = encoded
                .len()
                .checked_sub(FRAME_CHECKSUM_SIZE)
                .filter(|&size| size >= FRAME_HEADER_SIZE)
                .ok_or_else(|| invalid("missing checksum"))?;
            let (body, checksum) = encoded.split_at(body_size);
            validate_checksum(body, checksum)?;
            body
        } else {
            encoded
        };

        let num_blocks = u32::from_le_bytes([body[6], body[7], body[8], body[9]]) as usize;
        let table_end = num_blocks
            .checked_mul(FRAME_BLOCK_ENTRY_SIZE)
            .and_then(|size| size.checked_add(FRAME_HEADER_SIZE))
            .filter(|&end| end <= body.len())
            .ok_or_else(|| invalid("truncated block table"))?;
        let mut blocks = Vec::with_capacity(num_blocks);
        let mut offset = table_end;
        for entry in body[FRAME_HEADER_SIZE..table_end].chunks_exact(FRAME_BLOCK_ENTRY_SIZE) {
            let kind = BlockKind::try_from(entry[0])?;
            let size = u32::from_le_bytes([entry[1], entry[2], entry[3], entry[4]]) as usize;
            let payload = offset
                .checked_add(size)
                .and_then(|end| body.get(offset..end))
                .ok_or_else(|| invalid("truncated block payload"))?;
            blocks.push((kind, payload));
            offset += size;
        }
        if offset != body.len() {
            return Err(invalid("trailing bytes after block payloads"));
        }
        Ok(blocks)
    }
}

#[cfg(feature = "crc32c")]
fn validate_checksum(body: &[u8], checksum: &[u8]) -> Result<(), CodecError> {
    if !crate::config::global_config().validate_checksums() {
        return Ok(());
    }
    let checksum = <[u8; FRAME_CHECKSUM_SIZE]>::try_from(checksum)
        .map_err(|_| CodecError::InvalidChunkFrame("missing checksum".to_string()))?;
    if crc32c::crc32c(body) == u32::from_le_bytes(checksum) {
        Ok(())
    } else {
        Err(CodecError::InvalidChecksum)
    }
}

#[cfg(not(feature = "crc32c"))]
#[allow(clippy::unnecessary_wraps)]
fn validate_checksum(_body: &[u8], _checksum: &[u8]) -> Result<(), CodecError> {
    Ok(())
}
