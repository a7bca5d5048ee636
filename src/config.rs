//! Global configuration options.

use std::sync::{OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::array::codec::Compressor;

/// Global configuration options for the ndchunk crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// ## Validate Checksums
///  > default: [`true`]
///
/// If enabled, encoded chunks carrying a crc32c checksum are validated when they are decoded, otherwise validation is skipped.
///
/// ## Codec Concurrent Limit
/// > default: [`std::thread::available_parallelism`]`()`
///
/// The default number of worker threads of a chunk store's block codec.
/// Blocks of a single chunk are encoded and decoded concurrently on these threads.
/// It is used when a [`StorageSpec`](crate::array::StorageSpec) does not set its own thread count.
///
/// ## Default Compressor
/// > default: `zstd` level 5 if the `zstd` feature is enabled, otherwise `none`
///
/// The block compressor used when a [`StorageSpec`](crate::array::StorageSpec) does not set one.
#[derive(Debug)]
pub struct Config {
    validate_checksums: bool,
    codec_concurrent_limit: usize,
    default_compressor: Compressor,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            validate_checksums: true,
            codec_concurrent_limit: std::thread::available_parallelism()
                .map_or(1, std::num::NonZeroUsize::get),
            default_compressor: Compressor::default(),
        }
    }
}

impl Config {
    /// Get the [validate checksums](#validate-checksums) configuration.
    #[must_use]
    pub fn validate_checksums(&self) -> bool {
        self.validate_checksums
    }

    /// Set the [validate checksums](#validate-checksums) configuration.
    pub fn set_validate_checksums(&mut self, validate_checksums: bool) {
        self.validate_checksums = validate_checksums;
    }

    /// Get the [codec concurrent limit](#codec-concurrent-limit) configuration.
    #[must_use]
    pub fn codec_concurrent_limit(&self) -> usize {
        self.codec_concurrent_limit
    }

    /// Set the [codec concurrent limit](#codec-concurrent-limit) configuration.
    ///
    /// A limit of zero is treated as one.
    pub fn set_codec_concurrent_limit(&mut self, concurrent_limit: usize) {
        self.codec_concurrent_limit = concurrent_limit.max(1);
    }

    /// Get the [default compressor](#default-compressor) configuration.
    #[must_use]
    pub fn default_compressor(&self) -> Compressor {
        self.default_compressor
    }

    /// Set the [default compressor](#default-compressor) configuration.
    pub fn set_default_compressor(&mut self, compressor: Compressor) {
        self.default_compressor = compressor;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global ndchunk configuration.
///
/// A poisoned lock is recovered, the configuration holds no invariants that a panic could break.
/// This might deadlock if the global config is already held mutably by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Returns a mutable reference to the global ndchunk configuration.
///
/// This might deadlock if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap_or_else(PoisonError::into_inner)
}
