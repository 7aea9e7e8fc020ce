// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::compression::Compressor;
use std::path::PathBuf;

/// Spread of segment sizes around the configured average.
pub(crate) const fn size_variation(avg: u32) -> u32 {
    avg / 16
}

/// Mount configuration
#[derive(Clone)]
pub struct Config<C: Compressor + Clone> {
    /// Root of the fast local device backing proxies, metadata and cache
    pub(crate) ssd_root: PathBuf,

    /// Mount point served to the filesystem host
    #[allow(unused)]
    pub(crate) fuse_root: PathBuf,

    /// Object store endpoint, handed through to the host's cloud client
    pub(crate) hostname: String,

    /// Capacity hint for the local device; not enforced by the engine
    #[allow(unused)]
    pub(crate) ssd_size: u64,

    /// Files larger than this move to the cloud on release
    pub(crate) threshold: u64,

    /// Target content-defined segment size
    pub(crate) avg_seg_size: u32,

    /// Rolling-hash window width
    pub(crate) rabin_window: usize,

    /// Byte budget of the on-disk segment cache
    pub(crate) cache_size: u64,

    /// Whole-file mode: one object per file, no cross-file dedup
    pub(crate) no_dedup: bool,

    /// Disables the segment cache for the lifetime of the mount
    pub(crate) no_cache: bool,

    /// Compression to use; `None` moves raw segment bytes
    pub(crate) compression: Option<C>,
}

impl<C: Compressor + Clone> Config<C> {
    /// Creates a new configuration.
    pub fn new<P: Into<PathBuf>>(ssd_root: P, fuse_root: P) -> Self {
        Self {
            ssd_root: ssd_root.into(),
            fuse_root: fuse_root.into(),
            hostname: "localhost".into(),
            ssd_size: 1_024 * 1_024 * 1_024,
            threshold: 64 * 1_024,
            avg_seg_size: 4_096,
            rabin_window: 48,
            cache_size: 32 * 1_024 * 1_024,
            no_dedup: false,
            no_cache: false,
            compression: None,
        }
    }

    /// Sets the object store endpoint name.
    #[must_use]
    pub fn hostname<S: Into<String>>(mut self, hostname: S) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Sets the local device capacity hint.
    #[must_use]
    pub fn ssd_size(mut self, bytes: u64) -> Self {
        self.ssd_size = bytes;
        self
    }

    /// Sets the size above which a file is promoted to the cloud on release.
    ///
    /// Default = 64 KiB
    #[must_use]
    pub fn threshold(mut self, bytes: u64) -> Self {
        self.threshold = bytes;
        self
    }

    /// Sets the target segment size.
    ///
    /// Actual segments range within 1/16 of the average.
    ///
    /// Default = 4 KiB
    #[must_use]
    pub fn avg_seg_size(mut self, bytes: u32) -> Self {
        self.avg_seg_size = bytes;
        self
    }

    /// Sets the rolling-hash window width.
    #[must_use]
    pub fn rabin_window(mut self, bytes: usize) -> Self {
        self.rabin_window = bytes;
        self
    }

    /// Sets the byte budget of the segment cache.
    ///
    /// A budget smaller than the maximum segment size disables caching
    /// for the lifetime of the mount.
    ///
    /// Default = 32 MiB
    #[must_use]
    pub fn cache_size(mut self, bytes: u64) -> Self {
        self.cache_size = bytes;
        self
    }

    /// Switches to whole-file mode: the entire file body is stored as a
    /// single object keyed by a weak per-path hash.
    #[must_use]
    pub fn no_dedup(mut self, flag: bool) -> Self {
        self.no_dedup = flag;
        self
    }

    /// Disables the segment cache; segments are materialised into a
    /// scratch file and discarded after use.
    #[must_use]
    pub fn no_cache(mut self, flag: bool) -> Self {
        self.no_cache = flag;
        self
    }

    /// Sets the compression & decompression scheme.
    #[must_use]
    pub fn compression(mut self, compressor: Option<C>) -> Self {
        self.compression = compressor;
        self
    }

    /// Largest segment the chunker may emit.
    pub(crate) fn max_seg_size(&self) -> u32 {
        self.avg_seg_size + size_variation(self.avg_seg_size)
    }
}
