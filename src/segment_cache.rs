// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{segment_hash::SegmentHash, HashMap};
use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

/// Bounded LRU of decompressed segments on the local device.
///
/// Cached bytes live as one file per segment under the cache directory,
/// named by hash. Recency is an ordered deque (most-recent first) plus a
/// size map; eviction pulls from the back and unlinks the evicted file.
pub struct SegmentCache {
    folder: PathBuf,
    budget: u64,
    used: u64,
    enabled: bool,

    /// Most-recently-used at the front
    recency: VecDeque<SegmentHash>,
    sizes: HashMap<SegmentHash, u64>,
}

impl SegmentCache {
    /// Sets up the cache directory.
    ///
    /// The cache is disabled for the lifetime of the mount when asked to,
    /// when the budget cannot hold even one maximum-size segment, or when
    /// the cache directory cannot be created.
    pub(crate) fn create<P: Into<PathBuf>>(
        folder: P,
        budget: u64,
        max_seg_size: u32,
        no_cache: bool,
    ) -> Self {
        let folder = folder.into();

        let mut enabled = !no_cache && budget >= u64::from(max_seg_size);

        if enabled {
            if let Err(e) = std::fs::create_dir_all(&folder) {
                log::warn!("could not create cache folder {}: {e}, disabling cache", folder.display());
                enabled = false;
            }
        }

        Self {
            folder,
            budget,
            used: 0,
            enabled,
            recency: VecDeque::new(),
            sizes: HashMap::default(),
        }
    }

    /// Whether caching is active for this mount.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the occupied bytes.
    #[must_use]
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Returns the byte budget.
    #[must_use]
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Counts cached segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recency.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recency.is_empty()
    }

    /// Backing file of a cached segment.
    pub fn file(&self, hash: &SegmentHash) -> PathBuf {
        self.folder.join(hash.as_str())
    }

    /// Whether a segment's bytes are cached.
    #[must_use]
    pub fn contains(&self, hash: &SegmentHash) -> bool {
        self.sizes.contains_key(hash)
    }

    /// Moves a cached segment to the most-recent position.
    pub(crate) fn touch(&mut self, hash: &SegmentHash) {
        if let Some(idx) = self.recency.iter().position(|h| h == hash) {
            if let Some(entry) = self.recency.remove(idx) {
                self.recency.push_front(entry);
            }
        }
    }

    /// Registers a freshly materialised segment as most-recent.
    pub(crate) fn insert(&mut self, hash: SegmentHash, length: u64) {
        self.used += length;
        self.sizes.insert(hash.clone(), length);
        self.recency.push_front(hash);
    }

    /// Re-registers a segment found on disk during mount, at the
    /// least-recent position.
    pub(crate) fn restore(&mut self, hash: SegmentHash, length: u64) {
        self.used += length;
        self.sizes.insert(hash.clone(), length);
        self.recency.push_back(hash);
    }

    /// Drops a segment from the cache, unlinking its file.
    pub(crate) fn remove(&mut self, hash: &SegmentHash) {
        let Some(length) = self.sizes.remove(hash) else {
            return;
        };

        if let Some(idx) = self.recency.iter().position(|h| h == hash) {
            self.recency.remove(idx);
        }
        self.used -= length;

        Self::unlink(&self.file(hash));
    }

    /// Evicts least-recent segments until `need` bytes fit in the budget.
    ///
    /// Returns `false` when no amount of eviction can make room; the
    /// caller then bypasses the cache for this segment.
    pub(crate) fn make_room(&mut self, need: u64) -> bool {
        if !self.enabled || need > self.budget {
            return false;
        }

        while self.budget.saturating_sub(self.used) < need {
            let Some(victim) = self.recency.pop_back() else {
                break;
            };

            log::debug!("evicting segment {victim} from the cache");

            let length = self.sizes.remove(&victim).unwrap_or_default();
            self.used -= length;

            Self::unlink(&self.file(&victim));
        }

        self.budget.saturating_sub(self.used) >= need
    }

    fn unlink(path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("could not unlink cache file {}: {e}", path.display());
        }
    }
}
