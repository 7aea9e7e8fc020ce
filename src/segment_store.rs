// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    segment_cache::SegmentCache,
    segment_hash::{SegmentHash, SEGMENT_HASH_LEN},
    HashMap,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::{
    io::{Cursor, Write},
    path::{Path, PathBuf},
};

/// On-disk footprint of one table record: hash, length, refcount.
const RECORD_LEN: usize = SEGMENT_HASH_LEN + 2 * std::mem::size_of::<u32>();

/// Atomically rewrites a file
fn rewrite_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    let folder = path.parent().expect("should have a parent");

    let mut temp_file = tempfile::NamedTempFile::new_in(folder)?;
    temp_file.write_all(content)?;
    temp_file.persist(path)?;

    #[cfg(not(target_os = "windows"))]
    {
        let file = std::fs::File::open(path)?;
        file.sync_all()?;
    }

    Ok(())
}

/// Length and global reference count of a segment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SegmentInfo {
    /// Decompressed byte length
    pub length: u32,

    /// Occurrences across all live metadata files
    pub ref_count: u32,
}

/// Process-wide table of `hash -> (length, refcount)`.
///
/// Clobbered to disk as a flat record file on every mutation and rebuilt
/// from that file on mount. A mutation only counts as durable once
/// [`SegmentStore::persist`] succeeds; on persist failure the caller rolls
/// its in-memory change back.
pub struct SegmentStore {
    path: PathBuf,
    entries: HashMap<SegmentHash, SegmentInfo>,
}

impl SegmentStore {
    pub(crate) fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            entries: HashMap::default(),
        }
    }

    /// Gets a segment's length and refcount.
    #[must_use]
    pub fn get(&self, hash: &SegmentHash) -> Option<SegmentInfo> {
        self.entries.get(hash).copied()
    }

    /// Counts table entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no segments are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all table entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&SegmentHash, SegmentInfo)> {
        self.entries.iter().map(|(hash, info)| (hash, *info))
    }

    /// Increments the refcount of an existing segment.
    ///
    /// # Panics
    ///
    /// Panics if the hash is not in the table.
    pub(crate) fn incref(&mut self, hash: &SegmentHash) {
        let entry = self
            .entries
            .get_mut(hash)
            .expect("segment should be in the table");
        entry.ref_count += 1;

        log::trace!("segment {hash} refcount -> {}", entry.ref_count);
    }

    /// Inserts a new segment with refcount 1.
    ///
    /// # Panics
    ///
    /// Panics if the hash is already present.
    pub(crate) fn add_new(&mut self, hash: SegmentHash, length: u32) {
        log::trace!("adding segment {hash} ({length} bytes) to the table");

        let prev = self.entries.insert(
            hash,
            SegmentInfo {
                length,
                ref_count: 1,
            },
        );
        assert!(prev.is_none(), "segment should not be in the table yet");
    }

    /// Decrements the refcount; removes the entry when it reaches zero.
    ///
    /// Returns whether the count reached zero, in which case the caller
    /// removes the cached bytes and the stored object.
    ///
    /// # Panics
    ///
    /// Panics if the hash is not in the table.
    pub(crate) fn decref(&mut self, hash: &SegmentHash) -> bool {
        let entry = self
            .entries
            .get_mut(hash)
            .expect("segment should be in the table");

        if entry.ref_count > 1 {
            entry.ref_count -= 1;
            log::trace!("segment {hash} refcount -> {}", entry.ref_count);
            false
        } else {
            log::trace!("removing segment {hash} from the table");
            self.entries.remove(hash);
            true
        }
    }

    /// Drops an entry without touching its refcount. Rollback helper for
    /// failed mutations that were never persisted.
    pub(crate) fn forget(&mut self, hash: &SegmentHash) {
        self.entries.remove(hash);
    }

    /// Clobbers and rewrites the table file.
    pub(crate) fn persist(&self) -> crate::Result<()> {
        log::trace!("persisting segment table to {}", self.path.display());

        let mut bytes = Vec::with_capacity(self.entries.len() * RECORD_LEN);

        for (hash, info) in &self.entries {
            hash.encode_into(&mut bytes)?;
            bytes.write_u32::<LittleEndian>(info.length)?;
            bytes.write_u32::<LittleEndian>(info.ref_count)?;
        }

        rewrite_atomic(&self.path, &bytes)?;

        Ok(())
    }

    /// Rebuilds the table from disk on mount.
    ///
    /// Every recovered segment whose cache file still exists is restored
    /// into the cache at the least-recently-used position.
    pub(crate) fn reload(&mut self, cache: &mut SegmentCache) -> crate::Result<()> {
        if !self.path.try_exists()? {
            log::debug!("no segment table at {}", self.path.display());
            return Ok(());
        }

        log::info!("restoring segment table from {}", self.path.display());

        let bytes = std::fs::read(&self.path)?;
        let mut cursor = Cursor::new(bytes.as_slice());

        while (cursor.position() as usize) < bytes.len() {
            let remaining = bytes.len() - cursor.position() as usize;
            if remaining < RECORD_LEN {
                log::warn!("segment table ends in a truncated record, ignoring it");
                break;
            }

            let hash = SegmentHash::decode_from(&mut cursor)?;
            let length = cursor.read_u32::<LittleEndian>()?;
            let ref_count = cursor.read_u32::<LittleEndian>()?;

            log::trace!("restored segment {hash}, refcount={ref_count}");
            self.entries.insert(hash.clone(), SegmentInfo { length, ref_count });

            if cache.is_enabled() && cache.file(&hash).try_exists()? {
                cache.restore(hash, u64::from(length));
            }
        }

        log::info!("restored {} segments", self.entries.len());

        Ok(())
    }
}
