// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Content-defined deduplication: file migration into segments, reads
//! against cloud-backed files, and tail pull-back for appends.
//!
//! Segments are deduplicated against the whole namespace before upload
//! and compressed individually. The segment table is persisted after
//! every segment commit, so a crash mid-migration leaves at most one
//! metadata record without a matching table entry, which `unlink`
//! tolerates.

use crate::{
    compression::{self, Compressor},
    controller::CloudFs,
    gateway::ObjectStore,
    meta,
    segment_hash::SegmentHash,
};
use std::{
    fs::File,
    io::{Cursor, Read, Seek, SeekFrom},
    os::unix::fs::{FileExt, MetadataExt},
    path::{Path, PathBuf},
};

/// Streaming buffer for chunking a source file.
const MIGRATE_BUF: usize = 8 * 1_024;

impl<S: ObjectStore, C: Compressor + Clone> CloudFs<S, C> {
    /// Splits a source file into segments and moves them to the cloud.
    ///
    /// With `source_is_proxy`, the whole proxy body migrates and the
    /// metadata record is created first; otherwise the source is the
    /// data-spill of an already cloud-tier file. With `move_tail`, the
    /// trailing partial segment is committed like any other; without it,
    /// the unconsumed tail lands in a fresh data-spill.
    pub(crate) fn migrate_file(
        &mut self,
        logical: &Path,
        source: &Path,
        source_is_proxy: bool,
        move_tail: bool,
    ) -> crate::Result<()> {
        let meta_path = self.paths.meta(logical)?;
        let creating = !meta_path.try_exists()?;

        let result = self.migrate_inner(logical, &meta_path, source, source_is_proxy, move_tail);
        self.chunker.reset();

        if result.is_err() && creating {
            if let Err(e) = std::fs::remove_file(&meta_path) {
                log::warn!(
                    "could not remove metadata of failed promotion {}: {e}",
                    meta_path.display()
                );
            }
        }

        result
    }

    fn migrate_inner(
        &mut self,
        logical: &Path,
        meta_path: &Path,
        source: &Path,
        source_is_proxy: bool,
        move_tail: bool,
    ) -> crate::Result<()> {
        log::debug!(
            "migrating {} from {}",
            logical.display(),
            source.display()
        );

        let meta_file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .open(meta_path)?;

        if source_is_proxy {
            let st = std::fs::metadata(source)?;
            meta::write_header(
                &meta_file,
                &meta::MetaHeader {
                    size: st.len(),
                    atime: st.atime(),
                    mtime: st.mtime(),
                    ctime: st.ctime(),
                },
            )?;
        }

        // Two cursors over the source: one streams bytes through the
        // chunker, the other trails behind it uploading (or skipping)
        // whole segments
        let mut chunk_src = File::open(source)?;
        let mut data_src = File::open(source)?;

        self.chunker.reset();
        let mut ctx = md5::Context::new();
        let mut seg_len: u64 = 0;
        let mut buf = vec![0u8; MIGRATE_BUF];

        loop {
            let n = chunk_src.read(&mut buf)?;
            if n == 0 {
                break;
            }

            let (mut window, _) = buf.split_at(n);

            while !window.is_empty() {
                let (consumed, boundary) = self.chunker.next_boundary(window);
                let (chunk, rest) = window.split_at(consumed);

                ctx.consume(chunk);
                seg_len += consumed as u64;
                window = rest;

                if boundary {
                    let digest = std::mem::replace(&mut ctx, md5::Context::new()).compute();
                    let hash = SegmentHash::from_digest(digest);

                    self.commit_segment(&meta_file, &hash, seg_len, &mut data_src)?;
                    seg_len = 0;
                }
            }
        }

        if move_tail {
            if seg_len > 0 {
                let hash = SegmentHash::from_digest(ctx.compute());
                self.commit_segment(&meta_file, &hash, seg_len, &mut data_src)?;
            }
        } else {
            // Stash the unfinished tail in a fresh data-spill
            let spill_path = self.paths.spill(logical)?;

            let mut tail_file = tempfile::NamedTempFile::new_in(self.paths.ssd_root())?;
            std::io::copy(&mut data_src.by_ref().take(seg_len), tail_file.as_file_mut())?;
            tail_file
                .persist(&spill_path)
                .map_err(|e| crate::Error::from(e.error))?;
        }

        if source_is_proxy {
            // The proxy keeps its dirent, mode and ownership but no
            // longer carries bytes
            let proxy_file = File::options().write(true).open(source)?;
            proxy_file.set_len(0)?;
        }

        log::debug!("done migrating {}", logical.display());

        Ok(())
    }

    /// Commits one segment: dedup against the table or upload, then append
    /// to metadata and persist the table.
    ///
    /// A failure after the table was touched rolls the in-memory change
    /// back, deleting a just-uploaded object, so no refcount leaks.
    fn commit_segment(
        &mut self,
        meta_file: &File,
        hash: &SegmentHash,
        len: u64,
        data_src: &mut File,
    ) -> crate::Result<()> {
        let deduplicated = self.store.get(hash).is_some();

        if deduplicated {
            self.store.incref(hash);

            if let Err(e) = data_src.seek(SeekFrom::Current(len as i64)) {
                self.store.decref(hash);
                return Err(e.into());
            }

            log::trace!("segment {hash} ({len} bytes) deduplicated");
        } else {
            self.gateway.ensure_bucket(hash.bucket())?;

            match &self.config.compression {
                Some(compressor) => {
                    let mut deflated = vec![];
                    compression::deflate(data_src, &mut deflated, len, compressor)?;
                    let deflated_len = deflated.len() as u64;

                    self.gateway.put(
                        hash.bucket(),
                        hash.object_key(),
                        deflated_len,
                        &mut Cursor::new(deflated),
                    )?;
                }
                None => {
                    let mut source = data_src.by_ref().take(len);
                    self.gateway
                        .put(hash.bucket(), hash.object_key(), len, &mut source)?;
                }
            }

            self.store.add_new(hash.clone(), len as u32);
        }

        let appended = meta::append_segment(meta_file, hash);
        let appended_ok = appended.is_ok();

        let committed = match appended {
            Ok(()) => self.store.persist(),
            Err(e) => Err(e),
        };

        if let Err(e) = committed {
            if deduplicated {
                self.store.decref(hash);
            } else {
                self.store.forget(hash);
                if let Err(del) = self.gateway.delete(hash.bucket(), hash.object_key()) {
                    log::warn!("could not delete segment {hash} during rollback: {del:?}");
                }
            }

            if appended_ok {
                if let Err(trunc) = meta::truncate_last_segment(meta_file) {
                    log::warn!("could not drop uncommitted metadata record: {trunc:?}");
                }
            }

            return Err(e);
        }

        Ok(())
    }

    /// Serves a read against a cloud-tier file from its segments and,
    /// past the segment list, from the data-spill tail.
    pub(crate) fn dedup_read(
        &mut self,
        logical: &Path,
        buf: &mut [u8],
        offset: u64,
    ) -> crate::Result<usize> {
        let meta_path = self.paths.meta(logical)?;
        let meta_file = File::open(meta_path)?;

        let file_size = meta::read_size(&meta_file)?;
        if offset >= file_size || buf.is_empty() {
            return Ok(0);
        }

        let mut segments = vec![];
        for hash in meta::SegmentListReader::new(&meta_file)? {
            let hash = hash?;
            let info = self
                .store
                .get(&hash)
                .ok_or_else(|| crate::Error::SegmentMissing(hash.clone()))?;
            segments.push((hash, u64::from(info.length)));
        }

        let want = (buf.len() as u64).min(file_size - offset) as usize;
        let (mut dst, _) = buf.split_at_mut(want);

        // Walk to the segment containing the start offset
        let mut running = 0u64;
        let mut idx = 0;
        while let Some((_, len)) = segments.get(idx) {
            if running + len > offset {
                break;
            }
            running += len;
            idx += 1;
        }

        let mut pos = offset;
        let mut total = 0usize;

        while !dst.is_empty() {
            let taken = std::mem::take(&mut dst);

            if let Some((hash, len)) = segments.get(idx).cloned() {
                let seg_off = pos - running;
                let n = (len - seg_off).min(taken.len() as u64) as usize;

                let (chunk, rest) = taken.split_at_mut(n);
                self.read_segment(&hash, chunk, seg_off)?;
                dst = rest;

                total += n;
                pos += n as u64;
                running += len;
                idx += 1;
            } else {
                // Past the segment list: the remaining bytes live in the
                // data-spill tail
                let spill_file = File::open(self.paths.spill(logical)?)?;
                spill_file.read_exact_at(taken, pos - running)?;

                total += taken.len();
                break;
            }
        }

        Ok(total)
    }

    /// Copies part of a segment into `dst`, materialising it first.
    fn read_segment(&mut self, hash: &SegmentHash, dst: &mut [u8], seg_off: u64) -> crate::Result<()> {
        log::trace!("reading {} bytes of segment {hash} at {seg_off}", dst.len());

        let (path, scratch) = self.materialize_segment(hash)?;

        let result = (|| -> crate::Result<()> {
            let file = File::open(&path)?;
            file.read_exact_at(dst, seg_off)?;
            Ok(())
        })();

        if scratch {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("could not remove scratch file {}: {e}", path.display());
            }
        }

        result
    }

    /// Makes a segment's decompressed bytes available in a local file.
    ///
    /// Cache hits are touched; misses are fetched into the cache after
    /// eviction made room. A segment the cache cannot hold goes to the
    /// scratch file instead, which the caller deletes after use.
    fn materialize_segment(&mut self, hash: &SegmentHash) -> crate::Result<(PathBuf, bool)> {
        let info = self
            .store
            .get(hash)
            .ok_or_else(|| crate::Error::SegmentMissing(hash.clone()))?;

        if self.cache.is_enabled() {
            if self.cache.contains(hash) {
                self.cache.touch(hash);
                return Ok((self.cache.file(hash), false));
            }

            if self.cache.make_room(u64::from(info.length)) {
                let target = self.cache.file(hash);
                self.fetch_segment(hash, &target)?;
                self.cache.insert(hash.clone(), u64::from(info.length));
                return Ok((target, false));
            }

            log::debug!("segment {hash} does not fit the cache budget");
        }

        let scratch = self.paths.scratch();
        self.fetch_segment(hash, &scratch)?;

        Ok((scratch, true))
    }

    /// Downloads a segment into `target`, inflating it if compression is on.
    fn fetch_segment(&self, hash: &SegmentHash, target: &Path) -> crate::Result<()> {
        let result = (|| -> crate::Result<()> {
            match &self.config.compression {
                Some(compressor) => {
                    let mut deflated = vec![];
                    self.gateway
                        .get(hash.bucket(), hash.object_key(), &mut deflated)?;

                    let mut target_file = File::create(target)?;
                    compression::inflate(&mut Cursor::new(deflated), &mut target_file, compressor)?;
                }
                None => {
                    let mut target_file = File::create(target)?;
                    self.gateway
                        .get(hash.bucket(), hash.object_key(), &mut target_file)?;
                }
            }
            Ok(())
        })();

        if result.is_err() {
            let _ = std::fs::remove_file(target);
        }

        result
    }

    /// Pulls the file's tail segment out of the cloud into a fresh
    /// data-spill, removing it from metadata and the segment table, so
    /// appends land on top of already-present bytes.
    pub(crate) fn pull_last_segment(
        &mut self,
        spill: &Path,
        meta_file: &File,
    ) -> crate::Result<()> {
        let hash = meta::last_segment(meta_file)?;
        log::debug!("pulling tail segment {hash} back from the cloud");

        if self.store.get(&hash).is_none() {
            return Err(crate::Error::SegmentMissing(hash));
        }

        self.fetch_segment(&hash, spill)?;

        if let Err(e) = meta::truncate_last_segment(meta_file) {
            let _ = std::fs::remove_file(spill);
            return Err(e);
        }

        self.drop_reference(&hash);
        self.store.persist()?;

        Ok(())
    }

    /// Drops one reference to every segment a metadata record lists,
    /// deleting objects and cache entries that become unreferenced.
    pub(crate) fn unlink_segments(&mut self, meta_path: &Path) -> crate::Result<()> {
        let meta_file = File::open(meta_path)?;

        for hash in meta::SegmentListReader::new(&meta_file)? {
            let hash = hash?;
            log::trace!("unlinking segment {hash}");
            self.drop_reference(&hash);
        }

        self.store.persist()?;

        Ok(())
    }

    /// Decrements a segment's refcount; at zero, removes the cached bytes
    /// and the stored object.
    ///
    /// A hash missing from the table is skipped: a crashed migration may
    /// leave metadata one record ahead of the table.
    fn drop_reference(&mut self, hash: &SegmentHash) {
        if self.store.get(hash).is_none() {
            log::warn!("segment {hash} is not in the table, skipping");
            return;
        }

        if self.store.decref(hash) {
            self.cache.remove(hash);

            if let Err(e) = self.gateway.delete(hash.bucket(), hash.object_key()) {
                log::warn!("could not delete object of segment {hash}: {e:?}");
            }
        }
    }
}
