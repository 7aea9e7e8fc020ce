// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    chunker::Chunker,
    compression::Compressor,
    config::Config,
    gateway::{CloudGateway, ObjectStore},
    handle::{AccessMode, Handle, HandleId, OpenHandle},
    meta,
    path_map::PathMap,
    segment_cache::SegmentCache,
    segment_store::SegmentStore,
    HashMap,
};
use std::{
    ffi::OsString,
    fs::File,
    os::unix::fs::{DirBuilderExt, FileExt, MetadataExt, OpenOptionsExt, PermissionsExt},
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

const EBADF: i32 = 9;
const ENOTDIR: i32 = 20;

/// Stat view of a logical file, merged from the proxy inode and (for
/// cloud-tier files) the metadata record.
#[derive(Clone, Copy, Debug)]
pub struct FileAttr {
    /// Proxy inode number
    pub ino: u64,

    /// Mode including the file type bits
    pub mode: u32,

    /// Hard link count
    pub nlink: u64,

    /// Owning user
    pub uid: u32,

    /// Owning group
    pub gid: u32,

    /// Logical size
    pub size: u64,

    /// 512-byte blocks
    pub blocks: u64,

    /// Last access, seconds since the epoch
    pub atime: i64,

    /// Last data change
    pub mtime: i64,

    /// Last attribute change
    pub ctime: i64,
}

/// One timestamp argument of a `utimens` call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SetTime {
    /// Use the current time
    Now,

    /// Leave the timestamp untouched
    Omit,

    /// Explicit seconds since the epoch
    Unix(i64),
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn bad_fd() -> crate::Error {
    crate::Error::Io(std::io::Error::from_raw_os_error(EBADF))
}

fn open_with_mode(path: &Path, mode: AccessMode) -> std::io::Result<File> {
    File::options()
        .read(mode.is_read())
        .write(mode.is_write())
        .open(path)
}

/// `pread` that retries short reads; returns the bytes read before EOF.
fn read_at_full(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    let mut total = 0;

    while total < buf.len() {
        let (_, dst) = buf.split_at_mut(total);
        let n = file.read_at(dst, offset + total as u64)?;
        if n == 0 {
            break;
        }
        total += n;
    }

    Ok(total)
}

/// Bucket name of a whole-file object: a weak hash of the logical path.
///
/// Collision-prone by construction; kept for compatibility with the
/// whole-file layout, and unsafe for adversarial paths.
pub(crate) fn weak_bucket(logical: &Path) -> String {
    let s = logical.to_string_lossy();

    let weak: usize = s
        .bytes()
        .enumerate()
        .filter(|(_, b)| *b == b'+')
        .map(|(i, _)| i)
        .sum();

    format!("{}", s.len() + weak + 100)
}

/// Object key of a whole-file object: the logical path with `/` folded away.
pub(crate) fn whole_file_key(logical: &Path) -> String {
    logical.to_string_lossy().replace('/', "+")
}

/// The tiered filesystem engine.
///
/// Files at or below the configured threshold live wholly in their proxy
/// inode on the local device. Larger files are promoted on release:
/// chunked, deduplicated, optionally compressed and stored as objects,
/// with only the proxy, a metadata record and (while being appended to) a
/// data-spill remaining local. A file is cloud-tier exactly when its
/// metadata record exists.
///
/// The host dispatches one request at a time, so all shared state is
/// plain: methods take `&mut self` and there are no locks.
pub struct CloudFs<S: ObjectStore, C: Compressor + Clone> {
    pub(crate) config: Config<C>,
    pub(crate) paths: PathMap,
    pub(crate) gateway: CloudGateway<S>,
    pub(crate) store: SegmentStore,
    pub(crate) cache: SegmentCache,
    pub(crate) chunker: Chunker,

    pub(crate) handles: HashMap<HandleId, Handle>,

    /// Write-capable opens per proxy inode
    pub(crate) open_refs: HashMap<u64, u32>,

    next_handle: HandleId,
}

impl<S: ObjectStore, C: Compressor + Clone> CloudFs<S, C> {
    /// Mounts the engine over the local device root, recovering the
    /// segment table and cache from a previous mount.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn mount(config: Config<C>, cloud: S) -> crate::Result<Self> {
        let paths = PathMap::new(&config.ssd_root);
        std::fs::create_dir_all(paths.ssd_root())?;

        log::info!(
            "mounting cloudfs: ssd root {}, threshold {} bytes",
            paths.ssd_root().display(),
            config.threshold,
        );

        let mut cache = SegmentCache::create(
            paths.cache_dir(),
            config.cache_size,
            config.max_seg_size(),
            config.no_cache,
        );

        let mut store = SegmentStore::new(paths.hash_table());
        if !config.no_dedup {
            store.reload(&mut cache)?;
        }

        let chunker = Chunker::new(config.rabin_window, config.avg_seg_size);

        Ok(Self {
            config,
            paths,
            gateway: CloudGateway::new(cloud),
            store,
            cache,
            chunker,
            handles: HashMap::default(),
            open_refs: HashMap::default(),
            next_handle: 1,
        })
    }

    /// Flushes the segment table before unmount.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn destroy(&mut self) -> crate::Result<()> {
        if !self.config.no_dedup {
            self.store.persist()?;
        }
        Ok(())
    }

    #[doc(hidden)]
    #[must_use]
    pub fn segment_table(&self) -> &SegmentStore {
        &self.store
    }

    #[doc(hidden)]
    #[must_use]
    pub fn segment_cache(&self) -> &SegmentCache {
        &self.cache
    }

    #[doc(hidden)]
    pub fn segment_hashes(&self, logical: &Path) -> crate::Result<Vec<crate::SegmentHash>> {
        let meta_path = self.paths.meta(logical)?;
        let meta_file = File::open(meta_path)?;
        meta::SegmentListReader::new(&meta_file)?.collect()
    }

    /// The path derivation in use.
    #[must_use]
    pub fn path_map(&self) -> &PathMap {
        &self.paths
    }

    fn next_handle_id(&mut self) -> HandleId {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    fn file_handle(&self, id: HandleId) -> crate::Result<&OpenHandle> {
        match self.handles.get(&id) {
            Some(Handle::File(handle)) => Ok(handle),
            _ => Err(bad_fd()),
        }
    }

    fn file_handle_mut(&mut self, id: HandleId) -> crate::Result<&mut OpenHandle> {
        match self.handles.get_mut(&id) {
            Some(Handle::File(handle)) => Ok(handle),
            _ => Err(bad_fd()),
        }
    }

    /// Returns the metadata path if the file is cloud-tier.
    ///
    /// The metadata file's existence is the sole source of truth for the
    /// tier, derived fresh on every call.
    fn meta_if_cloud(&self, logical: &Path) -> crate::Result<Option<PathBuf>> {
        let meta = self.paths.meta(logical)?;
        Ok(meta.try_exists()?.then_some(meta))
    }

    /// Creates a file's proxy inode.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn mknod(&mut self, logical: &Path, mode: u32) -> crate::Result<()> {
        log::trace!("mknod {}", logical.display());

        File::options()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(self.paths.proxy(logical))?;

        Ok(())
    }

    /// Opens a logical file.
    ///
    /// Local-tier opens hold the proxy. Cloud-tier read opens hold no fd
    /// at all; cloud-tier write opens get their data-spill lazily on the
    /// first write. Only write-capable opens join the per-inode refcount
    /// that gates migration on release.
    ///
    /// # Errors
    ///
    /// Will return `Err` if access is denied or an IO error occurs.
    pub fn open(&mut self, logical: &Path, mode: AccessMode) -> crate::Result<HandleId> {
        log::trace!("open {} ({mode:?})", logical.display());

        let proxy = self.paths.proxy(logical);
        let ino = self.paths.inode(logical)?;
        let meta = self.meta_if_cloud(logical)?;

        let file = match meta {
            None => Some(open_with_mode(&proxy, mode)?),
            Some(_) if self.config.no_dedup => Some(self.open_whole_file(logical, ino)?),
            Some(_) => {
                // Permission check only; cloud-tier bytes are served
                // through the segment path
                drop(open_with_mode(&proxy, mode)?);
                None
            }
        };

        if mode.is_write() || self.config.no_dedup {
            *self.open_refs.entry(ino).or_insert(0) += 1;
        }

        let id = self.next_handle_id();
        self.handles
            .insert(id, Handle::File(OpenHandle { file, mode, ino }));

        Ok(id)
    }

    /// Whole-file mode: materialise the entire object into the data-spill.
    fn open_whole_file(&mut self, logical: &Path, ino: u64) -> crate::Result<File> {
        let spill = self.paths.spill_for_inode(ino);
        let populated = spill.try_exists()?;

        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .open(&spill)?;

        if !populated {
            let bucket = weak_bucket(logical);
            let key = whole_file_key(logical);

            if let Err(e) = self.gateway.get(&bucket, &key, &mut &file) {
                drop(file);
                let _ = std::fs::remove_file(&spill);
                return Err(e);
            }
        }

        Ok(file)
    }

    /// Reads from a logical file at an offset.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn read(
        &mut self,
        logical: &Path,
        handle: HandleId,
        buf: &mut [u8],
        offset: u64,
    ) -> crate::Result<usize> {
        log::trace!(
            "read {} bytes at {offset} from {}",
            buf.len(),
            logical.display()
        );

        let Some(meta_path) = self.meta_if_cloud(logical)? else {
            let handle = self.file_handle(handle)?;

            let n = match &handle.file {
                Some(file) => read_at_full(file, buf, offset)?,
                None => {
                    let file = File::open(self.paths.proxy(logical))?;
                    read_at_full(&file, buf, offset)?
                }
            };

            return Ok(n);
        };

        let n = if self.config.no_dedup {
            let handle = self.file_handle(handle)?;
            let file = handle.file.as_ref().ok_or_else(bad_fd)?;
            read_at_full(file, buf, offset)?
        } else {
            self.dedup_read(logical, buf, offset)?
        };

        let meta_file = File::options().write(true).open(meta_path)?;
        meta::set_atime(&meta_file, unix_now())?;

        Ok(n)
    }

    /// Writes to a logical file.
    ///
    /// Local-tier writes are positional into the proxy. Cloud-tier writes
    /// append to the data-spill, pulling the file's tail segment back
    /// from the cloud first if the spill does not exist yet; a spill
    /// grown past the maximum segment size is migrated eagerly.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn write(
        &mut self,
        logical: &Path,
        handle: HandleId,
        buf: &[u8],
        offset: u64,
    ) -> crate::Result<usize> {
        log::trace!(
            "write {} bytes at {offset} to {}",
            buf.len(),
            logical.display()
        );

        let Some(meta_path) = self.meta_if_cloud(logical)? else {
            let handle = self.file_handle(handle)?;
            let file = handle.file.as_ref().ok_or_else(bad_fd)?;
            file.write_all_at(buf, offset)?;
            return Ok(buf.len());
        };

        let meta_file = File::options().read(true).write(true).open(&meta_path)?;

        if self.config.no_dedup {
            let handle = self.file_handle(handle)?;
            let file = handle.file.as_ref().ok_or_else(bad_fd)?;
            file.write_all_at(buf, offset)?;
            meta::set_size(&meta_file, file.metadata()?.len())?;
        } else {
            self.append_to_spill(logical, handle, &meta_file, buf)?;
        }

        let now = unix_now();
        meta::set_mtime(&meta_file, now)?;
        meta::set_ctime(&meta_file, now)?;

        Ok(buf.len())
    }

    /// Appends to the data-spill, creating and prefilling it on first use.
    fn append_to_spill(
        &mut self,
        logical: &Path,
        handle: HandleId,
        meta_file: &File,
        buf: &[u8],
    ) -> crate::Result<()> {
        let ino = self.file_handle(handle)?.ino;
        let spill_path = self.paths.spill_for_inode(ino);

        if self.file_handle(handle)?.file.is_none() {
            if !spill_path.try_exists()? {
                if meta::segment_count(meta_file)? == 0 {
                    File::create(&spill_path)?;
                } else {
                    self.pull_last_segment(&spill_path, meta_file)?;
                }
            }

            let file = File::options().read(true).write(true).open(&spill_path)?;
            self.file_handle_mut(handle)?.file = Some(file);
        }

        let spill_len = {
            let handle = self.file_handle(handle)?;
            let file = handle.file.as_ref().ok_or_else(bad_fd)?;

            let end = file.metadata()?.len();
            file.write_all_at(buf, end)?;
            end + buf.len() as u64
        };

        let new_size = meta::read_size(meta_file)? + buf.len() as u64;
        meta::set_size(meta_file, new_size)?;

        // An overgrown spill is segmented eagerly; the unfinished tail
        // lands in a fresh spill, so the handle's fd is stale after this
        if spill_len >= u64::from(self.config.max_seg_size()) {
            self.file_handle_mut(handle)?.file = None;
            self.migrate_file(logical, &spill_path, false, false)?;
        }

        Ok(())
    }

    /// Closes a handle; the last write-capable close of an over-threshold
    /// file promotes it to the cloud.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn release(&mut self, logical: &Path, handle: HandleId) -> crate::Result<()> {
        log::trace!("release {}", logical.display());

        let handle = match self.handles.remove(&handle) {
            Some(Handle::File(entry)) => entry,
            Some(other) => {
                self.handles.insert(handle, other);
                return Err(bad_fd());
            }
            None => return Err(bad_fd()),
        };

        if !(handle.mode.is_write() || self.config.no_dedup) {
            return Ok(());
        }

        let ino = handle.ino;
        drop(handle);

        let remaining = match self.open_refs.get_mut(&ino) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => 0,
        };

        if remaining > 0 {
            return Ok(());
        }
        self.open_refs.remove(&ino);

        let proxy = self.paths.proxy(logical);
        let meta_path = self.paths.meta_for_inode(ino);
        let is_local = !meta_path.try_exists()?;

        if is_local {
            let size = std::fs::metadata(&proxy)?.len();
            if size <= self.config.threshold {
                return Ok(());
            }

            log::debug!(
                "promoting {} ({size} bytes) to the cloud",
                logical.display()
            );

            if self.config.no_dedup {
                self.upload_whole_file(logical, &proxy, true)?;
            } else {
                self.migrate_file(logical, &proxy, true, true)?;
            }
        } else {
            let spill = self.paths.spill_for_inode(ino);
            if !spill.try_exists()? {
                return Ok(());
            }

            if self.config.no_dedup {
                self.upload_whole_file(logical, &spill, false)?;
            } else {
                self.migrate_file(logical, &spill, false, true)?;
            }

            std::fs::remove_file(spill)?;
        }

        Ok(())
    }

    /// Whole-file mode: upload the entire body as one object.
    fn upload_whole_file(
        &mut self,
        logical: &Path,
        source: &Path,
        is_proxy: bool,
    ) -> crate::Result<()> {
        let bucket = weak_bucket(logical);
        let key = whole_file_key(logical);

        self.gateway.ensure_bucket(&bucket)?;

        let st = std::fs::metadata(source)?;
        let mut file = File::open(source)?;
        self.gateway.put(&bucket, &key, st.len(), &mut file)?;

        if is_proxy {
            let meta_path = self.paths.meta(logical)?;
            let meta_file = File::options()
                .write(true)
                .create(true)
                .truncate(true)
                .open(meta_path)?;

            meta::write_header(
                &meta_file,
                &meta::MetaHeader {
                    size: st.len(),
                    atime: st.atime(),
                    mtime: st.mtime(),
                    ctime: st.ctime(),
                },
            )?;

            let proxy_file = File::options().write(true).open(source)?;
            proxy_file.set_len(0)?;
        }

        Ok(())
    }

    /// Removes a logical file: its segments' references, spill, metadata
    /// and proxy.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs; unlinking a missing path
    /// reports not-found.
    pub fn unlink(&mut self, logical: &Path) -> crate::Result<()> {
        log::trace!("unlink {}", logical.display());

        let proxy = self.paths.proxy(logical);
        let ino = self.paths.inode(logical)?;
        let meta_path = self.paths.meta_for_inode(ino);

        if meta_path.try_exists()? {
            if self.config.no_dedup {
                let bucket = weak_bucket(logical);
                let key = whole_file_key(logical);

                if let Err(e) = self.gateway.delete(&bucket, &key) {
                    log::warn!("could not delete whole-file object {bucket}/{key}: {e:?}");
                }
            } else {
                self.unlink_segments(&meta_path)?;
            }

            let spill = self.paths.spill_for_inode(ino);
            if spill.try_exists()? {
                std::fs::remove_file(spill)?;
            }

            std::fs::remove_file(&meta_path)?;
        }

        std::fs::remove_file(proxy)?;

        Ok(())
    }

    /// Stats a logical file.
    ///
    /// Ownership, mode and link count come from the proxy; size, block
    /// count and timestamps of cloud-tier files come from metadata.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn getattr(&self, logical: &Path) -> crate::Result<FileAttr> {
        let st = std::fs::metadata(self.paths.proxy(logical))?;

        let mut attr = FileAttr {
            ino: st.ino(),
            mode: st.mode(),
            nlink: st.nlink(),
            uid: st.uid(),
            gid: st.gid(),
            size: st.len(),
            blocks: st.blocks(),
            atime: st.atime(),
            mtime: st.mtime(),
            ctime: st.ctime(),
        };

        if !st.is_dir() {
            let meta_path = self.paths.meta_for_inode(st.ino());

            if meta_path.try_exists()? {
                let header = meta::read_header(&File::open(meta_path)?)?;

                attr.size = header.size;
                attr.blocks = header.size / 512;
                attr.atime = header.atime;
                attr.mtime = header.mtime;
                attr.ctime = header.ctime;
            }
        }

        Ok(attr)
    }

    /// Checks whether the file exists and, if a mode is given, whether it
    /// grants that access.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the check fails.
    pub fn access(&self, logical: &Path, mode: Option<AccessMode>) -> crate::Result<()> {
        let proxy = self.paths.proxy(logical);
        let st = std::fs::metadata(&proxy)?;

        let Some(mode) = mode else { return Ok(()) };

        if st.is_dir() {
            return Ok(());
        }

        if mode.is_read() {
            drop(File::open(&proxy)?);
        }
        if mode.is_write() {
            drop(File::options().write(true).open(&proxy)?);
        }

        Ok(())
    }

    /// Changes the file mode on the proxy; cloud-tier files also get
    /// their metadata ctime refreshed.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn chmod(&mut self, logical: &Path, mode: u32) -> crate::Result<()> {
        let proxy = self.paths.proxy(logical);
        std::fs::set_permissions(&proxy, std::fs::Permissions::from_mode(mode))?;

        let st = std::fs::metadata(&proxy)?;
        if st.is_dir() {
            return Ok(());
        }

        let meta_path = self.paths.meta_for_inode(st.ino());
        if meta_path.try_exists()? {
            let meta_file = File::options().write(true).open(meta_path)?;
            meta::set_ctime(&meta_file, unix_now())?;
        }

        Ok(())
    }

    /// Sets access/modification times; for cloud-tier files the canonical
    /// timestamps live in the metadata record.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn utimens(
        &mut self,
        logical: &Path,
        atime: SetTime,
        mtime: SetTime,
    ) -> crate::Result<()> {
        let proxy = self.paths.proxy(logical);
        let st = std::fs::metadata(&proxy)?;
        let meta_path = self.paths.meta_for_inode(st.ino());

        if st.is_dir() || !meta_path.try_exists()? {
            let mut times = std::fs::FileTimes::new();

            if let Some(t) = system_time(atime) {
                times = times.set_accessed(t);
            }
            if let Some(t) = system_time(mtime) {
                times = times.set_modified(t);
            }

            File::open(&proxy)?.set_times(times)?;
            return Ok(());
        }

        let meta_file = File::options().write(true).open(meta_path)?;

        match atime {
            SetTime::Omit => {}
            SetTime::Now => meta::set_atime(&meta_file, unix_now())?,
            SetTime::Unix(t) => meta::set_atime(&meta_file, t)?,
        }
        match mtime {
            SetTime::Omit => {}
            SetTime::Now => meta::set_mtime(&meta_file, unix_now())?,
            SetTime::Unix(t) => meta::set_mtime(&meta_file, t)?,
        }

        Ok(())
    }

    /// Resolves the proxy path for an extended-attribute read. The host
    /// performs the attribute I/O itself.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file does not exist.
    pub fn getxattr(&self, logical: &Path) -> crate::Result<PathBuf> {
        let proxy = self.paths.proxy(logical);
        std::fs::metadata(&proxy)?;
        Ok(proxy)
    }

    /// Resolves the proxy path for an extended-attribute update and
    /// records the attribute-change time for cloud-tier files.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn setxattr(&mut self, logical: &Path) -> crate::Result<PathBuf> {
        let proxy = self.paths.proxy(logical);
        let st = std::fs::metadata(&proxy)?;

        if !st.is_dir() {
            let meta_path = self.paths.meta_for_inode(st.ino());
            if meta_path.try_exists()? {
                let meta_file = File::options().write(true).open(meta_path)?;
                meta::set_ctime(&meta_file, unix_now())?;
            }
        }

        Ok(proxy)
    }

    /// Creates a directory in the proxy tree.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn mkdir(&mut self, logical: &Path, mode: u32) -> crate::Result<()> {
        std::fs::DirBuilder::new()
            .mode(mode)
            .create(self.paths.proxy(logical))?;
        Ok(())
    }

    /// Removes a directory from the proxy tree.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn rmdir(&mut self, logical: &Path) -> crate::Result<()> {
        std::fs::remove_dir(self.paths.proxy(logical))?;
        Ok(())
    }

    /// Opens a directory for listing.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the path is not a directory.
    pub fn opendir(&mut self, logical: &Path) -> crate::Result<HandleId> {
        let proxy = self.paths.proxy(logical);

        if !std::fs::metadata(&proxy)?.is_dir() {
            return Err(crate::Error::Io(std::io::Error::from_raw_os_error(ENOTDIR)));
        }

        let id = self.next_handle_id();
        self.handles.insert(id, Handle::Dir(proxy));

        Ok(id)
    }

    /// Lists an open directory.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the handle is not an open directory.
    pub fn readdir(&self, handle: HandleId) -> crate::Result<Vec<OsString>> {
        let Some(Handle::Dir(path)) = self.handles.get(&handle) else {
            return Err(bad_fd());
        };

        let mut names = vec![OsString::from("."), OsString::from("..")];

        for entry in std::fs::read_dir(path)? {
            names.push(entry?.file_name());
        }

        Ok(names)
    }

    /// Closes a directory handle.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the handle is not an open directory.
    pub fn releasedir(&mut self, handle: HandleId) -> crate::Result<()> {
        match self.handles.remove(&handle) {
            Some(Handle::Dir(_)) => Ok(()),
            Some(other) => {
                self.handles.insert(handle, other);
                Err(bad_fd())
            }
            None => Err(bad_fd()),
        }
    }
}

fn system_time(t: SetTime) -> Option<SystemTime> {
    match t {
        SetTime::Omit => None,
        SetTime::Now => Some(SystemTime::now()),
        SetTime::Unix(secs) => {
            if secs >= 0 {
                UNIX_EPOCH.checked_add(Duration::from_secs(secs as u64))
            } else {
                UNIX_EPOCH.checked_sub(Duration::from_secs(secs.unsigned_abs()))
            }
        }
    }
}

impl<S: ObjectStore, C: Compressor + Clone> Drop for CloudFs<S, C> {
    fn drop(&mut self) {
        if !self.config.no_dedup {
            if let Err(e) = self.store.persist() {
                log::warn!("could not persist segment table on drop: {e:?}");
            }
        }
    }
}
