// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use path_absolutize::Absolutize;
use std::{
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};

pub const CACHE_FOLDER: &str = ".cache";
pub const HASH_TABLE_FILE: &str = ".hash_table";
const SCRATCH_FILE: &str = ".segment_temp";

/// Derives the local-device paths backing a logical file.
///
/// Metadata and data-spill files are named from the proxy's inode number,
/// so they live flat in the SSD root without path collisions or directory
/// permission concerns. The proxy itself mirrors the logical path.
#[derive(Clone, Debug)]
pub struct PathMap {
    ssd_root: PathBuf,
}

impl PathMap {
    pub(crate) fn new<P: AsRef<Path>>(ssd_root: P) -> Self {
        let ssd_root = ssd_root
            .as_ref()
            .absolutize()
            .map(Into::into)
            .unwrap_or_else(|_| ssd_root.as_ref().into());

        Self { ssd_root }
    }

    /// Root of the local device.
    #[must_use]
    pub fn ssd_root(&self) -> &Path {
        &self.ssd_root
    }

    /// The proxy inode carrying a logical file's dirent, mode and ownership.
    #[must_use]
    pub fn proxy(&self, logical: &Path) -> PathBuf {
        let relative = logical.strip_prefix("/").unwrap_or(logical);
        self.ssd_root.join(relative)
    }

    /// Inode number of a logical file's proxy.
    pub(crate) fn inode(&self, logical: &Path) -> std::io::Result<u64> {
        Ok(std::fs::metadata(self.proxy(logical))?.ino())
    }

    /// Metadata file for a logical path. Fails if the proxy cannot be
    /// stat'd; callers holding an already-stat'd inode use
    /// [`PathMap::meta_for_inode`] instead.
    pub(crate) fn meta(&self, logical: &Path) -> std::io::Result<PathBuf> {
        Ok(self.meta_for_inode(self.inode(logical)?))
    }

    /// Metadata file for an inode, resolvable even after the proxy is gone.
    pub(crate) fn meta_for_inode(&self, inode: u64) -> PathBuf {
        self.ssd_root.join(format!(".{inode:x}"))
    }

    /// Data-spill file for a logical path.
    pub(crate) fn spill(&self, logical: &Path) -> std::io::Result<PathBuf> {
        Ok(self.spill_for_inode(self.inode(logical)?))
    }

    /// Data-spill file for an inode.
    pub(crate) fn spill_for_inode(&self, inode: u64) -> PathBuf {
        self.ssd_root.join(format!(".{inode:x}_data"))
    }

    /// Directory holding cached segments; the cache names its files by
    /// hash inside it.
    pub(crate) fn cache_dir(&self) -> PathBuf {
        self.ssd_root.join(CACHE_FOLDER)
    }

    /// The persistent segment table.
    pub(crate) fn hash_table(&self) -> PathBuf {
        self.ssd_root.join(HASH_TABLE_FILE)
    }

    /// Fixed-name scratch file for uncached segment materialisation.
    ///
    /// Single-threaded dispatch makes the fixed name collision-free.
    pub(crate) fn scratch(&self) -> PathBuf {
        self.ssd_root.join(SCRATCH_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_mirrors_logical_path() {
        let map = PathMap::new("/ssd");
        assert_eq!(Path::new("/ssd/dir/file"), map.proxy(Path::new("/dir/file")));
        assert_eq!(Path::new("/ssd/file"), map.proxy(Path::new("file")));
    }

    #[test]
    fn hidden_files_sit_in_the_root() {
        let map = PathMap::new("/ssd");
        assert_eq!(Path::new("/ssd/.2a"), map.meta_for_inode(42));
        assert_eq!(Path::new("/ssd/.2a_data"), map.spill_for_inode(42));
        assert_eq!(Path::new("/ssd/.hash_table"), map.hash_table());
    }
}
