// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

#![allow(dead_code)]

use cloudfs::{AccessMode, CloudFs, Config, DeflateCompressor, MemoryCloud};
use std::path::Path;

pub type TestFs = CloudFs<MemoryCloud, DeflateCompressor>;

/// SSD root, mount point and object store shared across remounts.
pub struct TestBed {
    pub ssd: tempfile::TempDir,
    pub mnt: tempfile::TempDir,
    pub cloud: MemoryCloud,
}

impl TestBed {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            ssd: tempfile::tempdir()?,
            mnt: tempfile::tempdir()?,
            cloud: MemoryCloud::default(),
        })
    }

    pub fn config(&self) -> Config<DeflateCompressor> {
        Config::new(self.ssd.path(), self.mnt.path())
    }

    pub fn mount(&self, config: Config<DeflateCompressor>) -> cloudfs::Result<TestFs> {
        CloudFs::mount(config, self.cloud.clone())
    }
}

/// Creates a file and writes its initial content through one open cycle.
pub fn create_file(fs: &mut TestFs, path: &Path, content: &[u8]) -> cloudfs::Result<()> {
    fs.mknod(path, 0o644)?;

    let fd = fs.open(path, AccessMode::WriteOnly)?;
    fs.write(path, fd, content, 0)?;
    fs.release(path, fd)?;

    Ok(())
}

/// Appends to an existing file through one open cycle.
pub fn append_file(fs: &mut TestFs, path: &Path, content: &[u8]) -> cloudfs::Result<()> {
    let end = fs.getattr(path)?.size;

    let fd = fs.open(path, AccessMode::WriteOnly)?;
    fs.write(path, fd, content, end)?;
    fs.release(path, fd)?;

    Ok(())
}

/// Reads a file back in full.
pub fn read_all(fs: &mut TestFs, path: &Path) -> cloudfs::Result<Vec<u8>> {
    let size = fs.getattr(path)?.size as usize;

    let fd = fs.open(path, AccessMode::ReadOnly)?;
    let mut buf = vec![0u8; size];
    let n = fs.read(path, fd, &mut buf, 0)?;
    buf.truncate(n);
    fs.release(path, fd)?;

    Ok(buf)
}

/// Reads a file back through many small reads at increasing offsets.
pub fn read_chunked(fs: &mut TestFs, path: &Path, chunk: usize) -> cloudfs::Result<Vec<u8>> {
    let fd = fs.open(path, AccessMode::ReadOnly)?;

    let mut out = vec![];
    let mut offset = 0u64;

    loop {
        let mut buf = vec![0u8; chunk];
        let n = fs.read(path, fd, &mut buf, offset)?;
        if n == 0 {
            break;
        }
        buf.truncate(n);
        out.extend_from_slice(&buf);
        offset += n as u64;
    }

    fs.release(path, fd)?;

    Ok(out)
}
