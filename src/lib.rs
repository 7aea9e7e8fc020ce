// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! User-space tiered storage engine for a FUSE-style filesystem host.
//!
//! Files at or below a configured threshold live wholly on the fast local
//! device. Larger files are promoted on release: split into content-defined
//! segments, deduplicated across the whole namespace, optionally compressed
//! and stored as objects in a cloud object store. Only a zero-byte *proxy*
//! inode (carrying dirent, mode and ownership), a *metadata* record (size,
//! timestamps and the ordered segment list) and, while a file is being
//! appended to, a *data-spill* holding the not-yet-uploaded tail remain
//! local. A file is cloud-tier exactly when its metadata record exists.
//!
//! Segments are content-addressed by their MD5 and reference-counted in a
//! persistent segment table, so identical data across files is stored once.
//! A byte-bounded LRU cache of decompressed segments on the local device
//! absorbs repeated cloud fetches.
//!
//! The filesystem host dispatches one request at a time; the engine relies
//! on that and keeps all shared state lock-free behind `&mut self`.
//!
//! # Example usage
//!
//! ```
//! use cloudfs::{AccessMode, CloudFs, Config, DeflateCompressor, MemoryCloud};
//! use std::path::Path;
//!
//! # fn main() -> cloudfs::Result<()> {
//! # let ssd = tempfile::tempdir()?;
//! # let mnt = tempfile::tempdir()?;
//! let config = Config::new(ssd.path(), mnt.path())
//!     .threshold(64 * 1_024)
//!     .compression(Some(DeflateCompressor::default()));
//!
//! let mut fs = CloudFs::mount(config, MemoryCloud::default())?;
//!
//! let file = Path::new("/hello.txt");
//! fs.mknod(file, 0o644)?;
//!
//! let fd = fs.open(file, AccessMode::WriteOnly)?;
//! fs.write(file, fd, b"hello cloud", 0)?;
//! fs.release(file, fd)?;
//!
//! assert_eq!(11, fs.getattr(file)?.size);
//! #
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]

mod chunker;
mod compression;
mod config;
mod controller;
mod dedup;
mod error;
mod gateway;
mod handle;
mod meta;
mod path_map;
mod segment_cache;
mod segment_hash;
mod segment_store;

#[doc(hidden)]
pub mod mock;

pub(crate) type HashMap<K, V> = std::collections::HashMap<K, V, xxhash_rust::xxh3::Xxh3Builder>;

pub use {
    compression::{Compressor, DeflateCompressor},
    config::Config,
    controller::{CloudFs, FileAttr, SetTime},
    error::{CloudStatus, Error, Result},
    gateway::ObjectStore,
    handle::{AccessMode, HandleId},
    meta::MetaHeader,
    path_map::PathMap,
    segment_cache::SegmentCache,
    segment_hash::SegmentHash,
    segment_store::{SegmentInfo, SegmentStore},
};

#[doc(hidden)]
pub use mock::MemoryCloud;
