// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::{fs::File, path::PathBuf};

/// Identifies an open file or directory across host upcalls.
pub type HandleId = u64;

/// Requested access of an `open` call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessMode {
    /// Read access only
    ReadOnly,

    /// Write access only
    WriteOnly,

    /// Read and write access
    ReadWrite,
}

impl AccessMode {
    /// Whether this mode can modify the file.
    #[must_use]
    pub fn is_write(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }

    /// Whether this mode can read the file.
    #[must_use]
    pub fn is_read(self) -> bool {
        !matches!(self, Self::WriteOnly)
    }
}

/// Per-open state of a logical file.
///
/// Local-tier opens hold the proxy fd. Cloud-tier write opens hold the
/// data-spill fd once the first write creates it; cloud-tier read opens
/// hold nothing, since their bytes come through the segment path.
pub(crate) struct OpenHandle {
    pub file: Option<File>,
    pub mode: AccessMode,
    pub ino: u64,
}

/// A handle held by the host: an open file or an open directory.
pub(crate) enum Handle {
    File(OpenHandle),
    Dir(PathBuf),
}
