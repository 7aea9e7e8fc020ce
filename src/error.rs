// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::segment_hash::SegmentHash;

/// Represents errors that can occur in the tiering engine
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error on the local device
    Io(std::io::Error),

    /// The object store returned a non-OK status
    Cloud(CloudStatus),

    /// Malformed metadata or segment-table record
    CorruptMetadata(&'static str),

    /// A hash listed in metadata is missing from the segment table
    SegmentMissing(SegmentHash),

    /// Compression failed
    Compress,

    /// Decompression failed
    Decompress,
}

/// Status reported by the object store for a failed operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloudStatus(pub String);

impl std::fmt::Display for CloudStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CloudFsError: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Cloud(_)
            | Self::CorruptMetadata(_)
            | Self::SegmentMissing(_)
            | Self::Compress
            | Self::Decompress => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

const EIO: i32 = 5;

impl Error {
    /// Maps the error to a negated POSIX error number for the filesystem host.
    ///
    /// Local I/O failures carry their original errno; everything else
    /// collapses to `-EIO`.
    #[must_use]
    pub fn to_errno(&self) -> i32 {
        match self {
            Self::Io(e) => -e.raw_os_error().unwrap_or(EIO),
            Self::Cloud(_)
            | Self::CorruptMetadata(_)
            | Self::SegmentMissing(_)
            | Self::Compress
            | Self::Decompress => -EIO,
        }
    }
}

/// Tiering engine result
pub type Result<T> = std::result::Result<T, Error>;
