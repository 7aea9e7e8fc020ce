// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Typed access to the on-disk metadata record.
//!
//! A cloud-tier file's metadata starts with a fixed header (`size: u64`,
//! then `atime`/`mtime`/`ctime` as `i64`, all little-endian), followed by
//! the segment list as contiguous 33-byte hash records in file order, with
//! no trailing delimiter. All I/O here is positional; no other module does
//! offset arithmetic on metadata.

use crate::segment_hash::{SegmentHash, SEGMENT_HASH_LEN};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::{fs::File, io::Cursor, os::unix::fs::FileExt};

const SIZE_OFFSET: u64 = 0;
const ATIME_OFFSET: u64 = 8;
const MTIME_OFFSET: u64 = 16;
const CTIME_OFFSET: u64 = 24;

/// Byte length of the fixed header prefix.
pub const HEADER_LEN: u64 = 32;

macro_rules! fail_iter {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => return Some(Err(e.into())),
        }
    };
}

/// Fixed metadata prefix: canonical size and timestamps of a cloud-tier file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MetaHeader {
    /// Logical file size
    pub size: u64,

    /// Last access, seconds since the epoch
    pub atime: i64,

    /// Last data change
    pub mtime: i64,

    /// Last attribute change
    pub ctime: i64,
}

pub(crate) fn read_header(file: &File) -> crate::Result<MetaHeader> {
    let mut buf = [0u8; HEADER_LEN as usize];
    file.read_exact_at(&mut buf, SIZE_OFFSET)
        .map_err(|_| crate::Error::CorruptMetadata("metadata header"))?;

    let mut cursor = Cursor::new(buf.as_slice());

    Ok(MetaHeader {
        size: cursor.read_u64::<LittleEndian>()?,
        atime: cursor.read_i64::<LittleEndian>()?,
        mtime: cursor.read_i64::<LittleEndian>()?,
        ctime: cursor.read_i64::<LittleEndian>()?,
    })
}

pub(crate) fn write_header(file: &File, header: &MetaHeader) -> crate::Result<()> {
    let mut buf = Vec::with_capacity(HEADER_LEN as usize);
    buf.write_u64::<LittleEndian>(header.size)?;
    buf.write_i64::<LittleEndian>(header.atime)?;
    buf.write_i64::<LittleEndian>(header.mtime)?;
    buf.write_i64::<LittleEndian>(header.ctime)?;

    file.write_all_at(&buf, SIZE_OFFSET)?;

    Ok(())
}

pub(crate) fn read_size(file: &File) -> crate::Result<u64> {
    let mut buf = [0u8; 8];
    file.read_exact_at(&mut buf, SIZE_OFFSET)
        .map_err(|_| crate::Error::CorruptMetadata("metadata size field"))?;

    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn set_size(file: &File, size: u64) -> crate::Result<()> {
    file.write_all_at(&size.to_le_bytes(), SIZE_OFFSET)?;
    Ok(())
}

pub(crate) fn set_atime(file: &File, atime: i64) -> crate::Result<()> {
    file.write_all_at(&atime.to_le_bytes(), ATIME_OFFSET)?;
    Ok(())
}

pub(crate) fn set_mtime(file: &File, mtime: i64) -> crate::Result<()> {
    file.write_all_at(&mtime.to_le_bytes(), MTIME_OFFSET)?;
    Ok(())
}

pub(crate) fn set_ctime(file: &File, ctime: i64) -> crate::Result<()> {
    file.write_all_at(&ctime.to_le_bytes(), CTIME_OFFSET)?;
    Ok(())
}

/// Number of hashes in the segment list.
pub(crate) fn segment_count(file: &File) -> crate::Result<u64> {
    let len = file.metadata()?.len();

    if len < HEADER_LEN {
        return Err(crate::Error::CorruptMetadata("metadata shorter than header"));
    }

    Ok((len - HEADER_LEN) / SEGMENT_HASH_LEN as u64)
}

/// Appends a hash to the segment list as a single 33-byte write.
pub(crate) fn append_segment(file: &File, hash: &SegmentHash) -> crate::Result<()> {
    let mut record = Vec::with_capacity(SEGMENT_HASH_LEN);
    hash.encode_into(&mut record)?;

    let end = file.metadata()?.len();
    file.write_all_at(&record, end)?;

    Ok(())
}

/// Reads the last hash of the segment list without removing it.
pub(crate) fn last_segment(file: &File) -> crate::Result<SegmentHash> {
    let len = file.metadata()?.len();

    if len < HEADER_LEN + SEGMENT_HASH_LEN as u64 {
        return Err(crate::Error::CorruptMetadata("empty segment list"));
    }

    let mut record = [0u8; SEGMENT_HASH_LEN];
    file.read_exact_at(&mut record, len - SEGMENT_HASH_LEN as u64)?;

    SegmentHash::decode(&record)
}

/// Removes and returns the last hash of the segment list.
pub(crate) fn truncate_last_segment(file: &File) -> crate::Result<SegmentHash> {
    let len = file.metadata()?.len();

    if len < HEADER_LEN + SEGMENT_HASH_LEN as u64 {
        return Err(crate::Error::CorruptMetadata("empty segment list"));
    }

    let mut record = [0u8; SEGMENT_HASH_LEN];
    let record_at = len - SEGMENT_HASH_LEN as u64;
    file.read_exact_at(&mut record, record_at)?;

    let hash = SegmentHash::decode(&record)?;
    file.set_len(record_at)?;

    Ok(hash)
}

/// Iterates the segment list in file order.
pub(crate) struct SegmentListReader<'a> {
    file: &'a File,
    offset: u64,
    len: u64,
    is_terminated: bool,
}

impl<'a> SegmentListReader<'a> {
    pub(crate) fn new(file: &'a File) -> crate::Result<Self> {
        Ok(Self {
            file,
            offset: HEADER_LEN,
            len: file.metadata()?.len(),
            is_terminated: false,
        })
    }
}

impl Iterator for SegmentListReader<'_> {
    type Item = crate::Result<SegmentHash>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_terminated || self.offset >= self.len {
            return None;
        }

        if self.len - self.offset < SEGMENT_HASH_LEN as u64 {
            self.is_terminated = true;
            return Some(Err(crate::Error::CorruptMetadata(
                "truncated segment list record",
            )));
        }

        let mut record = [0u8; SEGMENT_HASH_LEN];
        fail_iter!(self.file.read_exact_at(&mut record, self.offset));
        self.offset += SEGMENT_HASH_LEN as u64;

        Some(SegmentHash::decode(&record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn header_roundtrip() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.path().join("meta"))?;

        let header = MetaHeader {
            size: 123_456,
            atime: 1_700_000_000,
            mtime: 1_700_000_001,
            ctime: 1_700_000_002,
        };

        write_header(&file, &header)?;
        assert_eq!(header, read_header(&file)?);

        set_size(&file, 99)?;
        assert_eq!(99, read_size(&file)?);

        Ok(())
    }

    #[test]
    fn segment_list_append_and_truncate() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.path().join("meta"))?;

        write_header(&file, &MetaHeader {
            size: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
        })?;

        let first = SegmentHash::from_digest(md5::compute(b"first"));
        let second = SegmentHash::from_digest(md5::compute(b"second"));

        append_segment(&file, &first)?;
        append_segment(&file, &second)?;
        assert_eq!(2, segment_count(&file)?);

        let listed = SegmentListReader::new(&file)?.collect::<crate::Result<Vec<_>>>()?;
        assert_eq!(vec![first.clone(), second.clone()], listed);

        assert_eq!(second, truncate_last_segment(&file)?);
        assert_eq!(1, segment_count(&file)?);

        let listed = SegmentListReader::new(&file)?.collect::<crate::Result<Vec<_>>>()?;
        assert_eq!(vec![first], listed);

        Ok(())
    }
}
