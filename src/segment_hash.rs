// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::{
    io::{Read, Write},
    sync::Arc,
};

/// Serialized footprint of a hash: 32 lowercase hex characters plus a NUL.
pub const SEGMENT_HASH_LEN: usize = 33;

/// Content address of a segment: the hex MD5 of its bytes.
///
/// The first 3 hex characters name the object-store bucket, the
/// remaining 29 the object key.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SegmentHash(Arc<str>);

impl SegmentHash {
    pub(crate) fn from_digest(digest: md5::Digest) -> Self {
        Self(format!("{digest:x}").into())
    }

    /// Hashes a byte slice into its segment address.
    #[must_use]
    pub fn from_content(bytes: &[u8]) -> Self {
        Self::from_digest(md5::compute(bytes))
    }

    /// Returns the hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Object-store bucket holding this segment.
    #[must_use]
    pub fn bucket(&self) -> &str {
        self.0.get(0..3).unwrap_or_default()
    }

    /// Object key of this segment inside its bucket.
    #[must_use]
    pub fn object_key(&self) -> &str {
        self.0.get(3..).unwrap_or_default()
    }

    pub(crate) fn encode_into<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.0.as_bytes())?;
        writer.write_all(&[0])?;
        Ok(())
    }

    pub(crate) fn decode_from<R: Read>(reader: &mut R) -> crate::Result<Self> {
        let mut buf = [0u8; SEGMENT_HASH_LEN];
        reader.read_exact(&mut buf)?;
        Self::decode(&buf)
    }

    pub(crate) fn decode(buf: &[u8; SEGMENT_HASH_LEN]) -> crate::Result<Self> {
        let Some((0, hex)) = buf.split_last() else {
            return Err(crate::Error::CorruptMetadata("segment hash terminator"));
        };

        let hex = std::str::from_utf8(hex)
            .map_err(|_| crate::Error::CorruptMetadata("segment hash encoding"))?;

        if !hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(crate::Error::CorruptMetadata("segment hash characters"));
        }

        Ok(Self(hex.into()))
    }
}

impl std::fmt::Display for SegmentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_bucket_split() {
        let hash = SegmentHash::from_digest(md5::compute(b"hello world"));
        assert_eq!(32, hash.as_str().len());
        assert_eq!(hash.as_str(), format!("{}{}", hash.bucket(), hash.object_key()));
        assert_eq!(3, hash.bucket().len());
    }

    #[test]
    fn hash_record_roundtrip() -> crate::Result<()> {
        let hash = SegmentHash::from_digest(md5::compute(b"roundtrip"));

        let mut buf = vec![];
        hash.encode_into(&mut buf)?;
        assert_eq!(SEGMENT_HASH_LEN, buf.len());

        let decoded = SegmentHash::decode_from(&mut &buf[..])?;
        assert_eq!(hash, decoded);

        Ok(())
    }

    #[test]
    fn rejects_unterminated_record() {
        let buf = [b'a'; SEGMENT_HASH_LEN];
        assert!(SegmentHash::decode(&buf).is_err());
    }
}
