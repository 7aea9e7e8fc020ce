use std::io::{Read, Write};

/// Generic compression trait
pub trait Compressor {
    /// Compresses a segment
    ///
    /// # Errors
    ///
    /// Will return `Err` if compression fails.
    fn compress(&self, bytes: &[u8]) -> crate::Result<Vec<u8>>;

    /// Decompresses a segment
    ///
    /// # Errors
    ///
    /// Will return `Err` if decompression fails.
    fn decompress(&self, bytes: &[u8]) -> crate::Result<Vec<u8>>;
}

/// zlib (DEFLATE) compression
#[derive(Clone, Copy, Debug, Default)]
pub struct DeflateCompressor {
    level: u8,
}

impl DeflateCompressor {
    /// Creates a zlib compressor with the given level (0..=10).
    #[must_use]
    pub fn with_level(level: u8) -> Self {
        Self { level }
    }
}

impl Compressor for DeflateCompressor {
    fn compress(&self, bytes: &[u8]) -> crate::Result<Vec<u8>> {
        let level = if self.level == 0 { 6 } else { self.level };
        Ok(miniz_oxide::deflate::compress_to_vec_zlib(bytes, level))
    }

    fn decompress(&self, bytes: &[u8]) -> crate::Result<Vec<u8>> {
        miniz_oxide::inflate::decompress_to_vec_zlib(bytes)
            .map_err(|_| crate::Error::Decompress)
    }
}

/// Deflates exactly `exact_input_bytes` from `reader` into `writer`.
///
/// Returns the compressed length. Never reads past the stated length,
/// so the reader can sit inside a larger stream.
pub(crate) fn deflate<R: Read, W: Write, C: Compressor>(
    reader: &mut R,
    writer: &mut W,
    exact_input_bytes: u64,
    compressor: &C,
) -> crate::Result<u64> {
    let mut raw = Vec::with_capacity(exact_input_bytes as usize);
    let read = reader.take(exact_input_bytes).read_to_end(&mut raw)?;

    if read as u64 != exact_input_bytes {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }

    let deflated = compressor.compress(&raw)?;
    writer.write_all(&deflated)?;

    Ok(deflated.len() as u64)
}

/// Inflates all of `reader` into `writer`, returning the inflated length.
pub(crate) fn inflate<R: Read, W: Write, C: Compressor>(
    reader: &mut R,
    writer: &mut W,
    compressor: &C,
) -> crate::Result<u64> {
    let mut deflated = vec![];
    reader.read_to_end(&mut deflated)?;

    let raw = compressor.decompress(&deflated)?;
    writer.write_all(&raw)?;

    Ok(raw.len() as u64)
}
