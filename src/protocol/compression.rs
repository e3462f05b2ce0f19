use flate2::Compression as GzipLevel;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{self, Read, Write};

/// Gzip-compress `data` at the default level.
///
/// # Errors
/// Returns an error only if the in-memory encoder fails.
pub fn gzip_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), GzipLevel::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompress a complete gzip member.
///
/// # Errors
/// Returns an error if `data` is not a valid gzip stream.
pub fn gzip_decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_still_produces_a_gzip_member() {
        let compressed = gzip_compress(&[]).unwrap();
        assert!(!compressed.is_empty());
        assert!(gzip_decompress(&compressed).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(gzip_decompress(b"definitely not gzip").is_err());
    }
}
