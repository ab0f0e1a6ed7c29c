//! gzip and deflate, both backed by `flate2`.

use std::io::Read;

use anyhow::Context;

#[cfg(feature = "compression-gzip")]
pub fn decode_gzip(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).context("gzip decode failed")?;
    Ok(out)
}

#[cfg(feature = "compression-deflate")]
pub fn decode_deflate(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    // Try raw deflate first, then zlib-wrapped deflate, since upstreams are
    // inconsistent about which one they mean by "Content-Encoding: deflate".
    let mut decoder = flate2::read::DeflateDecoder::new(bytes);
    let mut out = Vec::new();
    if decoder.read_to_end(&mut out).is_ok() && !out.is_empty() {
        return Ok(out);
    }

    out.clear();
    let mut zlib_decoder = flate2::read::ZlibDecoder::new(bytes);
    zlib_decoder.read_to_end(&mut out).context("deflate decode failed")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(feature = "compression-gzip")]
    fn gzip_round_trips() {
        use std::io::Write;
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"hello gzip").unwrap();
        let compressed = encoder.finish().unwrap();
        assert_eq!(decode_gzip(&compressed).unwrap(), b"hello gzip");
    }

    #[test]
    #[cfg(feature = "compression-deflate")]
    fn deflate_round_trips() {
        use std::io::Write;
        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"hello deflate").unwrap();
        let compressed = encoder.finish().unwrap();
        assert_eq!(decode_deflate(&compressed).unwrap(), b"hello deflate");
    }
}
