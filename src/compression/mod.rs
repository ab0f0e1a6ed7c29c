//! Decompression Engine.
//!
//! Each codec lives behind its own cargo feature, following the same
//! feature-gating pattern used for optional compression crates elsewhere
//! in this kind of service: `compression-gzip`/`-deflate`/`-brotli`/`-zstd`
//! here, since this proxy needs the codecs HLS/DASH CDNs actually use
//! rather than archive formats.

#[cfg(feature = "compression-brotli")]
mod brotli_codec;
#[cfg(feature = "compression-zstd")]
mod zstd_codec;
#[cfg(any(feature = "compression-gzip", feature = "compression-deflate"))]
mod zlib_codec;

use tracing::{debug, warn};

/// Supported/declarable content encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Gzip,
    Br,
    Deflate,
    Zstd,
}

impl Encoding {
    /// Parse a `Content-Encoding` header value (case-insensitive).
    pub fn from_header_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Encoding::Gzip),
            "br" => Some(Encoding::Br),
            "deflate" => Some(Encoding::Deflate),
            "zstd" => Some(Encoding::Zstd),
            _ => None,
        }
    }

    pub fn as_header_value(&self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
            Encoding::Br => "br",
            Encoding::Deflate => "deflate",
            Encoding::Zstd => "zstd",
        }
    }

    /// The fallback probing order: "try each *other* codec once
    /// in order {zstd, gzip, brotli, deflate}".
    fn fallback_order() -> [Encoding; 4] {
        [Encoding::Zstd, Encoding::Gzip, Encoding::Br, Encoding::Deflate]
    }
}

/// Result of a [`decompress`] call: the bytes to use, and (for callers that
/// care, e.g. metrics) which codec actually worked.
pub struct DecompressOutcome {
    pub bytes: Vec<u8>,
    pub encoding_used: Option<Encoding>,
    /// `true` if the declared/detected codec failed and a fallback codec —
    /// or no codec at all — was used instead.
    pub fell_back: bool,
}

/// Detect a compression format from magic bytes alone. Brotli and
/// deflate have no reliable magic number, so detection only ever returns
/// `Gzip` or `Zstd`.
pub fn detect_by_magic(bytes: &[u8]) -> Option<Encoding> {
    if bytes.len() >= 2 && bytes[0] == 0x1F && bytes[1] == 0x8B {
        return Some(Encoding::Gzip);
    }
    if bytes.len() >= 4 && bytes[0..4] == [0x28, 0xB5, 0x2F, 0xFD] {
        return Some(Encoding::Zstd);
    }
    None
}

fn try_decode(encoding: Encoding, bytes: &[u8]) -> Option<Vec<u8>> {
    let result = match encoding {
        #[cfg(feature = "compression-gzip")]
        Encoding::Gzip => zlib_codec::decode_gzip(bytes),
        #[cfg(not(feature = "compression-gzip"))]
        Encoding::Gzip => Err(anyhow::anyhow!("gzip support not compiled in")),

        #[cfg(feature = "compression-deflate")]
        Encoding::Deflate => zlib_codec::decode_deflate(bytes),
        #[cfg(not(feature = "compression-deflate"))]
        Encoding::Deflate => Err(anyhow::anyhow!("deflate support not compiled in")),

        #[cfg(feature = "compression-brotli")]
        Encoding::Br => brotli_codec::decode(bytes),
        #[cfg(not(feature = "compression-brotli"))]
        Encoding::Br => Err(anyhow::anyhow!("brotli support not compiled in")),

        #[cfg(feature = "compression-zstd")]
        Encoding::Zstd => zstd_codec::decode(bytes),
        #[cfg(not(feature = "compression-zstd"))]
        Encoding::Zstd => Err(anyhow::anyhow!("zstd support not compiled in")),
    };

    match result {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            debug!(codec = ?encoding, error = %e, "codec attempt failed");
            None
        }
    }
}

/// Decompress `bytes`, given an optional declared `Content-Encoding`.
/// Never fails: on total failure, the original bytes are returned unchanged
/// and `encoding_used` is `None`, per/§7's "DecompressionError —
/// never fatal" policy. Use [`decompress_strict`] where the caller actually
/// wants to observe the failure.
pub fn decompress(bytes: &[u8], declared: Option<Encoding>) -> DecompressOutcome {
    let primary = declared.or_else(|| detect_by_magic(bytes));

    if let Some(encoding) = primary {
        if let Some(decoded) = try_decode(encoding, bytes) {
            return DecompressOutcome {
                bytes: decoded,
                encoding_used: Some(encoding),
                fell_back: false,
            };
        }
        return fall_back(bytes, &[encoding]);
    }

    // No declared encoding and no magic match: probe brotli, then deflate
    //.
    for candidate in [Encoding::Br, Encoding::Deflate] {
        if let Some(decoded) = try_decode(candidate, bytes) {
            return DecompressOutcome {
                bytes: decoded,
                encoding_used: Some(candidate),
                fell_back: false,
            };
        }
    }

    fall_back(bytes, &[Encoding::Br, Encoding::Deflate])
}

/// Try every codec in the fallback order except the ones already attempted,
/// returning the original bytes untouched if none succeed.
fn fall_back(bytes: &[u8], already_tried: &[Encoding]) -> DecompressOutcome {
    for candidate in Encoding::fallback_order() {
        if already_tried.contains(&candidate) {
            continue;
        }
        if let Some(decoded) = try_decode(candidate, bytes) {
            return DecompressOutcome {
                bytes: decoded,
                encoding_used: Some(candidate),
                fell_back: true,
            };
        }
    }

    warn!("all decompression attempts failed; passing original bytes through");
    DecompressOutcome {
        bytes: bytes.to_vec(),
        encoding_used: None,
        fell_back: true,
    }
}

/// Strict variant: returns `Err` instead of silently passing bytes through
/// when an explicit `declared` codec and every fallback both fail.
pub fn decompress_strict(bytes: &[u8], declared: Encoding) -> anyhow::Result<Vec<u8>> {
    let outcome = decompress(bytes, Some(declared));
    if outcome.encoding_used.is_none() {
        anyhow::bail!("decompression failed for declared encoding {:?} and every fallback", declared);
    }
    Ok(outcome.bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "compression-gzip")]
    fn gzip_encode(data: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn detects_gzip_magic() {
        assert_eq!(detect_by_magic(&[0x1F, 0x8B, 0x08, 0x00]), Some(Encoding::Gzip));
    }

    #[test]
    fn detects_zstd_magic() {
        assert_eq!(detect_by_magic(&[0x28, 0xB5, 0x2F, 0xFD, 0x00]), Some(Encoding::Zstd));
    }

    #[test]
    fn no_magic_for_plain_text() {
        assert_eq!(detect_by_magic(b"#EXTM3U\n"), None);
    }

    #[test]
    #[cfg(feature = "compression-gzip")]
    fn decompress_autodetects_gzip_without_declared_encoding() {
        let original = b"#EXTM3U\n#EXT-X-VERSION:3\n";
        let compressed = gzip_encode(original);
        let outcome = decompress(&compressed, None);
        assert_eq!(outcome.bytes, original);
        assert_eq!(outcome.encoding_used, Some(Encoding::Gzip));
        assert!(!outcome.fell_back);
    }

    #[test]
    fn decompress_passes_through_unrecognized_data_unchanged() {
        let plain = b"not compressed at all".to_vec();
        let outcome = decompress(&plain, None);
        assert_eq!(outcome.bytes, plain);
        assert_eq!(outcome.encoding_used, None);
    }

    #[test]
    #[cfg(feature = "compression-gzip")]
    fn wrong_declared_encoding_falls_back_to_correct_codec() {
        let original = b"fallback payload";
        let compressed = gzip_encode(original);
        // Declare zstd (wrong); engine should fall back and still recover gzip.
        let outcome = decompress(&compressed, Some(Encoding::Zstd));
        assert_eq!(outcome.bytes, original);
        assert_eq!(outcome.encoding_used, Some(Encoding::Gzip));
        assert!(outcome.fell_back);
    }
}
