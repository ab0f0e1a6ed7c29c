//! brotli, via the pure-Rust `brotli` crate (no magic-byte signature, so
//! this is only ever reached via explicit declaration or the no-magic probe
//! order in [`super::decompress`]).

use std::io::Read;

use anyhow::Context;

pub fn decode(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut decompressor = brotli::Decompressor::new(bytes, 4096);
    let mut out = Vec::new();
    decompressor.read_to_end(&mut out).context("brotli decode failed")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brotli_round_trips() {
        let original = b"hello brotli, a bit longer so compression has something to do";
        let mut compressed = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut compressed, 4096, 5, 22);
            std::io::Write::write_all(&mut writer, original).unwrap();
        }
        assert_eq!(decode(&compressed).unwrap(), original);
    }

    #[test]
    fn brotli_rejects_garbage() {
        assert!(decode(b"definitely not brotli").is_err());
    }
}
