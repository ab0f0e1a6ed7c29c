//! zstd, via the `zstd` crate's bindings to the reference implementation.

use anyhow::Context;

pub fn decode(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    zstd::stream::decode_all(bytes).context("zstd decode failed")
}
