// SPDX-License-Identifier: MIT

//! Fixed-width digests over byte sequences.
//!
//! Node data and whole-network state are summarised as the first
//! [`DIGEST_LEN`] bytes of an MD5 sum. The same construction seeds the
//! pseudo-random prefix candidate generator, which is why it lives here
//! rather than next to the codec.

use std::fmt;

use md5::{Digest as _, Md5};

/// Width of every on-wire hash in this protocol.
pub const DIGEST_LEN: usize = 8;

/// Truncated-MD5 digest of node data or network state.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    /// Digest a single byte sequence.
    pub fn of(data: &[u8]) -> Self {
        let mut ctx = Md5::new();
        ctx.update(data);
        Self::finish(ctx)
    }

    /// Digest a sequence of chunks as if they were concatenated.
    pub fn of_chunks<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut ctx = Md5::new();
        for chunk in chunks {
            ctx.update(chunk);
        }
        Self::finish(ctx)
    }

    fn finish(ctx: Md5) -> Self {
        let full = ctx.finalize();
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&full[..DIGEST_LEN]);
        Digest(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(value: [u8; DIGEST_LEN]) -> Self {
        Digest(value)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Deterministic pseudo-random byte source: successive MD5 blocks over
/// `seed ++ counter`. Used by the random prefix rule so that candidate
/// sequences are reproducible from the link seed.
pub fn pseudo_random_bytes(seed: &[u8], counter: u32, out: &mut [u8]) {
    let mut produced = 0;
    let mut round = 0u32;
    while produced < out.len() {
        let mut ctx = Md5::new();
        ctx.update(seed);
        ctx.update(counter.to_be_bytes());
        ctx.update(round.to_be_bytes());
        let block = ctx.finalize();
        let take = (out.len() - produced).min(block.len());
        out[produced..produced + take].copy_from_slice(&block[..take]);
        produced += take;
        round += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_md5_prefix() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(
            Digest::of(b"").0,
            [0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04]
        );
    }

    #[test]
    fn chunked_digest_matches_flat() {
        let flat = Digest::of(b"hello world");
        let chunked = Digest::of_chunks([b"hello ".as_slice(), b"world"]);
        assert_eq!(flat, chunked);
    }

    #[test]
    fn pseudo_random_is_deterministic() {
        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        pseudo_random_bytes(b"eth0-seed", 3, &mut a);
        pseudo_random_bytes(b"eth0-seed", 3, &mut b);
        assert_eq!(a, b);
        pseudo_random_bytes(b"eth0-seed", 4, &mut b);
        assert_ne!(a, b);
    }
}
