//! Transcript module for deterministic hashing.
//!
//! Provides a transcript builder that appends tagged data in a canonical
//! format, ensuring the same logical data produces the same hash everywhere.

use bytes::{BufMut, BytesMut};
use sha2::{Digest, Sha256};

/// Standard tag constants for common transcript fields.
pub mod tags {
    pub const DOMAIN: u32 = 0;
    pub const SCHEME: u32 = 1;
    pub const KEY: u32 = 2;
    pub const PEER_KEY: u32 = 3;
    pub const CONTEXT: u32 = 4;
}

/// A minimal deterministic transcript builder.
/// We append (tag, len, bytes) tuples so the same logical data hashes the same everywhere.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    buf: BytesMut,
}

impl Transcript {
    /// Create a new transcript with the given domain separator.
    pub fn new(domain: &'static str) -> Self {
        let mut t = Self { buf: BytesMut::with_capacity(128) };
        t.append_str(tags::DOMAIN, domain);
        t
    }

    /// Append raw bytes with a tag.
    pub fn append_bytes(&mut self, tag: u32, data: &[u8]) -> &mut Self {
        // tag (u32 be) + len (u32 be) + data
        self.buf.put_u32(tag);
        self.buf.put_u32(data.len() as u32);
        self.buf.extend_from_slice(data);
        self
    }

    /// Append a u64 value with a tag.
    pub fn append_u64(&mut self, tag: u32, v: u64) -> &mut Self {
        self.buf.put_u32(tag);
        self.buf.put_u32(8);
        self.buf.put_u64(v);
        self
    }

    /// Append a string with a tag (encoded as UTF-8 bytes).
    pub fn append_str(&mut self, tag: u32, s: &str) -> &mut Self {
        self.append_bytes(tag, s.as_bytes())
    }

    /// Get the raw transcript bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// SHA-256 of the transcript contents.
    pub fn finalize(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(&self.buf);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_prefix_prevents_ambiguity() {
        let mut a = Transcript::new("t");
        a.append_bytes(1, b"ab").append_bytes(1, b"c");
        let mut b = Transcript::new("t");
        b.append_bytes(1, b"a").append_bytes(1, b"bc");
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_domain_separation() {
        let mut a = Transcript::new("one");
        a.append_u64(1, 7);
        let mut b = Transcript::new("two");
        b.append_u64(1, 7);
        assert_ne!(a.finalize(), b.finalize());
    }
}
