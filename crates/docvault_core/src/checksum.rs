//! Content checksums.
//!
//! Every save digests the document three times: the content as handed in,
//! the bytes read back from staging, and the bytes read back from the
//! published path. All three must agree.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Size of a checksum in bytes.
pub const CHECKSUM_SIZE: usize = 32;

/// A SHA-256 digest of document bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum([u8; CHECKSUM_SIZE]);

impl Checksum {
    /// Computes the checksum of `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; CHECKSUM_SIZE];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; CHECKSUM_SIZE] {
        &self.0
    }

    /// Returns the digest as lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", &self.to_hex()[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            Checksum::of(b"hello").to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn empty_input() {
        assert_eq!(
            Checksum::of(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn deterministic_and_sensitive() {
        assert_eq!(Checksum::of(b"v2"), Checksum::of(b"v2"));
        assert_ne!(Checksum::of(b"v2"), Checksum::of(b"v3"));
    }

    #[test]
    fn debug_is_abbreviated() {
        let debug = format!("{:?}", Checksum::of(b"hello"));
        assert_eq!(debug, "Checksum(2cf24dba5fb0)");
    }
}
