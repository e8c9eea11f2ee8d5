//! Content checksums.
//!
//! The checksum of a file is the lowercase hex SHA-256 of its full contents.
//! It is the content identity used by the precheck protocol to decide
//! same-file vs. different-content.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 file checksum, stored as 32 raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Compute the checksum of a complete byte slice.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Create an incremental hasher for streaming computation.
    pub fn hasher() -> ChecksumHasher {
        ChecksumHasher(Sha256::new())
    }

    /// Parse from a lowercase (or mixed-case) hex string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.len() != 64 {
            return Err(crate::Error::InvalidChecksum(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, pair) in s.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(pair)
                .map_err(|e| crate::Error::InvalidChecksum(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex, 16)
                .map_err(|e| crate::Error::InvalidChecksum(e.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Encode as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl TryFrom<String> for Checksum {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::parse(&s)
    }
}

impl From<Checksum> for String {
    fn from(c: Checksum) -> Self {
        c.to_hex()
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental SHA-256 checksum hasher.
pub struct ChecksumHasher(Sha256);

impl ChecksumHasher {
    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the checksum.
    pub fn finalize(self) -> Checksum {
        Checksum(self.0.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_known_vector() {
        let checksum = Checksum::compute(b"hello world");
        assert_eq!(
            checksum.to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_parse_roundtrip() {
        let checksum = Checksum::compute(b"depot");
        let parsed = Checksum::parse(&checksum.to_hex()).unwrap();
        assert_eq!(checksum, parsed);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(Checksum::parse("abcd").is_err());
        assert!(Checksum::parse(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_streaming_matches_oneshot() {
        let data = b"a larger body split across updates";
        let mut hasher = Checksum::hasher();
        for part in data.chunks(7) {
            hasher.update(part);
        }
        assert_eq!(hasher.finalize(), Checksum::compute(data));
    }
}
