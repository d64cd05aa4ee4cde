//! Partition checksums
//!
//! Provides [`Checksum`], the BLAKE3 digest recorded for every partition at
//! write time and re-checked whenever the partition's bytes are read back.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte BLAKE3 digest of a partition's serialized bytes
///
/// Serialized as a lowercase hex string in manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Wrap raw digest bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Digest arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Raw digest bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True when `data` hashes to this checksum
    #[inline]
    #[must_use]
    pub fn matches(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }

    /// First 16 hex chars, for log lines
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Checksum {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ChecksumError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl serde::Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors parsing a checksum from text
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    /// Decoded digest is not 32 bytes
    #[error("invalid checksum length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    /// Not valid hex
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_deterministic() {
        assert_eq!(Checksum::compute(b"rows"), Checksum::compute(b"rows"));
        assert_ne!(Checksum::compute(b"rows"), Checksum::compute(b"rowz"));
    }

    #[test]
    fn checksum_matches_only_original_bytes() {
        let sum = Checksum::compute(b"[1,2,3]");
        assert!(sum.matches(b"[1,2,3]"));
        assert!(!sum.matches(b"[1,2,4]"));
    }

    #[test]
    fn checksum_hex_roundtrip() {
        let sum = Checksum::compute(b"partition");
        let parsed: Checksum = sum.to_string().parse().unwrap();
        assert_eq!(sum, parsed);
        assert!(sum.to_string().starts_with(&sum.short()));
    }

    #[test]
    fn checksum_rejects_short_hex() {
        let result = "abcd".parse::<Checksum>();
        assert!(matches!(result, Err(ChecksumError::InvalidLength(2))));
    }

    #[test]
    fn checksum_serializes_as_string() {
        let sum = Checksum::compute(b"x");
        let json = serde_json::to_string(&sum).unwrap();
        assert_eq!(json.len(), 66);
        let back: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sum);
    }
}
