//! Checksum module for payload integrity verification.
//!
//! Checksums are non-cryptographic: they detect accidental corruption of
//! stored envelopes, not tampering. The algorithm travels with the value
//! (`"crc32:1a2b3c4d"`), so envelopes written under one algorithm stay
//! verifiable after the configured default changes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Supported checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// CRC-32 (IEEE), hardware-accelerated by `crc32fast` where available.
    #[default]
    Crc32,
    /// 64-bit XXH3, the fastest option for large payloads.
    Xxh3,
    /// 32-bit multiplicative rolling hash (`h = h * 31 + byte`).
    Rolling32,
}

impl ChecksumAlgorithm {
    /// Short tag used in the textual checksum form.
    pub fn tag(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc32 => "crc32",
            ChecksumAlgorithm::Xxh3 => "xxh3",
            ChecksumAlgorithm::Rolling32 => "rolling32",
        }
    }

    fn hex_width(&self) -> usize {
        match self {
            ChecksumAlgorithm::Xxh3 => 16,
            ChecksumAlgorithm::Crc32 | ChecksumAlgorithm::Rolling32 => 8,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crc32" => Ok(ChecksumAlgorithm::Crc32),
            "xxh3" => Ok(ChecksumAlgorithm::Xxh3),
            "rolling32" => Ok(ChecksumAlgorithm::Rolling32),
            other => Err(format!("unknown checksum algorithm '{}'", other)),
        }
    }
}

/// A computed checksum value with its algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum {
    /// The algorithm used to compute this checksum.
    pub algorithm: ChecksumAlgorithm,
    /// The checksum value.
    pub value: u64,
}

impl Checksum {
    /// Creates a new checksum with the given algorithm and value.
    pub fn new(algorithm: ChecksumAlgorithm, value: u64) -> Self {
        Self { algorithm, value }
    }

    /// True when `data` digests to this checksum under its own algorithm.
    pub fn matches(&self, data: &[u8]) -> bool {
        compute(self.algorithm, data) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:0width$x}",
            self.algorithm,
            self.value,
            width = self.algorithm.hex_width()
        )
    }
}

impl FromStr for Checksum {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, hex) = s
            .split_once(':')
            .ok_or_else(|| format!("checksum '{}' has no algorithm tag", s))?;
        let algorithm: ChecksumAlgorithm = tag.parse()?;
        if hex.is_empty() || hex.len() > algorithm.hex_width() {
            return Err(format!("checksum '{}' has invalid digest length", s));
        }
        let value = u64::from_str_radix(hex, 16)
            .map_err(|e| format!("checksum '{}' is not hex: {}", s, e))?;
        Ok(Checksum { algorithm, value })
    }
}

impl TryFrom<String> for Checksum {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Checksum> for String {
    fn from(value: Checksum) -> Self {
        value.to_string()
    }
}

/// Computes the checksum for the given data using the specified algorithm.
pub fn compute(algorithm: ChecksumAlgorithm, data: &[u8]) -> Checksum {
    let value = match algorithm {
        ChecksumAlgorithm::Crc32 => crc32fast::hash(data) as u64,
        ChecksumAlgorithm::Xxh3 => xxhash_rust::xxh3::xxh3_64(data),
        ChecksumAlgorithm::Rolling32 => rolling32(data) as u64,
    };
    debug!(
        algorithm = %algorithm,
        value = value,
        size = data.len(),
        "computed checksum"
    );
    Checksum { algorithm, value }
}

fn rolling32(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |h, &b| h.wrapping_mul(31).wrapping_add(b as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_value() {
        // CRC-32/ISO-HDLC check value
        let c = compute(ChecksumAlgorithm::Crc32, b"123456789");
        assert_eq!(c.value, 0xCBF43926);
    }

    #[test]
    fn test_rolling32_known_value() {
        // "ab" = 97 * 31 + 98
        let c = compute(ChecksumAlgorithm::Rolling32, b"ab");
        assert_eq!(c.value, 3105);
    }

    #[test]
    fn test_xxh3_differs_from_crc() {
        let a = compute(ChecksumAlgorithm::Xxh3, b"payload");
        let b = compute(ChecksumAlgorithm::Crc32, b"payload");
        assert_ne!(a.algorithm, b.algorithm);
        assert!(a.matches(b"payload"));
        assert!(b.matches(b"payload"));
    }

    #[test]
    fn test_matches_detects_single_byte_flip() {
        for algorithm in [
            ChecksumAlgorithm::Crc32,
            ChecksumAlgorithm::Xxh3,
            ChecksumAlgorithm::Rolling32,
        ] {
            let c = compute(algorithm, b"{\"name\":\"A\"}");
            assert!(!c.matches(b"{\"name\":\"B\"}"), "{} missed a flip", algorithm);
        }
    }

    #[test]
    fn test_display_pads_digest() {
        let c = Checksum::new(ChecksumAlgorithm::Crc32, 0xAB);
        assert_eq!(c.to_string(), "crc32:000000ab");

        let x = Checksum::new(ChecksumAlgorithm::Xxh3, 1);
        assert_eq!(x.to_string(), "xxh3:0000000000000001");
    }

    #[test]
    fn test_parse_display_form() {
        let c = compute(ChecksumAlgorithm::Rolling32, b"hello");
        let parsed: Checksum = c.to_string().parse().unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("deadbeef".parse::<Checksum>().is_err());
        assert!("md5:deadbeef".parse::<Checksum>().is_err());
        assert!("crc32:".parse::<Checksum>().is_err());
        assert!("crc32:zz".parse::<Checksum>().is_err());
        assert!("crc32:123456789".parse::<Checksum>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let c = Checksum::new(ChecksumAlgorithm::Crc32, 0xDEADBEEF);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "\"crc32:deadbeef\"");
        let back: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_algorithm_serde_lowercase() {
        let json = serde_json::to_string(&ChecksumAlgorithm::Xxh3).unwrap();
        assert_eq!(json, "\"xxh3\"");
    }
}
