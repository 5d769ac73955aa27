//! Versioned storage envelope written for every application key.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checksum::{compute, Checksum, ChecksumAlgorithm};

/// Envelope schema version written by this crate.
pub const FORMAT_VERSION: &str = "1.0";

/// Field names that identify a value as an envelope.
pub const ENVELOPE_FIELDS: [&str; 5] = [
    "format_version",
    "written_at",
    "payload",
    "checksum",
    "byte_size",
];

/// The persisted wrapper around an application payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEnvelope {
    /// Envelope schema version.
    pub format_version: String,
    /// Write time in milliseconds since the Unix epoch.
    pub written_at: i64,
    /// The sanitized application value.
    pub payload: Value,
    /// Digest of the serialized payload.
    pub checksum: Checksum,
    /// Length of the serialized payload in bytes.
    pub byte_size: u64,
}

impl StorageEnvelope {
    /// Wraps `payload`, computing its checksum and size.
    pub fn seal(payload: Value, algorithm: ChecksumAlgorithm, written_at: i64) -> Self {
        let bytes = payload_bytes(&payload);
        Self {
            format_version: FORMAT_VERSION.to_string(),
            written_at,
            checksum: compute(algorithm, &bytes),
            byte_size: bytes.len() as u64,
            payload,
        }
    }

    /// Recomputes the payload checksum with the envelope's own algorithm.
    pub fn recompute(&self) -> Checksum {
        compute(self.checksum.algorithm, &payload_bytes(&self.payload))
    }

    /// True when the stored checksum matches the payload.
    pub fn is_intact(&self) -> bool {
        self.checksum.matches(&payload_bytes(&self.payload))
    }

    /// Serializes the envelope to its stored JSON form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Canonical payload serialization: compact JSON with sorted object keys.
pub fn payload_bytes(payload: &Value) -> Vec<u8> {
    // Serializing a Value cannot fail: keys are always strings.
    serde_json::to_vec(payload).unwrap_or_default()
}

/// Outcome of interpreting a raw stored string.
#[derive(Debug)]
pub enum Decoded {
    /// A well-formed envelope of a supported version.
    Envelope(StorageEnvelope),
    /// Valid JSON without the envelope fields: a pre-versioning value.
    Legacy(Value),
    /// Not JSON, or envelope fields with the wrong shape.
    Unparseable(String),
    /// An envelope written by an incompatible schema version.
    UnsupportedVersion(String),
}

/// Interprets a raw stored string.
pub fn decode(raw: &str) -> Decoded {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return Decoded::Unparseable(e.to_string()),
    };

    let is_envelope = value
        .as_object()
        .map(|obj| ENVELOPE_FIELDS.iter().all(|f| obj.contains_key(*f)))
        .unwrap_or(false);
    if !is_envelope {
        return Decoded::Legacy(value);
    }

    match serde_json::from_value::<StorageEnvelope>(value) {
        Ok(envelope) if is_supported_version(&envelope.format_version) => {
            Decoded::Envelope(envelope)
        }
        Ok(envelope) => Decoded::UnsupportedVersion(envelope.format_version),
        Err(e) => Decoded::Unparseable(e.to_string()),
    }
}

fn is_supported_version(version: &str) -> bool {
    let current_major = FORMAT_VERSION.split('.').next();
    version.split('.').next() == current_major
}
