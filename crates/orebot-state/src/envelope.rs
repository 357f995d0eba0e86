//! The on-disk envelope wrapping a component payload.
//!
//! Every state file holds a single JSON-encoded [`Envelope`]: the payload
//! plus the schema version it was written under, a CRC-32 of the
//! canonical payload bytes, and a write timestamp. Validation recomputes
//! the checksum from the re-serialized payload rather than trusting the
//! stored field, so an envelope whose checksum field was corrupted into
//! self-consistency cannot masquerade as valid unless payload and
//! checksum were corrupted identically.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checksum::crc32;
use crate::error::{StateError, StateResult};

/// Versioned, checksummed wrapper around a component payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Schema version the payload was written under.
    pub schema_version: u32,
    /// CRC-32 of the canonical serialized payload bytes.
    pub checksum: u32,
    /// Unix timestamp of the write, seconds.
    pub timestamp: i64,
    /// The component payload tree.
    pub payload: Value,
}

impl Envelope {
    /// Wrap `payload` in a freshly checksummed envelope.
    pub fn seal(payload: Value, schema_version: u32) -> StateResult<Self> {
        let bytes = payload_bytes(&payload)?;
        Ok(Self {
            schema_version,
            checksum: crc32(&bytes),
            timestamp: Utc::now().timestamp(),
            payload,
        })
    }

    /// Decode an envelope from raw file bytes.
    ///
    /// Missing structural fields (`payload`, `checksum`, ...) surface as
    /// [`StateError::Deserialization`] — serde rejects them during decode.
    pub fn from_bytes(bytes: &[u8]) -> StateResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| StateError::Deserialization(e.to_string()))
    }

    /// Encode the envelope to its canonical byte form.
    pub fn to_bytes(&self) -> StateResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StateError::Serialization(e.to_string()))
    }

    /// Recompute the payload checksum and compare against the stored one.
    pub fn validate(&self) -> StateResult<()> {
        let bytes = payload_bytes(&self.payload)?;
        let computed = crc32(&bytes);
        if computed != self.checksum {
            return Err(StateError::ChecksumMismatch {
                stored: self.checksum,
                computed,
            });
        }
        Ok(())
    }
}

/// Canonical serialized form of a payload, the input to the checksum.
pub fn payload_bytes(payload: &Value) -> StateResult<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| StateError::Serialization(e.to_string()))
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seal_then_validate() {
        let envelope = Envelope::seal(json!({"x": 10, "y": 64, "z": -3}), 3).unwrap();
        envelope.validate().unwrap();
        assert_eq!(envelope.schema_version, 3);
    }

    #[test]
    fn byte_round_trip_preserves_payload() {
        let payload = json!({
            "heading": "north",
            "fuel": 1422.5,
            "targets": [[10, 64, -3], [11, 64, -3]],
            "active": true,
        });
        let envelope = Envelope::seal(payload.clone(), 3).unwrap();
        let decoded = Envelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        decoded.validate().unwrap();
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn tampered_payload_fails_validation() {
        let mut envelope = Envelope::seal(json!({"x": 10}), 3).unwrap();
        envelope.payload = json!({"x": 11});
        let err = envelope.validate().unwrap_err();
        assert!(matches!(err, StateError::ChecksumMismatch { .. }));
    }

    #[test]
    fn missing_structural_fields_are_rejected() {
        // No checksum field.
        let err = Envelope::from_bytes(br#"{"schema_version":3,"timestamp":0,"payload":{}}"#)
            .unwrap_err();
        assert!(matches!(err, StateError::Deserialization(_)));

        // No payload field.
        let err = Envelope::from_bytes(br#"{"schema_version":3,"timestamp":0,"checksum":0}"#)
            .unwrap_err();
        assert!(matches!(err, StateError::Deserialization(_)));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(Envelope::from_bytes(b"\x00\xffnot json").is_err());
    }
}
