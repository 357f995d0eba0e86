//! Payload integrity checksums.
//!
//! Every envelope carries a CRC-32 (polynomial `0xEDB88320`, initial and
//! final XOR `0xFFFFFFFF`) computed over the canonical serialized payload
//! bytes. `crc32fast` implements exactly these semantics with a
//! precomputed kernel, so the checksum is a pure function of the input
//! and is defined on empty input (yielding 0).

/// Compute the CRC-32 of `bytes`.
#[must_use]
pub fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

// ── tests ────────────────────────────────────────────────────────────
