//! Atomic state file writes.
//!
//! A write never leaves a reader able to observe a half-written primary:
//! the envelope is written to a `.tmp` sibling, read back and
//! byte-compared, and only then renamed over the primary. The rename is
//! the sole atomicity boundary; any failure before it leaves the primary
//! untouched and the write safe to retry on the next scheduler tick.
//! After a successful commit the envelope bytes are handed to the backup
//! manager for rotation.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::backup;
use crate::envelope::Envelope;
use crate::error::{StateError, StateResult};

/// Path of the transient temp sibling for `path`.
#[must_use]
pub fn temp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.tmp", path.display()))
}

/// Seal `payload` into an envelope and atomically commit it to `path`.
pub fn atomic_write(path: &Path, payload: &Value, schema_version: u32) -> StateResult<()> {
    let envelope = Envelope::seal(payload.clone(), schema_version)?;
    let bytes = envelope.to_bytes()?;
    commit_bytes(path, &bytes)
}

/// Commit already-serialized envelope bytes to `path`.
///
/// Steps: write temp, read back and verify, delete existing primary,
/// rename temp over primary, rotate backups.
pub fn commit_bytes(path: &Path, bytes: &[u8]) -> StateResult<()> {
    let tmp = temp_path(path);

    fs::write(&tmp, bytes)?;

    let written = fs::read(&tmp)?;
    if written != bytes {
        warn!(path = %path.display(), "temp file read-back mismatch, aborting write");
        if let Err(err) = fs::remove_file(&tmp) {
            warn!(path = %tmp.display(), error = %err, "failed to remove bad temp file");
        }
        return Err(StateError::WriteVerificationFailed {
            path: path.to_path_buf(),
        });
    }

    if path.exists() {
        fs::remove_file(path)?;
    }
    fs::rename(&tmp, path)?;

    debug!(path = %path.display(), bytes = bytes.len(), "state file committed");

    backup::rotate(path, bytes)?;
    Ok(())
}

// ── tests ────────────────────────────────────────────────────────────
