//! Validated state reads with backup fallback and primary healing.
//!
//! A read first validates the primary file: decode the envelope, require
//! its structural fields, recompute the payload checksum and compare. On
//! any failure the backup slots are walked newest-first under the same
//! validation. The first valid backup wins and is copied back over the
//! primary so the chain is consistent again without waiting for the next
//! scheduled write. Only when nothing validates does the read fail, with
//! [`StateError::AllBackupsExhausted`] — the store then hands the file to
//! corruption recovery instead of treating this as a hard fault.

use std::fs;
use std::io;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backup::{self, BACKUP_SLOTS};
use crate::envelope::Envelope;
use crate::error::{StateError, StateResult};

/// Where a successful read ultimately came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// The primary file validated.
    Primary,
    /// Backup slot `n` validated after the primary failed.
    Backup(usize),
}

/// A payload recovered from disk, with its provenance.
#[derive(Debug, Clone)]
pub struct LoadedState {
    pub payload: Value,
    pub schema_version: u32,
    pub source: LoadSource,
}

/// Read `path`, falling back to backup slots and healing the primary.
pub fn read(path: &Path) -> StateResult<LoadedState> {
    match read_and_validate(path) {
        Ok(envelope) => Ok(LoadedState {
            payload: envelope.payload,
            schema_version: envelope.schema_version,
            source: LoadSource::Primary,
        }),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "primary state file invalid, walking backups");
            read_from_backups(path)
        }
    }
}

/// Open, decode and checksum-validate a single file.
pub fn read_and_validate(path: &Path) -> StateResult<Envelope> {
    let bytes = fs::read(path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            StateError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            StateError::Io(err)
        }
    })?;
    let envelope = Envelope::from_bytes(&bytes)?;
    envelope.validate()?;
    Ok(envelope)
}

/// Walk the backup slots newest-first, healing the primary from the
/// first slot that validates. Used directly by forced restores.
pub(crate) fn read_from_backups(path: &Path) -> StateResult<LoadedState> {
    for slot in 1..=BACKUP_SLOTS {
        let slot_path = backup::slot_path(path, slot);
        match read_and_validate(&slot_path) {
            Ok(envelope) => {
                info!(path = %path.display(), slot, "recovered from backup");
                heal(path, &slot_path);
                return Ok(LoadedState {
                    payload: envelope.payload,
                    schema_version: envelope.schema_version,
                    source: LoadSource::Backup(slot),
                });
            }
            Err(err) => {
                debug!(path = %slot_path.display(), slot, error = %err, "backup slot invalid");
            }
        }
    }
    Err(StateError::AllBackupsExhausted {
        path: path.to_path_buf(),
        slots: BACKUP_SLOTS,
    })
}

/// Copy a valid backup over the primary. Best effort: a failed heal is
/// logged and the read still succeeds with the backup's payload.
fn heal(path: &Path, valid_backup: &Path) {
    match fs::copy(valid_backup, path) {
        Ok(_) => info!(path = %path.display(), "primary healed from backup"),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to heal primary from backup");
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::slot_path;
    use crate::writer::atomic_write;
    use serde_json::json;

    #[test]
    fn valid_primary_reads_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("position.json");
        atomic_write(&path, &json!({"x": 10, "y": 64, "z": -3}), 3).unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.payload, json!({"x": 10, "y": 64, "z": -3}));
        assert_eq!(loaded.source, LoadSource::Primary);
    }

    #[test]
    fn corrupted_primary_falls_back_and_heals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("position.json");
        atomic_write(&path, &json!({"x": 10, "y": 64, "z": -3}), 3).unwrap();

        fs::write(&path, b"\x00\x01garbage\xff").unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.payload, json!({"x": 10, "y": 64, "z": -3}));
        assert_eq!(loaded.source, LoadSource::Backup(1));

        // The primary was healed to match the backup.
        let healed = read_and_validate(&path).unwrap();
        assert_eq!(healed.payload, json!({"x": 10, "y": 64, "z": -3}));
    }

    #[test]
    fn older_backup_wins_when_newer_slots_are_bad() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mining.json");
        atomic_write(&path, &json!({"depth": 5}), 3).unwrap();
        atomic_write(&path, &json!({"depth": 6}), 3).unwrap();

        fs::write(&path, b"junk").unwrap();
        fs::write(slot_path(&path, 1), b"junk").unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.payload, json!({"depth": 5}));
        assert_eq!(loaded.source, LoadSource::Backup(2));
    }

    #[test]
    fn single_bit_flip_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        atomic_write(&path, &json!({"fuel_level": 900}), 3).unwrap();

        // Flip one bit inside the payload region.
        let mut bytes = fs::read(&path).unwrap();
        let target = bytes.len() - 3;
        bytes[target] ^= 0x04;
        fs::write(&path, &bytes).unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.source, LoadSource::Backup(1));
        assert_eq!(loaded.payload, json!({"fuel_level": 900}));
    }

    #[test]
    fn everything_invalid_exhausts_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.json");
        atomic_write(&path, &json!({"beacon_id": "b-1"}), 3).unwrap();
        atomic_write(&path, &json!({"beacon_id": "b-2"}), 3).unwrap();

        fs::write(&path, b"junk").unwrap();
        for slot in 1..=BACKUP_SLOTS {
            fs::write(slot_path(&path, slot), b"junk").unwrap();
        }

        let err = read(&path).unwrap_err();
        assert!(matches!(err, StateError::AllBackupsExhausted { .. }));
    }

    #[test]
    fn missing_primary_with_valid_backup_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.json");
        atomic_write(&path, &json!({"boot_count": 4}), 3).unwrap();
        fs::remove_file(&path).unwrap();

        let loaded = read(&path).unwrap();
        assert_eq!(loaded.payload, json!({"boot_count": 4}));
        assert_eq!(loaded.source, LoadSource::Backup(1));
        assert!(path.exists());
    }
}
