//! Rotating backup slots for component state files.
//!
//! Each primary file keeps exactly [`BACKUP_SLOTS`] prior envelopes as
//! numbered siblings: `position.json.bak1` (newest) through `.bak3`
//! (oldest). Rotation shifts each slot one generation older and writes
//! the just-committed envelope bytes into slot 1, so slot 1 always
//! matches the primary that was committed alongside it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::StateResult;

/// Number of rotating backup generations kept per component file.
pub const BACKUP_SLOTS: usize = 3;

/// Path of backup slot `slot` (1-based) for `path`.
#[must_use]
pub fn slot_path(path: &Path, slot: usize) -> PathBuf {
    PathBuf::from(format!("{}.bak{slot}", path.display()))
}

/// Shift every slot one generation older, then write `envelope_bytes`
/// into slot 1.
pub fn rotate(path: &Path, envelope_bytes: &[u8]) -> StateResult<()> {
    for slot in (2..=BACKUP_SLOTS).rev() {
        let younger = slot_path(path, slot - 1);
        if younger.exists() {
            fs::copy(&younger, slot_path(path, slot))?;
        }
    }
    fs::write(slot_path(path, 1), envelope_bytes)?;
    debug!(path = %path.display(), "backups rotated");
    Ok(())
}

/// Remove numbered backups outside the slot range (left behind by older
/// builds or by hand-copied files). Slots 1..=[`BACKUP_SLOTS`] are kept.
pub fn prune(path: &Path) -> StateResult<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(());
    };
    if !parent.is_dir() {
        return Ok(());
    }
    let prefix = format!("{name}.bak");
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(suffix) = file_name.strip_prefix(&prefix) else {
            continue;
        };
        if let Ok(slot) = suffix.parse::<usize>() {
            if slot == 0 || slot > BACKUP_SLOTS {
                warn!(file = file_name, "removing stray backup");
                fs::remove_file(entry.path())?;
            }
        }
    }
    Ok(())
}

// ── diagnostics ──────────────────────────────────────────────────────

/// Existence and size of one file in a snapshot chain.
#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub exists: bool,
    pub size: u64,
}

impl FileStatus {
    fn probe(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(meta) => Self {
                exists: true,
                size: meta.len(),
            },
            Err(_) => Self {
                exists: false,
                size: 0,
            },
        }
    }
}

/// Snapshot-chain report for one component file: the primary plus each
/// backup slot, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct BackupStatus {
    pub primary: FileStatus,
    pub slots: Vec<FileStatus>,
}

/// Report existence and size of the primary and each backup slot.
#[must_use]
pub fn status(path: &Path) -> BackupStatus {
    BackupStatus {
        primary: FileStatus::probe(path),
        slots: (1..=BACKUP_SLOTS)
            .map(|slot| FileStatus::probe(&slot_path(path, slot)))
            .collect(),
    }
}

// ── tests ────────────────────────────────────────────────────────────
