//! Schema migration engine.
//!
//! Migrations are a fixed, ordered list of version-gated transforms over
//! a component payload. Each transform is idempotent, so applying the
//! chain to already-current data is a no-op. Transforms run on a copy:
//! the upgraded payload is committed only if every pending transform
//! completes, otherwise the pre-migration payload is preserved and the
//! failure is reported as [`StateError::Migration`] — non-fatal, the
//! component simply stays on its old shape until the next attempt.
//!
//! Versions are monotonically increasing integers. Add new migrations to
//! the end of this array.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};

/// Current schema version written into every sealed envelope.
pub const SCHEMA_VERSION: u32 = 3;

/// A single migration definition.
struct Migration {
    /// Version this transform upgrades a payload *to*.
    version: u32,
    /// Human-readable description.
    description: &'static str,
    /// The transform. Receives the component name and the working copy.
    apply: fn(&str, &mut Map<String, Value>) -> Result<(), String>,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 2,
        description: "position records gain a dimension field",
        apply: add_position_dimension,
    },
    Migration {
        version: 3,
        description: "mining counter renamed from mined to blocks_mined",
        apply: rename_mining_counter,
    },
];

/// Result of running the migration chain over one payload.
#[derive(Debug)]
pub struct MigrationOutcome {
    /// The (possibly upgraded) payload.
    pub payload: Value,
    /// Whether any transform fired; when true the caller persists the
    /// payload under [`SCHEMA_VERSION`].
    pub migrated: bool,
}

/// Upgrade `payload` from `from_version` to the current schema.
pub fn migrate(component: &str, payload: &Value, from_version: u32) -> StateResult<MigrationOutcome> {
    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| m.version > from_version)
        .collect();

    if pending.is_empty() {
        debug!(component, from_version, "payload schema is up to date");
        return Ok(MigrationOutcome {
            payload: payload.clone(),
            migrated: false,
        });
    }

    let mut working = match payload {
        Value::Object(map) => map.clone(),
        _ => {
            return Err(StateError::Migration {
                version: pending[0].version,
                message: format!("{component} payload root is not a map"),
            });
        }
    };

    for migration in pending {
        info!(
            component,
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        if let Err(message) = (migration.apply)(component, &mut working) {
            warn!(
                component,
                version = migration.version,
                error = %message,
                "migration failed, keeping pre-migration payload"
            );
            return Err(StateError::Migration {
                version: migration.version,
                message,
            });
        }
    }

    Ok(MigrationOutcome {
        payload: Value::Object(working),
        migrated: true,
    })
}

// ── transforms ───────────────────────────────────────────────────────

/// v2: early position records had no dimension.
fn add_position_dimension(component: &str, payload: &mut Map<String, Value>) -> Result<(), String> {
    if component != "position" {
        return Ok(());
    }
    payload
        .entry("dimension")
        .or_insert_with(|| Value::String("overworld".into()));
    Ok(())
}

/// v3: the mining counter was renamed; the old field carried an integer.
fn rename_mining_counter(component: &str, payload: &mut Map<String, Value>) -> Result<(), String> {
    if component != "mining" {
        return Ok(());
    }
    if let Some(old) = payload.remove("mined") {
        if !old.is_i64() && !old.is_u64() {
            return Err(format!("mined counter is not an integer: {old}"));
        }
        if !payload.contains_key("blocks_mined") {
            payload.insert("blocks_mined".into(), old);
        }
    }
    Ok(())
}

// ── tests ────────────────────────────────────────────────────────────
