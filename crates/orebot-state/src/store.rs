//! The component state store.
//!
//! An in-memory, path-addressable tree partitioned into named
//! components, each independently persisted as a checksummed envelope
//! file with rotating backups. The store is the single owner of all
//! component payloads: collaborators mutate it through path-addressed
//! `set` calls and the persistence scheduler (or an explicit `save`)
//! flushes components to disk.
//!
//! Read-path failures never escape as fatal. On load each component
//! falls through validate → backups → corruption recovery → defaults,
//! so the store always ends up with a usable in-memory payload; worst
//! case the robot operates on defaulted state for one component while
//! the degradation is logged.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::backup::{self, BackupStatus};
use crate::config::StateConfig;
use crate::defaults::{self, COMPONENTS, DEFAULT_COMPONENT};
use crate::error::{StateError, StateResult};
use crate::migration::{self, SCHEMA_VERSION};
use crate::path::{self, PathKey};
use crate::reader::{self, LoadSource};
use crate::recovery;
use crate::writer;

/// Extension of component state files.
pub const STATE_FILE_EXT: &str = "json";

/// One named partition of state and the schema version it is persisted
/// under. The version only trails [`SCHEMA_VERSION`] while a migration
/// is failing, so the upgrade is retried on the next boot.
struct Component {
    payload: Map<String, Value>,
    schema_version: u32,
}

/// Path-addressable store over independently persisted components.
pub struct StateStore {
    config: StateConfig,
    components: BTreeMap<String, Component>,
}

impl StateStore {
    /// Create the storage directory if absent and load (or default)
    /// every component, then record the boot in the `main` component.
    pub fn init(config: StateConfig) -> StateResult<Self> {
        info!(data_dir = %config.data_dir.display(), "state store initializing");
        let mut store = Self::attach(config)?;

        let boots = store.get_i64("main.boot_count").unwrap_or(0) + 1;
        store.set("main.boot_count", boots)?;
        store.set("main.last_boot", Utc::now().timestamp())?;
        store.save_component("main")?;

        Ok(store)
    }

    /// Load the store without recording a boot — the entry point for
    /// diagnostic tooling that must not disturb boot bookkeeping.
    pub fn attach(config: StateConfig) -> StateResult<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let mut store = Self {
            config,
            components: BTreeMap::new(),
        };
        store.load();
        Ok(store)
    }

    /// The configuration the store was initialized with.
    #[must_use]
    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Primary file path for `component`.
    #[must_use]
    pub fn component_path(&self, component: &str) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{component}.{STATE_FILE_EXT}"))
    }

    // ── loading ──────────────────────────────────────────────────────

    /// (Re)populate the in-memory tree from disk, component by
    /// component, through the full fallback chain. Never fails.
    pub fn load(&mut self) {
        for component in COMPONENTS {
            self.load_component(component);
        }
    }

    fn load_component(&mut self, component: &str) {
        let path = self.component_path(component);
        if let Err(err) = backup::prune(&path) {
            warn!(component, error = %err, "backup prune failed");
        }

        // A leftover temp file means a write was interrupted before its
        // rename; the primary is still authoritative.
        let temp = writer::temp_path(&path);
        if temp.exists() {
            debug!(component, "removing stale temp file from interrupted write");
            let _ = fs::remove_file(&temp);
        }

        let untouched = !path.exists()
            && (1..=backup::BACKUP_SLOTS).all(|slot| !backup::slot_path(&path, slot).exists());
        if untouched {
            info!(component, "no state on disk, starting from defaults");
            let payload = defaults::for_component(component);
            if let Err(err) = writer::atomic_write(&path, &payload, SCHEMA_VERSION) {
                warn!(component, error = %err, "failed to persist default state");
            }
            self.install(component, payload, SCHEMA_VERSION);
            return;
        }

        match reader::read(&path) {
            Ok(loaded) => {
                if let LoadSource::Backup(slot) = loaded.source {
                    info!(component, slot, "component loaded from backup");
                }
                self.install_migrated(component, &path, loaded.payload, loaded.schema_version);
            }
            Err(err) => {
                warn!(component, error = %err, "component unreadable, entering corruption recovery");
                let payload = recovery::recover(&path, component, SCHEMA_VERSION);
                self.install(component, payload, SCHEMA_VERSION);
            }
        }
    }

    /// Run the migration chain over a freshly loaded payload and persist
    /// the upgrade. A failed migration keeps the pre-migration payload
    /// and its old version so the upgrade is retried next boot.
    fn install_migrated(&mut self, component: &str, path: &Path, payload: Value, from_version: u32) {
        match migration::migrate(component, &payload, from_version) {
            Ok(outcome) if outcome.migrated => {
                info!(
                    component,
                    from_version,
                    to_version = SCHEMA_VERSION,
                    "schema migrated"
                );
                if let Err(err) = writer::atomic_write(path, &outcome.payload, SCHEMA_VERSION) {
                    warn!(component, error = %err, "failed to persist migrated payload");
                }
                self.install(component, outcome.payload, SCHEMA_VERSION);
            }
            Ok(outcome) => self.install(component, outcome.payload, SCHEMA_VERSION),
            Err(err) => {
                warn!(component, error = %err, "keeping pre-migration payload");
                self.install(component, payload, from_version);
            }
        }
    }

    fn install(&mut self, component: &str, payload: Value, schema_version: u32) {
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                warn!(component, payload = %other, "payload root is not a map, resetting to defaults");
                match defaults::for_component(component) {
                    Value::Object(map) => map,
                    _ => Map::new(),
                }
            }
        };
        self.components.insert(
            component.to_string(),
            Component {
                payload,
                schema_version,
            },
        );
    }

    // ── path-addressed access ────────────────────────────────────────

    /// Read the value at `path_key`, or `None` if unset.
    ///
    /// A path consisting of just a component name returns that
    /// component's whole payload.
    pub fn get(&self, path_key: &str) -> StateResult<Option<Value>> {
        let key = PathKey::parse(path_key)?;
        let (component, rest) = key.resolve(COMPONENTS, DEFAULT_COMPONENT);
        let Some(component) = self.components.get(component) else {
            return Ok(None);
        };
        if rest.is_empty() {
            return Ok(Some(Value::Object(component.payload.clone())));
        }
        Ok(path::get_in(&component.payload, rest).cloned())
    }

    /// Read the value at `path_key`, falling back to `default`.
    #[must_use]
    pub fn get_or(&self, path_key: &str, default: Value) -> Value {
        self.get(path_key).ok().flatten().unwrap_or(default)
    }

    /// Read an integer, or `None` if unset or not an integer.
    #[must_use]
    pub fn get_i64(&self, path_key: &str) -> Option<i64> {
        self.get(path_key).ok().flatten().and_then(|v| v.as_i64())
    }

    /// Read a float, or `None` if unset or not numeric.
    #[must_use]
    pub fn get_f64(&self, path_key: &str) -> Option<f64> {
        self.get(path_key).ok().flatten().and_then(|v| v.as_f64())
    }

    /// Read a boolean, or `None` if unset or not a boolean.
    #[must_use]
    pub fn get_bool(&self, path_key: &str) -> Option<bool> {
        self.get(path_key).ok().flatten().and_then(|v| v.as_bool())
    }

    /// Read a string, or `None` if unset or not a string.
    #[must_use]
    pub fn get_string(&self, path_key: &str) -> Option<String> {
        self.get(path_key)
            .ok()
            .flatten()
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Write `value` at `path_key`, creating intermediate maps as
    /// needed. Mutations are volatile until the next save.
    pub fn set(&mut self, path_key: &str, value: impl Into<Value>) -> StateResult<()> {
        let value = value.into();
        let key = PathKey::parse(path_key)?;
        let (name, rest) = key.resolve(COMPONENTS, DEFAULT_COMPONENT);

        let component = self
            .components
            .entry(name.to_string())
            .or_insert_with(|| Component {
                payload: match defaults::for_component(name) {
                    Value::Object(map) => map,
                    _ => Map::new(),
                },
                schema_version: SCHEMA_VERSION,
            });

        if rest.is_empty() {
            let Value::Object(map) = value else {
                return Err(StateError::InvalidArgument(format!(
                    "cannot replace component {name} with a non-map value"
                )));
            };
            component.payload = map;
            return Ok(());
        }
        path::set_in(&mut component.payload, rest, value);
        Ok(())
    }

    /// Remove the value at `path_key`, returning whether anything was
    /// removed. Component roots cannot be deleted; use [`Self::reset`].
    pub fn delete(&mut self, path_key: &str) -> StateResult<bool> {
        let key = PathKey::parse(path_key)?;
        let (name, rest) = key.resolve(COMPONENTS, DEFAULT_COMPONENT);
        if rest.is_empty() {
            return Err(StateError::InvalidArgument(format!(
                "refusing to delete component {name} root"
            )));
        }
        Ok(self
            .components
            .get_mut(name)
            .map(|c| path::delete_in(&mut c.payload, rest))
            .unwrap_or(false))
    }

    /// Deep copy of the entire store, keyed by component name.
    #[must_use]
    pub fn get_all(&self) -> Value {
        Value::Object(
            self.components
                .iter()
                .map(|(name, c)| (name.clone(), Value::Object(c.payload.clone())))
                .collect(),
        )
    }

    // ── persistence ──────────────────────────────────────────────────

    /// Persist every component sequentially. Each failure is logged and
    /// the first one is returned after the remaining components have
    /// still been attempted.
    pub fn save(&self) -> StateResult<()> {
        let mut first_error = None;
        for component in COMPONENTS {
            if let Err(err) = self.save_component(component) {
                warn!(component, error = %err, "component save failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Persist one component through the atomic writer.
    pub fn save_component(&self, component: &str) -> StateResult<()> {
        let Some(entry) = self.components.get(component) else {
            return Err(StateError::InvalidArgument(format!(
                "unknown component: {component}"
            )));
        };
        let path = self.component_path(component);
        writer::atomic_write(
            &path,
            &Value::Object(entry.payload.clone()),
            entry.schema_version,
        )?;
        debug!(component, "component saved");
        Ok(())
    }

    /// Flush all components; the final call before process exit.
    pub fn shutdown(&self) -> StateResult<()> {
        info!("flushing state before shutdown");
        self.save()
    }

    // ── diagnostics and recovery ─────────────────────────────────────

    /// Validate every component's on-disk primary and report the
    /// snapshot chain for each.
    #[must_use]
    pub fn verify(&self) -> VerifyReport {
        verify_dir(&self.config)
    }

    /// Force recovery of every component from backups, then heuristics,
    /// then defaults — the primary is distrusted. Unsaved in-memory
    /// mutations are discarded.
    pub fn restore(&mut self) {
        info!("forcing recovery of every component from backups");
        for name in COMPONENTS {
            let path = self.component_path(name);
            match reader::read_from_backups(&path) {
                Ok(loaded) => {
                    if let LoadSource::Backup(slot) = loaded.source {
                        info!(component = name, slot, "component restored from backup");
                    }
                    self.install_migrated(name, &path, loaded.payload, loaded.schema_version);
                }
                Err(err) => {
                    warn!(component = name, error = %err, "no valid backup, entering corruption recovery");
                    let payload = recovery::recover(&path, name, SCHEMA_VERSION);
                    self.install(name, payload, SCHEMA_VERSION);
                }
            }
        }
    }

    /// Restore every component to defaults and force-persist them.
    pub fn reset(&mut self) -> StateResult<()> {
        info!("resetting all components to defaults");
        for name in COMPONENTS {
            self.install(name, defaults::for_component(name), SCHEMA_VERSION);
        }
        self.save()
    }
}

// ── reports ──────────────────────────────────────────────────────────

/// Validate every component file in a data directory without loading a
/// store. Pure inspection: nothing is repaired, healed or written, which
/// is what diagnostic tooling wants before deciding to intervene.
#[must_use]
pub fn verify_dir(config: &StateConfig) -> VerifyReport {
    let mut components = Vec::new();
    let mut all_valid = true;
    for name in COMPONENTS {
        let path = config.data_dir.join(format!("{name}.{STATE_FILE_EXT}"));
        let report = match reader::read_and_validate(&path) {
            Ok(envelope) => ComponentReport {
                component: (*name).to_string(),
                valid: true,
                schema_version: Some(envelope.schema_version),
                timestamp: Some(envelope.timestamp),
                error: None,
                backups: backup::status(&path),
            },
            Err(err) => {
                all_valid = false;
                ComponentReport {
                    component: (*name).to_string(),
                    valid: false,
                    schema_version: None,
                    timestamp: None,
                    error: Some(err.to_string()),
                    backups: backup::status(&path),
                }
            }
        };
        components.push(report);
    }
    VerifyReport {
        all_valid,
        components,
    }
}

/// Validity and snapshot chain of one component's on-disk state.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    pub component: String,
    pub valid: bool,
    pub schema_version: Option<u32>,
    pub timestamp: Option<i64>,
    pub error: Option<String>,
    pub backups: BackupStatus,
}

/// Aggregate result of [`StateStore::verify`].
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub all_valid: bool,
    pub components: Vec<ComponentReport>,
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_in(dir: &tempfile::TempDir) -> StateStore {
        let config = StateConfig {
            data_dir: dir.path().to_path_buf(),
            ..StateConfig::default()
        };
        StateStore::init(config).unwrap()
    }

    #[test]
    fn init_defaults_and_persists_every_component() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        for name in COMPONENTS {
            assert!(store.component_path(name).exists(), "{name} not persisted");
        }
        let report = store.verify();
        assert!(report.all_valid);
        assert_eq!(report.components.len(), COMPONENTS.len());
    }

    #[test]
    fn set_and_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);

        store.set("position.x", 10).unwrap();
        store.set("position.y", 64).unwrap();
        store.set("mining.targets", json!([[3, 60, 9]])).unwrap();

        assert_eq!(store.get_i64("position.x"), Some(10));
        assert_eq!(store.get("mining.targets.0").unwrap(), Some(json!([3, 60, 9])));
        assert_eq!(store.get("position.missing").unwrap(), None);
    }

    #[test]
    fn unrecognized_first_segment_lands_in_main() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);

        store.set("alert_threshold", 12).unwrap();
        assert_eq!(store.get_i64("main.alert_threshold"), Some(12));
    }

    #[test]
    fn set_creates_intermediate_maps() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);

        store.set("mining.run.started_at", 1_754_000_000_i64).unwrap();
        assert_eq!(store.get_i64("mining.run.started_at"), Some(1_754_000_000));
    }

    #[test]
    fn component_root_reads_whole_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let position = store.get("position").unwrap().unwrap();
        assert_eq!(position["heading"], "north");
    }

    #[test]
    fn component_root_rejects_non_map_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);

        let err = store.set("position", 7).unwrap_err();
        assert!(matches!(err, StateError::InvalidArgument(_)));
    }

    #[test]
    fn delete_removes_leaves_not_roots() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);

        store.set("network.peers", json!(["b-2"])).unwrap();
        assert!(store.delete("network.peers").unwrap());
        assert!(!store.delete("network.peers").unwrap());
        assert!(store.delete("network").is_err());
    }

    #[test]
    fn saved_state_survives_reinit() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.set("position.x", 10).unwrap();
        store.set("position.z", -3).unwrap();
        store.save().unwrap();
        drop(store);

        let store = store_in(&dir);
        assert_eq!(store.get_i64("position.x"), Some(10));
        assert_eq!(store.get_i64("position.z"), Some(-3));
    }

    #[test]
    fn unsaved_mutations_are_volatile() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.set("position.x", 10).unwrap();
        store.save().unwrap();

        store.set("position.x", 99).unwrap();
        drop(store); // crash before the next save

        let store = store_in(&dir);
        assert_eq!(store.get_i64("position.x"), Some(10));
    }

    #[test]
    fn get_all_is_a_deep_copy() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.set("position.x", 10).unwrap();

        let mut snapshot = store.get_all();
        snapshot["position"]["x"] = json!(999);
        assert_eq!(store.get_i64("position.x"), Some(10));
    }

    #[test]
    fn reset_restores_defaults_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.set("mining.depth", 40).unwrap();
        store.save().unwrap();

        store.reset().unwrap();
        assert_eq!(store.get_i64("mining.depth"), Some(0));

        let reread = store_in(&dir);
        assert_eq!(reread.get_i64("mining.depth"), Some(0));
    }

    #[test]
    fn boot_count_increments_across_inits() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert_eq!(store.get_i64("main.boot_count"), Some(1));
        drop(store);

        let store = store_in(&dir);
        assert_eq!(store.get_i64("main.boot_count"), Some(2));
    }

    #[test]
    fn restore_rolls_back_to_last_backup_generation() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_in(&dir);
        store.set("mining.depth", 7).unwrap();
        store.save().unwrap();
        store.set("mining.depth", 8).unwrap();

        // In-memory 8 is discarded; slot 1 holds the saved 7.
        store.restore();
        assert_eq!(store.get_i64("mining.depth"), Some(7));
    }

    #[test]
    fn verify_flags_corrupted_component() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        fs::write(store.component_path("inventory"), b"garbage").unwrap();

        let report = store.verify();
        assert!(!report.all_valid);
        let inventory = report
            .components
            .iter()
            .find(|c| c.component == "inventory")
            .unwrap();
        assert!(!inventory.valid);
        assert!(inventory.error.is_some());
        assert!(inventory.backups.slots[0].exists);
    }
}
