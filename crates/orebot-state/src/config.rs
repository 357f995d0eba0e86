//! Store configuration.
//!
//! A small TOML-backed config: where the state directory lives and how
//! often the persistence scheduler flushes. Every field has a default so
//! a missing config file is not an error, and `OREBOT_DATA_DIR` can
//! override the data directory for operators pointing diagnostics at a
//! pulled robot image.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StateError, StateResult};

/// Environment variable overriding [`StateConfig::data_dir`].
pub const DATA_DIR_ENV: &str = "OREBOT_DATA_DIR";

/// Configuration for the durable state layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory holding one primary state file per component.
    pub data_dir: PathBuf,
    /// Seconds between scheduled full saves.
    pub save_interval_secs: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/state"),
            save_interval_secs: 30,
        }
    }
}

impl StateConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults. The `OREBOT_DATA_DIR`
    /// environment variable overrides the data directory either way.
    pub fn load(path: &Path) -> StateResult<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            toml::from_str(&text).map_err(|e| StateError::Config(e.to_string()))?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    /// Interval between scheduled saves, floored at one second.
    #[must_use]
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs.max(1))
    }
}

// ── tests ────────────────────────────────────────────────────────────
