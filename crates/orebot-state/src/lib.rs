//! # orebot-state
//!
//! Durable state layer for the orebot field agent.
//!
//! The robot runs unattended for hours and can lose power at any
//! instant. This crate guarantees that its operational state — position,
//! inventory, mission progress, configuration — survives abrupt
//! termination and always loads back into a valid in-memory form, even
//! when the on-disk data is partially destroyed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  StateStore (path-addressed component tree)  │
//! │  PersistenceScheduler (periodic full saves)  │
//! ├──────────────────────────────────────────────┤
//! │  Reader/Validator → backups → Recovery       │
//! │  Migration (version-gated transforms)        │
//! ├──────────────────────────────────────────────┤
//! │  Atomic Writer (tmp → verify → rename)       │
//! │  Backup rotation (3 generations per file)    │
//! │  Envelope (schema version + CRC-32 + time)   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use orebot_state::{StateConfig, StateStore};
//!
//! let mut store = StateStore::init(StateConfig::default())?;
//! store.set("position.x", 10)?;
//! store.save()?;
//! ```

pub mod backup;
pub mod checksum;
pub mod config;
pub mod defaults;
pub mod envelope;
pub mod error;
pub mod migration;
pub mod path;
pub mod reader;
pub mod recovery;
pub mod scheduler;
pub mod store;
pub mod writer;

// ── re-exports ───────────────────────────────────────────────────────

pub use backup::{BACKUP_SLOTS, BackupStatus, FileStatus};
pub use config::StateConfig;
pub use envelope::Envelope;
pub use error::{StateError, StateResult};
pub use migration::SCHEMA_VERSION;
pub use path::PathKey;
pub use scheduler::PersistenceScheduler;
pub use store::{ComponentReport, STATE_FILE_EXT, StateStore, VerifyReport, verify_dir};
