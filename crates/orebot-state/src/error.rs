//! Error types for the orebot-state crate.
//!
//! All storage operations return [`StateError`] via [`StateResult`].
//! Read-path errors are handled inside the store's fallback chain and
//! never surface as fatal; write-path errors are reported to the caller
//! of `save`, which retries on the next scheduler tick.

use std::path::PathBuf;

use thiserror::Error;

/// Alias for `Result<T, StateError>`.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur in the durable state layer.
#[derive(Debug, Error)]
pub enum StateError {
    /// A payload could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// On-disk bytes could not be decoded into an envelope or payload.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The checksum stored in an envelope disagrees with the checksum
    /// recomputed from its payload.
    #[error("checksum mismatch: stored 0x{stored:08x}, computed 0x{computed:08x}")]
    ChecksumMismatch {
        /// Checksum recorded in the envelope.
        stored: u32,
        /// Checksum recomputed from the re-serialized payload.
        computed: u32,
    },

    /// The state file does not exist.
    #[error("state file not found: {}", .path.display())]
    FileNotFound {
        /// Path that was probed.
        path: PathBuf,
    },

    /// Read-back of a freshly written temp file did not match what was
    /// intended to be written.
    #[error("write verification failed: {}", .path.display())]
    WriteVerificationFailed {
        /// Primary path the write was destined for.
        path: PathBuf,
    },

    /// The primary file and every backup slot failed validation.
    #[error("all backups exhausted for {}: primary and {slots} slots invalid", .path.display())]
    AllBackupsExhausted {
        /// Primary path whose snapshot chain was walked.
        path: PathBuf,
        /// Number of backup slots that were tried.
        slots: usize,
    },

    /// A schema migration transform failed.
    #[error("migration v{version} failed: {message}")]
    Migration {
        /// Version of the transform that failed.
        version: u32,
        /// What went wrong.
        message: String,
    },

    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The configuration file could not be parsed.
    #[error("invalid config: {0}")]
    Config(String),

    /// Underlying file I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
