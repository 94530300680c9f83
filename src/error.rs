//! Engine-level error types.
//!
//! Provider failures are recorded per cycle in the `SyncReport` rather than
//! surfaced here; `EngineError` covers the failures that abort a cycle
//! outright (configuration, lock, state store).

use std::io;
use thiserror::Error;

/// Errors that abort a sync cycle.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid configuration, detected before the engine starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// The state directory lock is held by a live process.
    #[error("another sync run is in progress (pid {pid})")]
    LockHeld { pid: u32 },

    /// State file exists but cannot be parsed. Never silently wiped.
    #[error("corrupt state file {path}: {message}")]
    CorruptState { path: String, message: String },

    /// State store read/write failure.
    #[error("state store error: {0}")]
    State(String),

    /// IO error (lock file, state directory)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state store error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
