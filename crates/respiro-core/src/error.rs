//! Core error types for respiro-core.
//!
//! Only [`EngineError`] ever reaches a caller of the session engine.
//! [`FeedbackError`] is produced by feedback ports and swallowed (logged) by
//! the engine, and [`SettingsError`] covers the persisted key/value store.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for respiro-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Session engine errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Settings persistence errors
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Feedback port errors
    #[error("Feedback error: {0}")]
    Feedback(#[from] FeedbackError),

    /// Session history queries
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by [`crate::SessionEngine`] commands.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// `start()` was called while a session is active.
    #[error("a breathing session is already running")]
    AlreadyRunning,
}

/// Failures reported by a feedback port (audio device missing, haptic
/// backend unavailable, ...).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedbackError {
    /// The channel has no usable backend.
    #[error("{channel} feedback is unavailable")]
    Unavailable { channel: &'static str },

    /// A cue asset could not be loaded.
    #[error("feedback asset '{name}' is missing")]
    AssetMissing { name: String },

    /// The backend accepted the call and then failed.
    #[error("{channel} backend error: {message}")]
    Backend {
        channel: &'static str,
        message: String,
    },
}

/// Settings store (persistence) errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Reading a key failed
    #[error("Failed to read setting '{key}': {message}")]
    ReadFailed { key: String, message: String },

    /// Writing a key failed; the previously persisted value is left in place
    #[error("Failed to write setting '{key}': {message}")]
    WriteFailed { key: String, message: String },

    /// Key is not part of the settings contract
    #[error("Unknown setting key: {0}")]
    UnknownKey(String),

    /// Value does not parse for this key
    #[error("Invalid value '{value}' for setting '{key}': {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },

    /// Failed to open the settings database
    #[error("Failed to open settings database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Any other SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(#[from] std::io::Error),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn start_twice() -> Result<()> {
        Err(EngineError::AlreadyRunning)?;
        Ok(())
    }

    #[test]
    fn errors_convert_into_core_error() {
        let err = start_twice().unwrap_err();
        assert!(matches!(err, CoreError::Engine(EngineError::AlreadyRunning)));
        assert_eq!(err.to_string(), "Engine error: a breathing session is already running");

        let err: CoreError = SettingsError::UnknownKey("volume".into()).into();
        assert_eq!(err.to_string(), "Settings error: Unknown setting key: volume");

        let err: CoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, CoreError::Database(_)));
    }
}
