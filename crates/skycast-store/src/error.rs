//! Error types for skycast-store.

use std::path::PathBuf;

/// Result type for skycast-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in skycast-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A thread panicked while holding the store lock.
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
