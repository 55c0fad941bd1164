//! Local key/value persistence for cached forecasts.
//!
//! This crate stores opaque byte payloads under string keys. Encoding and
//! decoding happen in the caller; the store never inspects a payload.
//!
//! # Features
//!
//! - SQLite-backed [`Store`] with WAL journaling and versioned schema
//! - In-memory [`MemoryStore`] for tests
//! - A [`KeyValueStore`] trait so callers can swap either in
//!
//! # Example
//!
//! ```no_run
//! use skycast_store::{KeyValueStore, Store};
//!
//! let store = Store::open_default()?;
//! store.set("momentum:59.9:30.3", b"{}")?;
//! assert!(store.get("momentum:59.9:30.3")?.is_some());
//! # Ok::<(), skycast_store::Error>(())
//! ```

mod error;
mod memory;
mod schema;
mod store;

pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use store::Store;

/// A synchronous byte-oriented key/value store.
///
/// Implementations must be safe to share between threads. Removing an
/// absent key is not an error.
pub trait KeyValueStore: Send + Sync {
    /// Read the payload stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or replace the payload stored under `key`.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete the payload stored under `key`, if any.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/skycast/cache.db`
/// - macOS: `~/Library/Application Support/skycast/cache.db`
/// - Windows: `C:\Users\<user>\AppData\Local\skycast\cache.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("skycast")
        .join("cache.db")
}
