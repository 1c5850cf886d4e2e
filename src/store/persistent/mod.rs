//! Durable snapshot storage for geofences.
//!
//! The whole collection is written as one checksummed snapshot file:
//! - writes go to a uniquely named temp file, are fsynced, then renamed over
//!   the snapshot, so a crash or failed write leaves the old snapshot intact
//! - a directory lock keeps a second process out
//! - anything unreadable on load is treated as "no prior state"
//!
//! ```text
//! <store dir>/
//!   .geonote.lock
//!   geofences.snap
//!   geofences.snap.tmp.<uuid>   (only while a save is in flight)
//! ```

mod codec;
mod file_lock;
mod snapshot;

pub use file_lock::StoreLock;
pub use snapshot::FileGeofenceStore;

use std::path::Path;

use crate::store::StorageError;

/// Configuration for the snapshot store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Snapshot file name inside the store directory.
    pub file_name: String,
    /// Whether to fsync the snapshot and directory after every save.
    pub sync_on_write: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file_name: "geofences.snap".to_string(),
            sync_on_write: true,
        }
    }
}

impl StoreConfig {
    /// Validate the configuration, returning it unchanged on success.
    pub fn validate(self) -> Result<Self, StorageError> {
        let name = self.file_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(StorageError::Serialization(format!(
                "snapshot file name must be a plain file name (got {:?})",
                self.file_name
            )));
        }
        Ok(self)
    }
}

/// Open or create a snapshot store in `dir`.
///
/// # Errors
/// - `Locked` if another process holds the directory
/// - `Io` if the directory cannot be created or accessed
///
/// # Example
/// ```rust,ignore
/// use geonote::store::open_store;
///
/// let store = open_store("./geofences", None)?;
/// let records = store.load();
/// ```
pub fn open_store(dir: impl AsRef<Path>, config: Option<StoreConfig>) -> Result<FileGeofenceStore, StorageError> {
    let cfg = config.unwrap_or_default().validate()?;
    FileGeofenceStore::open(dir.as_ref(), cfg)
}
