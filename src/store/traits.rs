//! Abstract storage contract for geofence records.

use thiserror::Error;

use crate::record::GeofenceRecord;

/// Errors that can occur while persisting geofences.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored bytes failed validation (bad magic, CRC mismatch, bad code).
    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Another process holds the store directory.
    #[error("Store is locked: {0}")]
    Locked(String),

    /// Failure injected by a test backend.
    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Storage trait for the ordered geofence collection.
///
/// # Contract
/// - `load` never fails: missing or corrupt state yields an empty collection
/// - `save` replaces the whole collection atomically; a failed save leaves the
///   previously persisted snapshot readable
/// - Insertion order is preserved
pub trait GeofenceStore: Send + Sync {
    /// Restore the persisted collection, or an empty one.
    fn load(&self) -> Vec<GeofenceRecord>;

    /// Persist the full collection in order.
    fn save(&self, records: &[GeofenceRecord]) -> Result<(), StorageError>;
}
