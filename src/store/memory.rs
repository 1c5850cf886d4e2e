//! In-memory storage backend.
//!
//! Thread-safe and cheap to clone: every clone shares the same collection, so
//! a test can hand one handle to the manager and inspect another.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::record::GeofenceRecord;
use crate::store::traits::{GeofenceStore, StorageError};

#[derive(Debug, Default)]
struct Inner {
    records: RwLock<Vec<GeofenceRecord>>,
    fail_saves: AtomicBool,
    saves: AtomicU64,
}

/// Shared in-memory geofence store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGeofenceStore {
    inner: Arc<Inner>,
}

impl InMemoryGeofenceStore {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `records`, as if a previous process
    /// had saved them.
    #[must_use]
    pub fn with_records(records: Vec<GeofenceRecord>) -> Self {
        let store = Self::default();
        if let Ok(mut guard) = store.inner.records.write() {
            *guard = records;
        }
        store
    }

    /// Make every subsequent `save` fail until reset.
    pub fn set_fail_saves(&self, fail: bool) {
        self.inner.fail_saves.store(fail, Ordering::Release);
    }

    /// Number of successful saves so far.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.inner.saves.load(Ordering::Acquire)
    }
}

impl GeofenceStore for InMemoryGeofenceStore {
    fn load(&self) -> Vec<GeofenceRecord> {
        match self.inner.records.read() {
            Ok(guard) => guard.clone(),
            Err(_) => {
                tracing::warn!("in-memory geofence store lock poisoned; loading empty collection");
                Vec::new()
            }
        }
    }

    fn save(&self, records: &[GeofenceRecord]) -> Result<(), StorageError> {
        if self.inner.fail_saves.load(Ordering::Acquire) {
            return Err(StorageError::Injected("save disabled".to_string()));
        }
        let mut guard = self
            .inner
            .records
            .write()
            .map_err(|_| StorageError::Injected("poisoned lock: records".to_string()))?;
        *guard = records.to_vec();
        self.inner.saves.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
