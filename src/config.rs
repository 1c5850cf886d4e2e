//! Manager configuration.

use std::time::Duration;

use crate::error::GeofenceError;

/// Configuration for [`GeofenceManager`](crate::manager::GeofenceManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Repeats of the same `(identifier, crossing)` pair closer than this are
    /// treated as platform redeliveries and dropped.
    pub debounce_window: Duration,
    /// How often the worker prunes expired debounce entries when idle.
    pub prune_interval: Duration,
    /// Max queued snapshot writes before mutations wait on the persister.
    pub persist_queue_capacity: usize,
    /// Character budget for alert titles derived from notes.
    pub title_max_chars: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_secs(5),
            prune_interval: Duration::from_secs(30),
            persist_queue_capacity: 64,
            title_max_chars: 40,
        }
    }
}

impl ManagerConfig {
    const MIN_TITLE_CHARS: usize = 4;

    /// Validate the configuration, returning it unchanged on success.
    pub fn validate(self) -> Result<Self, GeofenceError> {
        if self.prune_interval.is_zero() {
            return Err(GeofenceError::internal("prune_interval must be non-zero"));
        }
        if self.persist_queue_capacity == 0 {
            return Err(GeofenceError::internal("persist_queue_capacity must be at least 1"));
        }
        if self.title_max_chars < Self::MIN_TITLE_CHARS {
            return Err(GeofenceError::internal(format!(
                "title_max_chars must be at least {} (got {})",
                Self::MIN_TITLE_CHARS,
                self.title_max_chars
            )));
        }
        if chrono::Duration::from_std(self.debounce_window).is_err() {
            return Err(GeofenceError::internal("debounce_window is out of range"));
        }
        Ok(self)
    }
}
