//! Signals delivered by the platform and the sink that carries them.

use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MonitoringError;
use crate::record::{Crossing, GeofenceId};

/// A boundary crossing reported by the platform.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEvent {
    pub identifier: GeofenceId,
    pub crossing: Crossing,
    pub timestamp: DateTime<Utc>,
}

impl RegionEvent {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(identifier: impl Into<GeofenceId>, crossing: Crossing, timestamp: DateTime<Utc>) -> Self {
        Self {
            identifier: identifier.into(),
            crossing,
            timestamp,
        }
    }
}

/// Everything the platform can push asynchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformSignal {
    /// The device crossed a monitored boundary.
    Crossing(RegionEvent),
    /// The platform gave up monitoring a region after accepting it.
    MonitoringFailed {
        /// Region that is no longer monitored.
        identifier: GeofenceId,
        /// Why monitoring stopped.
        reason: MonitoringError,
    },
}

pub(crate) type SignalCallback = Arc<dyn Fn(PlatformSignal) + Send + Sync>;

/// Cloneable handle the platform uses to push signals into the adapter.
///
/// Safe to call from any thread. The registered callback is cloned out of the
/// lock before it runs, so a slow callback never blocks registration.
#[derive(Clone, Default)]
pub struct RegionEventSink {
    callback: Arc<RwLock<Option<SignalCallback>>>,
}

impl fmt::Debug for RegionEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered = self.callback.read().map(|g| g.is_some()).unwrap_or(false);
        f.debug_struct("RegionEventSink")
            .field("registered", &registered)
            .finish()
    }
}

impl RegionEventSink {
    pub(crate) fn set(&self, callback: Option<SignalCallback>) {
        match self.callback.write() {
            Ok(mut guard) => *guard = callback,
            Err(poisoned) => *poisoned.into_inner() = callback,
        }
    }

    /// Push a signal. Returns false if nobody is listening.
    pub fn emit(&self, signal: PlatformSignal) -> bool {
        let callback = match self.callback.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match callback {
            Some(cb) => {
                cb(signal);
                true
            }
            None => {
                tracing::debug!(?signal, "region signal dropped: no callback registered");
                false
            }
        }
    }

    /// Report a boundary crossing.
    pub fn crossing(&self, identifier: impl Into<GeofenceId>, crossing: Crossing, timestamp: DateTime<Utc>) -> bool {
        self.emit(PlatformSignal::Crossing(RegionEvent::new(identifier, crossing, timestamp)))
    }

    /// Report that monitoring of a region failed after it was started.
    pub fn monitoring_failed(&self, identifier: impl Into<GeofenceId>, reason: MonitoringError) -> bool {
        self.emit(PlatformSignal::MonitoringFailed {
            identifier: identifier.into(),
            reason,
        })
    }
}
