//! Translation layer between geofence records and the platform.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{MonitoringError, UnavailableReason};
use crate::record::{GeofenceId, GeofenceRecord};

use super::event::{PlatformSignal, RegionEventSink};
use super::platform::{Availability, CircularRegion, RegionPlatform};

/// Starts and stops per-record monitoring and forwards platform signals.
///
/// The adapter checks every precondition it can before calling the platform,
/// so callers get a typed [`MonitoringError`] instead of a silent no-op.
pub struct RegionMonitorAdapter {
    platform: Box<dyn RegionPlatform>,
    sink: RegionEventSink,
}

impl fmt::Debug for RegionMonitorAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionMonitorAdapter")
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl RegionMonitorAdapter {
    /// Wrap a platform and attach the adapter's signal sink to it.
    pub fn new(mut platform: Box<dyn RegionPlatform>) -> Self {
        let sink = RegionEventSink::default();
        platform.attach(sink.clone());
        Self { platform, sink }
    }

    /// Register the callback that receives every platform signal.
    ///
    /// Replaces any previous callback. The callback runs on whatever thread
    /// the platform delivers from.
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(PlatformSignal) + Send + Sync + 'static,
    {
        self.sink.set(Some(Arc::new(callback)));
    }

    /// Remove the registered callback. Later signals are dropped.
    pub fn clear_callback(&self) {
        self.sink.set(None);
    }

    /// Largest radius the platform will monitor, in meters.
    #[must_use]
    pub fn max_monitoring_distance(&self) -> f64 {
        self.platform.max_monitoring_distance()
    }

    /// Maximum number of regions monitored at once.
    #[must_use]
    pub fn monitoring_ceiling(&self) -> usize {
        self.platform.max_monitored_regions()
    }

    /// Start monitoring `record`.
    ///
    /// # Errors
    /// - `UnsupportedRegion` if the radius exceeds the platform maximum
    /// - `MonitoringUnavailable` without hardware or permission, or when the
    ///   platform is already at its ceiling
    pub fn start_monitoring(&mut self, record: &GeofenceRecord) -> Result<(), MonitoringError> {
        let max = self.platform.max_monitoring_distance();
        if record.radius > max {
            return Err(MonitoringError::UnsupportedRegion {
                radius: record.radius,
                max,
            });
        }

        match self.platform.availability() {
            Availability::Available => {}
            Availability::NoHardware => {
                return Err(MonitoringError::MonitoringUnavailable {
                    reason: UnavailableReason::NoHardware,
                });
            }
            Availability::PermissionDenied => {
                return Err(MonitoringError::MonitoringUnavailable {
                    reason: UnavailableReason::PermissionDenied,
                });
            }
        }

        let monitored = self.platform.monitored();
        if !monitored.contains(&record.identifier) && monitored.len() >= self.platform.max_monitored_regions() {
            return Err(MonitoringError::MonitoringUnavailable {
                reason: UnavailableReason::AtCapacity,
            });
        }

        self.platform.start(&CircularRegion::from(record))?;
        tracing::debug!(id = %record.identifier, radius = record.radius, "region monitoring started");
        Ok(())
    }

    /// Stop monitoring `identifier`. A no-op if it is not monitored.
    pub fn stop_monitoring(&mut self, identifier: &GeofenceId) {
        if self.platform.monitored().contains(identifier) {
            self.platform.stop(identifier);
            tracing::debug!(id = %identifier, "region monitoring stopped");
        }
    }

    /// The platform's authoritative view of what is monitored.
    #[must_use]
    pub fn currently_monitored_identifiers(&self) -> HashSet<GeofenceId> {
        self.platform.monitored()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::SimulatedPlatform;
    use crate::record::{Coordinate, Crossing, EventType};
    use chrono::Utc;
    use std::sync::Mutex;

    fn rec(id: &str, radius: f64) -> GeofenceRecord {
        GeofenceRecord::with_identifier(id, Coordinate::new(10.0, 20.0), radius, "", EventType::OnEntry)
    }

    fn adapter(capacity: usize) -> (RegionMonitorAdapter, SimulatedPlatform) {
        let platform = SimulatedPlatform::new(capacity, 1_000.0);
        (RegionMonitorAdapter::new(Box::new(platform.clone())), platform)
    }

    #[test]
    fn test_start_and_stop() {
        let (mut adapter, platform) = adapter(2);
        adapter.start_monitoring(&rec("a", 100.0)).unwrap();
        assert!(adapter.currently_monitored_identifiers().contains(&GeofenceId::from("a")));
        assert!(platform.region(&GeofenceId::from("a")).unwrap().notify_on_entry);

        adapter.stop_monitoring(&GeofenceId::from("a"));
        assert!(adapter.currently_monitored_identifiers().is_empty());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut adapter, platform) = adapter(2);
        adapter.stop_monitoring(&GeofenceId::from("ghost"));
        adapter.stop_monitoring(&GeofenceId::from("ghost"));
        assert_eq!(platform.stop_calls(), 0);
    }

    #[test]
    fn test_unsupported_radius() {
        let (mut adapter, _platform) = adapter(2);
        let err = adapter.start_monitoring(&rec("a", 1_000.5)).unwrap_err();
        assert!(matches!(err, MonitoringError::UnsupportedRegion { .. }));
    }

    #[test]
    fn test_unavailable_reasons() {
        let (mut adapter, platform) = adapter(1);

        platform.set_availability(Availability::PermissionDenied);
        let err = adapter.start_monitoring(&rec("a", 10.0)).unwrap_err();
        assert_eq!(
            err,
            MonitoringError::MonitoringUnavailable { reason: UnavailableReason::PermissionDenied }
        );

        platform.set_availability(Availability::Available);
        adapter.start_monitoring(&rec("a", 10.0)).unwrap();
        let err = adapter.start_monitoring(&rec("b", 10.0)).unwrap_err();
        assert_eq!(
            err,
            MonitoringError::MonitoringUnavailable { reason: UnavailableReason::AtCapacity }
        );

        // Restarting an already monitored region does not need a free slot.
        adapter.start_monitoring(&rec("a", 20.0)).unwrap();
        assert_eq!(platform.region(&GeofenceId::from("a")).unwrap().radius, 20.0);
    }

    #[test]
    fn test_callback_receives_platform_crossings() {
        let (mut adapter, platform) = adapter(2);
        let seen: Arc<Mutex<Vec<PlatformSignal>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        adapter.register_callback(move |s| seen_cb.lock().unwrap().push(s));

        adapter.start_monitoring(&rec("a", 10.0)).unwrap();
        assert!(platform.fire("a", Crossing::Entered, Utc::now()));
        assert_eq!(seen.lock().unwrap().len(), 1);

        adapter.clear_callback();
        assert!(!platform.fire("a", Crossing::Exited, Utc::now()));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
