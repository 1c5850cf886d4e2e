//! In-process [`RegionPlatform`] for tests and embedding.
//!
//! Every clone shares one simulated device, so a test can hand a clone to the
//! adapter and keep another to fire crossings, revoke permission or drop
//! regions behind the manager's back.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::MonitoringError;
use crate::record::{Crossing, GeofenceId};

use super::event::RegionEventSink;
use super::platform::{Availability, CircularRegion, RegionPlatform};

/// Default monitoring ceiling of the simulated device.
pub const DEFAULT_MAX_MONITORED_REGIONS: usize = 20;

/// Default maximum monitoring distance of the simulated device, in meters.
pub const DEFAULT_MAX_MONITORING_DISTANCE: f64 = 10_000.0;

#[derive(Debug)]
struct SimState {
    availability: Availability,
    max_distance: f64,
    capacity: usize,
    regions: HashMap<GeofenceId, CircularRegion>,
    sink: Option<RegionEventSink>,
    start_calls: u64,
    stop_calls: u64,
}

/// Simulated region monitoring device.
#[derive(Debug, Clone)]
pub struct SimulatedPlatform {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MONITORED_REGIONS, DEFAULT_MAX_MONITORING_DISTANCE)
    }
}

impl SimulatedPlatform {
    /// Create a device with the given ceiling and maximum radius.
    #[must_use]
    pub fn new(capacity: usize, max_distance: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                availability: Availability::Available,
                max_distance,
                capacity,
                regions: HashMap::new(),
                sink: None,
                start_calls: 0,
                stop_calls: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Change hardware/permission state, e.g. to simulate a revoked permission.
    pub fn set_availability(&self, availability: Availability) {
        self.lock().availability = availability;
    }

    /// The region currently monitored under `identifier`.
    #[must_use]
    pub fn region(&self, identifier: &GeofenceId) -> Option<CircularRegion> {
        self.lock().regions.get(identifier).cloned()
    }

    /// Forget every region without telling anyone, like a device reboot.
    pub fn drop_all(&self) {
        self.lock().regions.clear();
    }

    /// Forget one region without telling anyone.
    pub fn drop_region(&self, identifier: &GeofenceId) {
        self.lock().regions.remove(identifier);
    }

    /// Register a region directly, bypassing the adapter (e.g. left over from
    /// a previous installation).
    pub fn inject_region(&self, region: CircularRegion) {
        self.lock().regions.insert(region.identifier.clone(), region);
    }

    /// Deliver a raw crossing for a monitored region.
    ///
    /// Returns false if the region is not monitored or nobody is listening.
    /// Direction flags are not applied, matching platforms that report both
    /// directions.
    pub fn fire(&self, identifier: impl Into<GeofenceId>, crossing: Crossing, timestamp: DateTime<Utc>) -> bool {
        let identifier = identifier.into();
        let sink = {
            let state = self.lock();
            if !state.regions.contains_key(&identifier) {
                return false;
            }
            state.sink.clone()
        };
        sink.is_some_and(|s| s.crossing(identifier, crossing, timestamp))
    }

    /// Drop a monitored region and report the failure asynchronously.
    pub fn fail_region(&self, identifier: impl Into<GeofenceId>, reason: MonitoringError) -> bool {
        let identifier = identifier.into();
        let sink = {
            let mut state = self.lock();
            if state.regions.remove(&identifier).is_none() {
                return false;
            }
            state.sink.clone()
        };
        sink.is_some_and(|s| s.monitoring_failed(identifier, reason))
    }

    /// Number of `start` calls that reached the device.
    #[must_use]
    pub fn start_calls(&self) -> u64 {
        self.lock().start_calls
    }

    /// Number of `stop` calls that reached the device.
    #[must_use]
    pub fn stop_calls(&self) -> u64 {
        self.lock().stop_calls
    }
}

impl RegionPlatform for SimulatedPlatform {
    fn availability(&self) -> Availability {
        self.lock().availability
    }

    fn max_monitoring_distance(&self) -> f64 {
        self.lock().max_distance
    }

    fn max_monitored_regions(&self) -> usize {
        self.lock().capacity
    }

    fn start(&mut self, region: &CircularRegion) -> Result<(), MonitoringError> {
        let mut state = self.lock();
        state.start_calls += 1;
        if region.radius > state.max_distance {
            return Err(MonitoringError::UnsupportedRegion {
                radius: region.radius,
                max: state.max_distance,
            });
        }
        if !state.regions.contains_key(&region.identifier) && state.regions.len() >= state.capacity {
            return Err(MonitoringError::MonitoringUnavailable {
                reason: crate::error::UnavailableReason::AtCapacity,
            });
        }
        state.regions.insert(region.identifier.clone(), region.clone());
        Ok(())
    }

    fn stop(&mut self, identifier: &GeofenceId) {
        let mut state = self.lock();
        state.stop_calls += 1;
        state.regions.remove(identifier);
    }

    fn monitored(&self) -> HashSet<GeofenceId> {
        self.lock().regions.keys().cloned().collect()
    }

    fn attach(&mut self, sink: RegionEventSink) {
        self.lock().sink = Some(sink);
    }
}
