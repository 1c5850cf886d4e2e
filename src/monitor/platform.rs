//! The platform's circular-region monitoring capability.
//!
//! Geonote does not detect crossings itself. A [`RegionPlatform`] is the opaque
//! capability "start/stop monitoring a circular region; deliver enter/exit
//! callbacks", implemented by the host for the device it runs on.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::MonitoringError;
use crate::record::{Coordinate, EventType, GeofenceId, GeofenceRecord};

use super::event::RegionEventSink;

/// Whether the device can monitor regions at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Monitoring hardware present and permission granted.
    Available,
    /// The device cannot monitor regions.
    NoHardware,
    /// The user denied background location permission.
    PermissionDenied,
}

/// A region in the form the platform monitors it.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircularRegion {
    pub identifier: GeofenceId,
    pub center: Coordinate,
    pub radius: f64,
    pub notify_on_entry: bool,
    pub notify_on_exit: bool,
}

impl From<&GeofenceRecord> for CircularRegion {
    fn from(record: &GeofenceRecord) -> Self {
        Self {
            identifier: record.identifier.clone(),
            center: record.coordinate,
            radius: record.radius,
            notify_on_entry: record.event_type == EventType::OnEntry,
            notify_on_exit: record.event_type == EventType::OnExit,
        }
    }
}

/// Host-provided region monitoring capability.
pub trait RegionPlatform: Send {
    /// Current hardware/permission state.
    fn availability(&self) -> Availability;

    /// Largest radius, in meters, the platform will monitor.
    fn max_monitoring_distance(&self) -> f64;

    /// Hard ceiling on concurrently monitored regions.
    fn max_monitored_regions(&self) -> usize;

    /// Begin monitoring a region. Starting an identifier that is already
    /// monitored replaces its geometry.
    fn start(&mut self, region: &CircularRegion) -> Result<(), MonitoringError>;

    /// Stop monitoring. Unknown identifiers are ignored.
    fn stop(&mut self, identifier: &GeofenceId);

    /// What the platform is actually watching right now.
    fn monitored(&self) -> HashSet<GeofenceId>;

    /// Hand the platform the sink it pushes signals into.
    fn attach(&mut self, sink: RegionEventSink);
}
