//! Error types for geonote.
//!
//! Errors are layered the same way the components are: input errors are
//! raised before any state changes, monitoring errors come from the platform
//! capability, and storage errors come from the snapshot store. All of them
//! fold into [`GeofenceError`] for callers of the manager.

use std::fmt;

use thiserror::Error;

use crate::record::GeofenceId;
use crate::store::StorageError;

/// Errors caused by caller input. Nothing has been mutated when one of these
/// is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("Radius {radius}m is out of range (0, {max}]")]
    InvalidRadius {
        radius: f64,
        max: f64,
    },

    #[error("Coordinate ({latitude}, {longitude}) is not a valid position")]
    InvalidCoordinate {
        latitude: f64,
        longitude: f64,
    },

    #[error("Geofence '{id}' already exists")]
    DuplicateIdentifier {
        id: GeofenceId,
    },

    #[error("Geofence not found: {id}")]
    NotFound {
        id: GeofenceId,
    },
}

/// Why the platform cannot monitor a region right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnavailableReason {
    /// The device has no region monitoring hardware.
    NoHardware,
    /// The user has not granted location permission.
    PermissionDenied,
    /// The platform is already watching its maximum number of regions.
    AtCapacity,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoHardware => "region monitoring is not supported on this device",
            Self::PermissionDenied => "location permission was denied",
            Self::AtCapacity => "monitoring ceiling reached",
        };
        f.write_str(s)
    }
}

/// Capability errors reported by the region monitor.
///
/// These never crash the process; the affected record stays persisted and is
/// tracked as unmonitored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MonitoringError {
    #[error("Region radius {radius}m exceeds the platform maximum of {max}m")]
    UnsupportedRegion {
        radius: f64,
        max: f64,
    },

    #[error("Region monitoring unavailable: {reason}")]
    MonitoringUnavailable {
        reason: UnavailableReason,
    },
}

impl MonitoringError {
    /// Returns true when the failure applies to every region, not just the
    /// one being started.
    #[must_use]
    pub const fn is_capability_wide(&self) -> bool {
        matches!(self, Self::MonitoringUnavailable { .. })
    }
}

/// Top-level error type returned by the geofence manager.
#[derive(Debug, Error)]
pub enum GeofenceError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Monitoring error: {0}")]
    Monitoring(#[from] MonitoringError),

    /// The store write failed. In-memory state is kept and will be written
    /// again by the next successful save.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StorageError),

    #[error("Geofence manager has shut down")]
    Shutdown,

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl GeofenceError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is an input error.
    #[must_use]
    pub const fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }

    /// Returns true if this is a monitoring capability error.
    #[must_use]
    pub const fn is_monitoring(&self) -> bool {
        matches!(self, Self::Monitoring(_))
    }

    /// Returns true if the store write failed.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// Returns true if this is a `NotFound` input error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Input(InputError::NotFound { .. }))
    }
}

/// Result type alias for geonote operations.
pub type GeofenceResult<T> = Result<T, GeofenceError>;
