//! # geonote - Geofence Lifecycle Manager
//!
//! geonote keeps a user's collection of location reminders (geofences) in
//! step with a platform region-monitoring service and a durable store, and
//! turns region crossings into user-facing alerts.
//!
//! ## Core Concepts
//!
//! - **GeofenceRecord**: A circular region with a note and a trigger direction
//! - **GeofenceStore**: Durable, order-preserving storage of the collection
//! - **RegionMonitorAdapter**: Bounded platform monitoring with a capacity ceiling
//! - **GeofenceManager**: Serializes mutations, admission and event handling
//! - **NotificationDispatcher**: Presents an alert for an accepted crossing
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use geonote::{
//!     ChannelDispatcher, Coordinate, EventType, GeofenceManager, GeofenceRecord,
//!     InMemoryGeofenceStore, ManagerConfig, RegionMonitorAdapter, SimulatedPlatform,
//! };
//!
//! let (dispatcher, alerts) = ChannelDispatcher::new();
//! let manager = GeofenceManager::start(
//!     ManagerConfig::default(),
//!     Arc::new(InMemoryGeofenceStore::new()),
//!     RegionMonitorAdapter::new(Box::new(SimulatedPlatform::default())),
//!     Arc::new(dispatcher),
//! )?;
//! manager.reconcile_on_startup()?;
//!
//! let record = GeofenceRecord::new(
//!     Coordinate::new(37.33, -122.03),
//!     100.0,
//!     "Buy milk",
//!     EventType::OnEntry,
//! );
//! manager.add_record(record)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod notify;
pub mod record;
pub mod store;

// Re-export primary types at crate root for convenience
pub use config::ManagerConfig;
pub use error::{GeofenceError, GeofenceResult, InputError, MonitoringError, UnavailableReason};
pub use manager::{EventDisposition, GeofenceManager, GeofenceView, MonitorState, ReconcileReport};
pub use monitor::{
    Availability, CircularRegion, PlatformSignal, RegionEvent, RegionEventSink, RegionMonitorAdapter,
    RegionPlatform, SimulatedPlatform,
};
pub use notify::{ChannelDispatcher, DispatchError, Notification, NotificationDispatcher, NotificationStream};
pub use record::{Coordinate, Crossing, EventType, GeofenceId, GeofenceRecord};
pub use store::{GeofenceStore, InMemoryGeofenceStore, StorageError};

#[cfg(feature = "persistent")]
pub use store::{open_store, FileGeofenceStore, StoreConfig};
