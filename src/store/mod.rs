//! Geofence persistence.
//!
//! The [`GeofenceStore`] trait is the contract the manager persists through.
//! An in-memory backend is always available; the durable snapshot backend is
//! compiled with the `persistent` feature.

mod memory;
#[cfg(feature = "persistent")]
pub mod persistent;
mod traits;

pub use memory::InMemoryGeofenceStore;
pub use traits::{GeofenceStore, StorageError};

#[cfg(feature = "persistent")]
pub use persistent::{open_store, FileGeofenceStore, StoreConfig};
