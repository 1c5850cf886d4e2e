//! Region monitoring.
//!
//! The platform's circular-region capability is consumed through the
//! [`RegionPlatform`] trait. [`RegionMonitorAdapter`] wraps it, checks
//! preconditions and forwards asynchronous [`PlatformSignal`]s to a single
//! registered callback.

/// Adapter between records and the platform.
pub mod adapter;
/// Platform signals and the sink that carries them.
pub mod event;
/// The platform capability trait.
pub mod platform;
/// In-process simulated platform.
pub mod simulated;

pub use adapter::RegionMonitorAdapter;
pub use event::{PlatformSignal, RegionEvent, RegionEventSink};
pub use platform::{Availability, CircularRegion, RegionPlatform};
pub use simulated::SimulatedPlatform;
