//! Geofence record model.
//!
//! A [`GeofenceRecord`] is an immutable-by-convention description of one
//! monitored circle and the reminder attached to it. Records are replaced
//! wholesale, never edited field by field.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InputError;

/// Unique identifier for a geofence.
///
/// This is the join key between the store, the region monitor and inbound
/// crossing events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeofenceId(String);

impl GeofenceId {
    /// Create a new random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeofenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GeofenceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GeofenceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A WGS-84 position in degrees.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[allow(missing_docs)]
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Returns true if both components are finite and within range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Which boundary crossing triggers the reminder.
///
/// Persisted as a fixed code: 0 = `OnEntry`, 1 = `OnExit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EventType {
    /// Alert when the device enters the region.
    OnEntry,
    /// Alert when the device leaves the region.
    OnExit,
}

impl EventType {
    /// Stable persisted code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::OnEntry => 0,
            Self::OnExit => 1,
        }
    }

    /// Returns true if a crossing in this direction should raise an alert.
    #[must_use]
    pub const fn matches(self, crossing: Crossing) -> bool {
        matches!(
            (self, crossing),
            (Self::OnEntry, Crossing::Entered) | (Self::OnExit, Crossing::Exited)
        )
    }
}

impl From<EventType> for u8 {
    fn from(value: EventType) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for EventType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::OnEntry),
            1 => Ok(Self::OnExit),
            other => Err(format!("unknown event type code {other}")),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnEntry => f.write_str("On Entry"),
            Self::OnExit => f.write_str("On Exit"),
        }
    }
}

/// Direction of a detected boundary crossing.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crossing {
    Entered,
    Exited,
}

/// One monitored circle plus its reminder.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceRecord {
    pub identifier: GeofenceId,
    pub coordinate: Coordinate,
    /// Radius in meters.
    pub radius: f64,
    pub note: String,
    pub event_type: EventType,
}

impl GeofenceRecord {
    /// Create a record with a freshly generated identifier.
    #[must_use]
    pub fn new(coordinate: Coordinate, radius: f64, note: impl Into<String>, event_type: EventType) -> Self {
        Self::with_identifier(GeofenceId::generate(), coordinate, radius, note, event_type)
    }

    /// Create a record with a caller-chosen identifier.
    ///
    /// Edit flows use this to keep the identity of the record they replace.
    #[must_use]
    pub fn with_identifier(
        identifier: impl Into<GeofenceId>,
        coordinate: Coordinate,
        radius: f64,
        note: impl Into<String>,
        event_type: EventType,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            coordinate,
            radius,
            note: note.into(),
            event_type,
        }
    }

    /// Check the geometry against the platform's maximum monitoring distance.
    pub fn validate(&self, max_radius: f64) -> Result<(), InputError> {
        if !self.coordinate.is_valid() {
            return Err(InputError::InvalidCoordinate {
                latitude: self.coordinate.latitude,
                longitude: self.coordinate.longitude,
            });
        }
        if !(self.radius.is_finite() && self.radius > 0.0 && self.radius <= max_radius) {
            return Err(InputError::InvalidRadius {
                radius: self.radius,
                max: max_radius,
            });
        }
        Ok(())
    }

    /// Alert title derived from the note.
    ///
    /// Uses the first non-empty line of the note, cut to `max_chars`
    /// characters with a trailing ellipsis. An empty note falls back to a
    /// description of the crossing.
    #[must_use]
    pub fn title(&self, max_chars: usize) -> String {
        let first_line = self
            .note
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty());

        let Some(line) = first_line else {
            return match self.event_type {
                EventType::OnEntry => "Entered geofence".to_string(),
                EventType::OnExit => "Exited geofence".to_string(),
            };
        };

        if line.chars().count() <= max_chars {
            return line.to_string();
        }
        let mut out: String = line.chars().take(max_chars.saturating_sub(1)).collect();
        out.push('…');
        out
    }

    /// Short description for map annotations, e.g. `Radius: 100m - On Entry`.
    #[must_use]
    pub fn subtitle(&self) -> String {
        format!("Radius: {}m - {}", self.radius, self.event_type)
    }
}
