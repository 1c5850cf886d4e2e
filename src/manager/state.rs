//! The geofence state machine.
//!
//! `ManagerState` is plain single-threaded data. The manager worker owns it
//! and calls into it with the adapter and dispatcher, so every transition runs
//! to completion before the next one starts.
//!
//! Admission is FIFO over insertion order: `entries` is the arena, `monitored`
//! the index set of identifiers the platform is watching. Older records keep
//! their slots; newer ones wait as `Pending` until a slot frees.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::ManagerConfig;
use crate::error::{InputError, MonitoringError, UnavailableReason};
use crate::monitor::{RegionEvent, RegionMonitorAdapter};
use crate::notify::NotificationDispatcher;
use crate::record::{GeofenceId, GeofenceRecord};

use super::debounce::Debouncer;

/// Monitoring state of one record.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorState {
    /// The platform is watching the region.
    Monitored,
    /// Unmonitored, waiting for a free slot.
    Pending,
    /// Unmonitored after a capability error. Retried by reconciliation only.
    Failed(MonitoringError),
}

impl MonitorState {
    /// Returns true if the platform is watching the region.
    #[must_use]
    pub const fn is_monitored(&self) -> bool {
        matches!(self, Self::Monitored)
    }
}

/// Read-only view of one record for renderers.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceView {
    pub record: GeofenceRecord,
    pub state: MonitorState,
    /// Annotation subtitle, e.g. `Radius: 100m - On Entry`.
    pub subtitle: String,
}

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Records the pass started monitoring.
    pub started: Vec<GeofenceId>,
    /// Identifiers the pass stopped: orphans without a record, or monitored
    /// records above the ceiling.
    pub stopped: Vec<GeofenceId>,
    /// Records the platform refused.
    pub failed: Vec<(GeofenceId, MonitoringError)>,
    /// Records left waiting for a slot.
    pub pending: usize,
}

/// How an inbound crossing was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDisposition {
    /// An alert was delivered.
    Delivered,
    /// No record with that identifier (removed while the event was in flight).
    UnknownRegion,
    /// The crossing direction does not match the record's trigger.
    DirectionMismatch,
    /// A redelivery inside the debounce window.
    Duplicate,
    /// Matched, but the dispatcher reported an error.
    DeliveryFailed,
}

#[derive(Debug, Clone)]
struct Entry {
    record: GeofenceRecord,
    state: MonitorState,
}

#[derive(Debug)]
pub(crate) struct ManagerState {
    entries: Vec<Entry>,
    monitored: HashSet<GeofenceId>,
    debouncer: Debouncer,
    title_max_chars: usize,
}

/// Keep the first record per identifier.
fn dedup_records(records: Vec<GeofenceRecord>) -> Vec<Entry> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.identifier.clone()) {
            tracing::warn!(id = %record.identifier, "dropping duplicate persisted geofence");
            continue;
        }
        out.push(Entry {
            record,
            state: MonitorState::Pending,
        });
    }
    out
}

impl ManagerState {
    pub(crate) fn new(records: Vec<GeofenceRecord>, config: &ManagerConfig) -> Self {
        Self {
            entries: dedup_records(records),
            monitored: HashSet::new(),
            debouncer: Debouncer::new(config.debounce_window),
            title_max_chars: config.title_max_chars,
        }
    }

    pub(crate) fn records(&self) -> Vec<GeofenceRecord> {
        self.entries.iter().map(|e| e.record.clone()).collect()
    }

    pub(crate) fn views(&self) -> Vec<GeofenceView> {
        self.entries
            .iter()
            .map(|e| GeofenceView {
                subtitle: e.record.subtitle(),
                record: e.record.clone(),
                state: e.state.clone(),
            })
            .collect()
    }

    pub(crate) fn monitored(&self) -> &HashSet<GeofenceId> {
        &self.monitored
    }

    fn position(&self, identifier: &GeofenceId) -> Option<usize> {
        self.entries.iter().position(|e| &e.record.identifier == identifier)
    }

    /// Start monitoring `entries[idx]` and record the outcome on the entry.
    ///
    /// A platform that is at capacity leaves the entry `Pending`; any other
    /// refusal marks it `Failed`.
    fn try_admit(&mut self, idx: usize, adapter: &mut RegionMonitorAdapter) -> Result<(), MonitoringError> {
        let entry = &mut self.entries[idx];
        match adapter.start_monitoring(&entry.record) {
            Ok(()) => {
                entry.state = MonitorState::Monitored;
                self.monitored.insert(entry.record.identifier.clone());
                Ok(())
            }
            Err(e) => {
                entry.state = match e {
                    MonitoringError::MonitoringUnavailable {
                        reason: UnavailableReason::AtCapacity,
                    } => MonitorState::Pending,
                    _ => MonitorState::Failed(e.clone()),
                };
                Err(e)
            }
        }
    }

    /// Promote `Pending` entries, oldest first, until the ceiling is reached.
    fn fill_free_slots(&mut self, adapter: &mut RegionMonitorAdapter) -> Vec<GeofenceId> {
        let ceiling = adapter.monitoring_ceiling();
        let mut promoted = Vec::new();
        for idx in 0..self.entries.len() {
            if self.monitored.len() >= ceiling {
                break;
            }
            if self.entries[idx].state != MonitorState::Pending {
                continue;
            }
            match self.try_admit(idx, adapter) {
                Ok(()) => promoted.push(self.entries[idx].record.identifier.clone()),
                Err(e) if e.is_capability_wide() => break,
                Err(_) => {}
            }
        }
        promoted
    }

    pub(crate) fn add(
        &mut self,
        record: GeofenceRecord,
        adapter: &mut RegionMonitorAdapter,
    ) -> Result<MonitorState, InputError> {
        if self.position(&record.identifier).is_some() {
            return Err(InputError::DuplicateIdentifier {
                id: record.identifier,
            });
        }
        record.validate(adapter.max_monitoring_distance())?;

        self.entries.push(Entry {
            record,
            state: MonitorState::Pending,
        });
        let idx = self.entries.len() - 1;

        // Older pending records get any free slot first.
        let promoted = self.fill_free_slots(adapter);
        if promoted.iter().any(|id| id != &self.entries[idx].record.identifier) {
            tracing::debug!(promoted = ?promoted, "pending geofences admitted ahead of new record");
        }
        Ok(self.entries[idx].state.clone())
    }

    /// Remove a record and hand its slot to the oldest pending one.
    pub(crate) fn remove(
        &mut self,
        identifier: &GeofenceId,
        adapter: &mut RegionMonitorAdapter,
    ) -> Result<Vec<GeofenceId>, InputError> {
        let idx = self.position(identifier).ok_or_else(|| InputError::NotFound {
            id: identifier.clone(),
        })?;

        adapter.stop_monitoring(identifier);
        self.entries.remove(idx);
        self.monitored.remove(identifier);
        self.debouncer.forget(identifier);

        Ok(self.fill_free_slots(adapter))
    }

    /// Replace a record in place, keeping its admission position.
    pub(crate) fn replace(
        &mut self,
        record: GeofenceRecord,
        adapter: &mut RegionMonitorAdapter,
    ) -> Result<MonitorState, InputError> {
        let idx = self.position(&record.identifier).ok_or_else(|| InputError::NotFound {
            id: record.identifier.clone(),
        })?;
        record.validate(adapter.max_monitoring_distance())?;

        let identifier = record.identifier.clone();
        self.debouncer.forget(&identifier);
        self.entries[idx].record = record;

        if self.monitored.contains(&identifier) {
            if self.try_admit(idx, adapter).is_err() {
                // The platform may still hold the old geometry.
                adapter.stop_monitoring(&identifier);
                self.monitored.remove(&identifier);
            }
        } else {
            self.entries[idx].state = MonitorState::Pending;
        }

        self.fill_free_slots(adapter);
        Ok(self.entries[idx].state.clone())
    }

    /// Resynchronize with the platform's actual monitoring state.
    ///
    /// `loaded` replaces the in-memory collection when given. Already
    /// monitored records keep their slots; the youngest are stopped if the
    /// platform somehow exceeds the ceiling. Free slots are filled FIFO,
    /// including records that previously failed.
    pub(crate) fn reconcile(
        &mut self,
        loaded: Option<Vec<GeofenceRecord>>,
        adapter: &mut RegionMonitorAdapter,
    ) -> ReconcileReport {
        if let Some(records) = loaded {
            self.entries = dedup_records(records);
        }

        let mut report = ReconcileReport::default();
        let actual = adapter.currently_monitored_identifiers();
        let known: HashSet<GeofenceId> = self.entries.iter().map(|e| e.record.identifier.clone()).collect();

        let mut orphans: Vec<GeofenceId> = actual.iter().filter(|id| !known.contains(*id)).cloned().collect();
        orphans.sort();
        for id in orphans {
            adapter.stop_monitoring(&id);
            report.stopped.push(id);
        }

        let ceiling = adapter.monitoring_ceiling();
        self.monitored.clear();
        for entry in &mut self.entries {
            entry.state = MonitorState::Pending;
            if !actual.contains(&entry.record.identifier) {
                continue;
            }
            if self.monitored.len() < ceiling {
                entry.state = MonitorState::Monitored;
                self.monitored.insert(entry.record.identifier.clone());
            } else {
                adapter.stop_monitoring(&entry.record.identifier);
                report.stopped.push(entry.record.identifier.clone());
            }
        }

        for idx in 0..self.entries.len() {
            if self.monitored.len() >= ceiling {
                break;
            }
            if self.entries[idx].state != MonitorState::Pending {
                continue;
            }
            let id = self.entries[idx].record.identifier.clone();
            match self.try_admit(idx, adapter) {
                Ok(()) => report.started.push(id),
                Err(e) => {
                    let stop = e.is_capability_wide();
                    report.failed.push((id, e));
                    if stop {
                        break;
                    }
                }
            }
        }

        report.pending = self
            .entries
            .iter()
            .filter(|e| e.state == MonitorState::Pending)
            .count();
        report
    }

    /// Turn a crossing into at most one alert.
    pub(crate) fn handle_event(
        &mut self,
        event: &RegionEvent,
        dispatcher: &dyn NotificationDispatcher,
    ) -> EventDisposition {
        let Some(idx) = self.position(&event.identifier) else {
            return EventDisposition::UnknownRegion;
        };
        let record = &self.entries[idx].record;
        if !record.event_type.matches(event.crossing) {
            return EventDisposition::DirectionMismatch;
        }
        if !self.debouncer.admit(&event.identifier, event.crossing, event.timestamp) {
            return EventDisposition::Duplicate;
        }

        let title = record.title(self.title_max_chars);
        match dispatcher.deliver(&title, &record.note, &record.identifier) {
            Ok(()) => EventDisposition::Delivered,
            Err(e) => {
                tracing::warn!(id = %record.identifier, error = %e, "geofence alert delivery failed");
                EventDisposition::DeliveryFailed
            }
        }
    }

    /// The platform dropped a region on its own. Mark it failed and give the
    /// slot to the oldest pending record.
    pub(crate) fn handle_monitoring_failed(
        &mut self,
        identifier: &GeofenceId,
        reason: MonitoringError,
        adapter: &mut RegionMonitorAdapter,
    ) -> Vec<GeofenceId> {
        let Some(idx) = self.position(identifier) else {
            return Vec::new();
        };
        adapter.stop_monitoring(identifier);
        self.monitored.remove(identifier);
        self.entries[idx].state = MonitorState::Failed(reason);
        self.fill_free_slots(adapter)
    }

    pub(crate) fn prune(&mut self) {
        self.debouncer.prune();
    }
}
