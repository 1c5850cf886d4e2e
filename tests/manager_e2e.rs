//! End-to-end tests for the geofence manager against the simulated platform.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use geonote::{
    Availability, ChannelDispatcher, CircularRegion, Coordinate, Crossing, EventType, GeofenceError, GeofenceId,
    GeofenceManager, GeofenceRecord, GeofenceStore, InMemoryGeofenceStore, InputError, ManagerConfig,
    MonitorState, MonitoringError, NotificationStream, RegionEvent, RegionMonitorAdapter, RegionPlatform,
    SimulatedPlatform, UnavailableReason,
};

const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    manager: GeofenceManager,
    platform: SimulatedPlatform,
    store: InMemoryGeofenceStore,
    alerts: NotificationStream,
}

fn harness_with(store: InMemoryGeofenceStore, capacity: usize) -> Harness {
    let platform = SimulatedPlatform::new(capacity, 10_000.0);
    let (dispatcher, alerts) = ChannelDispatcher::new();
    let manager = GeofenceManager::start(
        ManagerConfig::default(),
        Arc::new(store.clone()),
        RegionMonitorAdapter::new(Box::new(platform.clone())),
        Arc::new(dispatcher),
    )
    .unwrap();
    Harness {
        manager,
        platform,
        store,
        alerts,
    }
}

fn harness(capacity: usize) -> Harness {
    harness_with(InMemoryGeofenceStore::new(), capacity)
}

fn rec(id: &str, event_type: EventType) -> GeofenceRecord {
    GeofenceRecord::with_identifier(id, Coordinate::new(37.33, -122.03), 100.0, format!("note {id}"), event_type)
}

fn ids(list: &[&str]) -> HashSet<GeofenceId> {
    list.iter().map(|s| GeofenceId::from(*s)).collect()
}

fn states(h: &Harness) -> Vec<(String, MonitorState)> {
    h.manager
        .snapshot()
        .unwrap()
        .into_iter()
        .map(|v| (v.record.identifier.to_string(), v.state))
        .collect()
}

#[test]
fn test_entry_crossing_delivers_note() {
    let h = harness(20);
    h.manager.reconcile_on_startup().unwrap();

    let record =
        GeofenceRecord::with_identifier("A", Coordinate::new(37.33, -122.03), 100.0, "Buy milk", EventType::OnEntry);
    assert_eq!(h.manager.add_record(record.clone()).unwrap(), MonitorState::Monitored);
    assert_eq!(h.store.load(), vec![record]);
    assert_eq!(h.manager.monitored_identifiers().unwrap(), ids(&["A"]));

    assert!(h.platform.fire("A", Crossing::Entered, Utc::now()));
    let alert = h.alerts.recv_timeout(WAIT).unwrap();
    assert_eq!(alert.identifier, GeofenceId::from("A"));
    assert_eq!(alert.title, "Buy milk");
    assert_eq!(alert.body, "Buy milk");
}

#[test]
fn test_fifo_admission_and_promotion_on_remove() {
    let h = harness(2);

    assert_eq!(h.manager.add_record(rec("A", EventType::OnEntry)).unwrap(), MonitorState::Monitored);
    assert_eq!(h.manager.add_record(rec("B", EventType::OnEntry)).unwrap(), MonitorState::Monitored);
    assert_eq!(h.manager.add_record(rec("C", EventType::OnEntry)).unwrap(), MonitorState::Pending);
    assert_eq!(h.manager.monitored_identifiers().unwrap(), ids(&["A", "B"]));
    assert_eq!(h.store.load().len(), 3);

    h.manager.remove_record(&GeofenceId::from("A")).unwrap();
    assert_eq!(h.manager.monitored_identifiers().unwrap(), ids(&["B", "C"]));
    assert!(h.platform.region(&GeofenceId::from("C")).is_some());
    assert!(h.platform.region(&GeofenceId::from("A")).is_none());

    let stored: Vec<_> = h.store.load().into_iter().map(|r| r.identifier.to_string()).collect();
    assert_eq!(stored, vec!["B", "C"]);
}

#[test]
fn test_duplicate_and_invalid_input_change_nothing() {
    let h = harness(20);
    h.manager.add_record(rec("A", EventType::OnEntry)).unwrap();
    let saves = h.store.save_count();

    let err = h.manager.add_record(rec("A", EventType::OnExit)).unwrap_err();
    assert!(matches!(err, GeofenceError::Input(InputError::DuplicateIdentifier { .. })));

    let too_big = GeofenceRecord::with_identifier("B", Coordinate::new(0.0, 0.0), 50_000.0, "", EventType::OnEntry);
    let err = h.manager.add_record(too_big).unwrap_err();
    assert!(matches!(err, GeofenceError::Input(InputError::InvalidRadius { .. })));

    let off_map = GeofenceRecord::with_identifier("C", Coordinate::new(91.0, 0.0), 100.0, "", EventType::OnEntry);
    let err = h.manager.add_record(off_map).unwrap_err();
    assert!(matches!(err, GeofenceError::Input(InputError::InvalidCoordinate { .. })));

    let err = h.manager.remove_record(&GeofenceId::from("missing")).unwrap_err();
    assert!(err.is_not_found());

    assert_eq!(h.manager.snapshot().unwrap().len(), 1);
    assert_eq!(h.store.save_count(), saves);
}

#[test]
fn test_direction_mismatch_is_ignored() {
    let h = harness(20);
    h.manager.add_record(rec("A", EventType::OnEntry)).unwrap();
    h.manager.add_record(rec("B", EventType::OnExit)).unwrap();

    let now = Utc::now();
    assert!(h.platform.fire("A", Crossing::Exited, now));
    assert!(h.platform.fire("B", Crossing::Entered, now));
    assert!(h.platform.fire("B", Crossing::Exited, now));
    h.manager.flush().unwrap();

    let alerts = h.alerts.drain();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].identifier, GeofenceId::from("B"));
}

#[test]
fn test_rapid_repeats_are_debounced() {
    let h = harness(20);
    h.manager.add_record(rec("A", EventType::OnEntry)).unwrap();

    let t0 = Utc::now();
    h.platform.fire("A", Crossing::Entered, t0);
    h.platform.fire("A", Crossing::Entered, t0 + ChronoDuration::seconds(1));
    h.manager.flush().unwrap();
    assert_eq!(h.alerts.drain().len(), 1);

    h.platform.fire("A", Crossing::Entered, t0 + ChronoDuration::seconds(30));
    h.manager.flush().unwrap();
    assert_eq!(h.alerts.drain().len(), 1);
}

#[test]
fn test_event_for_removed_record_is_dropped() {
    let h = harness(20);
    h.manager.add_record(rec("A", EventType::OnEntry)).unwrap();
    h.manager.remove_record(&GeofenceId::from("A")).unwrap();

    h.manager.handle_event(RegionEvent::new("A", Crossing::Entered, Utc::now()));
    h.manager.flush().unwrap();
    assert!(h.alerts.try_recv().is_none());
}

#[test]
fn test_injected_event_uses_same_path() {
    let h = harness(20);
    h.manager.add_record(rec("A", EventType::OnExit)).unwrap();

    h.manager.handle_event(RegionEvent::new("A", Crossing::Exited, Utc::now()));
    let alert = h.alerts.recv_timeout(WAIT).unwrap();
    assert_eq!(alert.body, "note A");
}

#[test]
fn test_reconcile_is_idempotent() {
    let store = InMemoryGeofenceStore::with_records(vec![
        rec("A", EventType::OnEntry),
        rec("B", EventType::OnEntry),
        rec("C", EventType::OnEntry),
    ]);
    let h = harness_with(store, 2);

    let first = h.manager.reconcile_on_startup().unwrap();
    let started: Vec<_> = first.started.iter().map(ToString::to_string).collect();
    assert_eq!(started, vec!["A", "B"]);
    assert_eq!(first.pending, 1);
    assert!(first.stopped.is_empty());

    let starts = h.platform.start_calls();
    let second = h.manager.reconcile_on_startup().unwrap();
    assert!(second.started.is_empty());
    assert!(second.stopped.is_empty());
    assert_eq!(second.pending, 1);
    assert_eq!(h.platform.start_calls(), starts);
    assert_eq!(h.manager.monitored_identifiers().unwrap(), ids(&["A", "B"]));
}

#[test]
fn test_reconcile_repairs_drift() {
    let store = InMemoryGeofenceStore::with_records(vec![rec("A", EventType::OnEntry), rec("B", EventType::OnExit)]);
    let h = harness_with(store, 20);
    h.manager.reconcile_on_startup().unwrap();

    // Device reboot wipes regions; a stale region from an old install appears.
    h.platform.drop_all();
    h.platform.inject_region(CircularRegion::from(&rec("ghost", EventType::OnEntry)));

    let report = h.manager.reconcile_on_startup().unwrap();
    assert_eq!(report.stopped, vec![GeofenceId::from("ghost")]);
    assert_eq!(report.started.len(), 2);
    assert!(h.platform.region(&GeofenceId::from("ghost")).is_none());
    assert_eq!(h.manager.monitored_identifiers().unwrap(), ids(&["A", "B"]));
}

#[test]
fn test_foreign_regions_leave_record_pending() {
    let h = harness(1);
    h.platform.inject_region(CircularRegion::from(&rec("ghost", EventType::OnEntry)));

    assert_eq!(h.manager.add_record(rec("A", EventType::OnEntry)).unwrap(), MonitorState::Pending);

    let report = h.manager.reconcile_on_startup().unwrap();
    assert_eq!(report.stopped, vec![GeofenceId::from("ghost")]);
    assert_eq!(report.started, vec![GeofenceId::from("A")]);
}

#[test]
fn test_new_record_waits_behind_older_pending() {
    let h = harness(2);
    h.platform.inject_region(CircularRegion::from(&rec("ghost", EventType::OnEntry)));

    assert_eq!(h.manager.add_record(rec("A", EventType::OnEntry)).unwrap(), MonitorState::Monitored);
    assert_eq!(h.manager.add_record(rec("B", EventType::OnEntry)).unwrap(), MonitorState::Pending);

    // The platform forgets the foreign region on its own.
    h.platform.drop_region(&GeofenceId::from("ghost"));
    assert_eq!(h.manager.add_record(rec("C", EventType::OnEntry)).unwrap(), MonitorState::Pending);

    assert_eq!(
        states(&h),
        vec![
            ("A".to_string(), MonitorState::Monitored),
            ("B".to_string(), MonitorState::Monitored),
            ("C".to_string(), MonitorState::Pending),
        ]
    );
    assert_eq!(h.manager.monitored_identifiers().unwrap(), ids(&["A", "B"]));
}

#[test]
fn test_permission_denied_keeps_record() {
    let h = harness(20);
    h.platform.set_availability(Availability::PermissionDenied);

    let err = h.manager.add_record(rec("A", EventType::OnEntry)).unwrap_err();
    assert!(matches!(
        err,
        GeofenceError::Monitoring(MonitoringError::MonitoringUnavailable {
            reason: UnavailableReason::PermissionDenied
        })
    ));
    assert!(matches!(states(&h)[0].1, MonitorState::Failed(_)));
    assert_eq!(h.store.load().len(), 1);

    h.platform.set_availability(Availability::Available);
    let report = h.manager.reconcile_on_startup().unwrap();
    assert_eq!(report.started, vec![GeofenceId::from("A")]);
    assert_eq!(states(&h)[0].1, MonitorState::Monitored);
}

#[test]
fn test_platform_failure_frees_slot() {
    let h = harness(1);
    h.manager.add_record(rec("A", EventType::OnEntry)).unwrap();
    h.manager.add_record(rec("B", EventType::OnEntry)).unwrap();

    let reason = MonitoringError::MonitoringUnavailable {
        reason: UnavailableReason::PermissionDenied,
    };
    assert!(h.platform.fail_region("A", reason.clone()));
    h.manager.flush().unwrap();

    assert_eq!(
        states(&h),
        vec![
            ("A".to_string(), MonitorState::Failed(reason)),
            ("B".to_string(), MonitorState::Monitored),
        ]
    );
}

#[test]
fn test_replace_keeps_position_and_restarts_region() {
    let h = harness(20);
    h.manager.add_record(rec("A", EventType::OnEntry)).unwrap();
    h.manager.add_record(rec("B", EventType::OnEntry)).unwrap();

    let edited = GeofenceRecord::with_identifier("A", Coordinate::new(40.0, -74.0), 250.0, "Pick up keys", EventType::OnExit);
    assert_eq!(h.manager.replace_record(edited.clone()).unwrap(), MonitorState::Monitored);

    let region = h.platform.region(&GeofenceId::from("A")).unwrap();
    assert_eq!(region.radius, 250.0);
    assert!(region.notify_on_exit);
    assert!(!region.notify_on_entry);

    let stored = h.store.load();
    assert_eq!(stored[0], edited);
    assert_eq!(stored[1].identifier, GeofenceId::from("B"));

    let err = h.manager.replace_record(rec("missing", EventType::OnEntry)).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_save_failure_keeps_memory_until_reconcile() {
    let h = harness(20);
    h.manager.add_record(rec("A", EventType::OnEntry)).unwrap();

    h.store.set_fail_saves(true);
    let err = h.manager.add_record(rec("B", EventType::OnEntry)).unwrap_err();
    assert!(err.is_persistence());
    assert_eq!(h.manager.snapshot().unwrap().len(), 2);
    assert_eq!(h.manager.monitored_identifiers().unwrap(), ids(&["A", "B"]));
    assert_eq!(h.store.load().len(), 1);

    h.store.set_fail_saves(false);
    let report = h.manager.reconcile_on_startup().unwrap();
    assert!(report.stopped.is_empty());
    assert_eq!(h.store.load().len(), 2);
}

#[test]
fn test_snapshot_views_carry_subtitle() {
    let h = harness(20);
    h.manager.add_record(rec("A", EventType::OnEntry)).unwrap();
    h.manager.add_record(rec("B", EventType::OnExit)).unwrap();

    let views = h.manager.snapshot().unwrap();
    assert_eq!(views[0].subtitle, "Radius: 100m - On Entry");
    assert_eq!(views[1].subtitle, "Radius: 100m - On Exit");
    assert!(views.iter().all(|v| v.state.is_monitored()));
}

#[test]
fn test_concurrent_adds_respect_ceiling() {
    let h = Arc::new(harness(5));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let h = Arc::clone(&h);
            std::thread::spawn(move || {
                for i in 0..5 {
                    h.manager.add_record(rec(&format!("t{t}-{i}"), EventType::OnEntry)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(h.manager.snapshot().unwrap().len(), 20);
    assert_eq!(h.manager.monitored_identifiers().unwrap().len(), 5);
    assert_eq!(h.platform.monitored().len(), 5);
    assert_eq!(h.store.load().len(), 20);
}

#[test]
fn test_shutdown_stops_signal_delivery() {
    let h = harness(20);
    h.manager.add_record(rec("A", EventType::OnEntry)).unwrap();
    let Harness {
        manager,
        platform,
        alerts,
        ..
    } = h;
    manager.shutdown();

    assert!(!platform.fire("A", Crossing::Entered, Utc::now()));
    assert!(alerts.try_recv().is_none());
}
