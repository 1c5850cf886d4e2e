//! The geofence lifecycle manager.
//!
//! # Architecture
//!
//! ```text
//!  UI thread(s)                platform thread(s)
//!      │ add/remove/...             │ PlatformSignal
//!      ▼                            ▼
//!  ┌──────────────────────────────────────────┐
//!  │        inbox (FIFO, unbounded)           │
//!  └────────────────────┬─────────────────────┘
//!                       ▼
//!  ┌──────────────────────────────────────────┐      ┌───────────────────┐
//!  │ geonote-manager worker                   │      │ NotificationDispatcher
//!  │  ManagerState + RegionMonitorAdapter     │─────▶│  deliver(...)     │
//!  └────────────────────┬─────────────────────┘      └───────────────────┘
//!                       │ snapshot + completion (bounded)
//!                       ▼
//!  ┌──────────────────────────────────────────┐
//!  │ geonote-persist: GeofenceStore::save     │──▶ reply to caller
//!  └──────────────────────────────────────────┘
//! ```
//!
//! Commands and platform signals share one inbox, so all operations are
//! mutually exclusive and observed in arrival order. Store writes happen on a
//! second thread; a mutation's reply is sent only after its snapshot has been
//! written, while later crossings keep flowing.
//!
//! # Consistency
//!
//! Persistence is at-least-once and best-effort consistent: a failed save is
//! reported to the caller but the in-memory and platform state are kept. The
//! next successful save, or [`GeofenceManager::reconcile_on_startup`], writes
//! the in-memory collection again.

mod debounce;
mod persister;
mod state;

pub use state::{EventDisposition, GeofenceView, MonitorState, ReconcileReport};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::config::ManagerConfig;
use crate::error::{GeofenceError, GeofenceResult};
use crate::monitor::{PlatformSignal, RegionEvent, RegionMonitorAdapter};
use crate::notify::NotificationDispatcher;
use crate::record::{GeofenceId, GeofenceRecord};
use crate::store::{GeofenceStore, StorageError};

use persister::{Persister, Reloaded};
use state::ManagerState;

enum Command {
    Add {
        record: GeofenceRecord,
        reply: Sender<GeofenceResult<MonitorState>>,
    },
    Replace {
        record: GeofenceRecord,
        reply: Sender<GeofenceResult<MonitorState>>,
    },
    Remove {
        identifier: GeofenceId,
        reply: Sender<GeofenceResult<()>>,
    },
    Reconcile {
        reply: Sender<GeofenceResult<ReconcileReport>>,
    },
    Snapshot {
        reply: Sender<Vec<GeofenceView>>,
    },
    Monitored {
        reply: Sender<HashSet<GeofenceId>>,
    },
    Flush {
        reply: Sender<()>,
    },
    Shutdown,
}

enum Inbound {
    Command(Command),
    Signal(PlatformSignal),
}

/// A `Failed` state is reported to the caller as the monitoring error that
/// caused it; the record itself stays.
fn monitoring_outcome(state: MonitorState) -> GeofenceResult<MonitorState> {
    match state {
        MonitorState::Failed(e) => Err(e.into()),
        other => Ok(other),
    }
}

struct Worker {
    config: ManagerConfig,
    state: ManagerState,
    adapter: RegionMonitorAdapter,
    dispatcher: Arc<dyn NotificationDispatcher>,
    persister: Option<Persister>,
    inbox: Receiver<Inbound>,
}

impl Worker {
    fn run(mut self) {
        loop {
            match self.inbox.recv_timeout(self.config.prune_interval) {
                Ok(Inbound::Command(Command::Shutdown)) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(Inbound::Command(cmd)) => self.handle_command(cmd),
                Ok(Inbound::Signal(signal)) => self.handle_signal(signal),
                Err(RecvTimeoutError::Timeout) => self.state.prune(),
            }
        }

        self.adapter.clear_callback();
        if let Some(persister) = self.persister.take() {
            persister.shutdown();
        }
        tracing::info!("geofence manager stopped");
    }

    fn persist<F>(&self, done: F)
    where
        F: FnOnce(Result<(), StorageError>) + Send + 'static,
    {
        match &self.persister {
            Some(p) => p.save(self.state.records(), Box::new(done)),
            None => done(Err(StorageError::Io(std::io::Error::other("persister stopped")))),
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Add { record, reply } => {
                let id = record.identifier.clone();
                match self.state.add(record, &mut self.adapter) {
                    Ok(state) => {
                        tracing::info!(id = %id, state = ?state, "geofence added");
                        let outcome = monitoring_outcome(state);
                        self.persist(move |res| {
                            let _ = reply.send(res.map_err(GeofenceError::from).and(outcome));
                        });
                    }
                    Err(e) => {
                        tracing::debug!(id = %id, error = %e, "geofence add rejected");
                        let _ = reply.send(Err(e.into()));
                    }
                }
            }
            Command::Replace { record, reply } => {
                let id = record.identifier.clone();
                match self.state.replace(record, &mut self.adapter) {
                    Ok(state) => {
                        tracing::info!(id = %id, state = ?state, "geofence replaced");
                        let outcome = monitoring_outcome(state);
                        self.persist(move |res| {
                            let _ = reply.send(res.map_err(GeofenceError::from).and(outcome));
                        });
                    }
                    Err(e) => {
                        tracing::debug!(id = %id, error = %e, "geofence replace rejected");
                        let _ = reply.send(Err(e.into()));
                    }
                }
            }
            Command::Remove { identifier, reply } => match self.state.remove(&identifier, &mut self.adapter) {
                Ok(promoted) => {
                    tracing::info!(id = %identifier, promoted = ?promoted, "geofence removed");
                    self.persist(move |res| {
                        let _ = reply.send(res.map_err(GeofenceError::from));
                    });
                }
                Err(e) => {
                    tracing::debug!(id = %identifier, error = %e, "geofence remove rejected");
                    let _ = reply.send(Err(e.into()));
                }
            },
            Command::Reconcile { reply } => self.reconcile(reply),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.state.views());
            }
            Command::Monitored { reply } => {
                let _ = reply.send(self.state.monitored().clone());
            }
            Command::Flush { reply } => {
                let _ = reply.send(());
            }
            Command::Shutdown => {}
        }
    }

    fn reconcile(&mut self, reply: Sender<GeofenceResult<ReconcileReport>>) {
        let loaded = match self.persister.as_ref().and_then(Persister::reload) {
            Some(Reloaded::Fresh(records)) => Some(records),
            Some(Reloaded::Unsaved) | None => None,
        };
        let unsaved = loaded.is_none();

        let report = self.state.reconcile(loaded, &mut self.adapter);
        tracing::info!(
            started = report.started.len(),
            stopped = report.stopped.len(),
            failed = report.failed.len(),
            pending = report.pending,
            rewrite = unsaved,
            "geofence reconciliation finished"
        );

        if unsaved {
            self.persist(move |res| {
                let _ = reply.send(res.map_err(GeofenceError::from).map(|()| report));
            });
        } else {
            let _ = reply.send(Ok(report));
        }
    }

    fn handle_signal(&mut self, signal: PlatformSignal) {
        match signal {
            PlatformSignal::Crossing(event) => {
                let disposition = self.state.handle_event(&event, self.dispatcher.as_ref());
                tracing::debug!(
                    id = %event.identifier,
                    crossing = ?event.crossing,
                    disposition = ?disposition,
                    "region crossing handled"
                );
            }
            PlatformSignal::MonitoringFailed { identifier, reason } => {
                tracing::warn!(id = %identifier, error = %reason, "platform stopped monitoring geofence");
                let promoted = self.state.handle_monitoring_failed(&identifier, reason, &mut self.adapter);
                if !promoted.is_empty() {
                    tracing::info!(promoted = ?promoted, "pending geofences admitted");
                }
            }
        }
    }
}

/// Owner of the geofence collection.
///
/// All methods may be called from any thread. Mutations block until the
/// change has been applied to the platform and written to the store.
#[derive(Debug)]
pub struct GeofenceManager {
    inbox: Sender<Inbound>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl GeofenceManager {
    /// Load the persisted collection and start the manager threads.
    ///
    /// Records start out `Pending`; call
    /// [`reconcile_on_startup`](Self::reconcile_on_startup) once to bring the
    /// platform in line with them.
    pub fn start(
        config: ManagerConfig,
        store: Arc<dyn GeofenceStore>,
        adapter: RegionMonitorAdapter,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> GeofenceResult<Self> {
        let config = config.validate()?;

        let records = store.load();
        let loaded = records.len();
        let state = ManagerState::new(records, &config);

        let persister = Persister::spawn(store, config.persist_queue_capacity)
            .map_err(|e| GeofenceError::internal(format!("failed to spawn persister: {e}")))?;

        let (inbox_tx, inbox_rx) = unbounded::<Inbound>();
        let signal_tx = inbox_tx.clone();
        adapter.register_callback(move |signal| {
            if signal_tx.send(Inbound::Signal(signal)).is_err() {
                tracing::debug!("region signal dropped: geofence manager stopped");
            }
        });

        let worker = Worker {
            config,
            state,
            adapter,
            dispatcher,
            persister: Some(persister),
            inbox: inbox_rx,
        };
        let join = thread::Builder::new()
            .name("geonote-manager".to_string())
            .spawn(move || worker.run())
            .map_err(|e| GeofenceError::internal(format!("failed to spawn manager worker: {e}")))?;

        tracing::info!(records = loaded, "geofence manager started");
        Ok(Self {
            inbox: inbox_tx,
            join: Mutex::new(Some(join)),
        })
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> Command) -> GeofenceResult<T> {
        let (tx, rx) = bounded(1);
        self.inbox
            .send(Inbound::Command(make(tx)))
            .map_err(|_| GeofenceError::Shutdown)?;
        rx.recv().map_err(|_| GeofenceError::Shutdown)
    }

    /// Add a record and start monitoring it if a slot is free.
    ///
    /// # Errors
    /// - `Input` (`DuplicateIdentifier`, `InvalidRadius`, `InvalidCoordinate`):
    ///   nothing changed
    /// - `Monitoring`: the record was added but is unmonitored
    /// - `Persistence`: the record was added but the store write failed
    pub fn add_record(&self, record: GeofenceRecord) -> GeofenceResult<MonitorState> {
        self.request(|reply| Command::Add { record, reply })?
    }

    /// Replace an existing record in place, keeping its identifier and its
    /// admission position. A monitored record is restarted with the new
    /// geometry.
    pub fn replace_record(&self, record: GeofenceRecord) -> GeofenceResult<MonitorState> {
        self.request(|reply| Command::Replace { record, reply })?
    }

    /// Remove a record, stop monitoring it and admit the oldest pending one.
    pub fn remove_record(&self, identifier: &GeofenceId) -> GeofenceResult<()> {
        let identifier = identifier.clone();
        self.request(|reply| Command::Remove { identifier, reply })?
    }

    /// Resynchronize persisted intent with what the platform is actually
    /// monitoring. Safe to call more than once.
    pub fn reconcile_on_startup(&self) -> GeofenceResult<ReconcileReport> {
        self.request(|reply| Command::Reconcile { reply })?
    }

    /// Every record in insertion order with its monitoring state.
    pub fn snapshot(&self) -> GeofenceResult<Vec<GeofenceView>> {
        self.request(|reply| Command::Snapshot { reply })
    }

    /// Identifiers the manager believes the platform is watching.
    pub fn monitored_identifiers(&self) -> GeofenceResult<HashSet<GeofenceId>> {
        self.request(|reply| Command::Monitored { reply })
    }

    /// Queue a crossing as if the platform had reported it.
    pub fn handle_event(&self, event: RegionEvent) {
        if self.inbox.send(Inbound::Signal(PlatformSignal::Crossing(event))).is_err() {
            tracing::debug!("region event dropped: geofence manager stopped");
        }
    }

    /// Wait until everything queued before this call has been processed.
    pub fn flush(&self) -> GeofenceResult<()> {
        self.request(|reply| Command::Flush { reply })
    }

    /// Stop the worker, draining queued store writes.
    pub fn shutdown(self) {
        self.stop();
    }

    fn stop(&self) {
        let handle = match self.join.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };
        let _ = self.inbox.send(Inbound::Command(Command::Shutdown));
        // Dropped from inside a dispatcher callback: the worker exits on its own.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            tracing::error!("geofence manager worker panicked");
        }
    }
}

impl Drop for GeofenceManager {
    fn drop(&mut self) {
        self.stop();
    }
}
