//! Background snapshot writer.
//!
//! The manager worker hands every post-mutation snapshot to this thread so
//! that slow disk I/O never holds up crossing events. Jobs run strictly in
//! arrival order; none is dropped. Each save carries a completion that
//! answers the caller once the write has landed (or failed).

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, SendError, Sender};

use crate::record::GeofenceRecord;
use crate::store::{GeofenceStore, StorageError};

pub(crate) type SaveCompletion = Box<dyn FnOnce(Result<(), StorageError>) + Send>;

/// Result of asking the persister for the stored collection.
#[derive(Debug)]
pub(crate) enum Reloaded {
    /// The store is in sync with the last snapshot handed over.
    Fresh(Vec<GeofenceRecord>),
    /// The last save failed, so the store is older than memory.
    Unsaved,
}

enum PersistJob {
    Save {
        records: Vec<GeofenceRecord>,
        done: SaveCompletion,
    },
    Reload {
        reply: Sender<Reloaded>,
    },
}

pub(crate) struct Persister {
    tx: Sender<PersistJob>,
    join: JoinHandle<()>,
}

impl Persister {
    pub(crate) fn spawn(store: Arc<dyn GeofenceStore>, queue_capacity: usize) -> std::io::Result<Self> {
        let (tx, rx) = bounded::<PersistJob>(queue_capacity.max(1));
        let join = thread::Builder::new()
            .name("geonote-persist".to_string())
            .spawn(move || persist_loop(store.as_ref(), &rx))?;
        Ok(Self { tx, join })
    }

    /// Queue a snapshot write. Blocks while the queue is full.
    pub(crate) fn save(&self, records: Vec<GeofenceRecord>, done: SaveCompletion) {
        if let Err(SendError(job)) = self.tx.send(PersistJob::Save { records, done }) {
            if let PersistJob::Save { done, .. } = job {
                done(Err(StorageError::Io(std::io::Error::other("persister stopped"))));
            }
        }
    }

    /// Wait for queued writes, then read the store back.
    ///
    /// Returns `None` if the persister thread is gone.
    pub(crate) fn reload(&self) -> Option<Reloaded> {
        let (reply, rx) = bounded(1);
        self.tx.send(PersistJob::Reload { reply }).ok()?;
        rx.recv().ok()
    }

    /// Drain queued writes and stop the thread.
    pub(crate) fn shutdown(self) {
        drop(self.tx);
        if self.join.join().is_err() {
            tracing::error!("geofence persister thread panicked");
        }
    }
}

fn persist_loop(store: &dyn GeofenceStore, rx: &Receiver<PersistJob>) {
    let mut dirty = false;
    while let Ok(job) = rx.recv() {
        match job {
            PersistJob::Save { records, done } => {
                let result = store.save(&records);
                match &result {
                    Ok(()) => dirty = false,
                    Err(e) => {
                        dirty = true;
                        tracing::error!(error = %e, count = records.len(), "geofence snapshot save failed");
                    }
                }
                done(result);
            }
            PersistJob::Reload { reply } => {
                let reloaded = if dirty {
                    Reloaded::Unsaved
                } else {
                    Reloaded::Fresh(store.load())
                };
                let _ = reply.send(reloaded);
            }
        }
    }
}
