//! Notification delivery.
//!
//! Presenting an alert (permission checks, in-app banner versus local
//! notification) belongs to the host. The manager only needs the narrow
//! [`NotificationDispatcher`] interface.

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::GeofenceId;

/// Delivery failure reported by a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Notification delivery failed: {message}")]
pub struct DispatchError {
    /// What went wrong.
    pub message: String,
}

/// An alert produced for one crossing.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub identifier: GeofenceId,
}

/// Presents alerts to the user.
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver one alert for the geofence `identifier`.
    fn deliver(&self, title: &str, body: &str, identifier: &GeofenceId) -> Result<(), DispatchError>;
}

/// Dispatcher that forwards alerts into a [`NotificationStream`].
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: Sender<Notification>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the stream its alerts arrive on.
    #[must_use]
    pub fn new() -> (Self, NotificationStream) {
        let (tx, rx) = unbounded();
        (Self { tx }, NotificationStream { rx })
    }
}

impl NotificationDispatcher for ChannelDispatcher {
    fn deliver(&self, title: &str, body: &str, identifier: &GeofenceId) -> Result<(), DispatchError> {
        self.tx
            .send(Notification {
                title: title.to_string(),
                body: body.to_string(),
                identifier: identifier.clone(),
            })
            .map_err(|_| DispatchError {
                message: "notification stream dropped".to_string(),
            })
    }
}

/// Receiving end of a [`ChannelDispatcher`].
#[derive(Debug)]
pub struct NotificationStream {
    rx: Receiver<Notification>,
}

impl NotificationStream {
    /// Receive the next alert, waiting at most `timeout`.
    ///
    /// Returns `None` on timeout or when the dispatcher is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Notification> {
        match self.rx.recv_timeout(timeout) {
            Ok(n) => Some(n),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take an alert if one is already queued.
    pub fn try_recv(&self) -> Option<Notification> {
        match self.rx.try_recv() {
            Ok(n) => Some(n),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drain every queued alert.
    pub fn drain(&self) -> Vec<Notification> {
        self.rx.try_iter().collect()
    }
}
