//! Short-lived memory of recent crossings.
//!
//! Platforms occasionally fire the same callback twice in quick succession.
//! A repeat of an identical `(identifier, crossing)` pair whose timestamp is
//! within the window of the last admitted one is a redelivery, not a new
//! crossing.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::record::{Crossing, GeofenceId};

#[derive(Debug)]
pub(crate) struct Debouncer {
    window: chrono::Duration,
    last_admitted: HashMap<(GeofenceId, Crossing), DateTime<Utc>>,
    /// Newest admitted timestamp; expiry runs on the event clock.
    newest: Option<DateTime<Utc>>,
}

impl Debouncer {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero()),
            last_admitted: HashMap::new(),
            newest: None,
        }
    }

    /// Returns true if the crossing is new and records it.
    ///
    /// Suppressed repeats do not extend the window.
    pub(crate) fn admit(&mut self, identifier: &GeofenceId, crossing: Crossing, at: DateTime<Utc>) -> bool {
        let key = (identifier.clone(), crossing);
        if let Some(&prev) = self.last_admitted.get(&key) {
            let gap = if at >= prev { at - prev } else { prev - at };
            if gap < self.window {
                return false;
            }
        }
        self.last_admitted.insert(key, at);
        self.newest = Some(self.newest.map_or(at, |n| n.max(at)));
        true
    }

    /// Drop all memory of `identifier`.
    pub(crate) fn forget(&mut self, identifier: &GeofenceId) {
        self.last_admitted.retain(|(id, _), _| id != identifier);
    }

    /// Drop entries a full window older than the newest admitted crossing.
    pub(crate) fn prune(&mut self) {
        let Some(newest) = self.newest else {
            return;
        };
        let window = self.window;
        self.last_admitted.retain(|_, at| newest - *at < window);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.last_admitted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn id(s: &str) -> GeofenceId {
        GeofenceId::from(s)
    }

    #[test]
    fn test_repeat_within_window_is_suppressed() {
        let mut d = Debouncer::new(Duration::from_secs(5));
        let t0 = Utc::now();
        assert!(d.admit(&id("A"), Crossing::Entered, t0));
        assert!(!d.admit(&id("A"), Crossing::Entered, t0 + ChronoDuration::seconds(1)));
        assert!(d.admit(&id("A"), Crossing::Entered, t0 + ChronoDuration::seconds(5)));
    }

    #[test]
    fn test_suppressed_repeat_does_not_extend_window() {
        let mut d = Debouncer::new(Duration::from_secs(5));
        let t0 = Utc::now();
        assert!(d.admit(&id("A"), Crossing::Entered, t0));
        assert!(!d.admit(&id("A"), Crossing::Entered, t0 + ChronoDuration::seconds(4)));
        assert!(d.admit(&id("A"), Crossing::Entered, t0 + ChronoDuration::seconds(6)));
    }

    #[test]
    fn test_pairs_are_independent() {
        let mut d = Debouncer::new(Duration::from_secs(5));
        let t0 = Utc::now();
        assert!(d.admit(&id("A"), Crossing::Entered, t0));
        assert!(d.admit(&id("A"), Crossing::Exited, t0));
        assert!(d.admit(&id("B"), Crossing::Entered, t0));
    }

    #[test]
    fn test_out_of_order_redelivery_is_suppressed() {
        let mut d = Debouncer::new(Duration::from_secs(5));
        let t0 = Utc::now();
        assert!(d.admit(&id("A"), Crossing::Exited, t0));
        assert!(!d.admit(&id("A"), Crossing::Exited, t0 - ChronoDuration::seconds(2)));
    }

    #[test]
    fn test_forget_and_prune() {
        let mut d = Debouncer::new(Duration::from_secs(5));
        let t0 = Utc::now();
        d.admit(&id("A"), Crossing::Entered, t0);
        d.admit(&id("A"), Crossing::Exited, t0);
        d.admit(&id("B"), Crossing::Entered, t0);

        d.forget(&id("A"));
        assert_eq!(d.len(), 1);

        d.admit(&id("C"), Crossing::Entered, t0 + ChronoDuration::seconds(10));
        d.prune();
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn test_prune_keeps_late_timestamps() {
        let mut d = Debouncer::new(Duration::from_secs(5));
        // Delivered long after it happened.
        let stale = Utc::now() - ChronoDuration::hours(1);
        assert!(d.admit(&id("A"), Crossing::Entered, stale));

        d.prune();
        assert_eq!(d.len(), 1);
        assert!(!d.admit(&id("A"), Crossing::Entered, stale));
    }
}
