//! Sensor subscription registry and notification debouncing.
//!
//! The gateway pushes a notification every time a sensor value moves, which
//! for fan speeds can be several times a second.  Updates are coalesced per
//! sensor: the first notification opens a fixed window, later ones replace
//! the pending candidate, and only the latest value is emitted when the
//! window closes.  The window is not extended by further notifications.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use comfoq_core::domain::{naming::sensor_identifier, sensors};
use comfoq_core::SensorId;
use tokio::time::Instant;
use tracing::debug;

use crate::application::events::SensorUpdate;

#[derive(Debug)]
struct DebounceEntry {
    deadline: Instant,
    candidate: SensorUpdate,
}

/// Tracks which sensors are subscribed and holds debounced values.
#[derive(Debug)]
pub struct SubscriptionManager {
    registered: BTreeSet<SensorId>,
    debounce: HashMap<SensorId, DebounceEntry>,
    window: Duration,
}

impl SubscriptionManager {
    /// Creates an empty registry.  A zero `window` disables debouncing.
    pub fn new(window: Duration) -> Self {
        Self {
            registered: BTreeSet::new(),
            debounce: HashMap::new(),
            window,
        }
    }

    /// Records `id` as subscribed.  Returns `false` if it already was.
    pub fn register(&mut self, id: SensorId) -> bool {
        self.registered.insert(id)
    }

    /// Forgets `id` and any pending value for it.
    pub fn unregister(&mut self, id: SensorId) {
        self.registered.remove(&id);
        self.debounce.remove(&id);
    }

    pub fn is_registered(&self, id: SensorId) -> bool {
        self.registered.contains(&id)
    }

    /// Subscribed ids in ascending order.
    pub fn registered(&self) -> Vec<SensorId> {
        self.registered.iter().copied().collect()
    }

    /// Handles a raw notification.  Returns an update to emit right away
    /// only when debouncing is disabled.
    pub fn on_notification(&mut self, id: SensorId, data: &[u8], now: Instant) -> Option<SensorUpdate> {
        if !self.registered.contains(&id) {
            debug!(sensor = id, "notification for unsubscribed sensor dropped");
            return None;
        }

        let update = build_update(id, data);
        if self.window.is_zero() {
            return Some(update);
        }

        match self.debounce.get_mut(&id) {
            Some(entry) => entry.candidate = update,
            None => {
                self.debounce.insert(
                    id,
                    DebounceEntry {
                        deadline: now + self.window,
                        candidate: update,
                    },
                );
            }
        }
        None
    }

    /// Emits and forgets every candidate whose window has closed.
    pub fn expire(&mut self, now: Instant) -> Vec<SensorUpdate> {
        let due: Vec<SensorId> = self
            .debounce
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        let mut entries: Vec<DebounceEntry> = due
            .into_iter()
            .filter_map(|id| self.debounce.remove(&id))
            .collect();
        entries.sort_by_key(|e| (e.deadline, e.candidate.sensor_id));
        entries.into_iter().map(|e| e.candidate).collect()
    }

    /// When the next debounce window closes.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.debounce.values().map(|e| e.deadline).min()
    }

    /// Drops every pending candidate but keeps the subscriptions.
    pub fn clear_pending(&mut self) {
        self.debounce.clear();
    }
}

fn build_update(id: SensorId, data: &[u8]) -> SensorUpdate {
    let label = sensors::label(id);
    SensorUpdate {
        sensor_id: id,
        name: sensor_identifier(&label),
        label,
        value: sensors::decode_value(id, data),
        unit: sensors::unit(id).to_string(),
    }
}
