//! Shared sensor bounds table.
//!
//! The table lives in a `watch` channel holding an immutable map behind an
//! `Arc`. The config listener is the only writer and replaces the map
//! copy-on-write, one config message at a time; readers take a snapshot per
//! cycle and never observe a half-applied message.

use std::{collections::HashMap, sync::Arc};

use tokio::{
    sync::watch,
    time::{sleep, Duration, Instant},
};
use tracing::{info, warn};

use super::schema::Bounds;

pub type BoundsSnapshot = Arc<HashMap<String, Bounds>>;

const WAIT_WARN_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct BoundsTable {
    tx: Arc<watch::Sender<BoundsSnapshot>>,
}

impl Default for BoundsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundsTable {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(HashMap::new()));
        Self { tx: Arc::new(tx) }
    }

    /// Inserts or replaces the bounds of one sensor.
    pub fn upsert(&self, bounds: Bounds) -> Option<Bounds> {
        let mut previous = None;
        self.tx.send_modify(|map| {
            previous = Arc::make_mut(map).insert(bounds.sensor.clone(), bounds);
        });
        previous
    }

    /// Upserts a batch of entries as a single update. Sensors not listed keep
    /// their current bounds.
    pub fn apply(&self, entries: impl IntoIterator<Item = Bounds>) -> usize {
        let entries: Vec<Bounds> = entries.into_iter().collect();
        if entries.is_empty() {
            return 0;
        }
        let count = entries.len();
        self.tx.send_modify(|map| {
            let map = Arc::make_mut(map);
            for bounds in entries {
                map.insert(bounds.sensor.clone(), bounds);
            }
        });
        count
    }

    /// Consistent view of the whole table.
    pub fn snapshot(&self) -> BoundsSnapshot {
        self.tx.borrow().clone()
    }

    pub fn get(&self, sensor: &str) -> Option<Bounds> {
        self.tx.borrow().get(sensor).cloned()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    pub fn subscribe(&self) -> watch::Receiver<BoundsSnapshot> {
        self.tx.subscribe()
    }

    /// Resolves once at least one sensor has bounds.
    ///
    /// Checks every `poll` (and on every table change), warning periodically
    /// while nothing has arrived.
    pub async fn wait_until_populated(&self, poll: Duration) {
        if !self.is_empty() {
            return;
        }

        info!("Waiting for sensor bounds configuration...");
        let mut rx = self.subscribe();
        let started = Instant::now();
        let mut last_warn = started;

        while rx.borrow_and_update().is_empty() {
            tokio::select! {
                _ = rx.changed() => {}
                _ = sleep(poll) => {}
            }
            if last_warn.elapsed() >= WAIT_WARN_INTERVAL {
                warn!(
                    "Still waiting for sensor bounds after {}s",
                    started.elapsed().as_secs()
                );
                last_warn = Instant::now();
            }
        }

        info!("Sensor bounds received for {} sensor(s)", self.len());
    }
}
