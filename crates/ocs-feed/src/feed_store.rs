//! Shared latest-tick store.
//!
//! One record per instrument key, merged field by field from partial
//! updates. A single coarse lock guards the whole map: writers are
//! exclusive, readers shared, so no reader ever sees a half-merged record
//! and `snapshot()` is a consistent point-in-time copy.

use chrono::{DateTime, Utc};
use ocs_core::{InstrumentKey, Price, Tick};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct FeedEntry {
    tick: Tick,
    last_update: DateTime<Utc>,
}

/// Point-in-time copy of the feed store.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    ticks: HashMap<InstrumentKey, Tick>,
}

impl FeedSnapshot {
    pub fn get(&self, key: &InstrumentKey) -> Option<&Tick> {
        self.ticks.get(key)
    }

    pub fn contains(&self, key: &InstrumentKey) -> bool {
        self.ticks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentKey, &Tick)> {
        self.ticks.iter()
    }
}

/// Concurrent instrument key → latest tick mapping.
#[derive(Debug, Default)]
pub struct FeedStore {
    entries: RwLock<HashMap<InstrumentKey, FeedEntry>>,
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a partial update into the record for `key`, creating it if absent.
    pub fn write(&self, key: InstrumentKey, update: Tick) {
        let now = Utc::now();
        let mut entries = self.entries.write();
        match entries.get_mut(&key) {
            Some(entry) => {
                entry.tick.merge(update);
                entry.last_update = now;
            }
            None => {
                entries.insert(
                    key,
                    FeedEntry {
                        tick: update,
                        last_update: now,
                    },
                );
            }
        }
    }

    /// Current record for `key`.
    pub fn read(&self, key: &InstrumentKey) -> Option<Tick> {
        self.entries.read().get(key).map(|e| e.tick.clone())
    }

    /// Parsed last-traded price for `key`, `None` when absent or malformed.
    pub fn last_price(&self, key: &InstrumentKey) -> Option<Price> {
        self.entries
            .read()
            .get(key)
            .and_then(|e| e.tick.last_price_value())
    }

    /// Wall-clock time of the last merge into `key`.
    pub fn last_update(&self, key: &InstrumentKey) -> Option<DateTime<Utc>> {
        self.entries.read().get(key).map(|e| e.last_update)
    }

    /// Consistent copy of every record.
    pub fn snapshot(&self) -> FeedSnapshot {
        let entries = self.entries.read();
        FeedSnapshot {
            ticks: entries
                .iter()
                .map(|(k, e)| (k.clone(), e.tick.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
