// src/cache.rs
//! Per-source TTL cache of fetched candidates.
//!
//! Each key owns its own slot lock; the outer map lock is held only to find or
//! create a slot, so a slow reader of one source never blocks another source.
//! Expired entries are evicted lazily on read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::candidate::Candidate;

/// Longest lifetime an entry can get; larger TTLs are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Vec<Candidate>,
    pub stored_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

type Slot = Arc<Mutex<Option<CacheEntry>>>;

#[derive(Debug, Default)]
pub struct CacheStore {
    slots: RwLock<HashMap<String, Slot>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh payload for `key`, or `None` when absent or expired.
    pub fn get(&self, key: &str) -> Option<Vec<Candidate>> {
        let slot = self.slot_if_present(key)?;
        let mut guard = slot.lock().expect("cache slot mutex poisoned");
        let fresh = guard.as_ref().map(|e| !e.is_expired(Instant::now()))?;
        if !fresh {
            *guard = None;
            return None;
        }
        guard.as_ref().map(|e| e.payload.clone())
    }

    /// Store `payload` under `key` for `ttl`, overwriting any previous entry.
    pub fn put(&self, key: &str, payload: Vec<Candidate>, ttl: Duration) {
        let slot = self.slot(key);
        let now = Instant::now();
        let entry = CacheEntry {
            payload,
            stored_at: now,
            expires_at: now + ttl.min(MAX_TTL),
        };
        *slot.lock().expect("cache slot mutex poisoned") = Some(entry);
    }

    /// Age of every live entry, keyed by source id.
    pub fn ages(&self) -> HashMap<String, Duration> {
        let now = Instant::now();
        let slots: Vec<(String, Slot)> = {
            let map = self.slots.read().expect("cache map rwlock poisoned");
            map.iter().map(|(k, s)| (k.clone(), Arc::clone(s))).collect()
        };
        slots
            .into_iter()
            .filter_map(|(k, s)| {
                let guard = s.lock().expect("cache slot mutex poisoned");
                guard
                    .as_ref()
                    .filter(|e| !e.is_expired(now))
                    .map(|e| (k, now.duration_since(e.stored_at)))
            })
            .collect()
    }

    fn slot_if_present(&self, key: &str) -> Option<Slot> {
        let map = self.slots.read().expect("cache map rwlock poisoned");
        map.get(key).cloned()
    }

    fn slot(&self, key: &str) -> Slot {
        if let Some(s) = self.slot_if_present(key) {
            return s;
        }
        let mut map = self.slots.write().expect("cache map rwlock poisoned");
        Arc::clone(map.entry(key.to_string()).or_default())
    }
}
