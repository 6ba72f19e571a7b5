//! Operational key/value cache with TTL and atomic idempotency checks.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Default TTL for `idempotency_check` entries: 24 hours.
const IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct Entry {
    value: String,
    stored_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// In-process KV store. Values expire lazily on read.
pub struct CacheStore {
    entries: DashMap<String, Entry>,
}

impl CacheStore {
    pub fn new() -> Self {
        CacheStore {
            entries: DashMap::new(),
        }
    }

    pub fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.expired() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Atomic set-if-absent. Returns `true` iff the key already existed
    /// (and had not expired) — the duplicate case.
    pub fn idempotency_check(&self, key: &str) -> bool {
        let namespaced = format!("idem:{key}");
        match self.entries.entry(namespaced) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().expired() {
                    occupied.insert(Entry {
                        value: "1".to_string(),
                        stored_at: Instant::now(),
                        ttl: IDEMPOTENCY_TTL,
                    });
                    false
                } else {
                    true
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value: "1".to_string(),
                    stored_at: Instant::now(),
                    ttl: IDEMPOTENCY_TTL,
                });
                false
            }
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        CacheStore::new()
    }
}
