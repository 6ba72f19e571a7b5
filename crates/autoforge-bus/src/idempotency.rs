//! Message-level deduplication store.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Default retention for seen keys: 24 hours.
const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// In-memory set of seen idempotency keys with TTL expiry.
///
/// `mark_seen` has set-if-absent semantics: a concurrent marker never
/// shortens an existing entry's lifetime. Entries are lost on restart, which
/// is acceptable — durability of record lives in the memory facade, and
/// redelivered messages are absorbed by idempotent handlers.
pub struct IdempotencyStore {
    ttl: Duration,
    seen: DashMap<String, Instant>,
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        IdempotencyStore {
            ttl,
            seen: DashMap::new(),
        }
    }

    /// Whether the key was marked within the TTL window.
    pub fn is_seen(&self, key: &str) -> bool {
        match self.seen.get(key) {
            Some(entry) => {
                if entry.elapsed() < self.ttl {
                    true
                } else {
                    drop(entry);
                    self.seen.remove(key);
                    false
                }
            }
            None => false,
        }
    }

    /// Marks a key as seen; keeps the earlier mark when one exists.
    pub fn mark_seen(&self, key: &str) {
        self.seen
            .entry(key.to_string())
            .or_insert_with(Instant::now);
    }
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        IdempotencyStore::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_key_is_not_seen() {
        let store = IdempotencyStore::new();
        assert!(!store.is_seen("k"));
    }

    #[test]
    fn marked_key_is_seen() {
        let store = IdempotencyStore::new();
        store.mark_seen("k");
        assert!(store.is_seen("k"));
        assert!(!store.is_seen("other"));
    }

    #[test]
    fn expired_key_is_forgotten() {
        let store = IdempotencyStore::with_ttl(Duration::from_millis(0));
        store.mark_seen("k");
        std::thread::sleep(Duration::from_millis(2));
        assert!(!store.is_seen("k"));
    }
}
