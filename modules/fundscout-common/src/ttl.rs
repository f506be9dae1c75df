//! Expiring in-memory key/value state.
//!
//! Bridges short-lived two-step protocols (request an upload handle, then
//! confirm it) without a global mutable map. Every entry carries its own
//! expiry; nothing here is relied on for correctness — a missing entry just
//! means the caller restarts the handshake.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Scoped, expiring key/value store. Clone-on-read; entries past their expiry
/// are treated as absent and purged lazily.
pub struct TtlKv<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    default_ttl: Duration,
}

impl<V: Clone> TtlKv<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let mut entries = self.entries.lock().expect("ttl_kv lock poisoned");
        entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Returns the value if present and unexpired; expired entries are purged.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().expect("ttl_kv lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Remove and return the value, completing the handshake.
    pub fn take(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().expect("ttl_kv lock poisoned");
        entries
            .remove(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value)
    }

    /// Drop every expired entry. Called opportunistically; correctness never
    /// depends on it running.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().expect("ttl_kv lock poisoned");
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("ttl_kv lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
