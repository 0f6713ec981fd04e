//! In-process TTL cache.
//!
//! Two caches hang off this module's trait: keyword strategies (keyed by
//! platform + seed) and per-keyword search results (keyed by endpoint +
//! keyword + target). Both are deliberately process-local — a cache miss
//! only costs an API round trip, so cross-instance coherence is not worth
//! the machinery.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Read/write/evict surface of a TTL cache.
///
/// The pipeline takes `Arc<dyn TtlCache<_>>` so tests can substitute a
/// deterministic fake (always-hit, always-miss, recording).
pub trait TtlCache<T>: Send + Sync
where
    T: Clone + Send + Sync,
{
    /// Returns a clone of the live entry for `key`, if any.
    fn get(&self, key: &str) -> Option<T>;

    /// Stores `value` under `key`, resetting its age.
    fn set(&self, key: String, value: T);

    /// Evicts entries older than the sweep age. Returns how many were
    /// dropped.
    fn sweep(&self) -> usize;
}

struct Entry<T> {
    value: T,
    inserted_at: Instant,
}

/// [`TtlCache`] backed by a mutex-guarded `HashMap`.
///
/// `ttl` bounds how long an entry answers `get`; `sweep_max_age` bounds how
/// long a dead entry may linger before the periodic sweep reclaims it.
pub struct MemoryTtlCache<T> {
    ttl: Duration,
    sweep_max_age: Duration,
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T> MemoryTtlCache<T> {
    #[must_use]
    pub fn new(ttl: Duration, sweep_max_age: Duration) -> Self {
        Self {
            ttl,
            sweep_max_age,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry<T>>> {
        // A poisoned map only means a panic mid-insert elsewhere; stale cache
        // data is acceptable, losing the cache is not.
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<T> TtlCache<T> for MemoryTtlCache<T>
where
    T: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries();
        let entry = entries.get(key)?;
        if entry.inserted_at.elapsed() <= self.ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    fn set(&self, key: String, value: T) {
        self.entries().insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn sweep(&self) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() <= self.sweep_max_age);
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = entries.len(), "cache sweep");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_hits() {
        let cache = MemoryTtlCache::new(Duration::from_secs(60), Duration::from_secs(120));
        cache.set("k".to_owned(), 7u32);
        assert_eq!(cache.get("k"), Some(7));
        assert_eq!(cache.get("other"), None);
    }

    #[test]
    fn expired_entry_misses_but_survives_until_sweep_age() {
        let cache = MemoryTtlCache::new(Duration::ZERO, Duration::from_secs(120));
        cache.set("k".to_owned(), 7u32);
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.get("k"), None);
        // Not yet past the sweep age, so the entry stays resident.
        assert_eq!(cache.sweep(), 0);
    }

    #[test]
    fn sweep_evicts_entries_past_max_age() {
        let cache = MemoryTtlCache::new(Duration::ZERO, Duration::ZERO);
        cache.set("a".to_owned(), 1u32);
        cache.set("b".to_owned(), 2u32);
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(cache.sweep(), 2);
        assert_eq!(cache.sweep(), 0);
    }

    #[test]
    fn set_resets_entry_age() {
        let cache = MemoryTtlCache::new(Duration::from_secs(60), Duration::from_secs(120));
        cache.set("k".to_owned(), 1u32);
        cache.set("k".to_owned(), 2u32);
        assert_eq!(cache.get("k"), Some(2));
    }
}
