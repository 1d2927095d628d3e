//! # Cache Store
//!
//! Keyed store of last-known-good poll results, used for graceful
//! degradation when a live fetch fails.
//!
//! Entries carry a hard TTL checked lazily at read time and an advisory
//! staleness flag computed against the scheduler's freshness window. There
//! is no background eviction: entries disappear only through explicit
//! `delete`/`clear`. An entry past its TTL reads as absent from [`CacheStore::get`]
//! but is still surfaced by [`CacheStore::get_with_age`] with its age
//! metadata, so the UI can show "data from N minutes ago" banners.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A single cached payload owned by one registration.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Value,
    pub registration_id: String,
    pub stored_at: Instant,
    pub expires_at: Instant,
    pub metadata: Option<HashMap<String, Value>>,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.stored_at)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Result of an age-aware cache read.
#[derive(Debug, Clone)]
pub struct CachedRead {
    pub data: Value,
    pub age: Duration,
    /// Advisory: the entry is older than the freshness window. Stale data is
    /// still returned, never purged.
    pub is_stale: bool,
    pub entry: CacheEntry,
}

/// Shared keyed cache, one entry per registration id.
#[derive(Debug)]
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    freshness_window: Duration,
}

impl CacheStore {
    pub fn new(freshness_window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            freshness_window,
        }
    }

    /// Overwrite the entry for `key`, stamping the current time and expiry.
    pub fn set(&self, key: impl Into<String>, data: Value, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        let entry = CacheEntry {
            data,
            registration_id: key.clone(),
            stored_at: now,
            expires_at: now + ttl,
            metadata: None,
        };
        debug!(
            registration_id = %key,
            ttl_ms = ttl.as_millis() as u64,
            "Cache entry stored"
        );
        self.entries.insert(key, entry);
    }

    /// Read the entry for `key`, treating a hard-TTL-expired entry as
    /// absent. Expiry is checked lazily here; the entry itself is left in
    /// place until an explicit delete.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            return None;
        }
        Some(entry.clone())
    }

    /// Read the entry for `key` with age metadata, regardless of TTL.
    /// `is_stale` flips once the age exceeds the freshness window.
    pub fn get_with_age(&self, key: &str) -> Option<CachedRead> {
        let entry = self.entries.get(key)?.clone();
        let age = entry.age();
        Some(CachedRead {
            data: entry.data.clone(),
            age,
            is_stale: age > self.freshness_window,
            entry,
        })
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_CACHE_FRESHNESS;
    use serde_json::json;

    fn store() -> CacheStore {
        CacheStore::new(DEFAULT_CACHE_FRESHNESS)
    }

    #[tokio::test]
    async fn test_set_overwrites_existing_entry() {
        let cache = store();
        cache.set("quests", json!({"completed": 1}), Duration::from_secs(60));
        cache.set("quests", json!({"completed": 2}), Duration::from_secs(60));

        assert_eq!(cache.len(), 1);
        let entry = cache.get("quests").unwrap();
        assert_eq!(entry.data, json!({"completed": 2}));
        assert_eq!(entry.registration_id, "quests");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_reads_as_absent_but_is_not_purged() {
        let cache = store();
        cache.set("stats", json!(42), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(cache.get("stats").is_none());
        // Still present for age-aware reads until explicitly deleted.
        assert_eq!(cache.len(), 1);
        let read = cache.get_with_age("stats").unwrap();
        assert_eq!(read.data, json!(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness_is_advisory() {
        let cache = CacheStore::new(Duration::from_secs(30));
        cache.set("stats", json!(7), Duration::from_secs(3600));

        let read = cache.get_with_age("stats").unwrap();
        assert!(!read.is_stale);

        tokio::time::advance(Duration::from_secs(31)).await;

        let read = cache.get_with_age("stats").unwrap();
        assert!(read.is_stale);
        assert_eq!(read.data, json!(7));
        // Stale but within TTL: plain reads still succeed.
        assert!(cache.get("stats").is_some());
    }

    #[test]
    fn test_delete_and_clear() {
        tokio_test::block_on(async {
            let cache = store();
            cache.set("a", json!(1), Duration::from_secs(60));
            cache.set("b", json!(2), Duration::from_secs(60));

            assert!(cache.delete("a"));
            assert!(!cache.delete("a"));
            assert_eq!(cache.len(), 1);

            cache.clear();
            assert!(cache.is_empty());
        });
    }
}
