//! # Durable Cache Store
//!
//! Persistent cache with per-entry TTL and optional monotonic version
//! stamps, over a swappable [`KeyValueStore`] substrate.
//!
//! ## Degraded, Never Broken
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Cache Store Failure Policy                         │
//! │                                                                         │
//! │  Every storage I/O failure is caught, logged, and downgraded:          │
//! │                                                                         │
//! │    get()  + storage error  ──►  None  (a cache miss)                   │
//! │    set()  + storage error  ──►  false (write did not happen)           │
//! │                                                                         │
//! │  Callers ALWAYS have a fallback path for a miss (the network), so a    │
//! │  broken local disk degrades the terminal to online-only instead of     │
//! │  taking it down.                                                       │
//! │                                                                         │
//! │  EXPIRY is lazy: an entry past expires_at reads as absent and is       │
//! │  purged by the reader. There is no background sweep.                   │
//! │                                                                         │
//! │  VERSIONS are monotonic non-decreasing per key: a late out-of-order    │
//! │  response carrying an older snapshot version is discarded.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use comanda_core::{CacheEntry, CacheStats};

use crate::kv::KeyValueStore;

// =============================================================================
// Key Layout
// =============================================================================

/// Namespace for cache envelopes inside the substrate.
const ENTRY_PREFIX: &str = "entry:";

/// Meta key recording the last successful sync.
const META_LAST_SYNC: &str = "meta:last_sync_at";

fn entry_key(key: &str) -> String {
    format!("{ENTRY_PREFIX}{key}")
}

// =============================================================================
// Cache Store
// =============================================================================

/// Durable cache store.
///
/// Constructed once per process over the production substrate
/// (`Store::cache()`), or over a [`MemoryKeyValueStore`] in tests. Each
/// instance owns its substrate handle; there is no hidden global.
///
/// [`MemoryKeyValueStore`]: crate::kv::MemoryKeyValueStore
#[derive(Clone)]
pub struct CacheStore {
    kv: Arc<dyn KeyValueStore>,
}

impl CacheStore {
    /// Creates a cache store over the given substrate.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        CacheStore { kv }
    }

    /// Reads the cached value under `key`, or `None` on miss, expiry, or
    /// storage failure.
    ///
    /// An expired entry is purged before returning `None`, so subsequent
    /// `version_of`/`age_minutes` calls see it as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.load_live(key).await?;

        match serde_json::from_value(entry.data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Cached value failed to decode; treating as miss");
                self.purge(key).await;
                None
            }
        }
    }

    /// Writes `data` under `key`.
    ///
    /// Returns whether the write was applied: `false` when the candidate
    /// version is older than the stored one, or on storage failure.
    /// Unversioned writes are last-write-wins.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        ttl_minutes: Option<i64>,
        version: Option<i64>,
    ) -> bool {
        // Monotonicity check against whatever is currently stored. A stored
        // entry that fails to load counts as absent (the write proceeds).
        if let Some(existing) = self.load_live(key).await {
            if !existing.accepts_version(version) {
                debug!(
                    key,
                    stored = ?existing.version,
                    candidate = ?version,
                    "Rejecting stale snapshot version"
                );
                return false;
            }
        }

        let data = match serde_json::to_value(data) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "Value failed to serialize; cache write skipped");
                return false;
            }
        };

        let entry = CacheEntry::new(key, data, Utc::now(), ttl_minutes, version);
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Envelope failed to serialize; cache write skipped");
                return false;
            }
        };

        match self.kv.put(&entry_key(key), &raw).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Cache write failed; continuing without cache");
                false
            }
        }
    }

    /// Removes the entry under `key`.
    pub async fn delete(&self, key: &str) {
        self.purge(key).await;
    }

    /// Removes every entry whose key starts with `prefix`.
    pub async fn clear_prefix(&self, prefix: &str) {
        match self.kv.delete_prefix(&entry_key(prefix)).await {
            Ok(n) => debug!(prefix, removed = n, "Cleared cache prefix"),
            Err(e) => warn!(prefix, error = %e, "Cache clear failed"),
        }
    }

    /// Server version stored under `key`, or 0 when absent, expired, or
    /// unversioned.
    pub async fn version_of(&self, key: &str) -> i64 {
        match self.load_live(key).await {
            Some(entry) => entry.version.unwrap_or(0),
            None => 0,
        }
    }

    /// Whole minutes since the entry under `key` was cached, or `None`
    /// when absent or expired.
    pub async fn age_minutes(&self, key: &str) -> Option<i64> {
        self.load_live(key)
            .await
            .map(|entry| entry.age_minutes(Utc::now()))
    }

    /// Aggregate statistics for diagnostics screens.
    ///
    /// Storage failures degrade to zeroed stats rather than an error.
    pub async fn stats(&self) -> CacheStats {
        let entry_count = match self.kv.count_prefix(ENTRY_PREFIX).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Cache stats query failed");
                0
            }
        };

        let last_sync_at = match self.kv.get(META_LAST_SYNC).await {
            Ok(Some(raw)) => raw.parse::<DateTime<Utc>>().ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Last-sync read failed");
                None
            }
        };

        CacheStats {
            entry_count,
            last_sync_at,
        }
    }

    /// Stamps the last successful sync.
    pub async fn record_sync(&self, at: DateTime<Utc>) {
        if let Err(e) = self.kv.put(META_LAST_SYNC, &at.to_rfc3339()).await {
            warn!(error = %e, "Failed to record sync timestamp");
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Loads the live (unexpired) envelope under `key`, purging it lazily
    /// when expired or undecodable. Storage failures read as a miss.
    async fn load_live(&self, key: &str) -> Option<CacheEntry> {
        let raw = match self.kv.get(&entry_key(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed; treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Cache envelope corrupted; purging");
                self.purge(key).await;
                return None;
            }
        };

        if entry.is_expired(Utc::now()) {
            debug!(key, "Cache entry expired; purging");
            self.purge(key).await;
            return None;
        }

        Some(entry)
    }

    /// Best-effort delete; failures are logged and swallowed.
    async fn purge(&self, key: &str) {
        if let Err(e) = self.kv.delete(&entry_key(key)).await {
            warn!(key, error = %e, "Cache purge failed");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::kv::MemoryKeyValueStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        items: Vec<String>,
    }

    fn snapshot(items: &[&str]) -> Snapshot {
        Snapshot {
            items: items.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn cache() -> CacheStore {
        CacheStore::new(Arc::new(MemoryKeyValueStore::new()))
    }

    #[tokio::test]
    async fn test_get_set_roundtrip() {
        let cache = cache();
        let value = snapshot(&["carbonara", "amatriciana"]);

        assert!(cache.set("reference:menu", &value, None, Some(3)).await);
        let read: Snapshot = cache.get("reference:menu").await.unwrap();
        assert_eq!(read, value);
        assert_eq!(cache.version_of("reference:menu").await, 3);
        assert_eq!(cache.age_minutes("reference:menu").await, Some(0));
    }

    #[tokio::test]
    async fn test_miss_on_absent_key() {
        let cache = cache();
        assert!(cache.get::<Snapshot>("nope").await.is_none());
        assert_eq!(cache.version_of("nope").await, 0);
        assert_eq!(cache.age_minutes("nope").await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_absent_and_is_purged() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let cache = CacheStore::new(kv.clone());

        // Plant an envelope that expired an hour ago.
        let expired = CacheEntry {
            key: "reference:customers".into(),
            data: serde_json::to_value(snapshot(&["ada"])).unwrap(),
            cached_at: Utc::now() - Duration::hours(2),
            expires_at: Some(Utc::now() - Duration::hours(1)),
            version: None,
        };
        kv.put(
            &entry_key("reference:customers"),
            &serde_json::to_string(&expired).unwrap(),
        )
        .await
        .unwrap();

        assert!(cache.get::<Snapshot>("reference:customers").await.is_none());

        // Lazy purge happened: the substrate no longer holds the row, and
        // the metadata views agree.
        assert!(kv
            .get(&entry_key("reference:customers"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(cache.version_of("reference:customers").await, 0);
        assert_eq!(cache.age_minutes("reference:customers").await, None);
    }

    #[tokio::test]
    async fn test_version_is_monotonic() {
        let cache = cache();

        assert!(cache.set("reference:menu", &snapshot(&["v3"]), None, Some(3)).await);

        // An out-of-order late response with an older version is discarded.
        assert!(!cache.set("reference:menu", &snapshot(&["v2"]), None, Some(2)).await);
        let read: Snapshot = cache.get("reference:menu").await.unwrap();
        assert_eq!(read, snapshot(&["v3"]));
        assert_eq!(cache.version_of("reference:menu").await, 3);

        // Same version replaces (refetch of identical snapshot).
        assert!(cache.set("reference:menu", &snapshot(&["v3b"]), None, Some(3)).await);
        // Newer version replaces.
        assert!(cache.set("reference:menu", &snapshot(&["v4"]), None, Some(4)).await);
        assert_eq!(cache.version_of("reference:menu").await, 4);
    }

    #[tokio::test]
    async fn test_unversioned_writes_are_last_write_wins() {
        let cache = cache();

        assert!(cache.set("reference:customers", &snapshot(&["a"]), Some(60), None).await);
        assert!(cache.set("reference:customers", &snapshot(&["b"]), Some(60), None).await);

        let read: Snapshot = cache.get("reference:customers").await.unwrap();
        assert_eq!(read, snapshot(&["b"]));
    }

    #[tokio::test]
    async fn test_clear_prefix_and_stats() {
        let cache = cache();

        cache.set("reference:menu", &snapshot(&["x"]), None, Some(1)).await;
        cache.set("reference:customers", &snapshot(&["y"]), None, None).await;
        cache.set("ui:layout", &snapshot(&["z"]), None, None).await;

        assert_eq!(cache.stats().await.entry_count, 3);

        cache.clear_prefix("reference:").await;
        assert_eq!(cache.stats().await.entry_count, 1);
        assert!(cache.get::<Snapshot>("reference:menu").await.is_none());
        assert!(cache.get::<Snapshot>("ui:layout").await.is_some());
    }

    #[tokio::test]
    async fn test_record_sync_shows_in_stats() {
        let cache = cache();
        assert!(cache.stats().await.last_sync_at.is_none());

        let at = Utc::now();
        cache.record_sync(at).await;
        let stats = cache.stats().await;
        assert_eq!(stats.last_sync_at.unwrap().timestamp(), at.timestamp());
    }

    // -------------------------------------------------------------------------
    // Storage failure downgrade
    // -------------------------------------------------------------------------

    /// Substrate whose every operation fails, standing in for a broken disk.
    struct BrokenKv;

    #[async_trait]
    impl crate::kv::KeyValueStore for BrokenKv {
        async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::Internal("disk on fire".into()))
        }
        async fn put(&self, _key: &str, _value: &str) -> StoreResult<()> {
            Err(StoreError::Internal("disk on fire".into()))
        }
        async fn delete(&self, _key: &str) -> StoreResult<()> {
            Err(StoreError::Internal("disk on fire".into()))
        }
        async fn delete_prefix(&self, _prefix: &str) -> StoreResult<u64> {
            Err(StoreError::Internal("disk on fire".into()))
        }
        async fn count_prefix(&self, _prefix: &str) -> StoreResult<i64> {
            Err(StoreError::Internal("disk on fire".into()))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_degrades_to_miss() {
        let cache = CacheStore::new(Arc::new(BrokenKv));

        // Never panics, never errors: reads miss, writes report unapplied.
        assert!(cache.get::<Snapshot>("reference:menu").await.is_none());
        assert!(!cache.set("reference:menu", &snapshot(&["x"]), None, None).await);
        assert_eq!(cache.version_of("reference:menu").await, 0);
        assert_eq!(cache.stats().await.entry_count, 0);
        cache.delete("reference:menu").await;
        cache.record_sync(Utc::now()).await;
    }
}
