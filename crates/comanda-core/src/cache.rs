//! # Cache Envelope Types
//!
//! Every value in the durable cache is wrapped in a [`CacheEntry`] that
//! carries the bookkeeping the store needs: when it was cached, when it
//! expires, and which server version it represents.
//!
//! The rules here are pure functions over explicit timestamps so the store's
//! expiry and monotonicity behavior is testable without a clock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Cache Entry
// =============================================================================

/// The persisted envelope around one cached value.
///
/// Owned exclusively by the cache store; values cross the store's API only
/// as deserialized copies of `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cache key this envelope is stored under.
    pub key: String,

    /// The cached value as JSON.
    pub data: serde_json::Value,

    /// When the value was written.
    pub cached_at: DateTime<Utc>,

    /// Hard expiry; past this instant the entry reads as absent and is
    /// purged lazily. `None` means the entry never hard-expires.
    pub expires_at: Option<DateTime<Utc>>,

    /// Server version of the cached collection, for monotonicity checks.
    /// `None` for collections without a server version.
    pub version: Option<i64>,
}

impl CacheEntry {
    /// Builds an envelope written at `now` with an optional TTL in minutes.
    pub fn new(
        key: impl Into<String>,
        data: serde_json::Value,
        now: DateTime<Utc>,
        ttl_minutes: Option<i64>,
        version: Option<i64>,
    ) -> Self {
        CacheEntry {
            key: key.into(),
            data,
            cached_at: now,
            expires_at: ttl_minutes.map(|m| now + Duration::minutes(m)),
            version,
        }
    }

    /// True once the hard expiry has passed. Entries without `expires_at`
    /// never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => now > at,
            None => false,
        }
    }

    /// Whole minutes since the value was cached.
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.cached_at).num_minutes()
    }

    /// Whether a candidate at `candidate_version` may overwrite this entry.
    ///
    /// Versions are monotonic non-decreasing per key: an out-of-order late
    /// response carrying an older version must not clobber newer data.
    /// Unversioned writes are last-write-wins.
    pub fn accepts_version(&self, candidate_version: Option<i64>) -> bool {
        match (self.version, candidate_version) {
            (Some(current), Some(candidate)) => candidate >= current,
            _ => true,
        }
    }
}

// =============================================================================
// Cache Stats
// =============================================================================

/// Aggregate cache statistics for diagnostics screens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of live entries.
    pub entry_count: i64,

    /// When the engine last completed a successful sync.
    pub last_sync_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================
