//! # Key/Value Substrate
//!
//! The cache store does not talk to SQLite directly. It talks to a
//! [`KeyValueStore`] - string keys, string (JSON) values - so the substrate
//! can be swapped per platform: SQLite on the terminal, an in-memory map in
//! tests or on hosts without an embedded database.
//!
//! ## Implementations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       KeyValueStore                                     │
//! │                                                                         │
//! │  ┌──────────────────────────┐    ┌──────────────────────────────────┐  │
//! │  │   SqliteKeyValueStore    │    │      MemoryKeyValueStore         │  │
//! │  │                          │    │                                  │  │
//! │  │  kv_entries table on the │    │  RwLock<HashMap> - isolated per  │  │
//! │  │  shared connection pool  │    │  instance, nothing hidden in a   │  │
//! │  │  (durable, WAL mode)     │    │  module global                   │  │
//! │  └──────────────────────────┘    └──────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::error::StoreResult;

// =============================================================================
// Trait
// =============================================================================

/// Abstract key/value storage with string keys and JSON string values.
///
/// Implementations must be safe for concurrent use; last write wins on the
/// same key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Removes every key starting with `prefix`; returns how many.
    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64>;

    /// Counts keys starting with `prefix`.
    async fn count_prefix(&self, prefix: &str) -> StoreResult<i64>;
}

// =============================================================================
// SQLite Implementation
// =============================================================================

/// Durable [`KeyValueStore`] over the `kv_entries` table.
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        SqliteKeyValueStore { pool }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM kv_entries WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value) VALUES (?1, ?2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE key LIKE ?1 || '%'")
            .bind(prefix)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_prefix(&self, prefix: &str) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_entries WHERE key LIKE ?1 || '%'")
            .bind(prefix)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// In-Memory Implementation
// =============================================================================

/// Volatile [`KeyValueStore`] for tests and hosts without SQLite.
///
/// Each instance owns its own map, so concurrent test instances cannot
/// interfere with each other.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    async fn count_prefix(&self, prefix: &str) -> StoreResult<i64> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .count() as i64)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Store, StoreConfig};

    async fn check_roundtrip(kv: &dyn KeyValueStore) {
        assert!(kv.get("a").await.unwrap().is_none());

        kv.put("a", "1").await.unwrap();
        kv.put("a", "2").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some("2"));

        kv.put("entry:menu", "{}").await.unwrap();
        kv.put("entry:customers", "{}").await.unwrap();
        assert_eq!(kv.count_prefix("entry:").await.unwrap(), 2);

        assert_eq!(kv.delete_prefix("entry:").await.unwrap(), 2);
        assert_eq!(kv.count_prefix("entry:").await.unwrap(), 0);

        kv.delete("a").await.unwrap();
        kv.delete("a").await.unwrap(); // absent key is fine
        assert!(kv.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_roundtrip() {
        check_roundtrip(&MemoryKeyValueStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip() {
        let store = Store::new(StoreConfig::in_memory()).await.unwrap();
        check_roundtrip(&store.kv()).await;
    }
}
