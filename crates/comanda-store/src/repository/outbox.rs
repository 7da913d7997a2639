//! # Mutation Outbox Queue
//!
//! Durable FIFO queue of writes not yet confirmed by the remote system of
//! record.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LOCAL OPERATION (e.g., order accepted at the terminal)                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT INTO mutation_outbox (id, kind, payload, ...)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  The UI-visible state change already happened (optimistic commit);     │
//! │  the row is the write's durable record until the server confirms it.   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            FLUSH PASS (comanda-sync, serialized)                │   │
//! │  │                                                                 │   │
//! │  │  1. SELECT ... WHERE retry_count < max                         │   │
//! │  │     AND (next_attempt_at IS NULL OR next_attempt_at <= now)    │   │
//! │  │     ORDER BY seq  ← strict insertion order                     │   │
//! │  │                                                                 │   │
//! │  │  2. For each row:                                              │   │
//! │  │     a. Submit to the remote write endpoint                     │   │
//! │  │     b. On success: DELETE the row                              │   │
//! │  │     c. On failure: retry_count += 1, last_error = ?,           │   │
//! │  │                    next_attempt_at = now + backoff             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • A queued write is never lost (it's in the local DB)                 │
//! │  • Offline? No problem - rows queue up                                 │
//! │  • retry_count >= max ⇒ DEAD: excluded from flushes, kept             │
//! │    inspectable until an operator clears or requeues it                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use comanda_core::{MutationKind, MutationRecord};

use crate::error::{StoreError, StoreResult};

// =============================================================================
// Row Mapping
// =============================================================================

/// Raw row shape; converted into [`MutationRecord`] after decoding the kind
/// and payload.
#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: String,
    kind: String,
    payload: String,
    created_at: DateTime<Utc>,
    retry_count: i64,
    last_error: Option<String>,
    attempted_at: Option<DateTime<Utc>>,
    next_attempt_at: Option<DateTime<Utc>>,
}

impl TryFrom<OutboxRow> for MutationRecord {
    type Error = StoreError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let kind: MutationKind = row
            .kind
            .parse()
            .map_err(|e: comanda_core::CoreError| StoreError::corrupted(&row.id, e.to_string()))?;

        let payload = serde_json::from_str(&row.payload)
            .map_err(|e| StoreError::corrupted(&row.id, e.to_string()))?;

        Ok(MutationRecord {
            id: row.id,
            kind,
            payload,
            created_at: row.created_at,
            retry_count: row.retry_count,
            last_error: row.last_error,
            attempted_at: row.attempted_at,
            next_attempt_at: row.next_attempt_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, kind, payload, created_at, retry_count, \
                              last_error, attempted_at, next_attempt_at";

// =============================================================================
// Outbox Queue
// =============================================================================

/// Durable queue operations over the `mutation_outbox` table.
///
/// This type only does bookkeeping; flush scheduling, retries, and the
/// exclusive flush lock live in `comanda-sync`.
#[derive(Debug, Clone)]
pub struct OutboxQueue {
    pool: SqlitePool,
}

impl OutboxQueue {
    /// Creates a queue over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        OutboxQueue { pool }
    }

    /// Appends a record to the tail of the queue.
    pub async fn append(&self, record: &MutationRecord) -> StoreResult<()> {
        debug!(id = %record.id, kind = %record.kind, "Queuing mutation");

        let payload = serde_json::to_string(&record.payload)?;

        sqlx::query(
            r#"
            INSERT INTO mutation_outbox (
                id, kind, payload, created_at,
                retry_count, last_error, attempted_at, next_attempt_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.id)
        .bind(record.kind.as_str())
        .bind(payload)
        .bind(record.created_at)
        .bind(record.retry_count)
        .bind(&record.last_error)
        .bind(record.attempted_at)
        .bind(record.next_attempt_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Non-dead records whose backoff gate has passed at `now`, in strict
    /// insertion order.
    pub async fn due_pending(
        &self,
        max_retries: i64,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<MutationRecord>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM mutation_outbox
            WHERE retry_count < ?1
              AND (next_attempt_at IS NULL OR next_attempt_at <= ?2)
            ORDER BY seq ASC
            LIMIT ?3
            "#
        ))
        .bind(max_retries)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MutationRecord::try_from).collect()
    }

    /// All non-dead records in insertion order, ignoring backoff gates.
    /// Used by explicit user-initiated sync.
    pub async fn pending(&self, max_retries: i64) -> StoreResult<Vec<MutationRecord>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM mutation_outbox
            WHERE retry_count < ?1
            ORDER BY seq ASC
            "#
        ))
        .bind(max_retries)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MutationRecord::try_from).collect()
    }

    /// Dead-lettered records (retry budget exhausted), oldest first.
    pub async fn dead(&self, max_retries: i64) -> StoreResult<Vec<MutationRecord>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM mutation_outbox
            WHERE retry_count >= ?1
            ORDER BY seq ASC
            "#
        ))
        .bind(max_retries)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MutationRecord::try_from).collect()
    }

    /// Removes a record after a confirmed success (or an operator clear).
    /// Returns whether the record existed.
    pub async fn remove(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM mutation_outbox WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Records a failed attempt: bumps `retry_count`, stores the error, and
    /// sets the backoff gate for the next automatic attempt.
    pub async fn record_failure(
        &self,
        id: &str,
        error: &str,
        attempted_at: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE mutation_outbox SET
                retry_count = retry_count + 1,
                last_error = ?2,
                attempted_at = ?3,
                next_attempt_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(attempted_at)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Manual requeue: resets the retry state so the record is eligible for
    /// automatic flushing again. Returns whether the record existed.
    pub async fn requeue(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE mutation_outbox SET
                retry_count = 0,
                last_error = NULL,
                next_attempt_at = NULL
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Counts records still awaiting confirmation (excludes dead letters).
    pub async fn pending_count(&self, max_retries: i64) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM mutation_outbox WHERE retry_count < ?1")
                .bind(max_retries)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Counts dead-lettered records.
    pub async fn dead_count(&self, max_retries: i64) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM mutation_outbox WHERE retry_count >= ?1")
                .bind(max_retries)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Operator action: removes all dead-lettered records. Returns how many.
    pub async fn clear_dead(&self, max_retries: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM mutation_outbox WHERE retry_count >= ?1")
            .bind(max_retries)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Operator action: empties the entire queue. Returns how many rows.
    pub async fn clear_all(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM mutation_outbox")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Store, StoreConfig};
    use chrono::Duration;
    use comanda_core::DEFAULT_MAX_RETRIES;

    async fn queue() -> OutboxQueue {
        Store::new(StoreConfig::in_memory()).await.unwrap().outbox()
    }

    fn record(kind: MutationKind, marker: i64) -> MutationRecord {
        MutationRecord::new(kind, serde_json::json!({ "marker": marker }), Utc::now())
    }

    #[tokio::test]
    async fn test_append_preserves_insertion_order() {
        let queue = queue().await;
        let now = Utc::now();

        let first = record(MutationKind::CreateOrder, 1);
        let second = record(MutationKind::AdjustInventory, 2);
        let third = record(MutationKind::AssignTable, 3);

        for r in [&first, &second, &third] {
            queue.append(r).await.unwrap();
        }

        let pending = queue
            .due_pending(DEFAULT_MAX_RETRIES, now + Duration::seconds(1), 100)
            .await
            .unwrap();
        let ids: Vec<&str> = pending.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![&first.id, &second.id, &third.id]);
    }

    #[tokio::test]
    async fn test_record_failure_bumps_retry_and_gates() {
        let queue = queue().await;
        let now = Utc::now();
        let r = record(MutationKind::CreateOrder, 1);
        queue.append(&r).await.unwrap();

        queue
            .record_failure(&r.id, "HTTP 500", now, now + Duration::seconds(30))
            .await
            .unwrap();

        // Gated: not due yet.
        assert!(queue
            .due_pending(DEFAULT_MAX_RETRIES, now, 100)
            .await
            .unwrap()
            .is_empty());
        // Still pending overall.
        assert_eq!(queue.pending_count(DEFAULT_MAX_RETRIES).await.unwrap(), 1);

        // Due once the gate passes, with the failure recorded.
        let due = queue
            .due_pending(DEFAULT_MAX_RETRIES, now + Duration::seconds(31), 100)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].retry_count, 1);
        assert_eq!(due[0].last_error.as_deref(), Some("HTTP 500"));
        assert!(due[0].attempted_at.is_some());
    }

    #[tokio::test]
    async fn test_dead_records_leave_the_flush_path() {
        let queue = queue().await;
        let now = Utc::now();
        let r = record(MutationKind::UpsertCustomer, 1);
        queue.append(&r).await.unwrap();

        for _ in 0..DEFAULT_MAX_RETRIES {
            queue
                .record_failure(&r.id, "connection refused", now, now)
                .await
                .unwrap();
        }

        // Excluded from automatic flushing, but never deleted.
        assert!(queue
            .due_pending(DEFAULT_MAX_RETRIES, now + Duration::hours(1), 100)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(queue.pending_count(DEFAULT_MAX_RETRIES).await.unwrap(), 0);
        assert_eq!(queue.dead_count(DEFAULT_MAX_RETRIES).await.unwrap(), 1);

        let dead = queue.dead(DEFAULT_MAX_RETRIES).await.unwrap();
        assert_eq!(dead[0].id, r.id);
        assert_eq!(dead[0].retry_count, DEFAULT_MAX_RETRIES);
    }

    #[tokio::test]
    async fn test_requeue_resets_retry_state() {
        let queue = queue().await;
        let now = Utc::now();
        let r = record(MutationKind::VoidOrder, 1);
        queue.append(&r).await.unwrap();

        for _ in 0..DEFAULT_MAX_RETRIES {
            queue.record_failure(&r.id, "timeout", now, now).await.unwrap();
        }
        assert_eq!(queue.dead_count(DEFAULT_MAX_RETRIES).await.unwrap(), 1);

        assert!(queue.requeue(&r.id).await.unwrap());
        assert_eq!(queue.dead_count(DEFAULT_MAX_RETRIES).await.unwrap(), 0);

        let due = queue.due_pending(DEFAULT_MAX_RETRIES, now, 100).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].retry_count, 0);
        assert!(due[0].last_error.is_none());
        assert!(due[0].next_attempt_at.is_none());

        assert!(!queue.requeue("no-such-id").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let queue = queue().await;
        let now = Utc::now();
        let keep = record(MutationKind::CreateOrder, 1);
        let gone = record(MutationKind::CreateOrder, 2);
        let doomed = record(MutationKind::CreateOrder, 3);

        for r in [&keep, &gone, &doomed] {
            queue.append(r).await.unwrap();
        }

        assert!(queue.remove(&gone.id).await.unwrap());
        assert!(!queue.remove(&gone.id).await.unwrap());

        for _ in 0..DEFAULT_MAX_RETRIES {
            queue.record_failure(&doomed.id, "410", now, now).await.unwrap();
        }
        assert_eq!(queue.clear_dead(DEFAULT_MAX_RETRIES).await.unwrap(), 1);
        assert_eq!(queue.pending_count(DEFAULT_MAX_RETRIES).await.unwrap(), 1);

        assert_eq!(queue.clear_all().await.unwrap(), 1);
        assert_eq!(queue.pending_count(DEFAULT_MAX_RETRIES).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_payload_round_trips() {
        let queue = queue().await;
        let payload = serde_json::json!({
            "order_id": "o-42",
            "lines": [{"menu_item_id": "espresso", "quantity": 2}],
        });
        let r = MutationRecord::new(MutationKind::CreateOrder, payload.clone(), Utc::now());
        queue.append(&r).await.unwrap();

        let read = queue.pending(DEFAULT_MAX_RETRIES).await.unwrap();
        assert_eq!(read[0].payload, payload);
        assert_eq!(read[0].kind, MutationKind::CreateOrder);
    }
}
