//! # Pending-Write Types
//!
//! A write accepted at the terminal becomes a [`MutationRecord`] the moment
//! it is committed locally (optimistic commit). The record then lives in the
//! durable outbox until the remote system of record confirms it.
//!
//! ## Record Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Mutation Record State Machine                        │
//! │                                                                         │
//! │   enqueue()                                                             │
//! │      │                                                                  │
//! │      ▼                 remote 2xx                                       │
//! │  ┌─────────┐  ─────────────────────────►  REMOVED (confirmed)          │
//! │  │ PENDING │                                                           │
//! │  └─────────┘  ── failure, retries left ──► PENDING (retry_count + 1)   │
//! │      │                                                                  │
//! │      │  retry_count ≥ MAX_RETRIES                                       │
//! │      ▼                                                                  │
//! │  ┌─────────┐   manual requeue (reset)                                  │
//! │  │  DEAD   │  ─────────────────────────►  PENDING (retry_count = 0)    │
//! │  └─────────┘   manual clear             ►  REMOVED                     │
//! │                                                                         │
//! │  DEAD records are excluded from automatic flushes but are NEVER        │
//! │  deleted automatically - offline work stays inspectable.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::CoreError;

// =============================================================================
// Mutation Kind
// =============================================================================

/// The kinds of writes a terminal can queue while offline.
///
/// Each kind maps to one remote write endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// A new order ticket.
    CreateOrder,
    /// Changes to an open order (lines added, course fired).
    UpdateOrder,
    /// An order cancelled before settlement.
    VoidOrder,
    /// A stock-count delta for an item.
    AdjustInventory,
    /// A customer directory create-or-update.
    UpsertCustomer,
    /// Seating or clearing a table.
    AssignTable,
}

impl MutationKind {
    /// Stable wire/storage name for this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MutationKind::CreateOrder => "create_order",
            MutationKind::UpdateOrder => "update_order",
            MutationKind::VoidOrder => "void_order",
            MutationKind::AdjustInventory => "adjust_inventory",
            MutationKind::UpsertCustomer => "upsert_customer",
            MutationKind::AssignTable => "assign_table",
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MutationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_order" => Ok(MutationKind::CreateOrder),
            "update_order" => Ok(MutationKind::UpdateOrder),
            "void_order" => Ok(MutationKind::VoidOrder),
            "adjust_inventory" => Ok(MutationKind::AdjustInventory),
            "upsert_customer" => Ok(MutationKind::UpsertCustomer),
            "assign_table" => Ok(MutationKind::AssignTable),
            other => Err(CoreError::UnknownMutationKind(other.to_string())),
        }
    }
}

// =============================================================================
// Mutation Record
// =============================================================================

/// A pending write in the durable outbox.
///
/// Owned by the outbox for its entire lifetime; everything else sees copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MutationRecord {
    /// Client-generated unique id (UUID v4). Doubles as the server-side
    /// idempotency key, so a retry after a lost response cannot double-apply.
    pub id: String,

    /// Which write endpoint this record targets.
    pub kind: MutationKind,

    /// The full write body as JSON.
    #[ts(type = "unknown")]
    pub payload: serde_json::Value,

    /// When the write was accepted locally.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// Number of failed submission attempts. Only ever increases, except on
    /// an explicit manual requeue.
    pub retry_count: i64,

    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,

    /// When submission was last attempted.
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,

    /// Earliest instant the next automatic attempt may run (backoff gate).
    /// `None` means eligible immediately.
    #[ts(as = "Option<String>")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl MutationRecord {
    /// Creates a fresh record for a write accepted at `now`.
    pub fn new(kind: MutationKind, payload: serde_json::Value, now: DateTime<Utc>) -> Self {
        MutationRecord {
            id: Uuid::new_v4().to_string(),
            kind,
            payload,
            created_at: now,
            retry_count: 0,
            last_error: None,
            attempted_at: None,
            next_attempt_at: None,
        }
    }

    /// True once the record has exhausted its retry budget (dead-lettered).
    pub fn is_dead(&self, max_retries: i64) -> bool {
        self.retry_count >= max_retries
    }

    /// True when the backoff gate allows an automatic attempt at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.next_attempt_at {
            Some(at) => now >= at,
            None => true,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [
            MutationKind::CreateOrder,
            MutationKind::UpdateOrder,
            MutationKind::VoidOrder,
            MutationKind::AdjustInventory,
            MutationKind::UpsertCustomer,
            MutationKind::AssignTable,
        ] {
            let parsed: MutationKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }

        assert!("fold_napkins".parse::<MutationKind>().is_err());
    }

    #[test]
    fn test_new_record_is_pending_and_due() {
        let now = Utc::now();
        let record = MutationRecord::new(
            MutationKind::CreateOrder,
            serde_json::json!({"order_id": "o-1"}),
            now,
        );

        assert_eq!(record.retry_count, 0);
        assert!(record.last_error.is_none());
        assert!(!record.is_dead(crate::DEFAULT_MAX_RETRIES));
        assert!(record.is_due(now));
    }

    #[test]
    fn test_dead_at_retry_budget() {
        let now = Utc::now();
        let mut record =
            MutationRecord::new(MutationKind::AdjustInventory, serde_json::json!({}), now);
        record.retry_count = 5;

        assert!(record.is_dead(5));
        assert!(!record.is_dead(6));
    }

    #[test]
    fn test_backoff_gate() {
        let now = Utc::now();
        let mut record = MutationRecord::new(MutationKind::AssignTable, serde_json::json!({}), now);
        record.next_attempt_at = Some(now + Duration::seconds(30));

        assert!(!record.is_due(now));
        assert!(record.is_due(now + Duration::seconds(30)));
    }
}
