//! # Derived Sync Status
//!
//! [`SyncStatus`] is recomputed on demand from the live queue counts and the
//! connectivity flag. It is never persisted on its own - there is exactly
//! one source of truth (the outbox and the connectivity observer) and this
//! type is a view over it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Snapshot of the engine's sync state for status bars and diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncStatus {
    /// Whether the host currently reports connectivity.
    pub is_online: bool,

    /// Whether a flush pass is in flight right now.
    pub is_syncing: bool,

    /// Queued mutations still awaiting confirmation (excludes dead letters).
    pub pending_count: i64,

    /// Dead-lettered mutations awaiting operator action.
    pub failed_count: i64,

    /// When the engine last completed a successful sync.
    #[ts(as = "Option<String>")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncStatus {
    /// True when there is nothing left to reconcile.
    pub fn is_drained(&self) -> bool {
        self.pending_count == 0 && self.failed_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_offline_and_drained() {
        let status = SyncStatus::default();
        assert!(!status.is_online);
        assert!(!status.is_syncing);
        assert!(status.is_drained());
    }

    #[test]
    fn test_serializes_with_snake_case_fields() {
        let json = serde_json::to_value(SyncStatus::default()).unwrap();
        assert!(json.get("pending_count").is_some());
        assert!(json.get("is_online").is_some());
    }
}
