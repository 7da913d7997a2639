//! # Version Negotiator
//!
//! Decides whether a versioned reference collection needs a refetch by
//! asking the server the cheap question first.
//!
//! ## Negotiation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Version Negotiation                                 │
//! │                                                                         │
//! │  check_menu_updates()                                                  │
//! │       │                                                                 │
//! │       ├── offline / no token / auth hold ──► Ok(false), zero I/O       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  GET /v1/menu/version?current_version=N   (lightweight probe)          │
//! │       │                                                                 │
//! │       ├── has_changes: false ──► Ok(false), no further I/O             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  GET /v1/menu   (full snapshot - replace, never merge)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  cache.set(version = snapshot.version)                                 │
//! │       │                                                                 │
//! │       ├── older than stored (late out-of-order response) ──► discarded │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  emit ReferenceUpdated(Menu)  ← only after the snapshot is persisted   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use comanda_core::ReferenceCollection;
use comanda_store::CacheStore;

use crate::auth::{AuthHold, AuthProvider};
use crate::connectivity::ConnectivityObserver;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::remote::RemoteApi;
use crate::MENU_CACHE_KEY;

// =============================================================================
// Revalidation Tracker
// =============================================================================

/// In-memory stamps of when each collection was last revalidated.
///
/// Back-to-back reads of a cached collection must not each fire a network
/// probe; a read only spawns revalidation when the stamp is older than the
/// configured minimum interval. Stamps are process-local on purpose - after
/// a restart, one probe per collection is the right behavior.
#[derive(Debug, Default)]
pub struct RevalidationTracker {
    stamps: Mutex<HashMap<ReferenceCollection, Instant>>,
}

impl RevalidationTracker {
    /// Creates a tracker with no stamps (everything due).
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `collection` is due for revalidation.
    pub fn due(&self, collection: ReferenceCollection, min_interval: Duration) -> bool {
        let stamps = self.stamps.lock().expect("tracker lock poisoned");
        match stamps.get(&collection) {
            Some(at) => at.elapsed() >= min_interval,
            None => true,
        }
    }

    /// Records that `collection` was just revalidated (or freshly fetched).
    pub fn stamp(&self, collection: ReferenceCollection) {
        self.stamps
            .lock()
            .expect("tracker lock poisoned")
            .insert(collection, Instant::now());
    }
}

// =============================================================================
// Version Negotiator
// =============================================================================

/// Keeps versioned reference data fresh with minimal traffic.
#[derive(Clone)]
pub struct VersionNegotiator {
    cache: CacheStore,
    remote: Arc<dyn RemoteApi>,
    auth: Arc<dyn AuthProvider>,
    auth_hold: Arc<AuthHold>,
    connectivity: Arc<dyn ConnectivityObserver>,
    events: EventBus,
    tracker: Arc<RevalidationTracker>,
}

impl VersionNegotiator {
    /// Creates the negotiator over its collaborators.
    pub fn new(
        cache: CacheStore,
        remote: Arc<dyn RemoteApi>,
        auth: Arc<dyn AuthProvider>,
        auth_hold: Arc<AuthHold>,
        connectivity: Arc<dyn ConnectivityObserver>,
        events: EventBus,
        tracker: Arc<RevalidationTracker>,
    ) -> Self {
        VersionNegotiator {
            cache,
            remote,
            auth,
            auth_hold,
            connectivity,
            events,
            tracker,
        }
    }

    /// Checks the menu against the server, refetching when stale.
    ///
    /// Returns whether a newer snapshot was persisted. A silent `Ok(false)`
    /// covers: offline, not signed in, auth hold, server reports no
    /// changes, or the response carried an older version than the cache.
    pub async fn check_menu_updates(&self) -> SyncResult<bool> {
        let local_version = self.cache.version_of(MENU_CACHE_KEY).await;
        self.check_menu_updates_since(local_version).await
    }

    /// Same as [`check_menu_updates`](Self::check_menu_updates) with an
    /// explicit local version.
    pub async fn check_menu_updates_since(&self, local_version: i64) -> SyncResult<bool> {
        if !self.connectivity.is_online() {
            debug!("Offline; skipping menu version check");
            return Ok(false);
        }

        let Some(token) = self.auth.bearer_token().await else {
            debug!("No auth token yet; skipping menu version check");
            return Ok(false);
        };
        if !self.auth_hold.try_release(Some(&token)) {
            debug!("Auth hold active; skipping menu version check");
            return Ok(false);
        }

        let has_changes = self
            .guard_auth(self.remote.menu_has_changes(local_version).await, &token)?;

        // The probe itself counts as a revalidation, whatever it answered.
        self.tracker.stamp(ReferenceCollection::Menu);

        if !has_changes {
            debug!(local_version, "Menu unchanged on server");
            return Ok(false);
        }

        info!(local_version, "Menu changed on server; refetching snapshot");
        let snapshot = self.guard_auth(self.remote.fetch_menu().await, &token)?;

        // Replace wholesale, subject to version monotonicity: a late
        // out-of-order response must not clobber newer data.
        let applied = self
            .cache
            .set(MENU_CACHE_KEY, &snapshot, None, Some(snapshot.version))
            .await;

        if !applied {
            debug!(
                fetched_version = snapshot.version,
                "Fetched menu is not newer than cache; discarded"
            );
            return Ok(false);
        }

        info!(version = snapshot.version, "Menu snapshot persisted");
        self.events
            .emit(SyncEvent::ReferenceUpdated(ReferenceCollection::Menu));
        Ok(true)
    }

    /// Engages the auth hold when a remote call answered 401.
    fn guard_auth<T>(&self, result: SyncResult<T>, token: &str) -> SyncResult<T> {
        if let Err(SyncError::Auth) = &result {
            self.auth_hold.engage(Some(token.to_string()));
            self.events.emit(SyncEvent::AuthPaused);
        }
        result
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, test_menu};
    use comanda_core::MenuSnapshot;

    #[test]
    fn test_tracker_due_and_stamp() {
        let tracker = RevalidationTracker::new();
        let interval = Duration::from_secs(60);

        assert!(tracker.due(ReferenceCollection::Menu, interval));

        tracker.stamp(ReferenceCollection::Menu);
        assert!(!tracker.due(ReferenceCollection::Menu, interval));
        // A zero interval means "always due" even right after a stamp.
        assert!(tracker.due(ReferenceCollection::Menu, Duration::ZERO));
        // Other collections are unaffected.
        assert!(tracker.due(ReferenceCollection::Customers, interval));
    }

    #[tokio::test]
    async fn test_offline_is_a_silent_no() {
        let fx = fixture(false).await;
        let negotiator = fx.negotiator();

        assert!(!negotiator.check_menu_updates().await.unwrap());
        assert!(fx.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_token_is_a_silent_no() {
        let fx = fixture(true).await;
        fx.auth.clear_token().await;
        let negotiator = fx.negotiator();

        assert!(!negotiator.check_menu_updates().await.unwrap());
        assert!(fx.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_menu_skips_the_refetch() {
        // Scenario: cache holds version 3, server reports no changes.
        let fx = fixture(true).await;
        fx.cache
            .set(MENU_CACHE_KEY, &test_menu(3), None, Some(3))
            .await;

        let negotiator = fx.negotiator();
        fx.remote.push_version(Ok(false));

        assert!(!negotiator.check_menu_updates().await.unwrap());

        // Exactly one probe, no snapshot fetch, cache untouched.
        assert_eq!(fx.remote.calls(), vec!["menu_version:3"]);
        assert_eq!(fx.cache.version_of(MENU_CACHE_KEY).await, 3);
    }

    #[tokio::test]
    async fn test_changed_menu_is_refetched_and_persisted() {
        let fx = fixture(true).await;
        fx.cache
            .set(MENU_CACHE_KEY, &test_menu(3), None, Some(3))
            .await;

        let negotiator = fx.negotiator();
        let mut events = fx.events.subscribe();
        fx.remote.push_version(Ok(true));
        fx.remote.set_menu(test_menu(4));

        assert!(negotiator.check_menu_updates().await.unwrap());

        assert_eq!(fx.remote.calls(), vec!["menu_version:3", "fetch_menu"]);
        assert_eq!(fx.cache.version_of(MENU_CACHE_KEY).await, 4);

        match events.recv().await.unwrap() {
            SyncEvent::ReferenceUpdated(ReferenceCollection::Menu) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_out_of_order_response_is_discarded() {
        // Cache holds version 3; a late response delivers version 2.
        let fx = fixture(true).await;
        let newer = test_menu(3);
        fx.cache.set(MENU_CACHE_KEY, &newer, None, Some(3)).await;

        let negotiator = fx.negotiator();
        fx.remote.push_version(Ok(true));
        fx.remote.set_menu(test_menu(2));

        assert!(!negotiator.check_menu_updates().await.unwrap());

        // Version 3 survives untouched, and no update event fired.
        assert_eq!(fx.cache.version_of(MENU_CACHE_KEY).await, 3);
        let cached: MenuSnapshot = fx.cache.get(MENU_CACHE_KEY).await.unwrap();
        assert_eq!(cached, newer);
    }

    #[tokio::test]
    async fn test_401_engages_the_hold() {
        let fx = fixture(true).await;
        let negotiator = fx.negotiator();
        fx.remote.push_version(Err(SyncError::Auth));

        assert!(matches!(
            negotiator.check_menu_updates().await,
            Err(SyncError::Auth)
        ));
        assert!(fx.auth_hold.is_held());

        // Subsequent checks skip silently while held.
        assert!(!negotiator.check_menu_updates().await.unwrap());
        assert_eq!(fx.remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_probe_stamps_the_tracker() {
        let fx = fixture(true).await;
        let negotiator = fx.negotiator();
        fx.remote.push_version(Ok(false));

        assert!(fx
            .tracker
            .due(ReferenceCollection::Menu, Duration::from_secs(60)));
        negotiator.check_menu_updates().await.unwrap();
        assert!(!fx
            .tracker
            .due(ReferenceCollection::Menu, Duration::from_secs(60)));
    }
}
