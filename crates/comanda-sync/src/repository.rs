//! # Reference Repository (stale-while-revalidate)
//!
//! The read side of the engine. Cached data answers immediately; freshness
//! work happens behind the caller's back.
//!
//! ## Read Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Stale-While-Revalidate                              │
//! │                                                                         │
//! │  menu() / customers()                                                   │
//! │       │                                                                 │
//! │       ├── cache hit ──► return the cached copy IMMEDIATELY              │
//! │       │       │                                                         │
//! │       │       └── online + revalidation due?                            │
//! │       │             spawn background refresh (never blocks, never      │
//! │       │             fails the caller; a newer snapshot lands in the    │
//! │       │             cache and fires ReferenceUpdated - the value       │
//! │       │             already returned is not retroactively changed)     │
//! │       │                                                                 │
//! │       └── cache cold ──► synchronous network fetch                     │
//! │               │                                                         │
//! │               ├── success: persist + return                            │
//! │               └── failure: PROPAGATE (a cold miss must not silently    │
//! │                   return nothing; the UI offers retry)                 │
//! │                                                                         │
//! │  Staleness triggers:                                                   │
//! │  • menu      - server version probe (VersionNegotiator)                │
//! │  • customers - cached copy older than the TTL window (default 60 min); │
//! │    the copy is stored WITHOUT a hard expiry so it still serves offline │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use comanda_core::{Customer, MenuSnapshot, ReferenceCollection};
use comanda_store::CacheStore;

use crate::auth::{AuthHold, AuthProvider};
use crate::config::RevalidationSettings;
use crate::connectivity::ConnectivityObserver;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::negotiator::{RevalidationTracker, VersionNegotiator};
use crate::remote::RemoteApi;
use crate::{CUSTOMERS_CACHE_KEY, MENU_CACHE_KEY};

// =============================================================================
// Reference Repository
// =============================================================================

/// Read-through access to reference data.
#[derive(Clone)]
pub struct ReferenceRepository {
    cache: CacheStore,
    remote: Arc<dyn RemoteApi>,
    negotiator: VersionNegotiator,
    auth: Arc<dyn AuthProvider>,
    auth_hold: Arc<AuthHold>,
    connectivity: Arc<dyn ConnectivityObserver>,
    events: EventBus,
    tracker: Arc<RevalidationTracker>,
    settings: RevalidationSettings,
}

impl ReferenceRepository {
    /// Creates the repository over its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: CacheStore,
        remote: Arc<dyn RemoteApi>,
        negotiator: VersionNegotiator,
        auth: Arc<dyn AuthProvider>,
        auth_hold: Arc<AuthHold>,
        connectivity: Arc<dyn ConnectivityObserver>,
        events: EventBus,
        tracker: Arc<RevalidationTracker>,
        settings: RevalidationSettings,
    ) -> Self {
        ReferenceRepository {
            cache,
            remote,
            negotiator,
            auth,
            auth_hold,
            connectivity,
            events,
            tracker,
            settings,
        }
    }

    // =========================================================================
    // Menu (versioned collection)
    // =========================================================================

    /// The menu, from cache when possible.
    ///
    /// A cache hit returns immediately and may kick off a background
    /// version check. A cold cache awaits the network; that failure
    /// propagates so the UI can offer retry.
    pub async fn menu(&self) -> SyncResult<MenuSnapshot> {
        if let Some(snapshot) = self.cache.get::<MenuSnapshot>(MENU_CACHE_KEY).await {
            self.maybe_spawn_menu_revalidation();
            return Ok(snapshot);
        }

        debug!("Menu cache cold; fetching synchronously");
        let snapshot = self.guard_auth(self.remote.fetch_menu().await).await?;

        self.cache
            .set(MENU_CACHE_KEY, &snapshot, None, Some(snapshot.version))
            .await;
        self.tracker.stamp(ReferenceCollection::Menu);

        info!(version = snapshot.version, "Menu fetched on cold start");
        Ok(snapshot)
    }

    /// Spawns a background version check when online and not checked
    /// recently. Failures are logged, never surfaced: the cached copy
    /// keeps serving.
    fn maybe_spawn_menu_revalidation(&self) {
        if !self.connectivity.is_online() {
            return;
        }
        if !self.tracker.due(
            ReferenceCollection::Menu,
            Duration::from_secs(self.settings.min_revalidate_interval_secs),
        ) {
            return;
        }

        let negotiator = self.negotiator.clone();
        tokio::spawn(async move {
            if let Err(e) = negotiator.check_menu_updates().await {
                warn!(error = %e, "Background menu revalidation failed; serving cached data");
            }
        });
    }

    // =========================================================================
    // Customers (TTL-windowed collection)
    // =========================================================================

    /// The customer directory, from cache when possible.
    ///
    /// The cached copy has no hard expiry - stale customers still serve
    /// while offline. Once the copy is older than the TTL window, a
    /// background refresh is kicked off.
    pub async fn customers(&self) -> SyncResult<Vec<Customer>> {
        if let Some(customers) = self.cache.get::<Vec<Customer>>(CUSTOMERS_CACHE_KEY).await {
            let age = self
                .cache
                .age_minutes(CUSTOMERS_CACHE_KEY)
                .await
                .unwrap_or(0);
            if age >= self.settings.customer_ttl_minutes {
                self.maybe_spawn_customer_refresh();
            }
            return Ok(customers);
        }

        debug!("Customer cache cold; fetching synchronously");
        let customers = self.fetch_and_store_customers().await?;
        info!(count = customers.len(), "Customer directory fetched on cold start");
        Ok(customers)
    }

    /// Refreshes the customer directory when it is absent or older than
    /// the TTL window. Used by the coordinator's reference pull.
    pub async fn revalidate_customers(&self) -> SyncResult<bool> {
        match self.cache.age_minutes(CUSTOMERS_CACHE_KEY).await {
            Some(age) if age < self.settings.customer_ttl_minutes => {
                debug!(age, "Customer directory still fresh");
                Ok(false)
            }
            _ => self.refresh_customers().await,
        }
    }

    /// Unconditionally refetches and persists the directory, skipping
    /// silently when offline, not signed in, or under auth hold.
    pub async fn refresh_customers(&self) -> SyncResult<bool> {
        if !self.connectivity.is_online() {
            debug!("Offline; skipping customer refresh");
            return Ok(false);
        }
        let Some(token) = self.auth.bearer_token().await else {
            debug!("No auth token yet; skipping customer refresh");
            return Ok(false);
        };
        if !self.auth_hold.try_release(Some(&token)) {
            debug!("Auth hold active; skipping customer refresh");
            return Ok(false);
        }

        self.fetch_and_store_customers().await?;
        self.events
            .emit(SyncEvent::ReferenceUpdated(ReferenceCollection::Customers));
        Ok(true)
    }

    async fn fetch_and_store_customers(&self) -> SyncResult<Vec<Customer>> {
        let customers = self.guard_auth(self.remote.fetch_customers().await).await?;

        // No hard expiry: the TTL window triggers refresh, not eviction,
        // so the directory keeps serving while offline.
        self.cache
            .set(CUSTOMERS_CACHE_KEY, &customers, None, None)
            .await;
        self.tracker.stamp(ReferenceCollection::Customers);

        Ok(customers)
    }

    fn maybe_spawn_customer_refresh(&self) {
        if !self.connectivity.is_online() {
            return;
        }
        if !self.tracker.due(
            ReferenceCollection::Customers,
            Duration::from_secs(self.settings.min_revalidate_interval_secs),
        ) {
            return;
        }

        let repository = self.clone();
        tokio::spawn(async move {
            if let Err(e) = repository.refresh_customers().await {
                warn!(error = %e, "Background customer refresh failed; serving cached data");
            }
        });
    }

    /// Engages the auth hold when a remote call answered 401.
    async fn guard_auth<T>(&self, result: SyncResult<T>) -> SyncResult<T> {
        if let Err(SyncError::Auth) = &result {
            self.auth_hold.engage(self.auth.bearer_token().await);
            self.events.emit(SyncEvent::AuthPaused);
        }
        result
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
