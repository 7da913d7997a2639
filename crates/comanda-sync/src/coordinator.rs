//! # Sync Coordinator
//!
//! Main orchestrator for the sync engine. Watches connectivity, sequences
//! flush-then-pull on reconnect, runs the periodic catch-up trigger, and
//! answers status queries.
//!
//! ## Coordinator Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     SyncCoordinator Run Loop                            │
//! │                                                                         │
//! │  tokio::select! over:                                                  │
//! │                                                                         │
//! │  ┌──────────────────┐   offline→online:                                │
//! │  │ connectivity     │   1. FLUSH the outbox    ← pending local writes  │
//! │  │ watch channel    │   2. PULL reference data ← only then refresh,    │
//! │  └──────────────────┘      so a fresh snapshot cannot land before      │
//! │                            still-queued writes reach the server        │
//! │                                                                         │
//! │  ┌──────────────────┐   every poll_interval while online: flush.       │
//! │  │ periodic tick    │   Catches records whose backoff gate reopened    │
//! │  └──────────────────┘   and triggers skipped under the flush lock      │
//! │                                                                         │
//! │  ┌──────────────────┐   FlushCompleted with confirmations ⇒ stamp      │
//! │  │ own event bus    │   last_sync_at (covers flushes triggered from    │
//! │  └──────────────────┘   enqueue, requeue, and force sync too)          │
//! │                                                                         │
//! │  ┌──────────────────┐                                                  │
//! │  │ shutdown channel │   break; in-flight work is abandoned, and a      │
//! │  └──────────────────┘   late response is tolerated by the stores       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use comanda_core::SyncStatus;
use comanda_store::{CacheStore, OutboxQueue, Store};

use crate::auth::{AuthHold, AuthProvider};
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityObserver;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::negotiator::{RevalidationTracker, VersionNegotiator};
use crate::outbox::{FlushReport, MutationOutbox};
use crate::remote::{HttpRemoteApi, RemoteApi};
use crate::repository::ReferenceRepository;

// =============================================================================
// Sync Coordinator
// =============================================================================

/// Orchestrates flushing and revalidation around connectivity transitions.
pub struct SyncCoordinator {
    outbox: MutationOutbox,
    negotiator: VersionNegotiator,
    repository: ReferenceRepository,
    cache: CacheStore,
    connectivity: Arc<dyn ConnectivityObserver>,
    events: EventBus,
    poll_interval: Duration,

    /// Shutdown sender (set while the run loop is alive).
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl SyncCoordinator {
    /// Creates a coordinator over its collaborators.
    pub fn new(
        outbox: MutationOutbox,
        negotiator: VersionNegotiator,
        repository: ReferenceRepository,
        cache: CacheStore,
        connectivity: Arc<dyn ConnectivityObserver>,
        events: EventBus,
        poll_interval: Duration,
    ) -> Self {
        SyncCoordinator {
            outbox,
            negotiator,
            repository,
            cache,
            connectivity,
            events,
            poll_interval,
            shutdown_tx: None,
        }
    }

    /// The current status, computed from live state on every call.
    pub async fn status(&self) -> SyncStatus {
        let pending_count = self.outbox.pending_count().await.unwrap_or_else(|e| {
            warn!(error = %e, "Pending count unavailable");
            0
        });
        let failed_count = self.outbox.failed_count().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed count unavailable");
            0
        });

        SyncStatus {
            is_online: self.connectivity.is_online(),
            is_syncing: self.outbox.is_syncing(),
            pending_count,
            failed_count,
            last_sync_at: self.cache.stats().await.last_sync_at,
        }
    }

    /// Subscribes to engine notifications. Read
    /// [`status`](Self::status) when one arrives for the aggregate picture.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Whether the run loop is active.
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// User-initiated sync: flush (including backoff-gated records), then
    /// pull reference data.
    pub async fn force_sync(&self) -> SyncResult<FlushReport> {
        info!("Force sync requested");
        let report = self.outbox.force_flush().await?;

        if report.succeeded > 0 {
            self.cache.record_sync(Utc::now()).await;
        }

        if !report.auth_paused {
            Self::pull_reference_data(&self.negotiator, &self.repository).await;
        }

        Ok(report)
    }

    /// Starts the background run loop.
    pub async fn start(&mut self) -> SyncResult<()> {
        if self.shutdown_tx.is_some() {
            return Err(SyncError::InvalidConfig(
                "Sync coordinator already started".into(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        info!(
            online = self.connectivity.is_online(),
            poll_interval_secs = self.poll_interval.as_secs(),
            "Starting sync coordinator"
        );

        tokio::spawn(Self::run_loop(
            self.outbox.clone(),
            self.negotiator.clone(),
            self.repository.clone(),
            self.cache.clone(),
            self.connectivity.clone(),
            self.events.clone(),
            self.events.subscribe(),
            self.poll_interval,
            shutdown_rx,
        ));

        Ok(())
    }

    /// Stops the run loop. Outstanding requests are simply abandoned; a
    /// late-arriving response still lands in the stores safely.
    pub async fn shutdown(&mut self) {
        info!("Shutting down sync coordinator");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }

    /// Pulls reference data after a flush. Failures are logged and
    /// swallowed: a failed background pull never blocks the terminal.
    async fn pull_reference_data(
        negotiator: &VersionNegotiator,
        repository: &ReferenceRepository,
    ) {
        if let Err(e) = negotiator.check_menu_updates().await {
            warn!(error = %e, "Menu pull failed");
        }
        if let Err(e) = repository.revalidate_customers().await {
            warn!(error = %e, "Customer pull failed");
        }
    }

    /// Main run loop.
    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        outbox: MutationOutbox,
        negotiator: VersionNegotiator,
        repository: ReferenceRepository,
        cache: CacheStore,
        connectivity: Arc<dyn ConnectivityObserver>,
        events: EventBus,
        mut events_rx: broadcast::Receiver<SyncEvent>,
        poll_interval: Duration,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut online_rx = connectivity.watch();
        let mut was_online = connectivity.is_online();

        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        // The observer dropped its sender; the host is
                        // tearing down around us.
                        warn!("Connectivity signal closed; stopping coordinator");
                        break;
                    }

                    let online = *online_rx.borrow_and_update();
                    if online == was_online {
                        continue;
                    }
                    was_online = online;
                    events.emit(SyncEvent::ConnectivityChanged { online });

                    if online {
                        info!("Back online; flushing outbox before pulling reference data");

                        // Flush FIRST: a snapshot pulled before the queued
                        // writes reach the server would overwrite UI state
                        // with data that doesn't reflect them yet.
                        match outbox.flush().await {
                            Ok(report) => debug!(?report, "Reconnect flush finished"),
                            Err(e) => error!(error = %e, "Reconnect flush failed"),
                        }

                        Self::pull_reference_data(&negotiator, &repository).await;
                    } else {
                        info!("Connectivity lost; queuing writes locally");
                    }
                }

                _ = interval.tick() => {
                    if connectivity.is_online() {
                        // Catch-up trigger: records whose backoff reopened,
                        // flushes skipped under the lock, and auth-hold
                        // release once a fresh token appears.
                        if let Err(e) = outbox.flush().await {
                            error!(error = %e, "Periodic flush failed");
                        }
                    }
                }

                event = events_rx.recv() => {
                    match event {
                        Ok(SyncEvent::FlushCompleted(report)) if report.succeeded > 0 => {
                            cache.record_sync(Utc::now()).await;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Coordinator lagged on its own event bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            // Cannot happen: `events` holds a sender.
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Sync coordinator received shutdown");
                    break;
                }
            }
        }

        info!("Sync coordinator stopped");
    }
}

// =============================================================================
// Engine Assembly
// =============================================================================

/// The assembled engine: read side, write side, and coordinator.
pub struct SyncEngine {
    repository: ReferenceRepository,
    outbox: MutationOutbox,
    coordinator: SyncCoordinator,
}

impl SyncEngine {
    /// The read side (menu, customers).
    pub fn repository(&self) -> &ReferenceRepository {
        &self.repository
    }

    /// The write side (enqueue, dead letters, operator actions).
    pub fn outbox(&self) -> &MutationOutbox {
        &self.outbox
    }

    /// The coordinator (status, subscribe, force sync).
    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Starts the coordinator's run loop.
    pub async fn start(&mut self) -> SyncResult<()> {
        self.coordinator.start().await
    }

    /// Stops the coordinator's run loop.
    pub async fn shutdown(&mut self) {
        self.coordinator.shutdown().await
    }

    /// Current sync status.
    pub async fn status(&self) -> SyncStatus {
        self.coordinator.status().await
    }

    /// Subscribes to engine notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.coordinator.subscribe()
    }
}

/// Builder wiring the engine's collaborators together.
///
/// ## Usage
/// ```rust,ignore
/// let store = Store::new(StoreConfig::new(data_dir.join("comanda.db"))).await?;
/// let connectivity = Arc::new(SharedConnectivity::new(false));
/// let auth = Arc::new(StaticTokenProvider::new());
///
/// let mut engine = SyncEngineBuilder::new(SyncConfig::load_or_default(None)?)
///     .with_store(&store)
///     .with_connectivity(connectivity.clone())
///     .with_auth(auth.clone())
///     .build()?;
/// engine.start().await?;
/// ```
pub struct SyncEngineBuilder {
    config: SyncConfig,
    cache: Option<CacheStore>,
    queue: Option<OutboxQueue>,
    remote: Option<Arc<dyn RemoteApi>>,
    auth: Option<Arc<dyn AuthProvider>>,
    connectivity: Option<Arc<dyn ConnectivityObserver>>,
}

impl SyncEngineBuilder {
    /// Creates a builder with the given config.
    pub fn new(config: SyncConfig) -> Self {
        SyncEngineBuilder {
            config,
            cache: None,
            queue: None,
            remote: None,
            auth: None,
            connectivity: None,
        }
    }

    /// Uses the storage handle for both the cache and the outbox queue.
    pub fn with_store(mut self, store: &Store) -> Self {
        self.cache = Some(store.cache());
        self.queue = Some(store.outbox());
        self
    }

    /// Overrides the cache store (e.g. an in-memory substrate).
    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Overrides the outbox queue.
    pub fn with_queue(mut self, queue: OutboxQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Overrides the remote API (defaults to [`HttpRemoteApi`] built from
    /// the config).
    pub fn with_remote(mut self, remote: Arc<dyn RemoteApi>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Sets the auth provider.
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets the connectivity observer.
    pub fn with_connectivity(mut self, connectivity: Arc<dyn ConnectivityObserver>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Builds the engine.
    pub fn build(self) -> SyncResult<SyncEngine> {
        self.config.validate()?;

        let cache = self
            .cache
            .ok_or_else(|| SyncError::InvalidConfig("Storage required (with_store)".into()))?;
        let queue = self
            .queue
            .ok_or_else(|| SyncError::InvalidConfig("Outbox queue required (with_store)".into()))?;
        let auth = self
            .auth
            .ok_or_else(|| SyncError::InvalidConfig("Auth provider required".into()))?;
        let connectivity = self.connectivity.ok_or_else(|| {
            SyncError::InvalidConfig("Connectivity observer required".into())
        })?;

        let remote: Arc<dyn RemoteApi> = match self.remote {
            Some(remote) => remote,
            None => Arc::new(HttpRemoteApi::new(&self.config.remote, auth.clone())?),
        };

        let events = EventBus::new();
        let auth_hold = Arc::new(AuthHold::new());
        let tracker = Arc::new(RevalidationTracker::new());

        let negotiator = VersionNegotiator::new(
            cache.clone(),
            remote.clone(),
            auth.clone(),
            auth_hold.clone(),
            connectivity.clone(),
            events.clone(),
            tracker.clone(),
        );

        let repository = ReferenceRepository::new(
            cache.clone(),
            remote.clone(),
            negotiator.clone(),
            auth.clone(),
            auth_hold.clone(),
            connectivity.clone(),
            events.clone(),
            tracker,
            self.config.revalidation.clone(),
        );

        let outbox = MutationOutbox::new(
            queue,
            remote,
            auth,
            auth_hold,
            connectivity.clone(),
            events.clone(),
            self.config.flush.clone(),
        );

        let coordinator = SyncCoordinator::new(
            outbox.clone(),
            negotiator.clone(),
            repository.clone(),
            cache,
            connectivity,
            events,
            Duration::from_secs(self.config.flush.poll_interval_secs),
        );

        Ok(SyncEngine {
            repository,
            outbox,
            coordinator,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, test_menu, wait_until};
    use crate::MENU_CACHE_KEY;
    use comanda_core::MutationKind;

    #[tokio::test]
    async fn test_offline_enqueue_then_reconnect_drains_the_queue() {
        // Scenario: write while offline, flip online, automatic flush.
        let fx = fixture(false).await;
        let mut engine = fx.engine();
        engine.start().await.unwrap();

        engine
            .outbox()
            .enqueue(MutationKind::CreateOrder, serde_json::json!({"order_id": "o-1"}))
            .await
            .unwrap();

        let status = engine.status().await;
        assert!(!status.is_online);
        assert_eq!(status.pending_count, 1);
        assert!(fx.remote.calls().is_empty());

        fx.connectivity.set_online(true);

        wait_until(|| async { engine.status().await.pending_count == 0 }).await;
        assert_eq!(
            fx.remote.calls_with("submit:create_order:").len(),
            1
        );

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_reconnect_flushes_before_pulling() {
        let fx = fixture(false).await;
        // Cached menu so the pull issues a version probe.
        fx.cache
            .set(MENU_CACHE_KEY, &test_menu(3), None, Some(3))
            .await;

        let mut engine = fx.engine();
        engine.start().await.unwrap();

        engine
            .outbox()
            .enqueue(MutationKind::CreateOrder, serde_json::json!({"order_id": "o-1"}))
            .await
            .unwrap();

        fx.connectivity.set_online(true);

        wait_until(|| async { fx.remote.calls().len() >= 3 }).await;
        let calls = fx.remote.calls();

        // Pending local writes reach the server BEFORE any snapshot pull.
        assert!(calls[0].starts_with("submit:"), "calls: {calls:?}");
        assert_eq!(calls[1], "menu_version:3");
        assert_eq!(calls[2], "fetch_customers");

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_reflects_connectivity_and_sync_progress() {
        let fx = fixture(false).await;
        let mut engine = fx.engine();
        engine.start().await.unwrap();
        let mut events = engine.subscribe();

        assert!(engine.status().await.last_sync_at.is_none());

        engine
            .outbox()
            .enqueue(MutationKind::AssignTable, serde_json::json!({"table_id": "t-1"}))
            .await
            .unwrap();

        fx.connectivity.set_online(true);

        // The flip is observable...
        loop {
            match events.recv().await.unwrap() {
                SyncEvent::ConnectivityChanged { online } => {
                    assert!(online);
                    break;
                }
                _ => continue,
            }
        }

        // ...and once the flush confirms the write, status shows a drained
        // queue and a sync stamp.
        wait_until(|| async {
            let status = engine.status().await;
            status.pending_count == 0 && status.last_sync_at.is_some()
        })
        .await;
        let status = engine.status().await;
        assert!(status.is_online);
        assert!(status.is_drained());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_force_sync_flushes_and_pulls() {
        let fx = fixture(true).await;
        fx.cache
            .set(MENU_CACHE_KEY, &test_menu(3), None, Some(3))
            .await;
        let engine = fx.engine();

        // Not started: force_sync works without the run loop too.
        let report = engine.coordinator().force_sync().await.unwrap();
        assert_eq!(report.attempted, 0);

        // The pull still ran.
        assert_eq!(fx.remote.calls(), vec!["menu_version:3", "fetch_customers"]);
    }

    #[tokio::test]
    async fn test_builder_requires_collaborators() {
        let result = SyncEngineBuilder::new(SyncConfig::default()).build();
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_start_twice_is_an_error() {
        let fx = fixture(true).await;
        let mut engine = fx.engine();

        engine.start().await.unwrap();
        assert!(engine.coordinator().is_running());
        assert!(engine.start().await.is_err());

        engine.shutdown().await;
    }
}
