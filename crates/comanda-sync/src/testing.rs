//! Test fixtures shared by the engine's unit tests: a scriptable remote
//! endpoint and a fully wired set of collaborators over an in-memory
//! database. Every fixture is isolated; nothing is shared between tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use comanda_core::{Customer, MenuCategory, MenuItem, MenuSnapshot, MutationRecord};
use comanda_store::{CacheStore, OutboxQueue, Store, StoreConfig};

use crate::auth::{AuthHold, StaticTokenProvider};
use crate::config::{FlushSettings, RevalidationSettings, SyncConfig};
use crate::connectivity::SharedConnectivity;
use crate::coordinator::{SyncEngine, SyncEngineBuilder};
use crate::error::SyncResult;
use crate::events::EventBus;
use crate::negotiator::{RevalidationTracker, VersionNegotiator};
use crate::outbox::MutationOutbox;
use crate::remote::RemoteApi;
use crate::repository::ReferenceRepository;

// =============================================================================
// Mock Remote
// =============================================================================

/// Scriptable [`RemoteApi`] that records every call in order.
///
/// Unscripted calls default to: submit succeeds, version probe reports no
/// changes, fetches fail with a network error (nothing to serve).
#[derive(Default)]
pub(crate) struct MockRemoteApi {
    calls: Mutex<Vec<String>>,
    submit_results: Mutex<VecDeque<SyncResult<()>>>,
    version_results: Mutex<VecDeque<SyncResult<bool>>>,
    menu: Mutex<Option<MenuSnapshot>>,
    customers: Mutex<Option<Vec<Customer>>>,
    submit_delay: Mutex<Duration>,
}

impl MockRemoteApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Scripts the outcome of the next unscripted submit.
    pub fn push_submit(&self, result: SyncResult<()>) {
        self.submit_results.lock().unwrap().push_back(result);
    }

    /// Scripts the outcome of the next version probe.
    pub fn push_version(&self, result: SyncResult<bool>) {
        self.version_results.lock().unwrap().push_back(result);
    }

    /// Sets the snapshot served by `fetch_menu`.
    pub fn set_menu(&self, menu: MenuSnapshot) {
        *self.menu.lock().unwrap() = Some(menu);
    }

    /// Sets the directory served by `fetch_customers`.
    pub fn set_customers(&self, customers: Vec<Customer>) {
        *self.customers.lock().unwrap() = Some(customers);
    }

    /// Delays every submit, to hold the flush lock open in tests.
    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = delay;
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls whose log line starts with `prefix`.
    pub fn calls_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RemoteApi for MockRemoteApi {
    async fn submit_mutation(&self, record: &MutationRecord) -> SyncResult<()> {
        self.log(format!("submit:{}:{}", record.kind, record.id));

        let delay = *self.submit_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.submit_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn menu_has_changes(&self, current_version: i64) -> SyncResult<bool> {
        self.log(format!("menu_version:{current_version}"));
        self.version_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(false))
    }

    async fn fetch_menu(&self) -> SyncResult<MenuSnapshot> {
        self.log("fetch_menu".into());
        self.menu
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| crate::error::SyncError::Network("no menu scripted".into()))
    }

    async fn fetch_customers(&self) -> SyncResult<Vec<Customer>> {
        self.log("fetch_customers".into());
        self.customers
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| crate::error::SyncError::Network("no customers scripted".into()))
    }
}

// =============================================================================
// Sample Data
// =============================================================================

/// A small menu snapshot at the given server version.
pub(crate) fn test_menu(version: i64) -> MenuSnapshot {
    MenuSnapshot {
        items: vec![MenuItem {
            id: "espresso".into(),
            category_id: "drinks".into(),
            name: "Espresso".into(),
            description: None,
            price_cents: 250,
            tax_rate_bps: 825,
            is_available: true,
            sort_order: 0,
        }],
        categories: vec![MenuCategory {
            id: "drinks".into(),
            name: "Drinks".into(),
            sort_order: 0,
        }],
        currency: "USD".into(),
        service_charge_bps: 0,
        version,
        generated_at: Utc::now(),
    }
}

/// A customer directory with the given names.
pub(crate) fn test_customers(names: &[&str]) -> Vec<Customer> {
    names
        .iter()
        .map(|name| Customer {
            id: format!("c-{name}"),
            name: name.to_string(),
            phone: None,
            email: None,
            notes: None,
            updated_at: Utc::now(),
        })
        .collect()
}

// =============================================================================
// Fixture
// =============================================================================

/// Fully wired collaborators over an isolated in-memory database.
///
/// The fixture is signed in ("jwt-test") by default; tests flip
/// connectivity and script the remote as needed.
pub(crate) struct Fixture {
    pub store: Store,
    pub cache: CacheStore,
    pub queue: OutboxQueue,
    pub remote: Arc<MockRemoteApi>,
    pub auth: Arc<StaticTokenProvider>,
    pub auth_hold: Arc<AuthHold>,
    pub connectivity: Arc<SharedConnectivity>,
    pub events: EventBus,
    pub tracker: Arc<RevalidationTracker>,
}

pub(crate) async fn fixture(online: bool) -> Fixture {
    // RUST_LOG=comanda_sync=debug surfaces engine logs under failing tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let store = Store::new(StoreConfig::in_memory()).await.unwrap();
    let cache = store.cache();
    let queue = store.outbox();

    Fixture {
        cache,
        queue,
        store,
        remote: MockRemoteApi::new(),
        auth: Arc::new(StaticTokenProvider::with_token("jwt-test")),
        auth_hold: Arc::new(AuthHold::new()),
        connectivity: Arc::new(SharedConnectivity::new(online)),
        events: EventBus::new(),
        tracker: Arc::new(RevalidationTracker::new()),
    }
}

impl Fixture {
    /// An outbox over this fixture's collaborators.
    pub fn outbox(&self) -> MutationOutbox {
        MutationOutbox::new(
            self.queue.clone(),
            self.remote.clone(),
            self.auth.clone(),
            self.auth_hold.clone(),
            self.connectivity.clone(),
            self.events.clone(),
            FlushSettings::default(),
        )
    }

    /// A negotiator over this fixture's collaborators.
    pub fn negotiator(&self) -> VersionNegotiator {
        VersionNegotiator::new(
            self.cache.clone(),
            self.remote.clone(),
            self.auth.clone(),
            self.auth_hold.clone(),
            self.connectivity.clone(),
            self.events.clone(),
            self.tracker.clone(),
        )
    }

    /// A repository with default revalidation settings.
    pub fn repository(&self) -> ReferenceRepository {
        self.repository_with(RevalidationSettings::default())
    }

    /// A repository with custom revalidation settings.
    pub fn repository_with(&self, settings: RevalidationSettings) -> ReferenceRepository {
        ReferenceRepository::new(
            self.cache.clone(),
            self.remote.clone(),
            self.negotiator(),
            self.auth.clone(),
            self.auth_hold.clone(),
            self.connectivity.clone(),
            self.events.clone(),
            self.tracker.clone(),
            settings,
        )
    }

    /// A full engine over this fixture's store, remote, auth, and
    /// connectivity. The engine wires its own bus/hold/tracker; shared
    /// state (database, remote log, token, connectivity) stays visible to
    /// the test through the fixture.
    pub fn engine(&self) -> SyncEngine {
        SyncEngineBuilder::new(SyncConfig::default())
            .with_cache(self.store.cache())
            .with_queue(self.store.outbox())
            .with_remote(self.remote.clone())
            .with_auth(self.auth.clone())
            .with_connectivity(self.connectivity.clone())
            .build()
            .unwrap()
    }
}

/// Polls `condition` for up to three seconds.
pub(crate) async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..300 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 3s");
}
