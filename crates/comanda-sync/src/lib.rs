//! # comanda-sync: Offline Sync Engine for Comanda POS
//!
//! This crate keeps a restaurant terminal fully usable with no network -
//! taking orders, adjusting inventory, seating tables - and reconciles with
//! the remote system of record once connectivity returns.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  READS                                    WRITES                        │
//! │  ┌──────────────────────────┐   ┌──────────────────────────────────┐   │
//! │  │   ReferenceRepository    │   │         MutationOutbox           │   │
//! │  │                          │   │                                  │   │
//! │  │  Cache hit: return NOW,  │   │  Durable FIFO of pending writes  │   │
//! │  │  revalidate in the       │   │  Serialized flush (one pass at   │   │
//! │  │  background              │   │  a time), exponential backoff,   │   │
//! │  │  Cold: fetch-through     │   │  dead letters after max retries  │   │
//! │  └───────────┬──────────────┘   └──────────────┬───────────────────┘   │
//! │              │                                 │                       │
//! │  ┌───────────▼──────────────┐                  │                       │
//! │  │    VersionNegotiator     │                  │                       │
//! │  │  "changed since N?" then │                  │                       │
//! │  │  full refetch, monotonic │                  │                       │
//! │  └───────────┬──────────────┘                  │                       │
//! │              │                                 │                       │
//! │  ┌───────────▼─────────────────────────────────▼───────────────────┐   │
//! │  │                       SyncCoordinator                           │   │
//! │  │                                                                 │   │
//! │  │  offline→online: FLUSH outbox, THEN pull reference data         │   │
//! │  │  periodic tick: catch-up flush                                  │   │
//! │  │  status() on demand, subscribe() for push notifications         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  SEAMS (swappable per host / test):                                    │
//! │  • RemoteApi            - HTTP in production, scripted in tests        │
//! │  • ConnectivityObserver - host feeds online/offline transitions        │
//! │  • AuthProvider         - "token or not yet"; 401 ⇒ engine-wide pause  │
//! │  • KeyValueStore        - cache substrate (SQLite / in-memory)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`coordinator`] - `SyncCoordinator` run loop, `SyncEngine` + builder
//! - [`outbox`] - `MutationOutbox` (enqueue, serialized flush, dead letters)
//! - [`repository`] - `ReferenceRepository` (stale-while-revalidate reads)
//! - [`negotiator`] - `VersionNegotiator` + revalidation stamps
//! - [`remote`] - `RemoteApi` seam and the HTTP implementation
//! - [`connectivity`] - `ConnectivityObserver` seam
//! - [`auth`] - `AuthProvider` seam and the 401 pause switch
//! - [`events`] - engine notification bus
//! - [`config`] - TOML configuration
//! - [`error`] - error taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use comanda_store::{Store, StoreConfig};
//! use comanda_sync::{SharedConnectivity, StaticTokenProvider, SyncConfig, SyncEngineBuilder};
//!
//! let store = Store::new(StoreConfig::new("./comanda.db")).await?;
//! let connectivity = Arc::new(SharedConnectivity::new(false));
//! let auth = Arc::new(StaticTokenProvider::new());
//!
//! let mut engine = SyncEngineBuilder::new(SyncConfig::load_or_default(None)?)
//!     .with_store(&store)
//!     .with_connectivity(connectivity.clone())
//!     .with_auth(auth.clone())
//!     .build()?;
//! engine.start().await?;
//!
//! // Reads serve from cache and refresh themselves.
//! let menu = engine.repository().menu().await?;
//!
//! // Writes commit locally and sync when they can.
//! engine.outbox().enqueue(MutationKind::CreateOrder, payload).await?;
//!
//! // The host feeds connectivity transitions.
//! connectivity.set_online(true);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod negotiator;
pub mod outbox;
pub mod remote;
pub mod repository;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Cache Key Layout
// =============================================================================

/// Cache key of the menu snapshot (versioned collection).
pub const MENU_CACHE_KEY: &str = "reference:menu";

/// Cache key of the customer directory (TTL-windowed collection).
pub const CUSTOMERS_CACHE_KEY: &str = "reference:customers";

// =============================================================================
// Re-exports
// =============================================================================

pub use auth::{AuthHold, AuthProvider, StaticTokenProvider};
pub use config::{
    DeviceSettings, FlushSettings, RemoteSettings, RevalidationSettings, SyncConfig,
};
pub use connectivity::{ConnectivityObserver, SharedConnectivity};
pub use coordinator::{SyncCoordinator, SyncEngine, SyncEngineBuilder};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, SyncEvent};
pub use negotiator::{RevalidationTracker, VersionNegotiator};
pub use outbox::{FlushReport, MutationOutbox};
pub use remote::{HttpRemoteApi, RemoteApi};
pub use repository::ReferenceRepository;
