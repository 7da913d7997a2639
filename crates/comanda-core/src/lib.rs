//! # comanda-core: Pure Engine Types for Comanda POS
//!
//! This crate contains the types shared by every layer of the offline-first
//! sync engine, as pure data with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Comanda POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Frontend (out of scope)                      │   │
//! │  │    Menu grid ──► Cart ──► Tables ──► Kitchen view              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ read/write contracts                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 comanda-sync (engine)                           │   │
//! │  │    ReferenceRepository, MutationOutbox, SyncCoordinator        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ comanda-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  mutation │  │   cache   │  │  status   │  │   │
//! │  │   │ MenuItem  │  │  Record   │  │ CacheEntry│  │SyncStatus │  │   │
//! │  │   │ Customer  │  │  Kind     │  │ CacheStats│  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE TYPES                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 comanda-store (Storage Layer)                   │   │
//! │  │           SQLite cache entries + mutation outbox queue          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Reference-data types (MenuSnapshot, MenuItem, Customer, ...)
//! - [`mutation`] - Pending-write types (MutationRecord, MutationKind)
//! - [`cache`] - Cache envelope types (CacheEntry, CacheStats)
//! - [`status`] - Derived sync status (SyncStatus)
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Data**: no I/O of any kind lives here
//! 2. **Explicit Timestamps**: expiry and staleness math take `now` as an
//!    argument so every rule is deterministic and testable
//! 3. **Explicit Errors**: all errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod mutation;
pub mod status;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use comanda_core::MutationRecord` instead of
// `use comanda_core::mutation::MutationRecord`

pub use cache::{CacheEntry, CacheStats};
pub use error::CoreError;
pub use mutation::{MutationKind, MutationRecord};
pub use status::SyncStatus;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Retry budget for a queued mutation before it is dead-lettered.
///
/// ## Why a constant?
/// The flush scheduler treats this as the default; deployments can override
/// it through `FlushSettings`, but the dead-letter rule itself
/// ([`MutationRecord::is_dead`]) always needs an explicit budget so the
/// decision stays a pure function.
pub const DEFAULT_MAX_RETRIES: i64 = 5;
