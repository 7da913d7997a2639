//! # Auth Provider Seam
//!
//! Token *acquisition* (login screens, refresh flows) lives outside this
//! engine. The engine only ever asks one question - "do we have a bearer
//! token right now?" - and reacts:
//!
//! - `None`  ⇒ skip the flush/refresh cycle silently. A terminal that has
//!   not signed in yet is a normal state, not an error.
//! - 401 from the remote ⇒ engage the [`AuthHold`]: all remote traffic
//!   pauses until the provider yields a *different* token. Re-submitting
//!   the same request against a rejected credential would only burn the
//!   retry budget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{info, warn};

// =============================================================================
// Provider Trait
// =============================================================================

/// Supplies the current bearer token, if any.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The current token, or `None` when not signed in yet.
    async fn bearer_token(&self) -> Option<String>;
}

// =============================================================================
// Static Token Provider
// =============================================================================

/// In-memory token holder the host updates as its auth flow progresses.
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    token: RwLock<Option<String>>,
}

impl StaticTokenProvider {
    /// Creates a provider with no token (not signed in).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider that already holds a token.
    pub fn with_token(token: impl Into<String>) -> Self {
        StaticTokenProvider {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Installs a fresh token (sign-in or refresh completed).
    pub async fn set_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    /// Drops the token (sign-out or revocation).
    pub async fn clear_token(&self) {
        *self.token.write().await = None;
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Option<String> {
        self.token.read().await.clone()
    }
}

// =============================================================================
// Auth Hold
// =============================================================================

/// Engine-wide pause switch, engaged on HTTP 401.
///
/// While held, the outbox skips flushes and the negotiator skips pulls.
/// The hold remembers the token the remote rejected; the next cycle
/// releases it only once the provider yields a different one.
#[derive(Debug, Default)]
pub struct AuthHold {
    held: AtomicBool,
    rejected_token: Mutex<Option<String>>,
}

impl AuthHold {
    /// Creates a released hold.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pauses remote traffic, remembering the credential that was rejected.
    pub fn engage(&self, rejected_token: Option<String>) {
        *self.rejected_token.lock().expect("auth hold lock poisoned") = rejected_token;
        if !self.held.swap(true, Ordering::SeqCst) {
            warn!("Credential rejected; pausing sync until re-authentication");
        }
    }

    /// Whether remote traffic is currently paused.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    /// Releases the hold if `current_token` is a fresh credential.
    ///
    /// Returns true when traffic may proceed: the hold was not engaged, or
    /// it just released. Returns false while the provider still hands back
    /// the rejected token (or none at all).
    pub fn try_release(&self, current_token: Option<&str>) -> bool {
        if !self.held.load(Ordering::SeqCst) {
            return true;
        }

        let rejected = self.rejected_token.lock().expect("auth hold lock poisoned");
        match current_token {
            Some(current) if rejected.as_deref() != Some(current) => {
                drop(rejected);
                self.held.store(false, Ordering::SeqCst);
                info!("Re-authenticated; resuming sync");
                true
            }
            _ => false,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_lifecycle() {
        let provider = StaticTokenProvider::new();
        assert!(provider.bearer_token().await.is_none());

        provider.set_token("jwt-1").await;
        assert_eq!(provider.bearer_token().await.as_deref(), Some("jwt-1"));

        provider.clear_token().await;
        assert!(provider.bearer_token().await.is_none());
    }

    #[test]
    fn test_hold_blocks_until_fresh_token() {
        let hold = AuthHold::new();
        assert!(hold.try_release(Some("jwt-1")));

        hold.engage(Some("jwt-1".into()));
        assert!(hold.is_held());

        // Same rejected credential, or none at all: stay held.
        assert!(!hold.try_release(Some("jwt-1")));
        assert!(!hold.try_release(None));
        assert!(hold.is_held());

        // A fresh credential releases the hold.
        assert!(hold.try_release(Some("jwt-2")));
        assert!(!hold.is_held());
    }

    #[test]
    fn test_hold_engaged_without_token_releases_on_any_token() {
        let hold = AuthHold::new();
        hold.engage(None);

        assert!(!hold.try_release(None));
        assert!(hold.try_release(Some("jwt-1")));
    }
}
