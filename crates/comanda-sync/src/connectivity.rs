//! # Connectivity Signal
//!
//! The engine never probes the network itself. The host environment (OS
//! reachability events, a heartbeat, a toggle in a test) feeds a boolean
//! "online" state through [`SharedConnectivity`]; the engine observes it
//! through the [`ConnectivityObserver`] seam.
//!
//! Keeping this behind a trait means the engine is portable across hosts
//! and tests can flip connectivity deterministically.

use tokio::sync::watch;
use tracing::info;

// =============================================================================
// Observer Trait
// =============================================================================

/// Read-only view of host connectivity.
pub trait ConnectivityObserver: Send + Sync {
    /// Current online state.
    fn is_online(&self) -> bool;

    /// A receiver that yields on every online/offline transition.
    ///
    /// The implementation must keep the sender alive for as long as the
    /// observer itself lives.
    fn watch(&self) -> watch::Receiver<bool>;
}

// =============================================================================
// Shared Connectivity
// =============================================================================

/// Host-driven connectivity state over a watch channel.
///
/// The host calls [`set_online`](SharedConnectivity::set_online) whenever
/// its platform signal changes; every engine component sees the flip
/// through the shared receiver.
#[derive(Debug)]
pub struct SharedConnectivity {
    tx: watch::Sender<bool>,
}

impl SharedConnectivity {
    /// Creates the signal with an initial state.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        SharedConnectivity { tx }
    }

    /// Updates the online state. No-op if unchanged.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            info!(online, "Connectivity changed");
        }
    }
}

impl ConnectivityObserver for SharedConnectivity {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn watch(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_observer_sees_transitions() {
        let signal = SharedConnectivity::new(false);
        assert!(!signal.is_online());

        let mut rx = signal.watch();

        signal.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(signal.is_online());
    }

    #[tokio::test]
    async fn test_unchanged_state_does_not_notify() {
        let signal = SharedConnectivity::new(true);
        let mut rx = signal.watch();

        signal.set_online(true);

        // Nothing pending: has_changed is false for a same-state set.
        assert!(!rx.has_changed().unwrap());
    }
}
