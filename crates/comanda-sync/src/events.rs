//! # Engine Event Bus
//!
//! Push notifications for everything a status bar or diagnostics screen
//! cares about: enqueues, flush passes, connectivity flips, reference-data
//! updates, and dead letters.
//!
//! Events are *semantic* - they say what happened, not what the whole
//! status now is. A subscriber that wants the aggregate picture calls
//! `SyncCoordinator::status()` when a notification arrives; status is
//! always computed from live state, never cached in the event.

use tokio::sync::broadcast;
use tracing::trace;

use comanda_core::ReferenceCollection;

use crate::outbox::FlushReport;

/// Default buffer size for the broadcast channel. Slow subscribers that
/// fall further behind than this see `Lagged` and should re-read status.
const EVENT_BUFFER: usize = 64;

// =============================================================================
// Events
// =============================================================================

/// A notification from the sync engine.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A write was accepted locally and queued.
    MutationEnqueued { id: String },

    /// A flush pass started.
    FlushStarted,

    /// A flush pass finished (or was skipped).
    FlushCompleted(FlushReport),

    /// The connectivity signal flipped.
    ConnectivityChanged { online: bool },

    /// A reference-data collection was refreshed in the cache. Readers see
    /// the new snapshot on their next read.
    ReferenceUpdated(ReferenceCollection),

    /// A record exhausted its retry budget and was dead-lettered.
    MutationDead { id: String },

    /// Remote traffic paused because the credential was rejected (401).
    AuthPaused,
}

// =============================================================================
// Event Bus
// =============================================================================

/// Cheap-to-clone handle to the engine's broadcast channel.
///
/// Emitting with no subscribers is fine; events are simply dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a bus with the default buffer.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_BUFFER);
        EventBus { tx }
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emits an event to all current subscribers.
    pub fn emit(&self, event: SyncEvent) {
        trace!(?event, "Engine event");
        // Err means no receivers are listening right now; that's fine.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(SyncEvent::MutationEnqueued { id: "m-1".into() });

        match rx.recv().await.unwrap() {
            SyncEvent::MutationEnqueued { id } => assert_eq!(id, "m-1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.emit(SyncEvent::FlushStarted);
    }
}
