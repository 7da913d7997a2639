//! # Mutation Outbox
//!
//! Accepts writes locally the moment the terminal makes them (optimistic
//! commit) and replays them against the remote system of record, in order,
//! with bounded retries.
//!
//! ## Flush Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Flush Pass                                     │
//! │                                                                         │
//! │  trigger (enqueue-while-online / reconnect / periodic / force sync)    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  try_lock flush mutex ──── already held? ──► skip (the in-flight pass  │
//! │       │                                      continues; the periodic   │
//! │       │                                      trigger catches leftovers)│
//! │       ▼                                                                 │
//! │  offline? no token? auth hold? ──► skip silently                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SNAPSHOT the eligible queue (non-dead, backoff gate passed),          │
//! │  strictly in insertion order. Records enqueued from here on wait       │
//! │  for the next trigger.                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  for each record, in order:                                            │
//! │    • 2xx        ⇒ DELETE from queue                                    │
//! │    • 401        ⇒ engage auth hold, abort the pass                     │
//! │    • other fail ⇒ retry_count += 1, last_error, and                    │
//! │                   next_attempt_at = now + min(cap, base · 2^retries)   │
//! │                   (pass continues with the NEXT record - one sick      │
//! │                   record never blocks the rest)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  release lock, emit FlushCompleted                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use comanda_core::{MutationKind, MutationRecord};
use comanda_store::OutboxQueue;

use crate::auth::{AuthHold, AuthProvider};
use crate::config::FlushSettings;
use crate::connectivity::ConnectivityObserver;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::remote::RemoteApi;

// =============================================================================
// Backoff Policy
// =============================================================================

/// Delay before the next automatic attempt for a record that has already
/// failed `retry_count` times: `min(cap, base * 2^retry_count)`.
///
/// With the defaults (base 2 s, cap 5 min): 2s, 4s, 8s, 16s, 32s.
fn backoff_delay(retry_count: i64, settings: &FlushSettings) -> Duration {
    // Clamp the exponent so a corrupt retry_count cannot overflow.
    let exponent = retry_count.clamp(0, 30) as u32;
    let ms = settings
        .base_backoff_ms
        .saturating_mul(2u64.saturating_pow(exponent))
        .min(settings.max_backoff_ms);
    Duration::milliseconds(ms as i64)
}

// =============================================================================
// Flush Report
// =============================================================================

/// Outcome of one flush trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// The trigger did nothing: lock held, offline, no token, or auth hold.
    pub skipped: bool,

    /// Records submitted this pass.
    pub attempted: usize,

    /// Records confirmed and removed.
    pub succeeded: usize,

    /// Records that failed and stayed queued (retry_count bumped).
    pub failed: usize,

    /// The pass aborted on a 401 and engaged the auth hold.
    pub auth_paused: bool,
}

impl FlushReport {
    fn skipped() -> Self {
        FlushReport {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Which records a pass considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushMode {
    /// Automatic trigger: respect each record's backoff gate.
    Due,
    /// Explicit user-initiated sync: include gated records too.
    IgnoreBackoff,
}

// =============================================================================
// Mutation Outbox
// =============================================================================

/// The engine's write side: durable enqueue plus serialized, retrying flush.
///
/// Cloning is cheap and every clone shares the same flush lock, so at most
/// one pass is in flight per engine regardless of which handle triggered it.
#[derive(Clone)]
pub struct MutationOutbox {
    queue: OutboxQueue,
    remote: Arc<dyn RemoteApi>,
    auth: Arc<dyn AuthProvider>,
    auth_hold: Arc<AuthHold>,
    connectivity: Arc<dyn ConnectivityObserver>,
    events: EventBus,
    settings: FlushSettings,

    /// Exclusive flush lock: a trigger that finds it held skips.
    flush_lock: Arc<Mutex<()>>,

    /// True while a pass is submitting records (for status displays).
    syncing: Arc<AtomicBool>,
}

impl MutationOutbox {
    /// Creates the outbox over its collaborators.
    pub fn new(
        queue: OutboxQueue,
        remote: Arc<dyn RemoteApi>,
        auth: Arc<dyn AuthProvider>,
        auth_hold: Arc<AuthHold>,
        connectivity: Arc<dyn ConnectivityObserver>,
        events: EventBus,
        settings: FlushSettings,
    ) -> Self {
        MutationOutbox {
            queue,
            remote,
            auth,
            auth_hold,
            connectivity,
            events,
            settings,
            flush_lock: Arc::new(Mutex::new(())),
            syncing: Arc::new(AtomicBool::new(false)),
        }
    }

    // =========================================================================
    // Enqueue
    // =========================================================================

    /// Accepts a write locally and, when online, schedules an immediate
    /// flush attempt in the background.
    ///
    /// The returned record is already durable: even if the process dies
    /// before any flush, the write survives.
    pub async fn enqueue(
        &self,
        kind: MutationKind,
        payload: serde_json::Value,
    ) -> SyncResult<MutationRecord> {
        let record = MutationRecord::new(kind, payload, Utc::now());
        self.queue.append(&record).await?;

        info!(id = %record.id, %kind, "Mutation queued");
        self.events.emit(SyncEvent::MutationEnqueued {
            id: record.id.clone(),
        });

        if self.connectivity.is_online() {
            let outbox = self.clone();
            tokio::spawn(async move {
                if let Err(e) = outbox.flush().await {
                    error!(error = %e, "Post-enqueue flush failed");
                }
            });
        }

        Ok(record)
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Automatic flush: submits eligible records in insertion order.
    pub async fn flush(&self) -> SyncResult<FlushReport> {
        self.flush_with(FlushMode::Due).await
    }

    /// User-initiated flush: also includes records still inside their
    /// backoff window.
    pub async fn force_flush(&self) -> SyncResult<FlushReport> {
        self.flush_with(FlushMode::IgnoreBackoff).await
    }

    async fn flush_with(&self, mode: FlushMode) -> SyncResult<FlushReport> {
        // At most one pass in flight. A trigger that loses the race skips;
        // the periodic trigger picks up whatever the in-flight pass misses.
        let Ok(_guard) = self.flush_lock.try_lock() else {
            debug!("Flush already in flight; skipping trigger");
            return Ok(FlushReport::skipped());
        };

        if !self.connectivity.is_online() {
            debug!("Offline; skipping flush");
            return Ok(FlushReport::skipped());
        }

        // No token yet is a normal state, not an error.
        let token = self.auth.bearer_token().await;
        let Some(token) = token else {
            debug!("No auth token yet; skipping flush");
            return Ok(FlushReport::skipped());
        };
        if !self.auth_hold.try_release(Some(&token)) {
            debug!("Auth hold active; skipping flush");
            return Ok(FlushReport::skipped());
        }

        let now = Utc::now();
        let snapshot = match mode {
            FlushMode::Due => {
                self.queue
                    .due_pending(self.settings.max_retries, now, self.settings.batch_size)
                    .await?
            }
            FlushMode::IgnoreBackoff => self.queue.pending(self.settings.max_retries).await?,
        };

        if snapshot.is_empty() {
            return Ok(FlushReport::default());
        }

        info!(count = snapshot.len(), ?mode, "Flushing outbox");
        self.syncing.store(true, Ordering::SeqCst);
        self.events.emit(SyncEvent::FlushStarted);

        let result = self.submit_pass(&snapshot, &token).await;

        // The flag must clear even when the pass dies on a storage error.
        self.syncing.store(false, Ordering::SeqCst);

        let report = result?;
        self.events.emit(SyncEvent::FlushCompleted(report.clone()));

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            auth_paused = report.auth_paused,
            "Flush pass complete"
        );

        Ok(report)
    }

    /// Submits one snapshot of the queue, strictly in order.
    async fn submit_pass(
        &self,
        snapshot: &[MutationRecord],
        token: &str,
    ) -> SyncResult<FlushReport> {
        let mut report = FlushReport::default();

        for record in snapshot {
            report.attempted += 1;

            match self.remote.submit_mutation(record).await {
                Ok(()) => {
                    self.queue.remove(&record.id).await?;
                    report.succeeded += 1;
                    debug!(id = %record.id, "Mutation confirmed");
                }

                Err(SyncError::Auth) => {
                    // The credential is dead; hammering the remaining
                    // records with it would only burn their retry budgets.
                    self.auth_hold.engage(Some(token.to_string()));
                    self.events.emit(SyncEvent::AuthPaused);
                    report.auth_paused = true;
                    break;
                }

                Err(e) => {
                    self.record_failure(record, &e).await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Bumps the retry state for a failed submission and dead-letters the
    /// record once the budget is gone.
    async fn record_failure(&self, record: &MutationRecord, error: &SyncError) -> SyncResult<()> {
        let now = Utc::now();
        let next_attempt = now + backoff_delay(record.retry_count, &self.settings);

        warn!(
            id = %record.id,
            kind = %record.kind,
            retry_count = record.retry_count + 1,
            error = %error,
            "Mutation submission failed"
        );

        self.queue
            .record_failure(&record.id, &error.to_string(), now, next_attempt)
            .await?;

        if record.retry_count + 1 >= self.settings.max_retries {
            warn!(
                id = %record.id,
                kind = %record.kind,
                "Retry budget exhausted; mutation dead-lettered (kept for inspection)"
            );
            self.events.emit(SyncEvent::MutationDead {
                id: record.id.clone(),
            });
        }

        Ok(())
    }

    // =========================================================================
    // Queue Views & Operator Actions
    // =========================================================================

    /// Queued mutations still awaiting confirmation (excludes dead letters).
    pub async fn pending_count(&self) -> SyncResult<i64> {
        Ok(self.queue.pending_count(self.settings.max_retries).await?)
    }

    /// Dead-lettered mutations awaiting operator action.
    pub async fn failed_count(&self) -> SyncResult<i64> {
        Ok(self.queue.dead_count(self.settings.max_retries).await?)
    }

    /// The dead-letter list, oldest first.
    pub async fn dead(&self) -> SyncResult<Vec<MutationRecord>> {
        Ok(self.queue.dead(self.settings.max_retries).await?)
    }

    /// Operator action: resets a dead record's retry state and, when
    /// online, schedules a flush attempt for it.
    pub async fn requeue(&self, id: &str) -> SyncResult<()> {
        if !self.queue.requeue(id).await? {
            return Err(SyncError::RecordNotFound { id: id.to_string() });
        }

        info!(id, "Mutation manually requeued");

        if self.connectivity.is_online() {
            let outbox = self.clone();
            tokio::spawn(async move {
                if let Err(e) = outbox.flush().await {
                    error!(error = %e, "Post-requeue flush failed");
                }
            });
        }

        Ok(())
    }

    /// Operator action: removes all dead letters. Returns how many.
    pub async fn clear_dead(&self) -> SyncResult<u64> {
        let removed = self.queue.clear_dead(self.settings.max_retries).await?;
        info!(removed, "Cleared dead-lettered mutations");
        Ok(removed)
    }

    /// Operator action: empties the whole queue. Returns how many.
    pub async fn clear_all(&self) -> SyncResult<u64> {
        let removed = self.queue.clear_all().await?;
        warn!(removed, "Cleared entire mutation outbox");
        Ok(removed)
    }

    /// True while a flush pass is submitting records.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
