//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Remote      │  │      Storage            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Network        │  │  Storage                │ │
//! │  │  ConfigLoad/Save│  │  Http {status}  │  │  (outbox queue I/O;     │ │
//! │  │                 │  │  Auth (401)     │  │   cache I/O never       │ │
//! │  │                 │  │                 │  │   reaches this type)    │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │     Outbox      │  │               Retry Policy                  │  │
//! │  │                 │  │                                             │  │
//! │  │  RecordNotFound │  │  Network/Http  → retryable, retry_count+1   │  │
//! │  │ ExhaustedRetries│  │  Auth          → pause everything (hold)    │  │
//! │  │                 │  │  Storage/Config→ not retryable              │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible engine failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// Transport-level failure (connection refused, DNS, timeout).
    #[error("Network failure: {0}")]
    Network(String),

    /// The remote endpoint answered with a non-2xx status other than 401.
    #[error("Remote returned HTTP {status}")]
    Http { status: u16 },

    /// HTTP 401: the bearer token is missing, expired, or revoked.
    ///
    /// This pauses outbox flushing and reference pulls until the auth
    /// provider yields a token again; retrying against a dead credential
    /// only burns the retry budget.
    #[error("Authentication rejected by remote")]
    Auth,

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Local persistence failure from the outbox queue.
    ///
    /// Cache-store failures never surface here: the cache downgrades them
    /// to misses internally.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Failed to (de)serialize a payload or wire body.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    // =========================================================================
    // Outbox Errors
    // =========================================================================
    /// A requeue/clear referenced an id that is not in the queue.
    #[error("No outbox record with id {id}")]
    RecordNotFound { id: String },

    /// A record exhausted its retry budget and was dead-lettered. Surfaced
    /// by operator tooling; automatic flushes report deaths through the
    /// event bus instead of failing the pass.
    #[error("Retries exhausted for mutation {id}")]
    ExhaustedRetries { id: String },
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<comanda_store::StoreError> for SyncError {
    fn from(err: comanda_store::StoreError) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // The transport timeout counts as a plain network failure:
            // retryable, increments retry_count.
            SyncError::Network(format!("request timed out: {err}"))
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidConfig(format!("invalid remote URL: {err}"))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is transient and the submission can be
    /// retried against the same record.
    ///
    /// ## Retryable Errors
    /// - Transport failures and timeouts
    /// - Non-2xx responses other than 401
    ///
    /// ## Non-Retryable Errors
    /// - 401 (handled by the auth hold, not the retry budget)
    /// - Configuration and storage errors
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Http { .. })
    }

    /// Returns true if this error must engage the auth hold.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Auth)
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
