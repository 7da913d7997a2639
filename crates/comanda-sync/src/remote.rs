//! # Remote Endpoints
//!
//! The engine's entire view of the remote system of record, behind the
//! [`RemoteApi`] trait so tests can script responses without a server.
//!
//! ## Wire Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Remote Endpoints                                 │
//! │                                                                         │
//! │  POST /v1/mutations/{kind}         body: mutation payload              │
//! │       Idempotency-Key: <mutation id>                                   │
//! │       2xx ⇒ confirmed; the outbox record is removed                    │
//! │       401 ⇒ AuthFailure (pause, don't retry against dead credential)   │
//! │       other ⇒ retryable failure, retry_count += 1                      │
//! │                                                                         │
//! │  GET  /v1/menu/version?current_version=N                               │
//! │       ⇒ { "has_changes": bool }    (cheap; no snapshot body)           │
//! │                                                                         │
//! │  GET  /v1/menu                     ⇒ full MenuSnapshot                 │
//! │  GET  /v1/customers                ⇒ full customer directory           │
//! │                                                                         │
//! │  TIMEOUT: one per-request timeout on the client (config), treated      │
//! │  exactly like a transport failure.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `Idempotency-Key` header carries the client-generated mutation id:
//! if a response is lost after the server applied the write, the retried
//! request deduplicates server-side instead of double-applying.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use comanda_core::{Customer, MenuSnapshot, MutationKind, MutationRecord};

use crate::auth::AuthProvider;
use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Remote API Trait
// =============================================================================

/// Everything the engine asks of the remote system of record.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Submits one queued mutation. `Ok(())` means the server confirmed it.
    async fn submit_mutation(&self, record: &MutationRecord) -> SyncResult<()>;

    /// Asks whether the menu changed since `current_version` (cheap probe).
    async fn menu_has_changes(&self, current_version: i64) -> SyncResult<bool>;

    /// Fetches the full menu snapshot.
    async fn fetch_menu(&self) -> SyncResult<MenuSnapshot>;

    /// Fetches the full customer directory.
    async fn fetch_customers(&self) -> SyncResult<Vec<Customer>>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// Response body of the version-check endpoint.
#[derive(Debug, Deserialize)]
struct VersionCheckResponse {
    has_changes: bool,
}

/// Production [`RemoteApi`] over HTTP.
#[derive(Clone)]
pub struct HttpRemoteApi {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpRemoteApi {
    /// Builds the client with the configured per-request timeout.
    pub fn new(settings: &RemoteSettings, auth: Arc<dyn AuthProvider>) -> SyncResult<Self> {
        // Fail fast on an unusable base URL instead of at first request.
        Url::parse(&settings.base_url)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(HttpRemoteApi {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// The write endpoint for a mutation kind.
    fn mutation_endpoint(&self, kind: MutationKind) -> String {
        self.endpoint(&format!("v1/mutations/{}", kind.as_str()))
    }

    /// Attaches the bearer token when one exists. Sending without a token
    /// is allowed; the server answers 401 and the engine pauses.
    async fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth.bearer_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Maps a response status to the engine's error taxonomy.
    fn check_status(response: &reqwest::Response) -> SyncResult<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.as_u16() == 401 {
            Err(SyncError::Auth)
        } else {
            Err(SyncError::Http {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn submit_mutation(&self, record: &MutationRecord) -> SyncResult<()> {
        let url = self.mutation_endpoint(record.kind);
        debug!(id = %record.id, kind = %record.kind, %url, "Submitting mutation");

        let request = self
            .client
            .post(&url)
            .header("Idempotency-Key", &record.id)
            .json(&record.payload);

        let response = self.authorize(request).await.send().await?;
        Self::check_status(&response)
    }

    async fn menu_has_changes(&self, current_version: i64) -> SyncResult<bool> {
        let url = self.endpoint("v1/menu/version");
        let request = self
            .client
            .get(&url)
            .query(&[("current_version", current_version)]);

        let response = self.authorize(request).await.send().await?;
        Self::check_status(&response)?;

        let body: VersionCheckResponse = response.json().await?;
        Ok(body.has_changes)
    }

    async fn fetch_menu(&self) -> SyncResult<MenuSnapshot> {
        let url = self.endpoint("v1/menu");
        let request = self.client.get(&url);

        let response = self.authorize(request).await.send().await?;
        Self::check_status(&response)?;

        Ok(response.json().await?)
    }

    async fn fetch_customers(&self) -> SyncResult<Vec<Customer>> {
        let url = self.endpoint("v1/customers");
        let request = self.client.get(&url);

        let response = self.authorize(request).await.send().await?;
        Self::check_status(&response)?;

        Ok(response.json().await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
