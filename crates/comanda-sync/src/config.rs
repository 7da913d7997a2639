//! # Sync Configuration
//!
//! Engine configuration loaded from a TOML file in the platform config
//! directory, with sensible defaults for every field so a missing file is
//! never fatal.
//!
//! ## Config Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Configuration Loading                               │
//! │                                                                         │
//! │  SyncConfig::load_or_default(None)                                     │
//! │       │                                                                 │
//! │       ├── explicit path given? ──► read that file                      │
//! │       │                                                                 │
//! │       ├── platform config dir   ──► e.g. ~/.config/comanda/sync.toml   │
//! │       │   (directories crate)                                          │
//! │       │                                                                 │
//! │       └── nothing found         ──► SyncConfig::default()              │
//! │                                                                         │
//! │  Unknown fields are ignored; missing fields take their defaults        │
//! │  (#[serde(default)]) so old config files keep working.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Settings Sections
// =============================================================================

/// Remote endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Base URL of the remote system of record.
    pub base_url: String,

    /// Per-request timeout, in seconds. The engine imposes no other
    /// timeout; a request that exceeds this is a retryable network failure.
    pub request_timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: "http://localhost:8080".into(),
            request_timeout_secs: 15,
        }
    }
}

/// Outbox flush scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushSettings {
    /// Retry budget per record before dead-lettering.
    pub max_retries: i64,

    /// First backoff step after a failed attempt, in milliseconds.
    pub base_backoff_ms: u64,

    /// Backoff ceiling, in milliseconds.
    pub max_backoff_ms: u64,

    /// Maximum records considered per flush pass.
    pub batch_size: i64,

    /// Periodic flush interval while online, in seconds. This is the
    /// catch-all trigger for records whose backoff gate has reopened and
    /// for flushes skipped under the exclusive lock.
    pub poll_interval_secs: u64,
}

impl Default for FlushSettings {
    fn default() -> Self {
        FlushSettings {
            max_retries: comanda_core::DEFAULT_MAX_RETRIES,
            // delay = min(max, base * 2^retry_count): 2s, 4s, 8s, ... 5min
            base_backoff_ms: 2_000,
            max_backoff_ms: 300_000,
            batch_size: 100,
            poll_interval_secs: 30,
        }
    }
}

/// Reference-data revalidation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevalidationSettings {
    /// Age after which the customer directory is refreshed in the
    /// background. The cached copy keeps serving in the meantime.
    pub customer_ttl_minutes: i64,

    /// Minimum spacing between background revalidations of the same
    /// collection. Keeps back-to-back reads from issuing duplicate
    /// version probes.
    pub min_revalidate_interval_secs: u64,
}

impl Default for RevalidationSettings {
    fn default() -> Self {
        RevalidationSettings {
            customer_ttl_minutes: 60,
            min_revalidate_interval_secs: 60,
        }
    }
}

/// Identity of this terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Stable terminal id (UUID v4, generated on first run).
    pub id: String,

    /// Human-readable terminal name ("bar", "patio-2").
    pub name: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettings {
            id: Uuid::new_v4().to_string(),
            name: "terminal".into(),
        }
    }
}

// =============================================================================
// Sync Config
// =============================================================================

/// Full engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote endpoint settings.
    pub remote: RemoteSettings,

    /// Outbox flush scheduling.
    pub flush: FlushSettings,

    /// Reference-data revalidation.
    pub revalidation: RevalidationSettings,

    /// Terminal identity.
    pub device: DeviceSettings,
}

impl SyncConfig {
    /// Validates the configuration before the engine starts.
    pub fn validate(&self) -> SyncResult<()> {
        Url::parse(&self.remote.base_url)?;

        if self.flush.max_retries <= 0 {
            return Err(SyncError::InvalidConfig(
                "flush.max_retries must be positive".into(),
            ));
        }
        if self.flush.base_backoff_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "flush.base_backoff_ms must be positive".into(),
            ));
        }
        if self.flush.max_backoff_ms < self.flush.base_backoff_ms {
            return Err(SyncError::InvalidConfig(
                "flush.max_backoff_ms must be >= flush.base_backoff_ms".into(),
            ));
        }
        if self.flush.batch_size <= 0 {
            return Err(SyncError::InvalidConfig(
                "flush.batch_size must be positive".into(),
            ));
        }
        if self.revalidation.customer_ttl_minutes <= 0 {
            return Err(SyncError::InvalidConfig(
                "revalidation.customer_ttl_minutes must be positive".into(),
            ));
        }
        if self.device.id.is_empty() {
            return Err(SyncError::InvalidConfig("device.id must be set".into()));
        }

        Ok(())
    }

    /// Loads the config from `path`, the platform config dir, or defaults.
    ///
    /// A missing file is not an error; a present-but-invalid file is.
    pub fn load_or_default(path: Option<&Path>) -> SyncResult<Self> {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path(),
        };

        match candidate {
            Some(p) if p.exists() => {
                info!(path = %p.display(), "Loading sync config");
                Self::load(&p)
            }
            _ => {
                debug!("No sync config file found; using defaults");
                Ok(SyncConfig::default())
            }
        }
    }

    /// Loads the config from an explicit file.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SyncConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Saves the config, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        info!(path = %path.display(), "Saved sync config");
        Ok(())
    }

    /// Default config file location for this platform.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "comanda", "comanda-pos")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        config.validate().unwrap();
        assert_eq!(config.flush.max_retries, 5);
        assert_eq!(config.revalidation.customer_ttl_minutes, 60);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = SyncConfig::default();
        config.remote.base_url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = SyncConfig::default();
        config.flush.base_backoff_ms = 10_000;
        config.flush.max_backoff_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_with_partial_file() {
        // Old/partial files keep working: missing sections take defaults.
        let partial = r#"
            [remote]
            base_url = "https://pos.example.com"

            [flush]
            max_retries = 3
        "#;

        let config: SyncConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.remote.base_url, "https://pos.example.com");
        assert_eq!(config.flush.max_retries, 3);
        // Untouched sections are defaulted.
        assert_eq!(config.flush.poll_interval_secs, 30);
        assert_eq!(config.revalidation.customer_ttl_minutes, 60);

        let serialized = toml::to_string_pretty(&config).unwrap();
        let reparsed: SyncConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed.remote.base_url, config.remote.base_url);
    }
}
