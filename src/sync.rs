//! Timezone synchronization orchestration.
//!
//! Drives one attempt end to end: validate the identifier, compose and apply
//! the command batch, probe the host, parse, and compare against an
//! expectation derived from the *local* timezone database. The flow is
//! strictly sequential; each attempt is stateless and reports exactly one
//! outcome. Persistence happens only on [`SyncOutcome::Verified`].

use crate::commands::{compose_apply, compose_probe};
use crate::config::HostsConfig;
use crate::error::SyncError;
use crate::mock::{self, MockConfig, MockSshClient};
use crate::probe::{TimezoneReading, expected_reading, parse_probe};
use crate::ssh::{SshClient, SshOptions};
use crate::types::{HostConfig, HostId, Timezone};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Terminal outcome of one synchronization attempt.
///
/// Failure variants carry their full diagnostic detail; nothing is discarded
/// between the remote host and the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Abbreviation, offset, and identifier all match the expectation.
    /// The only state from which persisting the new value is authorized.
    Verified { reading: TimezoneReading },
    /// The probe parsed, but at least one field disagrees with the locally
    /// computed expectation.
    Mismatch {
        expected: TimezoneReading,
        actual: TimezoneReading,
    },
    /// The probe returned an unexpected shape. "Could not verify" - distinct
    /// from a definite mismatch; the raw text is preserved verbatim.
    MalformedProbe { raw: String },
    /// The apply batch could not complete; underlying error kept verbatim.
    ApplyFailed { error: String },
}

impl SyncOutcome {
    /// Whether the caller may persist the new timezone value.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    /// Human-readable message for the notification collaborator.
    pub fn user_message(&self) -> String {
        match self {
            Self::Verified { reading } => {
                format!("Timezone updated to {}.", reading.identifier)
            }
            Self::Mismatch { expected, actual } => format!(
                "The server reported a different timezone than requested: \
                 expected {} {} ({}), got {} {} ({}).",
                expected.abbreviation,
                expected.offset_text,
                expected.identifier,
                actual.abbreviation,
                actual.offset_text,
                actual.identifier
            ),
            Self::MalformedProbe { .. } => {
                "Could not verify timezone update: unexpected server response.".to_string()
            }
            Self::ApplyFailed { error } => {
                format!("Failed to update server timezone: {error}")
            }
        }
    }
}

/// Persistence seam for the accepted timezone value.
///
/// Invoked only after a `Verified` outcome; every other outcome must leave
/// stored state untouched.
pub trait SettingsStore: Send + Sync {
    fn store_timezone(&self, host: &HostId, timezone: &Timezone) -> Result<()>;
}

/// In-memory [`SettingsStore`], for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<HostId, Timezone>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timezone_for(&self, host: &HostId) -> Option<Timezone> {
        self.inner.lock().unwrap().get(host).cloned()
    }
}

impl SettingsStore for MemoryStore {
    fn store_timezone(&self, host: &HostId, timezone: &Timezone) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .insert(host.clone(), timezone.clone());
        Ok(())
    }
}

fn use_mock_transport(host: &HostConfig) -> bool {
    mock::is_mock_enabled() || mock::is_mock_host(&host.host)
}

/// Timezone synchronization service for one managed host.
pub struct TimezoneSync {
    host: HostConfig,
    ssh_options: SshOptions,
}

impl TimezoneSync {
    /// Create a service for a host with default SSH options.
    pub fn new(host: HostConfig) -> Self {
        Self {
            host,
            ssh_options: SshOptions::default(),
        }
    }

    /// Set SSH options.
    pub fn with_ssh_options(mut self, options: SshOptions) -> Self {
        self.ssh_options = options;
        self
    }

    /// Create a service for a host named in an inventory, carrying the
    /// inventory's transport timeouts. `None` if the id is unknown.
    pub fn from_inventory(inventory: &HostsConfig, id: &str) -> Option<Self> {
        let host = inventory.host(id)?.clone();
        Some(Self::new(host).with_ssh_options(inventory.settings.ssh_options()))
    }

    /// Run one synchronization attempt, comparing against "now".
    pub async fn sync(&self, candidate: &str) -> Result<SyncOutcome, SyncError> {
        self.sync_at(candidate, Utc::now()).await
    }

    /// Run one synchronization attempt, comparing at an explicit instant.
    ///
    /// The identifier is validated before any remote contact. No retries:
    /// the outcome is reported once and re-offering the operation is the
    /// caller's decision.
    pub async fn sync_at(
        &self,
        candidate: &str,
        at: DateTime<Utc>,
    ) -> Result<SyncOutcome, SyncError> {
        let timezone = Timezone::parse(candidate)?;
        info!("Synchronizing timezone {} on {}", timezone, self.host.id);

        let apply = compose_apply(&timezone);
        if let Err(e) = self.run_apply(&apply).await {
            warn!("Apply failed on {}: {:#}", self.host.id, e);
            return Ok(SyncOutcome::ApplyFailed {
                error: format!("{e:#}"),
            });
        }

        // The probe must not look like an apply failure: output is captured
        // even when the channel reports a non-zero status.
        let raw = self.run_probe(&compose_probe()).await;
        debug!("Probe output from {}: {:?}", self.host.id, raw);

        let Some(actual) = parse_probe(&raw) else {
            warn!("Malformed probe output from {}", self.host.id);
            return Ok(SyncOutcome::MalformedProbe { raw });
        };

        // Expectation comes from the local timezone database, never from
        // anything the host echoed back.
        let expected = expected_reading(&timezone, at);
        if actual == expected {
            info!("Timezone verified on {}: {}", self.host.id, timezone);
            Ok(SyncOutcome::Verified { reading: actual })
        } else {
            warn!(
                "Timezone mismatch on {}: expected {:?}, got {:?}",
                self.host.id, expected, actual
            );
            Ok(SyncOutcome::Mismatch { expected, actual })
        }
    }

    /// Run one attempt and persist the accepted value on `Verified`.
    ///
    /// All other outcomes leave the store untouched.
    pub async fn sync_and_persist(
        &self,
        candidate: &str,
        store: &dyn SettingsStore,
    ) -> Result<SyncOutcome> {
        let outcome = self.sync(candidate).await?;
        if let SyncOutcome::Verified { reading } = &outcome {
            let timezone = Timezone::parse(&reading.identifier)?;
            store.store_timezone(&self.host.id, &timezone)?;
            debug!("Persisted timezone {} for {}", timezone, self.host.id);
        }
        Ok(outcome)
    }

    async fn run_apply(&self, commands: &[String]) -> Result<()> {
        if use_mock_transport(&self.host) {
            let mut client = MockSshClient::new(self.host.clone(), MockConfig::from_env());
            client.connect().await?;
            let result = client.run_batch(commands).await;
            client.disconnect().await?;
            result.map(|_| ())
        } else {
            let mut client = SshClient::new(self.host.clone(), self.ssh_options.clone());
            client.connect().await?;
            let result = client.run_batch(commands).await;
            client.disconnect().await?;
            result.map(|_| ())
        }
    }

    async fn run_probe(&self, commands: &[String]) -> String {
        if use_mock_transport(&self.host) {
            let mut client = MockSshClient::new(self.host.clone(), MockConfig::from_env());
            if client.connect().await.is_err() {
                return String::new();
            }
            let output = client.run_batch_silent(commands).await;
            let _ = client.disconnect().await;
            output
        } else {
            let mut client = SshClient::new(self.host.clone(), self.ssh_options.clone());
            if let Err(e) = client.connect().await {
                warn!("Probe connection to {} failed: {:#}", self.host.id, e);
                return String::new();
            }
            let output = client.run_batch_silent(commands).await;
            if let Err(e) = client.disconnect().await {
                debug!("Probe disconnect from {} failed: {:#}", self.host.id, e);
            }
            output
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(abbr: &str, offset: &str, id: &str) -> TimezoneReading {
        TimezoneReading {
            abbreviation: abbr.to_string(),
            offset_text: offset.to_string(),
            identifier: id.to_string(),
        }
    }

    #[test]
    fn test_outcome_is_verified() {
        let verified = SyncOutcome::Verified {
            reading: reading("CET", "+01:00", "Europe/Berlin"),
        };
        assert!(verified.is_verified());

        let malformed = SyncOutcome::MalformedProbe {
            raw: "garbage".to_string(),
        };
        assert!(!malformed.is_verified());
    }

    #[test]
    fn test_outcome_messages() {
        let mismatch = SyncOutcome::Mismatch {
            expected: reading("CET", "+01:00", "Europe/Berlin"),
            actual: reading("CEST", "+02:00", "Europe/Berlin"),
        };
        let message = mismatch.user_message();
        assert!(message.contains("different timezone than requested"));
        assert!(message.contains("CET +01:00"));
        assert!(message.contains("CEST +02:00"));

        let apply_failed = SyncOutcome::ApplyFailed {
            error: "Connection refused".to_string(),
        };
        assert!(apply_failed.user_message().contains("Connection refused"));

        let malformed = SyncOutcome::MalformedProbe {
            raw: String::new(),
        };
        assert!(malformed.user_message().contains("Could not verify"));
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let outcome = SyncOutcome::MalformedProbe {
            raw: "one line only".to_string(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"outcome\":\"malformed_probe\""));
        assert!(json.contains("one line only"));

        let restored: SyncOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, outcome);
    }

    #[test]
    fn test_from_inventory_carries_transport_settings() {
        let inventory: HostsConfig = toml::from_str(
            r#"
            [settings]
            connect_timeout_secs = 5
            command_timeout_secs = 30

            [[hosts]]
            id = "web-1"
            host = "203.0.113.7"
            user = "root"
            identity_file = "~/.ssh/id_ed25519"
            "#,
        )
        .unwrap();

        let service = TimezoneSync::from_inventory(&inventory, "web-1").unwrap();
        assert_eq!(service.host.host, "203.0.113.7");
        assert_eq!(
            service.ssh_options.connect_timeout,
            std::time::Duration::from_secs(5)
        );
        assert_eq!(
            service.ssh_options.command_timeout,
            std::time::Duration::from_secs(30)
        );

        assert!(TimezoneSync::from_inventory(&inventory, "missing").is_none());
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let host = HostId::new("web-1");
        assert!(store.timezone_for(&host).is_none());

        let tz = Timezone::parse("Asia/Tokyo").unwrap();
        store.store_timezone(&host, &tz).unwrap();
        assert_eq!(store.timezone_for(&host), Some(tz));
    }
}
