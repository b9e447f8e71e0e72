//! Common types used across tzsync.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};

/// Unique identifier for a managed host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostId(pub String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated IANA timezone identifier (e.g. `Europe/Berlin`).
///
/// Construction goes through [`Timezone::parse`], which checks membership in
/// the timezone database. Downstream code (notably the command composer)
/// relies on this: a `Timezone` never contains shell- or path-hostile
/// characters beyond what the IANA identifier set allows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timezone(String);

impl Timezone {
    /// Validate a candidate identifier against the IANA catalog.
    pub fn parse(candidate: &str) -> Result<Self, SyncError> {
        let trimmed = candidate.trim();
        match trimmed.parse::<chrono_tz::Tz>() {
            Ok(_) => Ok(Self(trimmed.to_string())),
            Err(_) => Err(SyncError::InvalidIdentifier {
                value: candidate.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The strongly typed timezone for local database lookups.
    pub fn tz(&self) -> chrono_tz::Tz {
        // Membership was checked at construction.
        self.0
            .parse::<chrono_tz::Tz>()
            .unwrap_or(chrono_tz::Tz::UTC)
    }
}

impl std::fmt::Display for Timezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Timezone {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Connection details for a managed host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Unique host identifier.
    pub id: HostId,
    /// Hostname or IP address (or `mock://...` for the mock transport).
    pub host: String,
    /// SSH user.
    pub user: String,
    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path to SSH identity file (`~` is expanded).
    pub identity_file: String,
}

fn default_port() -> u16 {
    22
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            id: HostId::new("default"),
            host: String::new(),
            user: "root".to_string(),
            port: 22,
            identity_file: "~/.ssh/id_rsa".to_string(),
        }
    }
}
