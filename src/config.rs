//! Host inventory configuration.
//!
//! Loads the managed host list from a TOML file, with an environment
//! override for the path. Transport behavior (timeouts, known-hosts policy)
//! belongs to [`crate::ssh::SshOptions`]; this file only describes *which*
//! hosts exist.

use crate::error::ConfigError;
use crate::ssh::SshOptions;
use crate::types::HostConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable to override the config file location.
pub const ENV_HOSTS_CONFIG: &str = "TZSYNC_HOSTS_CONFIG";

/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "hosts.toml";

/// Settings applied to every sync attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// SSH connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Remote command timeout in seconds. Must be finite: once an apply
    /// batch is sent it cannot be rolled back, but callers may not block
    /// forever on the channel.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_command_timeout_secs() -> u64 {
    120
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl SyncSettings {
    /// Transport options carrying these timeouts.
    pub fn ssh_options(&self) -> SshOptions {
        SshOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            ..SshOptions::default()
        }
    }
}

/// Complete host inventory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostsConfig {
    /// Sync-wide settings.
    #[serde(default)]
    pub settings: SyncSettings,

    /// List of managed hosts.
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

impl HostsConfig {
    /// Load configuration from the default path or environment override.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_path())
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: HostsConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the inventory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for host in &self.hosts {
            let count = seen.entry(host.id.as_str()).or_insert(0);
            *count += 1;
            if *count > 1 {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate host id '{}'",
                    host.id
                )));
            }
            if host.host.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "host '{}' has an empty address",
                    host.id
                )));
            }
            if host.user.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "host '{}' has an empty user",
                    host.id
                )));
            }
        }
        Ok(())
    }

    /// Find a host by id.
    pub fn host(&self, id: &str) -> Option<&HostConfig> {
        self.hosts.iter().find(|h| h.id.as_str() == id)
    }
}

fn config_path() -> PathBuf {
    std::env::var(ENV_HOSTS_CONFIG)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}
