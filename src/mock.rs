//! Mock transport layer for testing.
//!
//! Provides a mock SSH client for deterministic testing without real network
//! dependencies. Enable mock mode by setting `TZSYNC_MOCK_SSH=1`, or use a
//! `mock://` host.

use crate::commands::join_batch;
use crate::ssh::CommandResult;
use crate::types::{HostConfig, HostId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;
use tracing::debug;

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

#[derive(Debug, Default, Clone)]
struct MockOverrides {
    enabled: Option<bool>,
    ssh_config: Option<MockConfig>,
}

fn overrides() -> &'static Mutex<MockOverrides> {
    static OVERRIDES: OnceLock<Mutex<MockOverrides>> = OnceLock::new();
    OVERRIDES.get_or_init(|| Mutex::new(MockOverrides::default()))
}

/// Set or clear the mock enabled override (test helper).
pub fn set_mock_enabled_override(enabled: Option<bool>) {
    overrides().lock().unwrap().enabled = enabled;
}

/// Set or clear the mock SSH config override (test helper).
pub fn set_mock_ssh_config_override(config: Option<MockConfig>) {
    overrides().lock().unwrap().ssh_config = config;
}

/// Clear all mock overrides.
pub fn clear_mock_overrides() {
    let mut guard = overrides().lock().unwrap();
    guard.enabled = None;
    guard.ssh_config = None;
}

/// Check if mock mode is enabled via override or environment variable.
pub fn is_mock_enabled() -> bool {
    if let Some(enabled) = overrides().lock().unwrap().enabled {
        return enabled;
    }
    env_flag("TZSYNC_MOCK_SSH")
}

/// Check if a host string indicates mock mode (mock://).
pub fn is_mock_host(host: &str) -> bool {
    host.starts_with("mock://")
}

fn global_invocations() -> &'static Mutex<Vec<MockInvocation>> {
    static GLOBAL: OnceLock<Mutex<Vec<MockInvocation>>> = OnceLock::new();
    GLOBAL.get_or_init(|| Mutex::new(Vec::new()))
}

/// Clear the global mock invocation log.
pub fn clear_global_invocations() {
    global_invocations().lock().unwrap().clear();
}

/// Snapshot global mock invocations.
pub fn global_invocations_snapshot() -> Vec<MockInvocation> {
    global_invocations().lock().unwrap().clone()
}

/// Recorded invocation for mock verification.
#[derive(Debug, Clone)]
pub struct MockInvocation {
    /// Host the invocation was made against.
    pub host_id: HostId,
    /// Script that was executed (if applicable).
    pub command: Option<String>,
    /// Whether failures were propagated (false for the silent probe mode).
    pub propagate_errors: bool,
    /// Timestamp of invocation.
    pub timestamp: std::time::SystemTime,
}

/// Configuration for mock behavior.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Default exit code for commands.
    pub default_exit_code: i32,
    /// Default stdout for commands.
    pub default_stdout: String,
    /// Default stderr for commands.
    pub default_stderr: String,
    /// Simulate connection failure.
    pub fail_connect: bool,
    /// Simulate command failure (transport-level).
    pub fail_execute: bool,
    /// Script-specific results (full joined script -> result).
    pub command_results: HashMap<String, CommandResult>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            default_exit_code: 0,
            default_stdout: String::new(),
            default_stderr: String::new(),
            fail_connect: false,
            fail_execute: false,
            command_results: HashMap::new(),
        }
    }
}

impl MockConfig {
    /// Create a config that simulates successful operations.
    pub fn success() -> Self {
        Self::default()
    }

    /// Create a config that simulates connection failure.
    pub fn connection_failure() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    /// Create a config that simulates command failure.
    pub fn command_failure(exit_code: i32, stderr: &str) -> Self {
        Self {
            default_exit_code: exit_code,
            default_stderr: stderr.to_string(),
            ..Self::default()
        }
    }

    /// Add a specific result for a full batch script.
    pub fn with_command_result(mut self, script: &str, result: CommandResult) -> Self {
        self.command_results.insert(script.to_string(), result);
        self
    }

    /// Set default stdout.
    pub fn with_stdout(mut self, stdout: &str) -> Self {
        self.default_stdout = stdout.to_string();
        self
    }

    /// Build mock config from the active override or environment variables.
    pub fn from_env() -> Self {
        if let Some(config) = overrides().lock().unwrap().ssh_config.clone() {
            return config;
        }

        let mut config = MockConfig::default();

        if let Ok(val) = std::env::var("TZSYNC_MOCK_SSH_EXIT_CODE")
            && let Ok(code) = val.parse()
        {
            config.default_exit_code = code;
        }
        if let Ok(val) = std::env::var("TZSYNC_MOCK_SSH_STDOUT") {
            config.default_stdout = val;
        }
        if let Ok(val) = std::env::var("TZSYNC_MOCK_SSH_STDERR") {
            config.default_stderr = val;
        }
        config.fail_connect = env_flag("TZSYNC_MOCK_SSH_FAIL_CONNECT");
        config.fail_execute = env_flag("TZSYNC_MOCK_SSH_FAIL_EXECUTE");

        config
    }
}

/// Mock SSH client for testing.
pub struct MockSshClient {
    /// Host configuration.
    config: HostConfig,
    /// Mock behavior configuration.
    mock_config: MockConfig,
    /// Whether currently "connected".
    connected: bool,
    /// Recorded invocations.
    invocations: Arc<Mutex<Vec<MockInvocation>>>,
}

impl MockSshClient {
    /// Create a new mock SSH client.
    pub fn new(config: HostConfig, mock_config: MockConfig) -> Self {
        Self {
            config,
            mock_config,
            connected: false,
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create with default mock config.
    pub fn new_default(config: HostConfig) -> Self {
        Self::new(config, MockConfig::default())
    }

    /// Check if "connected".
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Get recorded invocations.
    pub fn invocations(&self) -> Vec<MockInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    fn record(&self, command: Option<String>, propagate_errors: bool) {
        let invocation = MockInvocation {
            host_id: self.config.id.clone(),
            command,
            propagate_errors,
            timestamp: std::time::SystemTime::now(),
        };

        self.invocations.lock().unwrap().push(invocation.clone());
        global_invocations().lock().unwrap().push(invocation);
    }

    /// Simulate connecting to the host.
    pub async fn connect(&mut self) -> anyhow::Result<()> {
        debug!("Connecting to mock host {}", self.config.id);
        self.record(None, true);

        if self.mock_config.fail_connect {
            return Err(anyhow::anyhow!(
                "Mock: Connection failed to {}",
                self.config.id
            ));
        }

        self.connected = true;
        Ok(())
    }

    /// Simulate disconnecting from the host.
    pub async fn disconnect(&mut self) -> anyhow::Result<()> {
        debug!("Disconnecting from mock host {}", self.config.id);
        self.connected = false;
        Ok(())
    }

    fn lookup(&self, script: &str, start: Instant) -> CommandResult {
        if let Some(result) = self.mock_config.command_results.get(script) {
            return result.clone();
        }
        CommandResult {
            exit_code: self.mock_config.default_exit_code,
            stdout: self.mock_config.default_stdout.clone(),
            stderr: self.mock_config.default_stderr.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Simulate executing a batch, propagating failures.
    pub async fn run_batch(&self, commands: &[String]) -> anyhow::Result<String> {
        let script = join_batch(commands);
        let start = Instant::now();
        self.record(Some(script.clone()), true);

        if !self.connected {
            anyhow::bail!("Mock: Not connected to host");
        }
        if self.mock_config.fail_execute {
            anyhow::bail!("Mock: Command execution failed");
        }

        let result = self.lookup(&script, start);
        if !result.success() {
            anyhow::bail!(
                "Remote batch failed on {} (exit {}): {}",
                self.config.id,
                result.exit_code,
                result.stderr.trim()
            );
        }
        Ok(result.stdout)
    }

    /// Simulate executing a batch, tolerating failures.
    pub async fn run_batch_silent(&self, commands: &[String]) -> String {
        let script = join_batch(commands);
        let start = Instant::now();
        self.record(Some(script.clone()), false);

        if !self.connected || self.mock_config.fail_execute {
            return String::new();
        }
        self.lookup(&script, start).stdout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_host() -> HostConfig {
        HostConfig {
            id: HostId::new("mock-host"),
            host: "mock://localhost".to_string(),
            user: "mockuser".to_string(),
            port: 22,
            identity_file: "~/.ssh/mock".to_string(),
        }
    }

    #[test]
    fn test_is_mock_host() {
        assert!(is_mock_host("mock://localhost"));
        assert!(!is_mock_host("localhost"));
        assert!(!is_mock_host("192.168.1.1"));
        assert!(!is_mock_host(""));
    }

    #[test]
    fn test_mock_config_command_failure() {
        let config = MockConfig::command_failure(1, "error message");
        assert_eq!(config.default_exit_code, 1);
        assert_eq!(config.default_stderr, "error message");
    }

    #[tokio::test]
    async fn test_mock_client_connect_and_run() {
        let mut client =
            MockSshClient::new(mock_host(), MockConfig::default().with_stdout("test output"));
        assert!(!client.is_connected());

        client.connect().await.unwrap();
        assert!(client.is_connected());

        let stdout = client
            .run_batch(&["echo test".to_string()])
            .await
            .unwrap();
        assert_eq!(stdout, "test output");

        let invocations = client.invocations();
        assert_eq!(invocations.len(), 2); // connect + run
        assert_eq!(invocations[1].command, Some("echo test".to_string()));
        assert!(invocations[1].propagate_errors);
    }

    #[tokio::test]
    async fn test_mock_client_connection_failure() {
        let mut client = MockSshClient::new(mock_host(), MockConfig::connection_failure());
        assert!(client.connect().await.is_err());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_mock_client_propagates_nonzero_exit() {
        let mut client =
            MockSshClient::new(mock_host(), MockConfig::command_failure(1, "boom"));
        client.connect().await.unwrap();

        let err = client
            .run_batch(&["false".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit 1"));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_mock_client_silent_mode_never_fails() {
        let mut client = MockSshClient::new(
            mock_host(),
            MockConfig::command_failure(1, "ignored").with_stdout("partial"),
        );
        client.connect().await.unwrap();

        let stdout = client.run_batch_silent(&["probe".to_string()]).await;
        assert_eq!(stdout, "partial");

        let invocations = client.invocations();
        assert!(!invocations[1].propagate_errors);
    }

    #[tokio::test]
    async fn test_mock_client_scripted_result() {
        let scripted = CommandResult {
            exit_code: 0,
            stdout: "CET +01:00\nEurope/Berlin\n".to_string(),
            stderr: String::new(),
            duration_ms: 1,
        };
        let mut client = MockSshClient::new(
            mock_host(),
            MockConfig::success().with_command_result("probe-script", scripted),
        );
        client.connect().await.unwrap();

        let stdout = client
            .run_batch_silent(&["probe-script".to_string()])
            .await;
        assert_eq!(stdout, "CET +01:00\nEurope/Berlin\n");
    }
}
