//! SSH transport for remote command batches.
//!
//! The sole I/O boundary of the crate. A batch is an ordered list of command
//! lines joined into one `sh` script, so later commands can depend on state
//! established by earlier ones. Two execution modes are provided:
//! [`SshClient::run_batch`] surfaces transport failures and non-zero exits,
//! [`SshClient::run_batch_silent`] always returns whatever output was
//! captured.

use crate::commands::join_batch;
use crate::types::HostConfig;
use anyhow::{Context, Result, bail};
use openssh::{KnownHosts, Session, SessionBuilder, Stdio};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::{debug, info, warn};

/// Default SSH connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default command execution timeout. Must stay finite: once an apply batch
/// has been sent the side effect cannot be rolled back, but the caller must
/// not block indefinitely waiting for the channel.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of a remote command batch execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit code of the batch.
    pub exit_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Execution duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandResult {
    /// Check if the batch succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// SSH connection options.
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Command execution timeout.
    pub command_timeout: Duration,
    /// SSH control master mode for connection reuse.
    pub control_master: bool,
    /// Known hosts policy.
    pub known_hosts: KnownHostsPolicy,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            control_master: true,
            known_hosts: KnownHostsPolicy::Add,
        }
    }
}

/// Known hosts policy for SSH connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownHostsPolicy {
    /// Strictly verify known hosts (recommended for production).
    Strict,
    /// Add unknown hosts automatically (for development).
    Add,
    /// Accept all hosts without verification (INSECURE - testing only).
    AcceptAll,
}

/// SSH client for a single managed host.
pub struct SshClient {
    /// Host configuration.
    config: HostConfig,
    /// SSH options.
    options: SshOptions,
    /// Active SSH session (if connected).
    session: Option<Session>,
}

impl SshClient {
    /// Create a new SSH client for a host.
    pub fn new(config: HostConfig, options: SshOptions) -> Self {
        Self {
            config,
            options,
            session: None,
        }
    }

    /// Check if connected to the host.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Connect to the remote host.
    pub async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            debug!("Already connected to {}", self.config.id);
            return Ok(());
        }

        let destination = format!("{}@{}", self.config.user, self.config.host);
        debug!("Connecting to {} via SSH...", destination);

        let known_hosts = match self.options.known_hosts {
            KnownHostsPolicy::Strict => KnownHosts::Strict,
            KnownHostsPolicy::Add => KnownHosts::Add,
            KnownHostsPolicy::AcceptAll => KnownHosts::Accept,
        };

        let mut builder = SessionBuilder::default();
        builder
            .known_hosts_check(known_hosts)
            .connect_timeout(self.options.connect_timeout)
            .port(self.config.port);

        // Add identity file if specified
        let identity_path = shellexpand::tilde(&self.config.identity_file);
        if Path::new(identity_path.as_ref()).exists() {
            builder.keyfile(identity_path.as_ref());
        }

        // Enable control master for connection reuse
        if self.options.control_master {
            let control_dir = if let Some(runtime_dir) = dirs::runtime_dir() {
                runtime_dir.join("tzsync-ssh")
            } else {
                let username =
                    whoami::fallible::username().unwrap_or_else(|_| "unknown".to_string());
                std::env::temp_dir().join(format!("tzsync-ssh-{}", username))
            };

            if let Err(e) = std::fs::create_dir_all(&control_dir) {
                warn!(
                    "Failed to create SSH control directory {:?}: {}",
                    control_dir, e
                );
            }
            builder.control_directory(&control_dir);
        }

        let session = builder
            .connect(&destination)
            .await
            .with_context(|| format!("Failed to connect to {}", destination))?;

        info!("Connected to {} ({})", self.config.id, self.config.host);
        self.session = Some(session);
        Ok(())
    }

    /// Disconnect from the host.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            debug!("Disconnecting from {}", self.config.id);
            session.close().await?;
            info!("Disconnected from {}", self.config.id);
        }
        Ok(())
    }

    /// Execute a command batch, propagating failures.
    ///
    /// Any transport error or non-zero exit is surfaced to the caller with
    /// the captured stderr attached, so the underlying detail reaches the
    /// user verbatim.
    pub async fn run_batch(&self, commands: &[String]) -> Result<String> {
        let result = self.execute(&join_batch(commands)).await?;
        if !result.success() {
            bail!(
                "Remote batch failed on {} (exit {}): {}",
                self.config.id,
                result.exit_code,
                result.stderr.trim()
            );
        }
        Ok(result.stdout)
    }

    /// Execute a command batch, tolerating failures.
    ///
    /// Always returns whatever output was captured; a non-zero exit or
    /// transport failure yields the partial (possibly empty) stdout instead
    /// of an error. Used for the verification probe, whose outcome must not
    /// look like an apply failure.
    pub async fn run_batch_silent(&self, commands: &[String]) -> String {
        match self.execute(&join_batch(commands)).await {
            Ok(result) => {
                if !result.success() {
                    debug!(
                        "Silent batch on {} exited {} (output kept)",
                        self.config.id, result.exit_code
                    );
                }
                result.stdout
            }
            Err(e) => {
                warn!("Silent batch on {} failed: {}", self.config.id, e);
                String::new()
            }
        }
    }

    /// Execute a raw command string on the remote host.
    pub async fn execute(&self, command: &str) -> Result<CommandResult> {
        let session = self.session.as_ref().context("Not connected to host")?;

        let start = std::time::Instant::now();
        debug!("Executing on {}: {}", self.config.id, command);

        let mut child = session
            .command("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .await
            .with_context(|| format!("Failed to spawn command on {}", self.config.id))?;

        let execution_future = async {
            // Read stdout and stderr concurrently to avoid deadlock if one pipe fills.
            let stdout_handle = child.stdout().take();
            let stderr_handle = child.stderr().take();

            let stdout_fut = async {
                if let Some(out) = stdout_handle {
                    let mut reader = BufReader::new(out);
                    let mut buf = String::new();
                    reader.read_to_string(&mut buf).await?;
                    Ok::<String, anyhow::Error>(buf)
                } else {
                    Ok(String::new())
                }
            };

            let stderr_fut = async {
                if let Some(err) = stderr_handle {
                    let mut reader = BufReader::new(err);
                    let mut buf = String::new();
                    reader.read_to_string(&mut buf).await?;
                    Ok::<String, anyhow::Error>(buf)
                } else {
                    Ok(String::new())
                }
            };

            let (stdout, stderr) = tokio::try_join!(stdout_fut, stderr_fut)?;

            let status = child
                .wait()
                .await
                .with_context(|| "Failed to wait for command completion")?;

            Ok::<_, anyhow::Error>((status, stdout, stderr))
        };

        match tokio::time::timeout(self.options.command_timeout, execution_future).await {
            Ok(result) => {
                let (status, stdout, stderr) = result?;
                let duration = start.elapsed();
                let exit_code = status.code().unwrap_or(-1);

                debug!(
                    "Command completed on {} (exit={}, duration={}ms)",
                    self.config.id,
                    exit_code,
                    duration.as_millis()
                );

                Ok(CommandResult {
                    exit_code,
                    stdout,
                    stderr,
                    duration_ms: duration.as_millis() as u64,
                })
            }
            Err(_) => {
                // Timeout - the async block owns child and dropping it terminates the process.
                warn!(
                    "Command timed out on {} after {:?}",
                    self.config.id, self.options.command_timeout
                );
                bail!("Command timed out after {:?}", self.options.command_timeout);
            }
        }
    }

    /// Check if the host is reachable via SSH.
    pub async fn health_check(&self) -> Result<bool> {
        match self.execute("echo ok").await {
            Ok(result) => Ok(result.success() && result.stdout.trim() == "ok"),
            Err(e) => {
                warn!("Health check failed for {}: {}", self.config.id, e);
                Ok(false)
            }
        }
    }
}
