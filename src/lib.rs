//! tzsync - Remote Host Timezone Synchronization
//!
//! Changes a remote machine's system timezone over SSH, then verifies the
//! change independently by re-querying the machine and comparing the
//! reported abbreviation, UTC offset, and resolved identifier against an
//! expectation computed from the local timezone database. The apply batch
//! works across systemd and legacy sysvinit hosts without knowing in advance
//! which tools are installed.

#![deny(unsafe_code)]

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod mock;
pub mod probe;
pub mod ssh;
pub mod sync;
pub mod types;

pub use commands::{compose_apply, compose_probe, join_batch};
pub use config::{HostsConfig, SyncSettings};
pub use error::{ConfigError, SyncError};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use mock::{MockConfig, MockSshClient};
pub use probe::{TimezoneReading, expected_reading, format_offset, parse_probe};
pub use ssh::{CommandResult, KnownHostsPolicy, SshClient, SshOptions};
pub use sync::{MemoryStore, SettingsStore, SyncOutcome, TimezoneSync};
pub use types::{HostConfig, HostId, Timezone};
