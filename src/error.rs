//! Typed errors for tzsync.
//!
//! Only conditions that abort an attempt before it produces an outcome live
//! here. Post-apply failures (`ApplyFailed`, `Mismatch`, `MalformedProbe`)
//! are data, carried by [`crate::sync::SyncOutcome`], so their diagnostic
//! detail survives to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised before any remote side effect is issued.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The candidate value is not a recognized IANA timezone identifier.
    /// Detected before any remote contact; recoverable by prompting for a
    /// different value.
    #[error("'{value}' is not a valid IANA timezone identifier (e.g. 'Europe/Berlin')")]
    InvalidIdentifier { value: String },
}

/// Errors loading the host inventory.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Hosts config not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read hosts config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse hosts config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid hosts config: {0}")]
    ValidationError(String),
}
