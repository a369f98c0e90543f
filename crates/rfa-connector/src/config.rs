//! Configuration management
//!
//! Configuration is a key→value lookup backed by environment variables
//! (with `.env` support via dotenvy). Which keys are required depends on the
//! selected acquisition mode; everything is validated once at startup, and a
//! missing required key is fatal there.

use rfa_common::{Result, RfaError};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::route::{ConnectionMap, ALL_TARGETS};

// ============================================================================
// Configuration Keys
// ============================================================================

/// Boolean mode selector: `true` = TCP stream, `false` = directory watcher.
pub const KEY_ENABLE_TCP: &str = "ENABLE_TCP_CONNECTION";

/// Stream endpoint host (required in TCP mode).
pub const KEY_TCP_HOST: &str = "RFA_TCP_HOST";

/// Stream endpoint port (required in TCP mode).
pub const KEY_TCP_PORT: &str = "RFA_TCP_PORT";

/// Watched directory (required in file mode).
pub const KEY_DATA_DIRECTORY: &str = "DATA_REPORT_DIRECTORY";

/// Default SQL Server connection string (always required).
pub const KEY_DEFAULT_CONNECTION: &str = "MSSQL_CONNECTION_STRING";

/// Cap on concurrently processed files (optional).
pub const KEY_MAX_CONCURRENT_FILES: &str = "RFA_MAX_CONCURRENT_FILES";

/// Shutdown grace period in seconds (optional).
pub const KEY_SHUTDOWN_TIMEOUT: &str = "RFA_SHUTDOWN_TIMEOUT";

// ============================================================================
// Defaults
// ============================================================================

/// Default cap on concurrently processed files.
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 8;

/// Default shutdown grace period in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// The active acquisition mode; exactly one is selected at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// Persistent TCP stream from the analyzer.
    Tcp { host: String, port: u16 },
    /// Watched directory the analyzer drops report files into.
    FileWatch { directory: PathBuf },
}

/// Connector configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: AcquisitionMode,
    pub connections: ConnectionMap,
    pub max_concurrent_files: usize,
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key→value lookup.
    ///
    /// Factored out of [`Config::load`] so tests can drive it with a map
    /// instead of mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let enable_tcp = parse_bool(&require(&lookup, KEY_ENABLE_TCP)?)
            .ok_or_else(|| RfaError::Config(format!("{KEY_ENABLE_TCP} must be true or false")))?;

        let mode = if enable_tcp {
            let host = require(&lookup, KEY_TCP_HOST)?;
            let port = require(&lookup, KEY_TCP_PORT)?
                .parse::<u16>()
                .map_err(|_| RfaError::Config(format!("{KEY_TCP_PORT} must be a port number")))?;
            AcquisitionMode::Tcp { host, port }
        } else {
            let directory = PathBuf::from(require(&lookup, KEY_DATA_DIRECTORY)?);
            AcquisitionMode::FileWatch { directory }
        };

        let default_connection = require(&lookup, KEY_DEFAULT_CONNECTION)?;
        let mut overrides = HashMap::new();
        for target in ALL_TARGETS {
            let key = format!("MSSQL_{}_CONNECTION_STRING", target.to_uppercase());
            if let Some(conn) = lookup(&key).filter(|v| !v.is_empty()) {
                overrides.insert(target.to_string(), conn);
            }
        }

        let max_concurrent_files = lookup(KEY_MAX_CONCURRENT_FILES)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONCURRENT_FILES);

        let shutdown_timeout_secs = lookup(KEY_SHUTDOWN_TIMEOUT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS);

        let config = Config {
            mode,
            connections: ConnectionMap::new(default_connection, overrides),
            max_concurrent_files,
            shutdown_timeout_secs,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match &self.mode {
            AcquisitionMode::Tcp { host, port } => {
                if host.is_empty() {
                    return Err(RfaError::Config(format!("{KEY_TCP_HOST} cannot be empty")));
                }
                if *port == 0 {
                    return Err(RfaError::Config(format!(
                        "{KEY_TCP_PORT} must be greater than 0"
                    )));
                }
            },
            AcquisitionMode::FileWatch { directory } => {
                if directory.as_os_str().is_empty() {
                    return Err(RfaError::Config(format!(
                        "{KEY_DATA_DIRECTORY} cannot be empty"
                    )));
                }
            },
        }

        if self.max_concurrent_files == 0 {
            return Err(RfaError::Config(format!(
                "{KEY_MAX_CONCURRENT_FILES} must be greater than 0"
            )));
        }

        Ok(())
    }
}

/// Look up a required key; absence is a configuration error.
fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RfaError::Config(format!("Configuration for {key} not found")))
}

/// Parse a boolean configuration value, case-insensitively.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
