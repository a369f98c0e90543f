//! Error types for the RFA connector

use thiserror::Error;

/// Result type alias for RFA connector operations
pub type Result<T> = std::result::Result<T, RfaError>;

/// Main error type for the RFA connector
#[derive(Error, Debug)]
pub enum RfaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
