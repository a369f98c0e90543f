//! RFA Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging bootstrap for the RFA connector
//! workspace.
//!
//! # Example
//!
//! ```no_run
//! use rfa_common::{Result, RfaError};
//!
//! fn require(value: Option<&str>, key: &str) -> Result<String> {
//!     value
//!         .map(str::to_string)
//!         .ok_or_else(|| RfaError::Config(format!("missing key {key}")))
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, RfaError};
