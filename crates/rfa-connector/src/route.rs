//! Routing from record classification to a persistence target
//!
//! Each classification maps to one fixed target database; each target may
//! carry its own connection string, with a single default as fallback.

use rfa_common::{Result, RfaError};
use std::collections::HashMap;
use tracing::warn;

use crate::record::Classification;

/// Target used before any probe header has been seen.
pub const DEFAULT_TARGET: &str = "TESTDB";

/// All known target databases, default first.
pub const ALL_TARGETS: [&str; 4] = [DEFAULT_TARGET, "TESTDB1", "TESTDB2", "TESTDB3"];

/// Select the target database for a record's classification.
pub fn target_database(classification: Option<Classification>) -> &'static str {
    match classification {
        Some(Classification::Scheidgut) => "TESTDB1",
        Some(Classification::Gekraetz) => "TESTDB2",
        Some(Classification::Other) => "TESTDB3",
        None => DEFAULT_TARGET,
    }
}

/// Resolved connection strings: one default, plus per-target overrides.
///
/// Built once at startup from `MSSQL_CONNECTION_STRING` and the optional
/// `MSSQL_<TARGET>_CONNECTION_STRING` keys.
#[derive(Debug, Clone)]
pub struct ConnectionMap {
    default: String,
    overrides: HashMap<String, String>,
}

impl ConnectionMap {
    pub fn new(default: String, overrides: HashMap<String, String>) -> Self {
        Self { default, overrides }
    }

    /// Resolve the connection string for a target, falling back to the
    /// default. An empty default is a configuration error, not retried.
    pub fn resolve(&self, target: &str) -> Result<&str> {
        if let Some(conn) = self.overrides.get(target) {
            return Ok(conn);
        }

        if self.default.is_empty() {
            return Err(RfaError::Config(format!(
                "no connection string configured for target {target} and no default set"
            )));
        }

        warn!(
            target_db = target,
            "No specific connection string found, using default connection string"
        );
        Ok(&self.default)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn map_with(default: &str, overrides: &[(&str, &str)]) -> ConnectionMap {
        ConnectionMap::new(
            default.to_string(),
            overrides
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn classification_maps_to_fixed_targets() {
        assert_eq!(target_database(Some(Classification::Scheidgut)), "TESTDB1");
        assert_eq!(target_database(Some(Classification::Gekraetz)), "TESTDB2");
        assert_eq!(target_database(Some(Classification::Other)), "TESTDB3");
        assert_eq!(target_database(None), DEFAULT_TARGET);
    }

    #[test]
    fn resolve_prefers_target_override() {
        let map = map_with("Server=default", &[("TESTDB1", "Server=one")]);
        assert_eq!(map.resolve("TESTDB1").unwrap(), "Server=one");
    }

    #[test]
    fn resolve_falls_back_to_default() {
        let map = map_with("Server=default", &[("TESTDB1", "Server=one")]);
        assert_eq!(map.resolve("TESTDB2").unwrap(), "Server=default");
    }

    #[test]
    fn resolve_without_default_is_a_config_error() {
        let map = map_with("", &[]);
        assert!(matches!(map.resolve("TESTDB3"), Err(RfaError::Config(_))));
    }
}
