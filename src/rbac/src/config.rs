//! Engine configuration
//!
//! Defaults are usable as-is. `RbacConfig::from_env` overlays `RBAC_*` environment
//! variables:
//!
//! - `RBAC_MAX_DEPTH` - maximum hierarchy level (default: 10)
//! - `RBAC_EXCLUDE_SYSTEM_PARENTS` - hide system roles from eligible parents (default: true)
//! - `RBAC_DELETE_POLICY` - `reject` or `reparent` (default: reject)
//! - `RBAC_CACHE_ENABLED` - cache effective permissions (default: true)
//! - `RBAC_CACHE_SIZE` - cache capacity (default: 10000)
//! - `RBAC_CACHE_TTL` - cache TTL in seconds (default: 60)
//! - `RBAC_METRICS_ENABLED` - collect metrics (default: true)
//! - `RBAC_AUDIT_CAPACITY` - retained audit entries (default: 1000)
//! - `RBAC_LOG_LEVEL` - fallback log filter when `RUST_LOG` is unset (default: info)

use crate::error::{RbacError, Result};
use crate::types::MAX_DEPTH;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// What happens to the children of a deleted role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Refuse to delete a role that still has children
    #[default]
    Reject,
    /// Move the children to the deleted role's parent
    #[serde(alias = "reparent")]
    ReparentToGrandparent,
}

impl FromStr for DeletePolicy {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "reparent" | "reparent_to_grandparent" => Ok(Self::ReparentToGrandparent),
            other => Err(RbacError::Configuration(format!(
                "unknown delete policy '{}'",
                other
            ))),
        }
    }
}

/// RBAC engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbacConfig {
    /// Maximum hierarchy level (root is level 0)
    pub max_depth: u32,

    /// Hide system roles from eligible parent lists
    pub exclude_system_parents: bool,

    /// Children handling on delete
    pub delete_policy: DeletePolicy,

    /// Cache effective permission sets
    pub enable_cache: bool,

    /// Maximum cached entries
    pub cache_capacity: usize,

    /// Cached entry lifetime in seconds
    pub cache_ttl_secs: u64,

    /// Collect engine metrics
    pub enable_metrics: bool,

    /// Retained audit entries
    pub audit_capacity: usize,

    /// Fallback log filter
    pub log_level: String,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            exclude_system_parents: true,
            delete_policy: DeletePolicy::Reject,
            enable_cache: true,
            cache_capacity: 10_000,
            cache_ttl_secs: 60,
            enable_metrics: true,
            audit_capacity: 1_000,
            log_level: "info".to_string(),
        }
    }
}

impl RbacConfig {
    /// Load defaults overlaid with `RBAC_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment, secrets file, test map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("RBAC_MAX_DEPTH") {
            config.max_depth = parse_var("RBAC_MAX_DEPTH", &v)?;
        }
        if let Some(v) = lookup("RBAC_EXCLUDE_SYSTEM_PARENTS") {
            config.exclude_system_parents = parse_bool("RBAC_EXCLUDE_SYSTEM_PARENTS", &v)?;
        }
        if let Some(v) = lookup("RBAC_DELETE_POLICY") {
            config.delete_policy = v.parse()?;
        }
        if let Some(v) = lookup("RBAC_CACHE_ENABLED") {
            config.enable_cache = parse_bool("RBAC_CACHE_ENABLED", &v)?;
        }
        if let Some(v) = lookup("RBAC_CACHE_SIZE") {
            config.cache_capacity = parse_var("RBAC_CACHE_SIZE", &v)?;
        }
        if let Some(v) = lookup("RBAC_CACHE_TTL") {
            config.cache_ttl_secs = parse_var("RBAC_CACHE_TTL", &v)?;
        }
        if let Some(v) = lookup("RBAC_METRICS_ENABLED") {
            config.enable_metrics = parse_bool("RBAC_METRICS_ENABLED", &v)?;
        }
        if let Some(v) = lookup("RBAC_AUDIT_CAPACITY") {
            config.audit_capacity = parse_var("RBAC_AUDIT_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("RBAC_LOG_LEVEL") {
            config.log_level = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(RbacError::Configuration(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.enable_cache && self.cache_capacity == 0 {
            return Err(RbacError::Configuration(
                "cache_capacity must be positive when the cache is enabled".to_string(),
            ));
        }
        if self.audit_capacity == 0 {
            return Err(RbacError::Configuration(
                "audit_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Cache TTL as a duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RbacError::Configuration(format!("{} has invalid value '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RbacError::Configuration(format!(
            "{} has invalid boolean '{}'",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RbacConfig::default();
        assert_eq!(config.max_depth, 10);
        assert!(config.exclude_system_parents);
        assert_eq!(config.delete_policy, DeletePolicy::Reject);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let config = RbacConfig::from_lookup(lookup(&[
            ("RBAC_MAX_DEPTH", "5"),
            ("RBAC_DELETE_POLICY", "reparent"),
            ("RBAC_CACHE_ENABLED", "off"),
            ("RBAC_EXCLUDE_SYSTEM_PARENTS", "false"),
            ("RBAC_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.max_depth, 5);
        assert_eq!(config.delete_policy, DeletePolicy::ReparentToGrandparent);
        assert!(!config.enable_cache);
        assert!(!config.exclude_system_parents);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            RbacConfig::from_lookup(lookup(&[("RBAC_MAX_DEPTH", "ten")])),
            Err(RbacError::Configuration(_))
        ));
        assert!(matches!(
            RbacConfig::from_lookup(lookup(&[("RBAC_MAX_DEPTH", "0")])),
            Err(RbacError::Configuration(_))
        ));
        assert!(matches!(
            RbacConfig::from_lookup(lookup(&[("RBAC_CACHE_ENABLED", "maybe")])),
            Err(RbacError::Configuration(_))
        ));
        assert!(matches!(
            RbacConfig::from_lookup(lookup(&[("RBAC_DELETE_POLICY", "cascade")])),
            Err(RbacError::Configuration(_))
        ));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RbacConfig =
            serde_json::from_str(r#"{"max_depth": 4, "delete_policy": "reparent"}"#).unwrap();
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.delete_policy, DeletePolicy::ReparentToGrandparent);
        assert_eq!(config.cache_capacity, 10_000);
    }
}
