//! Configuration types

use crate::{ConfigError, UopError, UopResult};
use serde::{Deserialize, Serialize};

/// Client session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Walk every association index for consistency before pushing a commit.
    pub verify_on_commit: bool,
    /// Populate association buckets when objects are loaded.
    pub load_associations: bool,
    /// Maximum nesting depth followed when expanding group containment.
    pub max_group_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            verify_on_commit: true,
            load_associations: true,
            max_group_depth: 32,
        }
    }
}

impl ClientConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable index verification on commit.
    pub fn with_verify_on_commit(mut self, enabled: bool) -> Self {
        self.verify_on_commit = enabled;
        self
    }

    /// Enable or disable association loading alongside objects.
    pub fn with_load_associations(mut self, enabled: bool) -> Self {
        self.load_associations = enabled;
        self
    }

    /// Set the maximum group nesting depth.
    pub fn with_max_group_depth(mut self, depth: usize) -> Self {
        self.max_group_depth = depth;
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `UOP_CLIENT_VERIFY_ON_COMMIT`: verify indices before commit (default: true)
    /// - `UOP_CLIENT_LOAD_ASSOCIATIONS`: load associations with objects (default: true)
    /// - `UOP_CLIENT_MAX_GROUP_DEPTH`: group nesting limit (default: 32)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            verify_on_commit: std::env::var("UOP_CLIENT_VERIFY_ON_COMMIT")
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(defaults.verify_on_commit),
            load_associations: std::env::var("UOP_CLIENT_LOAD_ASSOCIATIONS")
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(defaults.load_associations),
            max_group_depth: std::env::var("UOP_CLIENT_MAX_GROUP_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_group_depth),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> UopResult<()> {
        if self.max_group_depth == 0 {
            return Err(UopError::Config(ConfigError::InvalidValue {
                field: "max_group_depth".to_string(),
                value: self.max_group_depth.to_string(),
                reason: "max_group_depth must be greater than 0".to_string(),
            }));
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
