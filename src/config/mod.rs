//! Configuration loading and management
//!
//! ```yaml
//! security:
//!   idp_user_name_claim: preferred_username
//!   refresh_interval: 3600000
//! db_contexts:
//!   HitsContext: "sqlite://hits.db?mode=rwc"
//!   AppUserRolesContext: "sqlite://hits.db?mode=rwc"
//! count_cache:
//!   expiration_seconds: 60
//! fake_user: Maria
//! ```

use crate::core::count_cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TOLERANCE};
use crate::core::error::{ConfigError, CrudResult};
use crate::security::options::SecurityOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Environment variable overriding [`AppConfig::fake_user`]
pub const FAKE_USER_ENV: &str = "FAKE_USER";

/// Settings for the per-entity count caches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CountCacheConfig {
    /// Age in seconds after which a cached count is recomputed
    pub expiration_seconds: f64,

    /// Maximum number of cached filter fingerprints per entity
    pub max_entries: usize,
}

impl Default for CountCacheConfig {
    fn default() -> Self {
        Self {
            expiration_seconds: DEFAULT_TOLERANCE.as_secs_f64(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CountCacheConfig {
    pub fn tolerance(&self) -> Duration {
        Duration::try_from_secs_f64(self.expiration_seconds).unwrap_or(DEFAULT_TOLERANCE)
    }
}

/// Settings for the user-to-role cache
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RolesCacheConfig {
    pub max_entries: usize,
}

impl Default for RolesCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub security: SecurityOptions,

    /// Connection strings keyed by context name (e.g., "HitsContext")
    pub db_contexts: HashMap<String, String>,

    pub count_cache: CountCacheConfig,

    pub roles_cache: RolesCacheConfig,

    /// User name every request is authenticated as (development only)
    pub fake_user: Option<String>,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> CrudResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str::<Self>(&content)
            .map(Self::with_env_overrides)
            .map_err(|e| {
                ConfigError::ParseError {
                    file: Some(path.to_string()),
                    message: e.to_string(),
                }
                .into()
            })
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> CrudResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(user) = std::env::var(FAKE_USER_ENV) {
            if !user.trim().is_empty() {
                self.fake_user = Some(user);
            }
        }
        self
    }

    /// Register a connection string for a context
    pub fn with_db_context(mut self, name: &str, connection_string: &str) -> Self {
        self.db_contexts
            .insert(name.to_string(), connection_string.to_string());
        self
    }

    /// The connection string configured for a context
    pub fn connection_string(&self, context_name: &str) -> CrudResult<&str> {
        self.db_contexts
            .get(context_name)
            .map(String::as_str)
            .ok_or_else(|| {
                ConfigError::MissingField {
                    field: format!("db_contexts.{}", context_name),
                    context: "application configuration".to_string(),
                }
                .into()
            })
    }

    /// The configured fake user, or a configuration error
    pub fn required_fake_user(&self) -> CrudResult<&str> {
        self.fake_user
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::MissingField {
                    field: "fake_user".to_string(),
                    context: "application configuration".to_string(),
                }
                .into()
            })
    }
}
