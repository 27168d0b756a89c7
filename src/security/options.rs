//! Security settings shared by the CRUD services and role resolution

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Security settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SecurityOptions {
    /// Claim type holding the user name issued by the identity provider
    pub idp_user_name_claim: String,

    /// Lifetime of a cached role, in milliseconds
    pub refresh_interval: u64,
}

impl Default for SecurityOptions {
    fn default() -> Self {
        Self {
            idp_user_name_claim: "preferred_username".to_string(),
            refresh_interval: 60 * 60 * 1000,
        }
    }
}

impl SecurityOptions {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval)
    }
}
