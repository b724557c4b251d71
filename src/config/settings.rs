//! # Configuration Settings
//!
//! Defines the configuration structure for the vaultsync engine.

use crate::errors::{Result, SyncError};
use crate::secrets::SecretString;
use crate::session::AuthMethod;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Vault connection and credentials
    #[validate(nested)]
    pub vault: VaultConfig,

    /// Path authorization policy
    #[validate(nested)]
    pub authorization: AuthorizationConfig,

    /// Credential session timing
    #[validate(nested)]
    pub session: SessionConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(SyncError::from)?;
        self.validate_custom()?;
        Ok(())
    }

    fn validate_custom(&self) -> Result<()> {
        if !self.vault.address.starts_with("http://") && !self.vault.address.starts_with("https://")
        {
            return Err(SyncError::config("Vault address must start with 'http://' or 'https://'"));
        }

        if self.vault.role_id.is_some() != self.vault.secret_id.is_some() {
            return Err(SyncError::config("AppRole login needs both role_id and secret_id"));
        }

        Ok(())
    }
}

/// Vault server and credential configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct VaultConfig {
    /// Vault server address (e.g., "https://vault.example.com:8200")
    #[validate(length(min = 1, message = "Vault address cannot be empty"))]
    pub address: String,

    /// Vault namespace (for Enterprise multi-tenancy)
    pub namespace: Option<String>,

    /// Static client token, takes precedence over AppRole
    pub token: Option<SecretString>,

    /// AppRole role id
    pub role_id: Option<String>,

    /// AppRole secret id
    pub secret_id: Option<SecretString>,

    /// Mount of the AppRole auth engine
    #[validate(length(min = 1, message = "AppRole mount cannot be empty"))]
    pub approle_mount: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            namespace: None,
            token: None,
            role_id: None,
            secret_id: None,
            approle_mount: "approle".to_string(),
        }
    }
}

impl VaultConfig {
    /// Select the auth method: a non-empty token wins over AppRole
    /// credentials.
    pub fn auth_method(&self) -> Result<AuthMethod> {
        if let Some(token) = self.token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(AuthMethod::Token { token: token.clone() });
        }

        match (&self.role_id, &self.secret_id) {
            (Some(role_id), Some(secret_id)) if !role_id.is_empty() && !secret_id.is_empty() => {
                Ok(AuthMethod::AppRole {
                    mount: self.approle_mount.clone(),
                    role_id: role_id.clone(),
                    secret_id: secret_id.clone(),
                })
            }
            _ => Err(SyncError::AuthMethodMissing),
        }
    }

    /// Namespace, if one is set and not blank
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

/// Which Vault paths a namespace may read outside its own scope
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Second-level `app/` segments readable from every namespace
    pub shared_paths: Vec<String>,
}

impl AuthorizationConfig {
    /// Parse a comma separated list, skipping empty entries
    pub fn from_csv(value: &str) -> Self {
        Self {
            shared_paths: value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Credential session configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SessionConfig {
    /// How long startup waits for the first token
    #[validate(range(
        min = 1,
        max = 300,
        message = "Initial token timeout must be between 1 and 300 seconds"
    ))]
    pub initial_token_timeout_secs: u64,

    /// Pause between failed logins
    #[validate(range(min = 1, message = "Login retry delay must be at least 1ms"))]
    pub login_retry_delay_ms: u64,

    /// Requested lease increment on renewal, Vault decides when unset
    pub renew_increment_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { initial_token_timeout_secs: 10, login_retry_delay_ms: 500, renew_increment_secs: None }
    }
}

impl SessionConfig {
    pub fn initial_token_timeout(&self) -> Duration {
        Duration::from_secs(self.initial_token_timeout_secs)
    }

    pub fn login_retry_delay(&self) -> Duration {
        Duration::from_millis(self.login_retry_delay_ms)
    }

    /// Increment in the `"<n>s"` form Vault's renew endpoint takes
    pub fn renew_increment(&self) -> Option<String> {
        self.renew_increment_secs.map(|secs| format!("{}s", secs))
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus exporter
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,

    /// Service name attached to metrics
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: 9090,
            service_name: "vaultsync".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}
