//! # Configuration Management
//!
//! Configuration is layered: built-in defaults, then an optional file, then
//! `VAULTSYNC__*` environment variables (e.g. `VAULTSYNC__VAULT__ADDRESS`).
//! The CLI applies its own flags and `VAULT_*` variables on top.

pub mod settings;

pub use settings::{
    AppConfig, AuthorizationConfig, ObservabilityConfig, SessionConfig, VaultConfig,
};

use crate::errors::Result;
use std::path::Path;

/// Environment prefix for layered configuration
pub const ENV_PREFIX: &str = "VAULTSYNC";

impl AppConfig {
    /// Load configuration from an optional file plus the environment.
    ///
    /// A missing file is not an error. The result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("authorization.shared_paths"),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
