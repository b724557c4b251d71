//! # vaultsync
//!
//! Derives secrets from HashiCorp Vault KV v2 data. A declarative
//! `VaultSecret` names single fields, generated values, templates and
//! whole-path imports; the engine resolves them on behalf of a namespace
//! and hands a complete value map to a sink.
//!
//! ## Architecture
//!
//! ```text
//! VaultSecret → SecretSync → SecretAssembler → SecretValueResolver → SecretStore → KvBackend
//!                                                   ↓         ↓
//!                                          PathAuthorizer  GeneratorEngine
//!
//! SessionManager (token / AppRole) → VaultConnection
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use vaultsync::{config::AppConfig, startup::connect, Result};
//!
//! # async fn run(object: vaultsync::domain::VaultSecret) -> Result<()> {
//! let config = AppConfig::load(None)?;
//! let engine = connect(&config).await?;
//! let rendered = engine.sync.render(&object).await?;
//! println!("{}", rendered.to_yaml()?);
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod secrets;
pub mod session;
pub mod startup;
pub mod sync;

pub use config::AppConfig;
pub use errors::{Result, SyncError};
pub use sync::{RenderedSecret, SecretSink, SecretSync};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "vaultsync");
    }
}
