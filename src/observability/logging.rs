//! # Structured Logging
//!
//! Provides the subscriber setup and span macros used across the engine.
//! Secret values never appear in fields, only paths, keys and counts.

use crate::config::ObservabilityConfig;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Create a tracing span for a Vault KV operation.
///
/// ```rust,ignore
/// let span = vault_span!("read", "app/payments/db");
/// let span = vault_span!("write", "app/payments/db", cas = 3);
/// ```
#[macro_export]
macro_rules! vault_span {
    ($operation:expr, $path:expr) => {
        tracing::debug_span!(
            "vault_operation",
            operation = %$operation,
            path = %$path,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $path:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "vault_operation",
            operation = %$operation,
            path = %$path,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for resolving one VaultSecret object.
#[macro_export]
macro_rules! resolve_span {
    ($namespace:expr, $name:expr) => {
        tracing::info_span!(
            "resolve_secret",
            namespace = %$namespace,
            name = %$name,
            resolution_id = %uuid::Uuid::new_v4()
        )
    };
    ($namespace:expr, $name:expr, $($field:tt)*) => {
        tracing::info_span!(
            "resolve_secret",
            namespace = %$namespace,
            name = %$name,
            resolution_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global fmt subscriber writing to stderr.
///
/// `RUST_LOG` wins over the configured level. Calling this twice is harmless;
/// the second subscriber is dropped.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let result = if config.json_logging {
        tracing::subscriber::set_global_default(
            FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .finish(),
        )
    } else {
        tracing::subscriber::set_global_default(
            FmtSubscriber::builder().with_env_filter(filter).with_writer(std::io::stderr).finish(),
        )
    };

    if result.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    let auth_method = config.vault.auth_method().map(|m| m.name()).unwrap_or("none");
    tracing::info!(
        vault_address = %config.vault.address,
        vault_namespace = ?config.vault.namespace(),
        auth_method = %auth_method,
        shared_paths = config.authorization.shared_paths.len(),
        metrics_enabled = %config.observability.enable_metrics,
        "vaultsync configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = vault_span!("read", "app/ns/db");
        let _span = vault_span!("write", "app/ns/db", cas = 3);
        let _span = resolve_span!("payments", "db-credentials");
        let _span = resolve_span!("payments", "db-credentials", fields = 2);
    }

    #[test]
    fn test_log_config_info() {
        let config = crate::config::AppConfig::default();

        // This should not panic
        log_config_info(&config);
    }

    #[test]
    fn test_init_logging_twice() {
        let config = ObservabilityConfig::default();
        init_logging(&config);
        init_logging(&config);
    }
}
