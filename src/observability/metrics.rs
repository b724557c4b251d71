//! # Metrics Collection
//!
//! Prometheus counters for resolution, generation and session activity.
//! Without an installed exporter the macros are no-ops.

use crate::config::ObservabilityConfig;
use crate::errors::{Result, SyncError};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Metrics recorder that tracks engine metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record a KV read or write against the store
    pub fn record_vault_operation(&self, operation: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        let labels = [("operation", operation.to_string()), ("status", status.to_string())];
        counter!("vault_operations_total", &labels).increment(1);
    }

    /// Record a check-and-set retry after a conflicting write
    pub fn record_cas_retry(&self) {
        counter!("vault_cas_retries_total").increment(1);
    }

    /// Record a generated value persisted for a missing location
    pub fn record_generated(&self, generator: &str) {
        let labels = [("generator", generator.to_string())];
        counter!("secret_values_generated_total", &labels).increment(1);
    }

    /// Record a denied path access
    pub fn record_permission_denied(&self, namespace: &str) {
        let labels = [("namespace", namespace.to_string())];
        counter!("path_authorization_denied_total", &labels).increment(1);
    }

    /// Record a key collision during import
    pub fn record_collision(&self, strategy: &str) {
        let labels = [("strategy", strategy.to_string())];
        counter!("secret_key_collisions_total", &labels).increment(1);
    }

    /// Record the outcome of one full resolution pass
    pub fn record_resolution(&self, success: bool, duration: f64) {
        let status = if success { "success" } else { "error" };
        counter!("secret_resolutions_total", "status" => status).increment(1);
        histogram!("secret_resolution_duration_seconds").record(duration);
    }

    /// Record a login attempt
    pub fn record_login(&self, method: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        let labels = [("method", method.to_string()), ("status", status.to_string())];
        counter!("vault_logins_total", &labels).increment(1);
    }

    /// Record a token renewal attempt
    pub fn record_renewal(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!("vault_token_renewals_total", "status" => status).increment(1);
    }

    /// Register metric descriptions
    pub fn register_metrics(&self) {
        describe_counter!("vault_operations_total", Unit::Count, "KV operations against Vault");
        describe_counter!(
            "vault_cas_retries_total",
            Unit::Count,
            "Writes retried after a check-and-set conflict"
        );
        describe_counter!(
            "secret_values_generated_total",
            Unit::Count,
            "Values generated for missing locations"
        );
        describe_counter!(
            "path_authorization_denied_total",
            Unit::Count,
            "Vault paths rejected by the path authorizer"
        );
        describe_counter!(
            "secret_key_collisions_total",
            Unit::Count,
            "Output key collisions during whole-path imports"
        );
        describe_counter!("secret_resolutions_total", Unit::Count, "VaultSecret resolution passes");
        describe_histogram!(
            "secret_resolution_duration_seconds",
            Unit::Seconds,
            "Duration of one resolution pass"
        );
        describe_counter!("vault_logins_total", Unit::Count, "Vault login attempts");
        describe_counter!("vault_token_renewals_total", Unit::Count, "Vault token renewals");
    }
}

/// Initialize metrics collection and Prometheus exporter
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        SyncError::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    let builder = PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name);

    builder
        .install()
        .map_err(|e| SyncError::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}
