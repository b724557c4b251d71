//! Namespace scoped access policy for Vault paths.
//!
//! Paths are `<area>/<scope>/<rest...>`. Certificates under `cert/` are
//! readable from everywhere, application secrets under `app/` only from the
//! namespace named by the scope segment or when the scope is shared.

use crate::config::AuthorizationConfig;
use crate::errors::{Result, SyncError};
use crate::observability::MetricsRecorder;
use std::collections::HashSet;
use tracing::error;

const CERT_AREA: &str = "cert";
const APP_AREA: &str = "app";

/// Decides whether a namespace may read a Vault path
#[derive(Debug, Clone, Default)]
pub struct PathAuthorizer {
    shared_paths: HashSet<String>,
    metrics: MetricsRecorder,
}

impl PathAuthorizer {
    /// Empty entries in `shared_paths` are ignored.
    pub fn new<I, S>(shared_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let shared_paths =
            shared_paths.into_iter().map(Into::into).filter(|s: &String| !s.is_empty()).collect();
        Self { shared_paths, metrics: MetricsRecorder::new() }
    }

    pub fn from_config(config: &AuthorizationConfig) -> Self {
        Self::new(config.shared_paths.iter().cloned())
    }

    pub fn is_shared(&self, scope: &str) -> bool {
        self.shared_paths.contains(scope)
    }

    /// Check that `namespace` may access `path`.
    ///
    /// Leading and trailing slashes are ignored.
    pub fn authorize(&self, namespace: &str, path: &str) -> Result<()> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(SyncError::invalid_path(path, "path is empty"));
        }

        let segments: Vec<&str> = trimmed.split('/').collect();
        match segments[0] {
            CERT_AREA => Ok(()),
            APP_AREA => {
                if segments.len() < 3 {
                    return Err(SyncError::invalid_path(
                        trimmed,
                        "app paths must be scoped as app/<namespace>/<name>",
                    ));
                }
                let scope = segments[1];
                if scope == namespace || self.is_shared(scope) {
                    Ok(())
                } else {
                    self.deny(namespace, trimmed)
                }
            }
            _ => self.deny(namespace, trimmed),
        }
    }

    fn deny(&self, namespace: &str, path: &str) -> Result<()> {
        error!(path = %path, namespace = %namespace, "Permission denied for vault path");
        self.metrics.record_permission_denied(namespace);
        Err(SyncError::permission_denied(path, namespace))
    }
}
