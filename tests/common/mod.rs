//! Common test utilities for all integration tests.
//!
//! Provides a seeded in-memory KV store, engine wiring and fake token issuers.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vaultsync::config::AuthorizationConfig;
use vaultsync::secrets::{MemoryKvBackend, SecretString};
use vaultsync::session::{Lease, TokenIssuer};
use vaultsync::startup::build_sync;
use vaultsync::{Result, SecretSync, SyncError};

/// Memory backend seeded with the fixtures used across tests
pub fn seeded_backend() -> Arc<MemoryKvBackend> {
    let backend = Arc::new(MemoryKvBackend::new());
    backend.insert("app/payments/db", [("user", "payments"), ("password", "hunter2")]);
    backend.insert("app/payments/db", [("user", "payments"), ("password", "correct-horse")]);
    backend.insert("app/shared/registry", [("token", "registry-token"), ("user", "shared-user")]);
    backend.insert("app/shared/fizz", [("test", "fizzbuzz")]);
    backend.insert("app/other/db", [("password", "not-yours")]);
    backend.insert("cert/wildcard", [("tls.crt", "-----BEGIN CERTIFICATE-----")]);
    backend
}

/// Engine over `backend` with `shared` as shared scopes
pub fn sync_for(backend: Arc<MemoryKvBackend>, shared: &str) -> SecretSync {
    build_sync(backend, &AuthorizationConfig::from_csv(shared))
}

/// Token issuer with scripted AppRole behavior
#[derive(Debug, Default)]
pub struct ScriptedIssuer {
    pub logins: AtomicUsize,
    pub renewals: AtomicUsize,
    /// Number of initial logins that fail
    pub failing_logins: usize,
    pub lease: Duration,
    pub renewable: bool,
}

impl ScriptedIssuer {
    pub fn renewable(lease: Duration) -> Self {
        Self { lease, renewable: true, ..Default::default() }
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIssuer for ScriptedIssuer {
    async fn login_approle(&self, _: &str, role_id: &str, _: &SecretString) -> Result<Lease> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst);
        if n < self.failing_logins {
            return Err(SyncError::backend_with_status("connection refused", 503));
        }
        Ok(Lease {
            token: SecretString::new(format!("s.{}-{}", role_id, n + 1)),
            renewable: self.renewable,
            duration: self.lease,
        })
    }

    async fn renew_self(&self, _: Option<&str>) -> Result<Lease> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        Ok(Lease { token: SecretString::new(""), renewable: self.renewable, duration: self.lease })
    }

    fn install_token(&self, _: &SecretString) -> Result<()> {
        Ok(())
    }
}
