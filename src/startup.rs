//! Startup sequence for the sync engine
//!
//! Wires configuration into a running engine:
//! - Vault connection and auth method selection
//! - Credential session with the initial token wait
//! - Store, authorizer, resolver and assembler behind [`SecretSync`]

use crate::config::{AppConfig, AuthorizationConfig};
use crate::errors::Result;
use crate::observability::MetricsRecorder;
use crate::secrets::{
    KvBackend, PathAuthorizer, SecretAssembler, SecretStore, SecretValueResolver, VaultConnection,
    VaultKvBackend,
};
use crate::session::SessionManager;
use crate::sync::SecretSync;
use std::sync::Arc;
use tracing::info;

/// A connected engine. Dropping it closes the credential session.
#[derive(Debug)]
pub struct Engine {
    pub sync: SecretSync,
    pub session: SessionManager,
}

impl Engine {
    /// Stop token renewal and wait for the background task to end.
    pub async fn shutdown(self) {
        self.session.shutdown().await;
    }
}

/// Build a [`SecretSync`] over any KV backend.
pub fn build_sync(backend: Arc<dyn KvBackend>, authorization: &AuthorizationConfig) -> SecretSync {
    let store = SecretStore::new(backend);
    let authorizer = PathAuthorizer::from_config(authorization);
    SecretSync::new(SecretAssembler::new(SecretValueResolver::new(store, authorizer)))
}

/// Connect to Vault, obtain the first token and build the engine.
///
/// Fails when no auth method is configured or no token arrives within
/// `session.initial_token_timeout_secs`.
pub async fn connect(config: &AppConfig) -> Result<Engine> {
    let connection =
        Arc::new(VaultConnection::new(config.vault.address.clone(), config.vault.namespace().map(String::from))?);
    let method = config.vault.auth_method()?;

    let session =
        SessionManager::start(method, connection.clone(), &config.session, MetricsRecorder::new()).await?;
    session.wait_for_token(config.session.initial_token_timeout()).await?;

    info!(
        address = %connection.address(),
        namespace = ?connection.namespace(),
        auth_method = session.method().name(),
        shared_paths = config.authorization.shared_paths.len(),
        "Connected to Vault"
    );

    let backend: Arc<dyn KvBackend> = Arc::new(VaultKvBackend::new(connection));
    Ok(Engine { sync: build_sync(backend, &config.authorization), session })
}
