//! Vault KV v2 backend implementation
//!
//! [`VaultConnection`] owns the HTTP client and the token currently in use.
//! It issues tokens for the session manager and is shared with
//! [`VaultKvBackend`], which talks to the KV v2 engine through it.

use super::backend::{KvBackend, KvBackendType, KvPayload};
use crate::errors::{Result, SyncError};
use crate::secrets::types::SecretString;
use crate::session::{Lease, TokenIssuer};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info};
use vaultrs::api;
use vaultrs::api::kv2::requests::{ReadSecretRequest, SetSecretRequestOptions};
use vaultrs::api::kv2::responses::ReadSecretResponse;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

/// Connection to a Vault server.
///
/// The underlying client is rebuilt whenever a new token is installed, so
/// callers grab a snapshot via [`VaultConnection::client`] and never hold the
/// lock across a request.
pub struct VaultConnection {
    address: String,
    namespace: Option<String>,
    client: RwLock<Arc<VaultClient>>,
}

impl VaultConnection {
    /// Creates a connection without a token. One is installed by the
    /// session manager after login.
    pub fn new(address: impl Into<String>, namespace: Option<String>) -> Result<Self> {
        let address = address.into();
        if address.is_empty() {
            return Err(SyncError::config("Vault address cannot be empty"));
        }

        let namespace = namespace.filter(|ns| !ns.is_empty());
        let client = build_client(&address, namespace.as_deref(), None)?;

        info!(address = %address, namespace = ?namespace, "Configured Vault connection");
        Ok(Self { address, namespace, client: RwLock::new(Arc::new(client)) })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Snapshot of the client carrying the current token.
    pub fn client(&self) -> Arc<VaultClient> {
        match self.client.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }
}

impl fmt::Debug for VaultConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConnection")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

fn build_client(address: &str, namespace: Option<&str>, token: Option<&str>) -> Result<VaultClient> {
    let mut settings_builder = VaultClientSettingsBuilder::default();
    settings_builder.address(address);

    if let Some(token) = token {
        settings_builder.token(token);
    }

    if let Some(namespace) = namespace {
        settings_builder.namespace(Some(namespace.to_string()));
    }

    let settings = settings_builder
        .build()
        .map_err(|e| SyncError::config(format!("Invalid Vault configuration: {}", e)))?;

    VaultClient::new(settings)
        .map_err(|e| SyncError::backend(format!("Failed to create Vault client: {}", e)))
}

/// Map a client error to the crate taxonomy. 404s are handled by the
/// callers that treat them as "no data".
fn map_client_error(path: &str, error: ClientError) -> SyncError {
    match error {
        ClientError::APIError { code, errors } => {
            let message = errors.join("; ");
            if code == 400 && message.contains("check-and-set") {
                SyncError::conflict(path, message)
            } else {
                SyncError::backend_with_status(format!("{} ({})", message, path), code)
            }
        }
        other => SyncError::backend(format!("{} ({})", other, path)),
    }
}

fn is_not_found(error: &ClientError) -> bool {
    matches!(error, ClientError::APIError { code: 404, .. })
}

#[async_trait]
impl TokenIssuer for VaultConnection {
    async fn login_approle(
        &self,
        mount: &str,
        role_id: &str,
        secret_id: &SecretString,
    ) -> Result<Lease> {
        let client = self.client();
        let auth =
            vaultrs::auth::approle::login(&*client, mount, role_id, secret_id.expose_secret())
                .await
                .map_err(|e| map_client_error(&format!("auth/{}/login", mount), e))?;

        Ok(Lease {
            token: SecretString::new(auth.client_token),
            renewable: auth.renewable,
            duration: Duration::from_secs(auth.lease_duration),
        })
    }

    async fn renew_self(&self, increment: Option<&str>) -> Result<Lease> {
        let client = self.client();
        let auth = vaultrs::token::renew_self(&*client, increment)
            .await
            .map_err(|e| map_client_error("auth/token/renew-self", e))?;

        Ok(Lease {
            token: SecretString::new(auth.client_token),
            renewable: auth.renewable,
            duration: Duration::from_secs(auth.lease_duration),
        })
    }

    fn install_token(&self, token: &SecretString) -> Result<()> {
        let client = build_client(&self.address, self.namespace.as_deref(), Some(token.expose_secret()))?;
        match self.client.write() {
            Ok(mut guard) => *guard = Arc::new(client),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(client),
        }
        debug!(address = %self.address, "Installed new Vault client token");
        Ok(())
    }
}

/// KV v2 engine reached through a shared [`VaultConnection`].
#[derive(Debug, Clone)]
pub struct VaultKvBackend {
    connection: Arc<VaultConnection>,
}

impl VaultKvBackend {
    pub fn new(connection: Arc<VaultConnection>) -> Self {
        Self { connection }
    }
}

/// Keep string fields only.
fn string_fields(raw: serde_json::Map<String, Value>) -> HashMap<String, String> {
    raw.into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect()
}

/// Deleted or destroyed versions come back with `data: null`.
fn payload_from_response(response: ReadSecretResponse) -> Option<KvPayload> {
    match response.data {
        Value::Object(fields) if response.metadata.version > 0 => {
            Some(KvPayload { data: string_fields(fields), version: response.metadata.version })
        }
        _ => None,
    }
}

#[async_trait]
impl KvBackend for VaultKvBackend {
    async fn read(&self, mount: &str, path: &str, version: Option<u64>) -> Result<Option<KvPayload>> {
        let client = self.connection.client();
        let full_path = format!("{}/{}", mount, path);

        // One read of <mount>/data/<path>; the payload carries its own version.
        let endpoint = ReadSecretRequest::builder()
            .mount(mount)
            .path(path)
            .version(version)
            .build()
            .map_err(|e| SyncError::internal(format!("Invalid read request for {}: {}", full_path, e)))?;

        match api::exec_with_result(&*client, endpoint).await {
            Ok(response) => Ok(payload_from_response(response)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => {
                error!(error = %e, path = %full_path, version = ?version, "Failed to read secret from Vault");
                Err(map_client_error(&full_path, e))
            }
        }
    }

    async fn write(
        &self,
        mount: &str,
        path: &str,
        data: &HashMap<String, String>,
        cas: u64,
    ) -> Result<u64> {
        let client = self.connection.client();
        let full_path = format!("{}/{}", mount, path);
        let cas = u32::try_from(cas)
            .map_err(|_| SyncError::internal(format!("cas {} out of range for {}", cas, full_path)))?;

        let metadata =
            kv2::set_with_options(&*client, mount, path, data, SetSecretRequestOptions { cas })
                .await
                .map_err(|e| {
                    error!(error = %e, path = %full_path, "Failed to write secret to Vault");
                    map_client_error(&full_path, e)
                })?;

        info!(path = %full_path, version = metadata.version, "Successfully stored secret in Vault");
        Ok(metadata.version)
    }

    async fn current_version(&self, mount: &str, path: &str) -> Result<u64> {
        let client = self.connection.client();
        match kv2::read_metadata(&*client, mount, path).await {
            Ok(metadata) => Ok(metadata.current_version),
            Err(e) if is_not_found(&e) => Ok(0),
            Err(e) => Err(map_client_error(&format!("{}/{}", mount, path), e)),
        }
    }

    fn backend_type(&self) -> KvBackendType {
        KvBackendType::Vault
    }
}
