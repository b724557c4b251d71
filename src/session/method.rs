//! Vault auth methods and the token issuing seam.

use crate::errors::{Result, SyncError};
use crate::secrets::SecretString;
use async_trait::async_trait;
use std::time::Duration;

/// A client token together with its lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub token: SecretString,
    pub renewable: bool,
    /// Zero means the token does not expire
    pub duration: Duration,
}

impl Lease {
    /// Lease for a token handed in from outside, never renewed
    pub fn static_token(token: SecretString) -> Self {
        Self { token, renewable: false, duration: Duration::ZERO }
    }
}

/// Talks to Vault's auth endpoints on behalf of the session manager.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// AppRole login against `auth/<mount>/login`
    async fn login_approle(&self, mount: &str, role_id: &str, secret_id: &SecretString)
        -> Result<Lease>;

    /// Renew the currently installed token
    async fn renew_self(&self, increment: Option<&str>) -> Result<Lease>;

    /// Make `token` the one used for all subsequent requests
    fn install_token(&self, token: &SecretString) -> Result<()>;
}

/// How the engine obtains its Vault token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Pre-issued token, used as is
    Token { token: SecretString },
    /// AppRole login with renewal
    AppRole { mount: String, role_id: String, secret_id: SecretString },
}

impl AuthMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::AppRole { .. } => "approle",
        }
    }

    /// Whether the session manager has to keep the token alive
    pub fn is_renewable(&self) -> bool {
        matches!(self, Self::AppRole { .. })
    }

    /// Obtain a token. An empty token is reported as [`SyncError::MissingToken`].
    pub async fn login(&self, issuer: &dyn TokenIssuer) -> Result<Lease> {
        let lease = match self {
            Self::Token { token } => Lease::static_token(token.clone()),
            Self::AppRole { mount, role_id, secret_id } => {
                issuer.login_approle(mount, role_id, secret_id).await?
            }
        };

        if lease.token.is_empty() {
            return Err(SyncError::MissingToken);
        }
        Ok(lease)
    }
}
