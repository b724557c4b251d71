//! KV backend trait and types
//!
//! Defines the storage seam between the secret store and a concrete
//! versioned key/value engine.

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Type of KV backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KvBackendType {
    /// HashiCorp Vault KV v2
    Vault,
    /// Process-local versioned map
    Memory,
}

impl KvBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vault => "vault",
            Self::Memory => "memory",
        }
    }
}

impl FromStr for KvBackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "vault" => Ok(Self::Vault),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown kv backend type: {}", s)),
        }
    }
}

impl fmt::Display for KvBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// String fields of one secret version together with that version number.
///
/// Non-string values stored at the path are dropped by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvPayload {
    pub data: HashMap<String, String>,
    pub version: u64,
}

/// Trait for versioned KV engines
///
/// `mount` is the first segment of a logical path, `path` the remainder.
/// Implementations must be Send + Sync for use in async contexts.
#[async_trait]
pub trait KvBackend: Send + Sync + fmt::Debug {
    /// Read one version of the secret at `mount/path`.
    ///
    /// `None` selects the latest version. Returns `Ok(None)` when there is no
    /// data at that path or version.
    async fn read(&self, mount: &str, path: &str, version: Option<u64>) -> Result<Option<KvPayload>>;

    /// Write `data` as a new version with check-and-set.
    ///
    /// `cas == 0` only succeeds when the path holds no version yet, otherwise
    /// `cas` must equal the current version. A mismatch is reported as
    /// [`SyncError::Conflict`](crate::errors::SyncError::Conflict). Returns the
    /// new version number.
    async fn write(
        &self,
        mount: &str,
        path: &str,
        data: &HashMap<String, String>,
        cas: u64,
    ) -> Result<u64>;

    /// Current version number of `mount/path`, `0` when it was never written.
    ///
    /// This can be non-zero while [`KvBackend::read`] returns nothing, e.g.
    /// when the latest version was deleted.
    async fn current_version(&self, mount: &str, path: &str) -> Result<u64>;

    /// Get the backend type identifier
    fn backend_type(&self) -> KvBackendType;
}
