//! Typed access to versioned KV secrets.
//!
//! Logical paths look like `<mount>/<rest...>`. Writes merge the new fields
//! over the latest version and are guarded by check-and-set.

use super::backends::{KvBackend, KvPayload};
use crate::errors::{Result, SyncError};
use crate::observability::MetricsRecorder;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

/// Value stored in a binary marker field
pub const BINARY_MARKER_VALUE: &str = "1";

/// Companion field flagging `field` as base64 encoded bytes.
///
/// The leading dot keeps marker fields out of whole-path imports.
pub fn binary_marker_key(field: &str) -> String {
    format!(".{}_isBinary", field)
}

/// Whether `fields` flag `field` as binary
pub fn is_marked_binary(fields: &HashMap<String, String>, field: &str) -> bool {
    fields.get(&binary_marker_key(field)).is_some_and(|v| v == BINARY_MARKER_VALUE)
}

/// A logical path split into its KV mount and the path within the mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPath {
    pub mount: String,
    pub path: String,
}

impl DataPath {
    /// Needs at least a mount and one more segment.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim_matches('/');
        match trimmed.split_once('/') {
            Some((mount, rest)) if !mount.is_empty() && !rest.is_empty() => {
                Ok(Self { mount: mount.to_string(), path: rest.to_string() })
            }
            _ => Err(SyncError::invalid_path(path, "expected <mount>/<path>")),
        }
    }

    /// The KV v2 API path, `<mount>/data/<rest>`
    pub fn api_path(&self) -> String {
        format!("{}/data/{}", self.mount, self.path)
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mount, self.path)
    }
}

/// A field value as stored
#[derive(Clone, PartialEq, Eq)]
pub struct StoredValue {
    pub value: String,
    /// The path carries a binary marker for this field
    pub marked_binary: bool,
}

impl fmt::Debug for StoredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredValue")
            .field("value", &"[REDACTED]")
            .field("marked_binary", &self.marked_binary)
            .finish()
    }
}

fn version_param(version: u64) -> Option<u64> {
    (version > 0).then_some(version)
}

/// Secret store on top of a [`KvBackend`]
#[derive(Debug, Clone)]
pub struct SecretStore {
    backend: Arc<dyn KvBackend>,
    metrics: MetricsRecorder,
}

impl SecretStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend, metrics: MetricsRecorder::new() }
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    /// One string field. `version == 0` reads the latest version.
    pub async fn get(&self, path: &str, field: &str, version: u64) -> Result<String> {
        let data_path = DataPath::parse(path)?;
        let span = crate::vault_span!("read", data_path, field = %field, version);

        async {
            let payload = self.read(&data_path, version).await?;
            payload
                .and_then(|mut p| p.data.remove(field))
                .ok_or_else(|| SyncError::not_found(data_path.to_string(), field))
        }
        .instrument(span)
        .await
    }

    /// One field together with its binary marker.
    pub async fn get_value(&self, path: &str, field: &str, version: u64) -> Result<StoredValue> {
        let data_path = DataPath::parse(path)?;
        let span = crate::vault_span!("read", data_path, field = %field, version);

        async {
            let payload = self.read(&data_path, version).await?;
            let Some(mut payload) = payload else {
                return Err(SyncError::not_found(data_path.to_string(), field));
            };
            let marked_binary = is_marked_binary(&payload.data, field);
            payload
                .data
                .remove(field)
                .map(|value| StoredValue { value, marked_binary })
                .ok_or_else(|| SyncError::not_found(data_path.to_string(), field))
        }
        .instrument(span)
        .await
    }

    /// All string fields of one version, marker fields included. An empty
    /// payload is reported as not found.
    pub async fn get_all(&self, path: &str, version: u64) -> Result<HashMap<String, String>> {
        let data_path = DataPath::parse(path)?;
        let span = crate::vault_span!("read_all", data_path, version);

        async {
            match self.read(&data_path, version).await? {
                Some(payload) if !payload.data.is_empty() => Ok(payload.data),
                _ => Err(SyncError::not_found(data_path.to_string(), "*")),
            }
        }
        .instrument(span)
        .await
    }

    /// Merge `fields` over the latest version and write the result.
    ///
    /// Fields not named in `fields` are kept. A check-and-set conflict is
    /// retried once against the then current version. Returns the new version.
    pub async fn create_or_update(&self, path: &str, fields: HashMap<String, String>) -> Result<u64> {
        let data_path = DataPath::parse(path)?;
        let span = crate::vault_span!("write", data_path, fields = fields.len());

        async {
            match self.merge_and_write(&data_path, &fields).await {
                Err(SyncError::Conflict { message, .. }) => {
                    warn!(path = %data_path, message = %message, "Check-and-set conflict, retrying once");
                    self.metrics.record_cas_retry();
                    self.merge_and_write(&data_path, &fields).await
                }
                result => result,
            }
        }
        .instrument(span)
        .await
    }

    async fn read(&self, data_path: &DataPath, version: u64) -> Result<Option<KvPayload>> {
        let result =
            self.backend.read(&data_path.mount, &data_path.path, version_param(version)).await;
        self.metrics.record_vault_operation("read", result.is_ok());
        result
    }

    async fn write(&self, data_path: &DataPath, data: &HashMap<String, String>, cas: u64) -> Result<u64> {
        let result = self.backend.write(&data_path.mount, &data_path.path, data, cas).await;
        self.metrics.record_vault_operation("write", result.is_ok());
        result
    }

    async fn merge_and_write(&self, data_path: &DataPath, fields: &HashMap<String, String>) -> Result<u64> {
        let (mut merged, cas) = match self.read(data_path, 0).await? {
            Some(payload) => (payload.data, payload.version),
            None => (HashMap::new(), 0),
        };
        merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));

        let version = match self.write(data_path, &merged, cas).await {
            Err(conflict @ SyncError::Conflict { .. }) if cas == 0 => {
                // Path exists but nothing is readable: the latest version is deleted.
                if self.read(data_path, 0).await?.is_some() {
                    return Err(conflict);
                }
                let current =
                    self.backend.current_version(&data_path.mount, &data_path.path).await?;
                debug!(path = %data_path, current, "Latest version deleted, writing over it");
                self.write(data_path, &merged, current).await?
            }
            result => result?,
        };
        debug!(path = %data_path, cas, version, "Wrote secret version");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::backends::{KvBackendType, KvPayload, MemoryKvBackend};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn store() -> (Arc<MemoryKvBackend>, SecretStore) {
        let backend = Arc::new(MemoryKvBackend::new());
        let store = SecretStore::new(backend.clone());
        (backend, store)
    }

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_data_path() {
        let path = DataPath::parse("/app/payments/db/").unwrap();
        assert_eq!(path.mount, "app");
        assert_eq!(path.path, "payments/db");
        assert_eq!(path.api_path(), "app/data/payments/db");
        assert_eq!(path.to_string(), "app/payments/db");

        assert!(DataPath::parse("app").is_err());
        assert!(DataPath::parse("app/").is_err());
        assert!(DataPath::parse("").is_err());
    }

    #[test]
    fn test_binary_marker() {
        assert_eq!(binary_marker_key("key"), ".key_isBinary");
        assert!(is_marked_binary(&fields(&[(".key_isBinary", "1")]), "key"));
        assert!(!is_marked_binary(&fields(&[(".key_isBinary", "0")]), "key"));
        assert!(!is_marked_binary(&fields(&[]), "key"));
    }

    #[tokio::test]
    async fn test_get_field_and_version() {
        let (backend, store) = store();
        backend.insert("app/ns/db", [("password", "old")]);
        backend.insert("app/ns/db", [("password", "new")]);

        assert_eq!(store.get("app/ns/db", "password", 0).await.unwrap(), "new");
        assert_eq!(store.get("app/ns/db", "password", 1).await.unwrap(), "old");
    }

    #[tokio::test]
    async fn test_get_value_reports_marker() {
        let (backend, store) = store();
        backend.insert("app/ns/bin", [("key", "Zml6eg=="), (".key_isBinary", "1"), ("plain", "x")]);

        let value = store.get_value("app/ns/bin", "key", 0).await.unwrap();
        assert_eq!(value.value, "Zml6eg==");
        assert!(value.marked_binary);
        assert!(!store.get_value("app/ns/bin", "plain", 0).await.unwrap().marked_binary);
        assert!(store.get_value("app/ns/bin", "nope", 0).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_missing_data_is_not_found() {
        let (backend, store) = store();
        backend.insert("app/ns/db", [("password", "x")]);

        assert!(store.get("app/ns/db", "user", 0).await.unwrap_err().is_not_found());
        assert!(store.get("app/ns/other", "password", 0).await.unwrap_err().is_not_found());
        assert!(store.get("app/ns/db", "password", 7).await.unwrap_err().is_not_found());
        assert!(store.get_all("app/ns/other", 0).await.unwrap_err().is_not_found());

        backend.insert("app/ns/empty", Vec::<(String, String)>::new());
        assert!(store.get_all("app/ns/empty", 0).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_short_path_is_invalid() {
        let (_, store) = store();
        assert!(matches!(store.get("app", "x", 0).await, Err(SyncError::InvalidPath { .. })));
        assert!(matches!(
            store.create_or_update("/app/", fields(&[("a", "1")])).await,
            Err(SyncError::InvalidPath { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_then_merge() {
        let (backend, store) = store();
        assert_eq!(store.create_or_update("app/ns/x", fields(&[("a", "1")])).await.unwrap(), 1);
        assert_eq!(store.create_or_update("app/ns/x", fields(&[("b", "2")])).await.unwrap(), 2);

        let all = store.get_all("app/ns/x", 0).await.unwrap();
        assert_eq!(all, fields(&[("a", "1"), ("b", "2")]));
        assert_eq!(backend.latest_version("app/ns/x"), 2);
    }

    /// Backend that lets another writer win the first check-and-set.
    #[derive(Debug)]
    struct RacingBackend {
        inner: MemoryKvBackend,
        races_left: AtomicUsize,
    }

    #[async_trait]
    impl KvBackend for RacingBackend {
        async fn read(&self, mount: &str, path: &str, version: Option<u64>) -> Result<Option<KvPayload>> {
            self.inner.read(mount, path, version).await
        }

        async fn write(
            &self,
            mount: &str,
            path: &str,
            data: &HashMap<String, String>,
            cas: u64,
        ) -> Result<u64> {
            if self.races_left.load(Ordering::SeqCst) > 0 {
                self.races_left.fetch_sub(1, Ordering::SeqCst);
                self.inner.insert(&format!("{}/{}", mount, path), [("racer", "won")]);
            }
            self.inner.write(mount, path, data, cas).await
        }

        async fn current_version(&self, mount: &str, path: &str) -> Result<u64> {
            self.inner.current_version(mount, path).await
        }

        fn backend_type(&self) -> KvBackendType {
            KvBackendType::Memory
        }
    }

    #[tokio::test]
    async fn test_conflict_is_retried_once() {
        let backend =
            Arc::new(RacingBackend { inner: MemoryKvBackend::new(), races_left: AtomicUsize::new(1) });
        let store = SecretStore::new(backend.clone());

        let version = store.create_or_update("app/ns/x", fields(&[("a", "1")])).await.unwrap();
        assert_eq!(version, 2);

        let all = store.get_all("app/ns/x", 0).await.unwrap();
        assert_eq!(all, fields(&[("a", "1"), ("racer", "won")]));
    }

    /// Backend whose latest version reads as deleted while `hidden` is set.
    #[derive(Debug, Default)]
    struct DeletedLatestBackend {
        inner: MemoryKvBackend,
        hidden: AtomicBool,
        metadata_reads: AtomicUsize,
    }

    #[async_trait]
    impl KvBackend for DeletedLatestBackend {
        async fn read(&self, mount: &str, path: &str, version: Option<u64>) -> Result<Option<KvPayload>> {
            if version.is_none() && self.hidden.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.inner.read(mount, path, version).await
        }

        async fn write(
            &self,
            mount: &str,
            path: &str,
            data: &HashMap<String, String>,
            cas: u64,
        ) -> Result<u64> {
            let version = self.inner.write(mount, path, data, cas).await?;
            self.hidden.store(false, Ordering::SeqCst);
            Ok(version)
        }

        async fn current_version(&self, mount: &str, path: &str) -> Result<u64> {
            self.metadata_reads.fetch_add(1, Ordering::SeqCst);
            self.inner.current_version(mount, path).await
        }

        fn backend_type(&self) -> KvBackendType {
            KvBackendType::Memory
        }
    }

    #[tokio::test]
    async fn test_create_on_missing_path_skips_metadata() {
        let backend = Arc::new(DeletedLatestBackend::default());
        let store = SecretStore::new(backend.clone());

        assert_eq!(store.create_or_update("app/ns/x", fields(&[("a", "1")])).await.unwrap(), 1);
        assert_eq!(backend.metadata_reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_write_over_deleted_latest_version() {
        let backend = Arc::new(DeletedLatestBackend::default());
        backend.inner.insert("app/ns/x", [("old", "gone")]);
        backend.hidden.store(true, Ordering::SeqCst);
        let store = SecretStore::new(backend.clone());

        let version = store.create_or_update("app/ns/x", fields(&[("a", "1")])).await.unwrap();
        assert_eq!(version, 2);
        assert_eq!(backend.metadata_reads.load(Ordering::SeqCst), 1);
        assert_eq!(store.get_all("app/ns/x", 0).await.unwrap(), fields(&[("a", "1")]));
    }

    #[tokio::test]
    async fn test_second_conflict_is_returned() {
        let backend =
            Arc::new(RacingBackend { inner: MemoryKvBackend::new(), races_left: AtomicUsize::new(2) });
        let store = SecretStore::new(backend);

        let err = store.create_or_update("app/ns/x", fields(&[("a", "1")])).await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict { .. }));
    }
}
