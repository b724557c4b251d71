//! In-process versioned KV backend
//!
//! Keeps every written version and enforces the same check-and-set rules as
//! Vault KV v2. Backs engines built with `startup::build_sync` and the tests.

use super::backend::{KvBackend, KvBackendType, KvPayload};
use crate::errors::{Result, SyncError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Versioned in-memory KV engine
///
/// Version numbers start at 1 per path. Reading a version that was never
/// written yields no data.
#[derive(Debug, Default)]
pub struct MemoryKvBackend {
    // "mount/path" -> versions, index 0 holds version 1
    entries: Mutex<HashMap<String, Vec<HashMap<String, String>>>>,
}

impl MemoryKvBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a path with a new version without check-and-set.
    pub fn insert<I, K, V>(&self, path: &str, fields: I) -> u64
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        let mut entries = self.lock();
        let versions = entries.entry(path.trim_matches('/').to_string()).or_default();
        versions.push(data);
        versions.len() as u64
    }

    /// Latest version of a logical path, `0` when nothing was written yet.
    pub fn latest_version(&self, path: &str) -> u64 {
        self.lock().get(path.trim_matches('/')).map_or(0, |v| v.len() as u64)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<HashMap<String, String>>>> {
        // A poisoned map is still structurally valid.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn key(mount: &str, path: &str) -> String {
    format!("{}/{}", mount, path)
}

#[async_trait]
impl KvBackend for MemoryKvBackend {
    async fn read(&self, mount: &str, path: &str, version: Option<u64>) -> Result<Option<KvPayload>> {
        let entries = self.lock();
        let Some(versions) = entries.get(&key(mount, path)) else {
            return Ok(None);
        };

        let version = version.unwrap_or(versions.len() as u64);
        if version == 0 {
            return Ok(None);
        }

        Ok(versions
            .get((version - 1) as usize)
            .map(|data| KvPayload { data: data.clone(), version }))
    }

    async fn write(
        &self,
        mount: &str,
        path: &str,
        data: &HashMap<String, String>,
        cas: u64,
    ) -> Result<u64> {
        let full_path = key(mount, path);
        let mut entries = self.lock();
        let versions = entries.entry(full_path.clone()).or_default();

        let current = versions.len() as u64;
        if cas != current {
            return Err(SyncError::conflict(
                full_path,
                format!("check-and-set parameter did not match the current version ({})", current),
            ));
        }

        versions.push(data.clone());
        Ok(current + 1)
    }

    async fn current_version(&self, mount: &str, path: &str) -> Result<u64> {
        Ok(self.lock().get(&key(mount, path)).map_or(0, |v| v.len() as u64))
    }

    fn backend_type(&self) -> KvBackendType {
        KvBackendType::Memory
    }
}
