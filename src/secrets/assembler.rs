//! Assembly of the full output map for one VaultSecret.
//!
//! Field definitions are resolved first, whole-path imports follow in
//! declaration order and are merged under their collision strategy.

use super::resolver::SecretValueResolver;
use super::store::is_marked_binary;
use super::types::ResolvedSecretMap;
use crate::domain::{CollisionStrategy, SourceImport, VaultSecretSpec};
use crate::errors::{Result, SyncError};
use crate::observability::MetricsRecorder;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Builds a [`ResolvedSecretMap`] from a [`VaultSecretSpec`]
#[derive(Debug, Clone)]
pub struct SecretAssembler {
    resolver: SecretValueResolver,
    metrics: MetricsRecorder,
}

impl SecretAssembler {
    pub fn new(resolver: SecretValueResolver) -> Self {
        Self { resolver, metrics: MetricsRecorder::new() }
    }

    pub fn resolver(&self) -> &SecretValueResolver {
        &self.resolver
    }

    /// Resolve every definition and import of `spec` for `namespace`.
    ///
    /// Any error aborts the pass; no partial map is returned.
    pub async fn assemble(&self, namespace: &str, spec: &VaultSecretSpec) -> Result<ResolvedSecretMap> {
        let mut output = ResolvedSecretMap::new();

        for definition in &spec.data {
            let value = self.resolver.resolve(namespace, definition).await?;
            output.insert(definition.name.clone(), value);
        }

        for import in &spec.data_from {
            self.import(namespace, import, &mut output).await?;
        }

        debug!(keys = output.len(), "Assembled secret data");
        Ok(output)
    }

    async fn import(
        &self,
        namespace: &str,
        import: &SourceImport,
        output: &mut ResolvedSecretMap,
    ) -> Result<()> {
        let path = import.trimmed_path();
        self.resolver.authorizer().authorize(namespace, path)?;

        let fields = self.resolver.store().get_all(path, import.version).await?;

        // Sorted so Overwrite/Ignore outcomes do not depend on map order.
        let visible: BTreeMap<&String, &String> =
            fields.iter().filter(|(key, _)| !key.starts_with('.')).collect();

        for (key, value) in visible {
            let bytes = if is_marked_binary(&fields, key) {
                STANDARD
                    .decode(value.as_bytes())
                    .map_err(|source| SyncError::Decode { field: key.clone(), source })?
            } else {
                value.clone().into_bytes()
            };

            if output.contains_key(key) {
                self.metrics.record_collision(import.collision_strategy.as_str());
                match import.collision_strategy {
                    CollisionStrategy::Error => {
                        warn!(key = %key, path = %path, "Key collision while importing secret data");
                        return Err(SyncError::collision(key.as_str(), path));
                    }
                    CollisionStrategy::Ignore => {
                        debug!(key = %key, path = %path, "Keeping existing value on collision");
                        continue;
                    }
                    CollisionStrategy::Overwrite => {
                        debug!(key = %key, path = %path, "Overwriting existing value on collision");
                    }
                }
            }
            output.insert(key.clone(), bytes);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldDefinition, Location};
    use crate::secrets::authorizer::PathAuthorizer;
    use crate::secrets::backends::MemoryKvBackend;
    use crate::secrets::store::SecretStore;
    use std::sync::Arc;

    fn assembler() -> (Arc<MemoryKvBackend>, SecretAssembler) {
        let backend = Arc::new(MemoryKvBackend::new());
        let resolver =
            SecretValueResolver::new(SecretStore::new(backend.clone()), PathAuthorizer::new(["shared"]));
        (backend, SecretAssembler::new(resolver))
    }

    fn spec_with_collision(strategy: CollisionStrategy) -> VaultSecretSpec {
        VaultSecretSpec {
            data: vec![FieldDefinition::from_location("user", Location::new("app/ns/db", "user"))],
            data_from: vec![SourceImport::new("app/shared/common").with_strategy(strategy)],
            ..Default::default()
        }
    }

    fn seed(backend: &MemoryKvBackend) {
        backend.insert("app/ns/db", [("user", "owner")]);
        backend.insert("app/shared/common", [("user", "shared"), ("region", "eu")]);
    }

    #[tokio::test]
    async fn test_collision_error_aborts() {
        let (backend, assembler) = assembler();
        seed(&backend);

        let err = assembler.assemble("ns", &spec_with_collision(CollisionStrategy::Error)).await;
        match err {
            Err(SyncError::Collision { key, path }) => {
                assert_eq!(key, "user");
                assert_eq!(path, "app/shared/common");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_collision_ignore_keeps_definition() {
        let (backend, assembler) = assembler();
        seed(&backend);

        let map = assembler.assemble("ns", &spec_with_collision(CollisionStrategy::Ignore)).await.unwrap();
        assert_eq!(map.get_str("user"), Some("owner"));
        assert_eq!(map.get_str("region"), Some("eu"));
    }

    #[tokio::test]
    async fn test_collision_overwrite_replaces() {
        let (backend, assembler) = assembler();
        seed(&backend);

        let map =
            assembler.assemble("ns", &spec_with_collision(CollisionStrategy::Overwrite)).await.unwrap();
        assert_eq!(map.get_str("user"), Some("shared"));
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn test_import_skips_hidden_and_decodes_binary() {
        let (backend, assembler) = assembler();
        backend.insert("app/ns/bin", [("baz", "Zml6emJ1enpi"), (".baz_isBinary", "1"), (".meta", "x")]);

        let spec = VaultSecretSpec { data_from: vec![SourceImport::new("app/ns/bin")], ..Default::default() };
        let map = assembler.assemble("ns", &spec).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("baz"), Some(&b"fizzbuzzb"[..]));
    }

    #[tokio::test]
    async fn test_missing_import_is_not_found() {
        let (_, assembler) = assembler();
        let spec = VaultSecretSpec { data_from: vec![SourceImport::new("app/ns/none")], ..Default::default() };
        assert!(assembler.assemble("ns", &spec).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unauthorized_import_is_denied() {
        let (backend, assembler) = assembler();
        backend.insert("app/other/x", [("a", "1")]);
        let spec = VaultSecretSpec { data_from: vec![SourceImport::new("app/other/x")], ..Default::default() };
        assert!(matches!(assembler.assemble("ns", &spec).await, Err(SyncError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn test_later_import_collides_with_earlier_import() {
        let (backend, assembler) = assembler();
        backend.insert("app/ns/a", [("k", "first")]);
        backend.insert("app/ns/b", [("k", "second")]);

        let spec = VaultSecretSpec {
            data_from: vec![
                SourceImport::new("app/ns/a"),
                SourceImport::new("app/ns/b").with_strategy(CollisionStrategy::Overwrite),
            ],
            ..Default::default()
        };
        let map = assembler.assemble("ns", &spec).await.unwrap();
        assert_eq!(map.get_str("k"), Some("second"));
    }

    fn two_imports(strategy: CollisionStrategy) -> VaultSecretSpec {
        VaultSecretSpec {
            data_from: vec![
                SourceImport::new("app/ns/a"),
                SourceImport::new("app/ns/b").with_strategy(strategy),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_import_collision_error_aborts() {
        let (backend, assembler) = assembler();
        backend.insert("app/ns/a", [("k", "first")]);
        backend.insert("app/ns/b", [("k", "second")]);

        match assembler.assemble("ns", &two_imports(CollisionStrategy::Error)).await {
            Err(SyncError::Collision { key, path }) => {
                assert_eq!(key, "k");
                assert_eq!(path, "app/ns/b");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_import_collision_ignore_keeps_first() {
        let (backend, assembler) = assembler();
        backend.insert("app/ns/a", [("k", "first")]);
        backend.insert("app/ns/b", [("k", "second"), ("other", "x")]);

        let map = assembler.assemble("ns", &two_imports(CollisionStrategy::Ignore)).await.unwrap();
        assert_eq!(map.get_str("k"), Some("first"));
        assert_eq!(map.get_str("other"), Some("x"));
    }

    #[tokio::test]
    async fn test_imported_version() {
        let (backend, assembler) = assembler();
        backend.insert("app/ns/v", [("k", "v1")]);
        backend.insert("app/ns/v", [("k", "v2")]);

        let spec = VaultSecretSpec {
            data_from: vec![SourceImport::new("app/ns/v").with_version(1)],
            ..Default::default()
        };
        assert_eq!(assembler.assemble("ns", &spec).await.unwrap().get_str("k"), Some("v1"));
    }
}
