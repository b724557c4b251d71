//! # Secret Synchronization
//!
//! Turns a [`VaultSecret`] object into a [`RenderedSecret`] and hands it to a
//! [`SecretSink`]. Each pass validates the object, assembles a fresh value
//! map and derives the output name and type.

use crate::domain::{FieldDefinition, VaultSecret};
use crate::errors::{Result, SyncError};
use crate::observability::MetricsRecorder;
use crate::secrets::{ResolvedSecretMap, SecretAssembler};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn, Instrument};

/// Secret type used when the VaultSecret names none
pub const DEFAULT_SECRET_TYPE: &str = "Opaque";

/// Secret type inferred when the only field definition is `.dockerconfigjson`
pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";

const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Output of one resolution pass, ready for materialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSecret {
    pub name: String,
    pub namespace: String,
    pub secret_type: String,
    pub data: ResolvedSecretMap,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SecretManifest<'a> {
    api_version: &'static str,
    kind: &'static str,
    metadata: ManifestMetadata<'a>,
    #[serde(rename = "type")]
    secret_type: &'a str,
    data: BTreeMap<&'a str, String>,
}

#[derive(Serialize)]
struct ManifestMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    namespace: &'a str,
}

impl RenderedSecret {
    fn manifest(&self) -> SecretManifest<'_> {
        SecretManifest {
            api_version: "v1",
            kind: "Secret",
            metadata: ManifestMetadata { name: &self.name, namespace: &self.namespace },
            secret_type: &self.secret_type,
            data: self.data.iter().map(|(k, v)| (k.as_str(), STANDARD.encode(v))).collect(),
        }
    }

    /// Secret manifest as pretty JSON with base64 `data`
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.manifest())?)
    }

    /// Secret manifest as YAML with base64 `data`
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.manifest())?)
    }
}

/// Output secret type: explicit, inferred for docker configs, or Opaque.
///
/// Inference looks at the declared field definitions only. Keys pulled in
/// through `dataFrom` imports do not change the type.
pub fn derive_secret_type(explicit: Option<&str>, definitions: &[FieldDefinition]) -> String {
    if let Some(explicit) = explicit.filter(|t| !t.is_empty()) {
        return explicit.to_string();
    }
    if let [only] = definitions {
        if only.name == DOCKER_CONFIG_JSON_KEY {
            return DOCKER_CONFIG_JSON_TYPE.to_string();
        }
    }
    DEFAULT_SECRET_TYPE.to_string()
}

/// Destination for rendered secrets
#[async_trait]
pub trait SecretSink: Send + Sync {
    /// Create or replace the derived secret
    async fn apply(&self, secret: &RenderedSecret) -> Result<()>;
}

/// Reconciliation entry point shared by the CLI and embedding controllers
#[derive(Debug, Clone)]
pub struct SecretSync {
    assembler: SecretAssembler,
    metrics: MetricsRecorder,
}

impl SecretSync {
    pub fn new(assembler: SecretAssembler) -> Self {
        Self { assembler, metrics: MetricsRecorder::new() }
    }

    pub fn assembler(&self) -> &SecretAssembler {
        &self.assembler
    }

    /// Validate and resolve `object` into a [`RenderedSecret`].
    pub async fn render(&self, object: &VaultSecret) -> Result<RenderedSecret> {
        let span = crate::resolve_span!(object.namespace(), object.name());
        let started = Instant::now();

        let result = async {
            object.spec.validate()?;
            let data = self.assembler.assemble(object.namespace(), &object.spec).await?;

            let name = object
                .spec
                .secret_name
                .as_deref()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| object.name())
                .to_string();
            let secret_type = derive_secret_type(object.spec.secret_type.as_deref(), &object.spec.data);

            Ok::<_, SyncError>(RenderedSecret {
                name,
                namespace: object.namespace().to_string(),
                secret_type,
                data,
            })
        }
        .instrument(span.clone())
        .await;

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.record_resolution(result.is_ok(), elapsed);

        let _entered = span.enter();
        match &result {
            Ok(rendered) => info!(
                secret = %rendered.name,
                secret_type = %rendered.secret_type,
                keys = rendered.data.len(),
                "Resolved VaultSecret"
            ),
            Err(e) => warn!(error = %e, "Failed to resolve VaultSecret"),
        }
        result
    }

    /// Render `object` and hand the result to `sink`.
    pub async fn reconcile(&self, object: &VaultSecret, sink: &dyn SecretSink) -> Result<RenderedSecret> {
        let rendered = self.render(object).await?;
        sink.apply(&rendered).await?;
        Ok(rendered)
    }
}
