//! Resolution of single field definitions.
//!
//! A location field is read from the store, generated and persisted when
//! missing and a generator is attached, then base64 decoded if binary. A
//! template field renders its variables, each resolved as a plain location.

use super::authorizer::PathAuthorizer;
use super::generator::{GeneratedValue, GeneratorEngine};
use super::store::{binary_marker_key, SecretStore, BINARY_MARKER_VALUE};
use super::template::TemplateRenderer;
use crate::domain::{FieldDefinition, FieldSource, Generator, Location, Variable};
use crate::errors::{Result, SyncError};
use crate::observability::MetricsRecorder;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Resolves one [`FieldDefinition`] to raw bytes
#[derive(Debug, Clone)]
pub struct SecretValueResolver {
    store: SecretStore,
    authorizer: PathAuthorizer,
    generator: GeneratorEngine,
    templates: TemplateRenderer,
    metrics: MetricsRecorder,
}

impl SecretValueResolver {
    pub fn new(store: SecretStore, authorizer: PathAuthorizer) -> Self {
        Self {
            store,
            authorizer,
            generator: GeneratorEngine::new(),
            templates: TemplateRenderer::new(),
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn store(&self) -> &SecretStore {
        &self.store
    }

    pub fn authorizer(&self) -> &PathAuthorizer {
        &self.authorizer
    }

    /// Resolve a field definition on behalf of `namespace`.
    ///
    /// When both a location and a template are present the location wins.
    pub async fn resolve(&self, namespace: &str, definition: &FieldDefinition) -> Result<Vec<u8>> {
        match definition.source()? {
            FieldSource::Location { location, generator } => {
                self.resolve_location(namespace, location, generator).await
            }
            FieldSource::Template { template, variables } => {
                self.resolve_template(namespace, template, variables).await
            }
        }
    }

    /// Read one location, generating it first if it is missing and a
    /// generator is given.
    pub async fn resolve_location(
        &self,
        namespace: &str,
        location: &Location,
        generator: Option<&Generator>,
    ) -> Result<Vec<u8>> {
        let path = location.trimmed_path();
        self.authorizer.authorize(namespace, path)?;

        let (value, is_binary) =
            match self.store.get_value(path, &location.field, location.version).await {
                Ok(stored) => (stored.value, location.is_binary || stored.marked_binary),
                Err(e) if e.is_not_found() => match generator {
                    Some(generator) => {
                        let generated = self.generate_and_store(location, generator).await?;
                        (generated.value, location.is_binary || generated.is_binary)
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            };

        if !is_binary {
            return Ok(value.into_bytes());
        }
        STANDARD
            .decode(value.as_bytes())
            .map_err(|source| SyncError::Decode { field: location.field.clone(), source })
    }

    async fn generate_and_store(
        &self,
        location: &Location,
        generator: &Generator,
    ) -> Result<GeneratedValue> {
        let engine = self.generator;
        let spec = generator.clone();
        let generated = tokio::task::spawn_blocking(move || engine.generate(&spec))
            .await
            .map_err(|e| SyncError::internal(format!("generator task failed: {}", e)))??;

        let mut fields = HashMap::new();
        fields.insert(location.field.clone(), generated.value.clone());
        if generated.is_binary {
            fields.insert(binary_marker_key(&location.field), BINARY_MARKER_VALUE.to_string());
        }

        let version = self.store.create_or_update(location.trimmed_path(), fields).await?;
        self.metrics.record_generated(&generator.name);
        info!(
            path = %location.trimmed_path(),
            field = %location.field,
            generator = %generator.name,
            version,
            "Generated missing secret value"
        );
        Ok(generated)
    }

    async fn resolve_template(
        &self,
        namespace: &str,
        template: &str,
        variables: &[Variable],
    ) -> Result<Vec<u8>> {
        let mut values = BTreeMap::new();
        for variable in variables {
            let location = variable.location.as_ref().ok_or_else(|| {
                SyncError::validation_field("variable requires a location", variable.name.clone())
            })?;
            let bytes = self.resolve_location(namespace, location, None).await?;
            let text = String::from_utf8(bytes).map_err(|_| {
                SyncError::template(format!("variable '{}' is not valid UTF-8", variable.name))
            })?;
            values.insert(variable.name.clone(), text);
        }

        debug!(variables = values.len(), "Rendering field template");
        self.templates.render(template, &values).map(String::into_bytes)
    }
}
