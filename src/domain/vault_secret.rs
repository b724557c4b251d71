//! Declarative VaultSecret object model.
//!
//! Field names follow the manifest's camelCase wire format so a `VaultSecret`
//! can be read straight from YAML or JSON.

use crate::errors::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single field inside a versioned KV path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Logical path, `<mount>/<rest...>`
    pub path: String,
    /// Field name inside the secret at `path`
    #[serde(default)]
    pub field: String,
    /// Explicit version, `0` means latest
    #[serde(default)]
    pub version: u64,
    /// The stored value is base64 of raw bytes
    #[serde(default)]
    pub is_binary: bool,
}

impl Location {
    pub fn new(path: impl Into<String>, field: impl Into<String>) -> Self {
        Self { path: path.into(), field: field.into(), version: 0, is_binary: false }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn binary(mut self) -> Self {
        self.is_binary = true;
        self
    }

    /// Path without leading or trailing slashes.
    pub fn trimmed_path(&self) -> &str {
        self.path.trim_matches('/')
    }
}

/// Value generator attached to a location. Only consulted when the
/// location holds no value yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generator {
    pub name: String,
    #[serde(default)]
    pub args: Vec<i32>,
}

impl Generator {
    pub fn new(name: impl Into<String>, args: Vec<i32>) -> Self {
        Self { name: name.into(), args }
    }
}

/// Named location used as input to a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Variable {
    pub fn new(name: impl Into<String>, location: Location) -> Self {
        Self { name: name.into(), location: Some(location) }
    }
}

/// One output key of the derived secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Output key
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<Generator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Where a field definition takes its value from.
#[derive(Debug, Clone, Copy)]
pub enum FieldSource<'a> {
    Location { location: &'a Location, generator: Option<&'a Generator> },
    Template { template: &'a str, variables: &'a [Variable] },
}

impl FieldDefinition {
    /// Field read from (and possibly generated into) a location.
    pub fn from_location(name: impl Into<String>, location: Location) -> Self {
        Self { name: name.into(), location: Some(location), ..Default::default() }
    }

    /// Field rendered from a template over the given variables.
    pub fn from_template(
        name: impl Into<String>,
        template: impl Into<String>,
        variables: Vec<Variable>,
    ) -> Self {
        Self { name: name.into(), template: Some(template.into()), variables, ..Default::default() }
    }

    pub fn with_generator(mut self, generator: Generator) -> Self {
        self.generator = Some(generator);
        self
    }

    /// The location wins when both are present; a definition with neither is
    /// malformed.
    pub fn source(&self) -> Result<FieldSource<'_>> {
        match (&self.location, &self.template) {
            (Some(location), _) => {
                Ok(FieldSource::Location { location, generator: self.generator.as_ref() })
            }
            (None, Some(template)) if !template.is_empty() => {
                Ok(FieldSource::Template { template, variables: &self.variables })
            }
            _ => Err(SyncError::validation_field(
                "either location or template+variables required",
                format!("data[{}]", self.name),
            )),
        }
    }
}

/// What happens when an import produces a key that is already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionStrategy {
    /// Abort the whole assembly
    #[default]
    Error,
    /// Keep the value already present
    Ignore,
    /// Replace the value already present
    Overwrite,
}

impl CollisionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Ignore => "Ignore",
            Self::Overwrite => "Overwrite",
        }
    }
}

impl FromStr for CollisionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "Error" => Ok(Self::Error),
            "Ignore" => Ok(Self::Ignore),
            "Overwrite" => Ok(Self::Overwrite),
            _ => Err(format!("Unknown collision strategy: {}", s)),
        }
    }
}

impl fmt::Display for CollisionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whole-path import: every field at `path` becomes an output key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceImport {
    pub path: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub collision_strategy: CollisionStrategy,
}

impl SourceImport {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    pub fn with_strategy(mut self, strategy: CollisionStrategy) -> Self {
        self.collision_strategy = strategy;
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn trimmed_path(&self) -> &str {
        self.path.trim_matches('/')
    }
}

/// Desired state of a derived secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSecretSpec {
    /// Name of the output secret, defaults to the object's name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    /// Type of the output secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_type: Option<String>,
    #[serde(default)]
    pub data: Vec<FieldDefinition>,
    #[serde(default)]
    pub data_from: Vec<SourceImport>,
}

impl VaultSecretSpec {
    /// Structural validation of the declarative spec. Resolution assumes a
    /// spec that passed this check.
    pub fn validate(&self) -> Result<()> {
        if self.data.is_empty() && self.data_from.is_empty() {
            return Err(SyncError::validation_field(
                "one of spec.data or spec.dataFrom is mandatory",
                "spec",
            ));
        }

        for (i, data) in self.data.iter().enumerate() {
            let field = |suffix: &str| format!("spec.data[{}]{}", i, suffix);

            if data.name.is_empty() {
                return Err(SyncError::validation_field("name can not be empty", field(".name")));
            }

            match &data.location {
                Some(location) => {
                    if !data.variables.is_empty() {
                        return Err(SyncError::validation_field(
                            "location conflicting with variables",
                            field(".variables"),
                        ));
                    }
                    if data.template.is_some() {
                        return Err(SyncError::validation_field(
                            "location conflicting with template",
                            field(".template"),
                        ));
                    }
                    validate_location(location, &field(".location"))?;
                    if let Some(generator) = &data.generator {
                        if generator.name.is_empty() {
                            return Err(SyncError::validation_field(
                                "generator name is required if generator is used",
                                field(".generator.name"),
                            ));
                        }
                        if location.version > 0 {
                            return Err(SyncError::validation_field(
                                "location version is not allowed together with a generator",
                                field(".location.version"),
                            ));
                        }
                    }
                }
                None => {
                    if data.template.as_deref().map_or(true, str::is_empty) {
                        return Err(SyncError::validation_field(
                            "template is required if location is not provided",
                            field(".template"),
                        ));
                    }
                    if data.generator.is_some() {
                        return Err(SyncError::validation_field(
                            "generator requires a location",
                            field(".generator"),
                        ));
                    }
                    for (j, variable) in data.variables.iter().enumerate() {
                        let var_field = field(&format!(".variables[{}]", j));
                        let Some(location) = &variable.location else {
                            return Err(SyncError::validation_field(
                                "variables require both name and location",
                                format!("{}.location", var_field),
                            ));
                        };
                        if variable.name.is_empty() {
                            return Err(SyncError::validation_field(
                                "variables require both name and location",
                                format!("{}.name", var_field),
                            ));
                        }
                        validate_location(location, &format!("{}.location", var_field))?;
                    }
                }
            }
        }

        for (i, import) in self.data_from.iter().enumerate() {
            if import.trimmed_path().is_empty() {
                return Err(SyncError::validation_field(
                    "path is required",
                    format!("spec.dataFrom[{}].path", i),
                ));
            }
        }

        Ok(())
    }
}

fn validate_location(location: &Location, field: &str) -> Result<()> {
    if location.trimmed_path().is_empty() || location.field.is_empty() {
        return Err(SyncError::validation_field(
            "location path and field are required",
            field.to_string(),
        ));
    }
    Ok(())
}

/// Identity of the managed object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// A VaultSecret object as handed over by the orchestration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSecret {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub metadata: ObjectMeta,
    pub spec: VaultSecretSpec,
}

impl VaultSecret {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, spec: VaultSecretSpec) -> Self {
        Self {
            api_version: None,
            kind: None,
            metadata: ObjectMeta { name: name.into(), namespace: namespace.into() },
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location_field(name: &str) -> FieldDefinition {
        FieldDefinition::from_location(name, Location::new("app/ns/db", "password"))
    }

    #[test]
    fn test_manifest_deserialization() {
        let yaml = r#"
apiVersion: vault.example.io/v1alpha1
kind: VaultSecret
metadata:
  name: db-credentials
  namespace: payments
spec:
  secretName: db
  data:
    - name: password
      location:
        path: app/payments/db
        field: password
      generator:
        name: password
        args: [32, 4, 4]
    - name: dsn
      template: "postgres://app:{{password}}@db"
      variables:
        - name: password
          location:
            path: app/payments/db
            field: password
            isBinary: false
  dataFrom:
    - path: app/shared/common
      collisionStrategy: Overwrite
"#;
        let secret: VaultSecret = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(secret.name(), "db-credentials");
        assert_eq!(secret.namespace(), "payments");
        assert_eq!(secret.spec.secret_name.as_deref(), Some("db"));
        assert_eq!(secret.spec.data.len(), 2);
        assert_eq!(secret.spec.data[0].generator.as_ref().unwrap().args, vec![32, 4, 4]);
        assert_eq!(secret.spec.data_from[0].collision_strategy, CollisionStrategy::Overwrite);
        assert!(secret.spec.validate().is_ok());
    }

    #[test]
    fn test_collision_strategy_defaults_to_error() {
        let import: SourceImport = serde_json::from_str(r#"{"path": "app/ns/x"}"#).unwrap();
        assert_eq!(import.collision_strategy, CollisionStrategy::Error);
        assert_eq!(import.version, 0);
        assert_eq!("".parse::<CollisionStrategy>().unwrap(), CollisionStrategy::Error);
        assert!("Merge".parse::<CollisionStrategy>().is_err());
    }

    #[test]
    fn test_source_selection() {
        let def = location_field("a");
        assert!(matches!(def.source().unwrap(), FieldSource::Location { .. }));

        let def = FieldDefinition::from_template("b", "{{x}}", vec![]);
        assert!(matches!(def.source().unwrap(), FieldSource::Template { .. }));

        let def = FieldDefinition { name: "c".into(), ..Default::default() };
        assert!(def.source().is_err());
    }

    #[test]
    fn test_validate_requires_data_or_data_from() {
        let err = VaultSecretSpec::default().validate().unwrap_err();
        assert!(err.to_string().contains("mandatory"));
    }

    #[test]
    fn test_validate_rejects_location_with_template() {
        let mut def = location_field("a");
        def.template = Some("{{x}}".into());
        let spec = VaultSecretSpec { data: vec![def], ..Default::default() };

        match spec.validate().unwrap_err() {
            SyncError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("spec.data[0].template"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_rejects_versioned_generator() {
        let def = FieldDefinition::from_location(
            "a",
            Location::new("app/ns/db", "password").with_version(3),
        )
        .with_generator(Generator::new("uuid", vec![]));
        let spec = VaultSecretSpec { data: vec![def], ..Default::default() };

        assert!(spec.validate().unwrap_err().to_string().contains("version"));
    }

    #[test]
    fn test_validate_rejects_incomplete_variable() {
        let def = FieldDefinition::from_template(
            "a",
            "{{x}}",
            vec![Variable { name: "x".into(), location: None }],
        );
        let spec = VaultSecretSpec { data: vec![def], ..Default::default() };
        assert!(spec.validate().is_err());

        let def = FieldDefinition::from_template(
            "a",
            "{{x}}",
            vec![Variable::new("x", Location::new("app/ns/db", ""))],
        );
        let spec = VaultSecretSpec { data: vec![def], ..Default::default() };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_import_path() {
        let spec =
            VaultSecretSpec { data_from: vec![SourceImport::new("/")], ..Default::default() };
        match spec.validate().unwrap_err() {
            SyncError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("spec.dataFrom[0].path"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_location_trims_slashes() {
        assert_eq!(Location::new("/app/ns/db/", "f").trimmed_path(), "app/ns/db");
    }
}
