//! # Error Types
//!
//! Error taxonomy for secret resolution and credential sessions using `thiserror`.

/// Custom result type for vaultsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for secret resolution, assembly and Vault sessions
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    /// No value at the requested path/field/version
    #[error("Secret not found: {path} (field: {field})")]
    NotFound { path: String, field: String },

    /// Generator kind is not one of the supported kinds
    #[error("Unknown generator: '{name}'")]
    UnknownGenerator { name: String },

    /// Generator arguments do not satisfy the kind's contract
    #[error("Invalid arguments for generator '{generator}': {reason}")]
    InvalidGeneratorArgs { generator: String, reason: String },

    /// Generator failed while producing a value
    #[error("Generation of '{generator}' value failed: {message}")]
    Generation { generator: String, message: String },

    /// Malformed or too short Vault path
    #[error("Invalid vault path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Path outside of the caller's authorized scope
    #[error("Permission denied for path '{path}' from namespace '{namespace}'")]
    PermissionDenied { path: String, namespace: String },

    /// Neither a token nor AppRole credentials were configured
    #[error("Authentication method not provided")]
    AuthMethodMissing,

    /// Login succeeded but yielded no client token
    #[error("Missing client token")]
    MissingToken,

    /// No token was obtained within the configured window
    #[error("Did not receive vault token within {timeout_ms}ms")]
    AuthTimeout { timeout_ms: u64 },

    /// Two sources produced the same output key under the `Error` strategy
    #[error("Collision on key '{key}' while importing '{path}'")]
    Collision { key: String, path: String },

    /// Check-and-set rejected the write
    #[error("Write conflict on '{path}': {message}")]
    Conflict { path: String, message: String },

    /// Template parsing or rendering failed
    #[error("Template error: {message}")]
    Template { message: String },

    /// A value flagged binary is not valid base64
    #[error("Failed to decode binary field '{field}'")]
    Decode {
        field: String,
        #[source]
        source: base64::DecodeError,
    },

    /// Backend (Vault) request failed
    #[error("Backend error: {message}")]
    Backend { message: String, status: Option<u16> },

    /// Declarative spec does not satisfy its structural rules
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Create a not found error
    pub fn not_found<P: Into<String>, F: Into<String>>(path: P, field: F) -> Self {
        Self::NotFound { path: path.into(), field: field.into() }
    }

    /// Create an unknown generator error
    pub fn unknown_generator<S: Into<String>>(name: S) -> Self {
        Self::UnknownGenerator { name: name.into() }
    }

    /// Create an invalid generator arguments error
    pub fn invalid_generator_args<G: Into<String>, R: Into<String>>(generator: G, reason: R) -> Self {
        Self::InvalidGeneratorArgs { generator: generator.into(), reason: reason.into() }
    }

    /// Create a generation failure
    pub fn generation<G: Into<String>, M: Into<String>>(generator: G, message: M) -> Self {
        Self::Generation { generator: generator.into(), message: message.into() }
    }

    /// Create an invalid path error
    pub fn invalid_path<P: Into<String>, R: Into<String>>(path: P, reason: R) -> Self {
        Self::InvalidPath { path: path.into(), reason: reason.into() }
    }

    /// Create a permission denied error
    pub fn permission_denied<P: Into<String>, N: Into<String>>(path: P, namespace: N) -> Self {
        Self::PermissionDenied { path: path.into(), namespace: namespace.into() }
    }

    /// Create a collision error
    pub fn collision<K: Into<String>, P: Into<String>>(key: K, path: P) -> Self {
        Self::Collision { key: key.into(), path: path.into() }
    }

    /// Create a CAS conflict error
    pub fn conflict<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::Conflict { path: path.into(), message: message.into() }
    }

    /// Create a template error
    pub fn template<S: Into<String>>(message: S) -> Self {
        Self::Template { message: message.into() }
    }

    /// Create a backend error
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend { message: message.into(), status: None }
    }

    /// Create a backend error carrying the HTTP status
    pub fn backend_with_status<S: Into<String>>(message: S, status: u16) -> Self {
        Self::Backend { message: message.into(), status: Some(status) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether this error means "no value here"
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }

    /// Policy and shape violations: the object has to be respecified,
    /// retrying will not help.
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidPath { .. }
                | SyncError::PermissionDenied { .. }
                | SyncError::Validation { .. }
        )
    }

    /// Check if this error should be retried by the caller's backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Backend { status, .. } => !matches!(status, Some(400..=499)),
            SyncError::Conflict { .. } => true,
            SyncError::AuthTimeout { .. } => true,
            SyncError::Io { .. } => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            context: "JSON serialization failed".to_string(),
            source: Box::new(error),
        }
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization {
            context: "YAML serialization failed".to_string(),
            source: Box::new(error),
        }
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for SyncError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = SyncError::not_found("app/ns/db", "password");
        assert!(error.is_not_found());
        assert_eq!(error.to_string(), "Secret not found: app/ns/db (field: password)");

        let error = SyncError::unknown_generator("sha");
        assert_eq!(error.to_string(), "Unknown generator: 'sha'");
    }

    #[test]
    fn test_validation_error() {
        let error = SyncError::validation_field("name can not be empty", "spec.data[0].name");
        if let SyncError::Validation { field, .. } = error {
            assert_eq!(field, Some("spec.data[0].name".to_string()));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_policy_violations_are_not_retryable() {
        let denied = SyncError::permission_denied("app/other/x", "ns");
        assert!(denied.is_policy_violation());
        assert!(!denied.is_retryable());

        let invalid = SyncError::invalid_path("app/x", "too short");
        assert!(invalid.is_policy_violation());
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::conflict("app/ns/x", "cas mismatch").is_retryable());
        assert!(SyncError::backend("connection reset").is_retryable());
        assert!(SyncError::backend_with_status("sealed", 503).is_retryable());
        assert!(!SyncError::backend_with_status("forbidden", 403).is_retryable());
        assert!(SyncError::AuthTimeout { timeout_ms: 10 }.is_retryable());
        assert!(!SyncError::not_found("cert/x", "tls.crt").is_retryable());
        assert!(!SyncError::unknown_generator("x").is_retryable());
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let sync_error: SyncError = io_error.into();
        assert!(matches!(sync_error, SyncError::Io { .. }));

        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let sync_error: SyncError = json_error.into();
        assert!(matches!(sync_error, SyncError::Serialization { .. }));

        let yaml_error = serde_yaml::from_str::<serde_json::Value>("key: [unclosed").unwrap_err();
        let sync_error: SyncError = yaml_error.into();
        assert!(matches!(sync_error, SyncError::Serialization { .. }));
    }
}
