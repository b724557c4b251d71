//! Secret resolution against a KV v2 store.
//!
//! The pieces compose bottom-up:
//!
//! - [`PathAuthorizer`] decides whether a namespace may touch a path
//! - [`SecretStore`] reads and merge-writes fields with check-and-set
//! - [`GeneratorEngine`] produces values for missing fields
//! - [`TemplateRenderer`] renders composite values
//! - [`SecretValueResolver`] resolves one field definition
//! - [`SecretAssembler`] builds the whole output map of a VaultSecret
//!
//! ```rust,ignore
//! use vaultsync::secrets::{MemoryKvBackend, PathAuthorizer, SecretStore, SecretValueResolver};
//!
//! let backend = Arc::new(MemoryKvBackend::new());
//! let resolver = SecretValueResolver::new(SecretStore::new(backend), PathAuthorizer::new(["shared"]));
//! let bytes = resolver.resolve("payments", &definition).await?;
//! ```

pub mod assembler;
pub mod authorizer;
pub mod backends;
pub mod generator;
pub mod resolver;
pub mod store;
pub mod template;
pub mod types;

pub use assembler::SecretAssembler;
pub use authorizer::PathAuthorizer;
pub use generator::{GeneratedValue, GeneratorEngine, GeneratorKind};
pub use resolver::SecretValueResolver;
pub use store::{DataPath, SecretStore, StoredValue};
pub use template::TemplateRenderer;
pub use types::{ResolvedSecretMap, SecretString};

pub use backends::{KvBackend, KvBackendType, KvPayload, MemoryKvBackend, VaultConnection, VaultKvBackend};
