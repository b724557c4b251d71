//! Domain layer
//!
//! The declarative VaultSecret object model and its structural validation.
//! Types here carry no Vault or I/O dependencies.

pub mod vault_secret;

pub use vault_secret::{
    CollisionStrategy, FieldDefinition, FieldSource, Generator, Location, ObjectMeta,
    SourceImport, Variable, VaultSecret, VaultSecretSpec,
};
