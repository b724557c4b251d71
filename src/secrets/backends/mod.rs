//! KV v2 storage backends
//!
//! - **Vault**: HashiCorp Vault KV v2 engine over HTTP
//! - **Memory**: versioned in-process store for tests and offline rendering

pub mod backend;
pub mod memory;
pub mod vault;

pub use backend::{KvBackend, KvBackendType, KvPayload};
pub use memory::MemoryKvBackend;
pub use vault::{VaultConnection, VaultKvBackend};
