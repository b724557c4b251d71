//! # Error Handling
//!
//! Error types shared by the resolution engine, the Vault store and the
//! credential session manager.

pub mod types;

pub use types::{Result, SyncError};
