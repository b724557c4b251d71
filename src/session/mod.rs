//! # Credential Sessions
//!
//! Vault auth methods, the token issuing seam and the session manager that
//! keeps a token alive.

pub mod manager;
pub mod method;

pub use manager::{Session, SessionManager, SessionPhase};
pub use method::{AuthMethod, Lease, TokenIssuer};
