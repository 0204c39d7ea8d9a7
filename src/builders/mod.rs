//! Builders
//!
//! Fluent builder for the credential manager.

pub mod manager;

pub use manager::{credential_manager, CredentialManagerBuilder};
