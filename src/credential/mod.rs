//! Credentials
//!
//! Credential storage, domain mapping, token refresh and the manager tying
//! them together.

pub mod headers;
pub mod manager;
pub mod mapping;
pub mod refresh;
pub mod store;

pub use headers::authorization_headers;
pub use manager::{CredentialManager, FailureRecord};
pub use mapping::{DomainCredentialMapping, DomainEntry, CATCH_ALL};
pub use refresh::TokenRefresher;
pub use store::{CredentialStore, FileCredentialStore, InMemoryCredentialStore, MockCredentialStore};
