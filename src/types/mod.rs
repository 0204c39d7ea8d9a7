//! Types
//!
//! Credential, token wire and configuration types.

pub mod config;
pub mod credential;
pub mod token;

pub use config::*;
pub use credential::*;
pub use token::*;
