//! Core Components
//!
//! HTTP transport seam shared by the token refresher and callers.

pub mod transport;

pub use transport::*;
