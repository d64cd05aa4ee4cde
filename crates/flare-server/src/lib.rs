//! Flare server
//!
//! HTTP job API over a [`flare_core::ValidationOrchestrator`]. The `flare`
//! binary adds the command line on top.

pub mod http;

pub use http::{router, serve};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
