//! Zephyr Server - HTTP front end for the location-aware ask pipeline
//!
//! This crate exposes `POST /ask-zephyr` over HTTP, together with health
//! endpoints, and wires configuration, CORS and the generation worker around
//! the [`zephyr_core`] pipeline.

/// Version of the zephyr-server crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod server;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{create_router, ServerState, ZephyrServer};
