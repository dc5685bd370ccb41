//! Core module: configuration, shared state, lifecycle
//!
//! - [`Config`] - service configuration
//! - [`ServerState`] - state shared with handlers
//! - [`Server`] - HTTP server and dispatcher lifecycle
//! - [`ServerError`] - startup errors

pub mod config;
pub mod error;
pub mod server;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::{Result, ServerError};
pub use server::{Server, shutdown_signal};
pub use state::ServerState;
