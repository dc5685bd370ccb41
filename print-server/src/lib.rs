//! Receipt print server
//!
//! Accepts image print requests over HTTP, keeps them in a durable queue and
//! feeds them one at a time to a thermal printer.
//!
//! ```text
//! print-server/src/
//! ├── core/     # config, shared state, server lifecycle
//! ├── queue/    # job store, dispatcher, job types
//! ├── api/      # HTTP routes
//! └── utils/    # HTTP errors, logging
//! ```

pub mod api;
pub mod core;
pub mod queue;
pub mod utils;

pub use crate::core::{Config, ConfigError, Server, ServerError, ServerState};
pub use queue::{JobPayload, JobStatus, JobStore, QueueError, QueueWorker, QueueWorkerHandle};
pub use utils::logger::init_logger_with_file;
pub use utils::{AppError, AppResult};

/// Load `.env`, then the configuration, then install the logger
pub fn setup_environment() -> Result<Config, ConfigError> {
    let _ = dotenv::dotenv();

    let config = Config::from_env()?;
    config.validate()?;

    let log_dir = config.log_dir.clone();
    init_logger_with_file(Some(&config.log_level), log_dir.as_deref());
    Ok(config)
}
