use std::sync::Arc;

use receipt_printer::{NetworkTransport, PrinterTransport};

use super::{Config, Result};
use crate::queue::JobStore;

/// Shared application state
///
/// Cheap to clone; handed to every axum handler.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub store: Arc<JobStore>,
    pub transport: Arc<dyn PrinterTransport>,
}

impl ServerState {
    /// Open the job store and build the printer transport described by `config`
    pub fn initialize(config: &Config) -> Result<Self> {
        let store = JobStore::open(&config.queue_file, config.retry_count)?;
        let transport = build_transport(config)?;
        Ok(Self::new(config.clone(), Arc::new(store), transport))
    }

    pub fn new(config: Config, store: Arc<JobStore>, transport: Arc<dyn PrinterTransport>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            transport,
        }
    }
}

/// `PRINTERS` selects network printers; otherwise the platform spooler
fn build_transport(config: &Config) -> Result<Arc<dyn PrinterTransport>> {
    if !config.printers.is_empty() {
        let transport = NetworkTransport::from_list(&config.printers)?;
        return Ok(Arc::new(transport));
    }
    Ok(platform_transport())
}

#[cfg(windows)]
fn platform_transport() -> Arc<dyn PrinterTransport> {
    Arc::new(receipt_printer::WindowsSpooler::new())
}

#[cfg(not(windows))]
fn platform_transport() -> Arc<dyn PrinterTransport> {
    tracing::warn!("No printers configured (PRINTERS is empty)");
    Arc::new(NetworkTransport::new())
}
