//! Server Implementation
//!
//! Starts the dispatcher, serves HTTP until a shutdown signal, then stops the
//! dispatcher within the configured deadline.

use std::future::Future;

use tokio::net::TcpListener;

use super::{Config, Result, ServerError, ServerState};
use crate::api;
use crate::queue::QueueWorker;

/// HTTP Server
pub struct Server {
    config: Config,
    state: ServerState,
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        let state = ServerState::initialize(&config)?;
        Ok(Self { config, state })
    }

    /// Create server with existing state (tests, custom transports)
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self { config, state }
    }

    /// Run until Ctrl+C / SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr = self
            .config
            .bind_addr()
            .ok_or_else(|| ServerError::Bind {
                addr: format!("{}:{}", self.config.http_host, self.config.http_port),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid host"),
            })?;

        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        let worker = QueueWorker::new(
            self.state.store.clone(),
            self.state.transport.clone(),
            self.config.worker_config(),
        )
        .spawn();

        let app = api::build_app(&self.state).with_state(self.state.clone());

        tracing::info!(
            %addr,
            auth = self.config.auth_enabled(),
            queue = %self.config.queue_file.display(),
            "Print server listening"
        );

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve);

        tracing::info!("HTTP server stopped, stopping queue worker");
        if !worker.shutdown(self.config.shutdown_timeout()).await {
            tracing::warn!("Queue worker abandoned mid-job; it will be retried on next start");
        }

        served?;
        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Graceful shutdown handler
///
/// Listens for SIGTERM and Ctrl+C signals
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
