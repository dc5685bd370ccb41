use anyhow::Context;
use print_server::{Server, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. .env, config, logging
    let config = setup_environment().context("Invalid configuration")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        queue_file = %config.queue_file.display(),
        retry_count = config.retry_count,
        "Print server starting"
    );

    // 2. Job store + printer transport
    let server = Server::new(config).context("Failed to initialize print server")?;

    // 3. Serve until Ctrl+C / SIGTERM
    if let Err(e) = server.run().await {
        tracing::error!(error = %e, "Server error");
        return Err(e.into());
    }

    Ok(())
}
