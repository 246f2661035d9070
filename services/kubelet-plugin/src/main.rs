//! fake-dra-kubeletplugin
//!
//! Per-node plugin. Publishes fabricated devices and prepares allocated
//! claims for the container runtime.

use std::sync::Arc;

use anyhow::Result;
use fakedra_kubelet_plugin::{
    cdi::CdiHandler, config::Config, server::PluginServer, NodeDriver,
};
use fakedra_nodestate::{NodeStateClient, RetryPolicy, SqliteNodeStateStore};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to FAKEDRA_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        node = %config.node_name,
        namespace = %config.namespace,
        cdi_root = %config.cdi_root.display(),
        "Starting fake DRA kubelet plugin"
    );

    let store = SqliteNodeStateStore::open(&config.state_db)?;
    let client = NodeStateClient::new(Arc::new(store), &config.namespace, &config.node_name);
    let cdi = CdiHandler::new(&config.cdi_root, &config.node_name)?;
    let retry = RetryPolicy::default().with_max_attempts(config.retry_attempts);

    let driver = Arc::new(
        NodeDriver::start(client, Arc::new(cdi), config.device_count, retry).await?,
    );

    let server = PluginServer::bind(&config.socket_path, Arc::clone(&driver))?
        .with_max_message_size(config.max_message_size);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_handle = tokio::spawn(server.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    if let Err(e) = driver.shutdown().await {
        error!(error = %e, "Failed to mark NodeAllocationState NotReady");
    }
    let _ = shutdown_tx.send(true);

    match server_handle.await {
        Ok(Ok(())) => info!("Kubelet plugin shutdown complete"),
        Ok(Err(e)) => error!(error = %e, "Server error"),
        Err(e) => error!(error = %e, "Server task panicked"),
    }
    Ok(())
}
