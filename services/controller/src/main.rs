//! fake-dra-controller
//!
//! Cluster-scoped allocation controller. Serves the scheduling framework on a
//! Unix socket and records allocations in the shared NodeAllocationState store.

use std::sync::Arc;

use anyhow::Result;
use fakedra_controller::{
    config::Config, params::InMemoryParameters, server::FrameworkServer, Driver,
};
use fakedra_nodestate::{RetryPolicy, SqliteNodeStateStore};
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
        namespace = %config.namespace,
        state_db = %config.state_db.display(),
        socket = %config.socket_path.display(),
        "Starting fake DRA controller"
    );

    let store = SqliteNodeStateStore::open(&config.state_db)?;

    let params = match &config.parameters_file {
        Some(path) => InMemoryParameters::from_file(path)?,
        None => InMemoryParameters::new(),
    };
    let claim_parameters = params.fake_claim_parameters_list();

    let driver = Driver::new(&config.namespace, Arc::new(store), Arc::new(params))
        .with_retry_policy(RetryPolicy::default().with_max_attempts(config.retry_attempts));
    driver.publish_claim_parameters(&claim_parameters);
    let driver = Arc::new(driver);

    let server = FrameworkServer::bind(&config.socket_path, driver, config.workers)?
        .with_max_message_size(config.max_message_size);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_handle = tokio::spawn(server.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    match server_handle.await {
        Ok(Ok(())) => info!("Controller shutdown complete"),
        Ok(Err(e)) => error!(error = %e, "Server error"),
        Err(e) => error!(error = %e, "Server task panicked"),
    }
    Ok(())
}
