//! set-nodestate-status
//!
//! Flips a node's NodeAllocationState between Ready and NotReady, e.g. to
//! drain a node from the allocation controller's point of view.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use fakedra_api::{NodeAllocationState, NodeAllocationStateStatus};
use fakedra_nodestate::{
    retry_on_conflict, NodeStateClient, NodeStateStore, RetryPolicy, SqliteNodeStateStore,
    StoreError,
};

/// Set the status of a node's NodeAllocationState.
#[derive(Debug, Parser)]
#[command(name = "set-nodestate-status")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Node whose record is updated.
    #[arg(long, env = "NODE_NAME")]
    node: String,

    /// Namespace holding the record.
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    namespace: String,

    /// New status (Ready or NotReady).
    #[arg(long)]
    status: NodeAllocationStateStatus,

    /// SQLite file shared with the controller and plugins.
    #[arg(long, env = "FAKEDRA_STATE_DB", default_value = "/var/lib/fake-dra/nodestate.db")]
    state_db: PathBuf,

    /// Attempts before giving up on version conflicts.
    #[arg(long, env = "FAKEDRA_RETRY_ATTEMPTS", default_value_t = 5)]
    retry_attempts: u32,
}

async fn set_status(
    store: Arc<dyn NodeStateStore>,
    retry: &RetryPolicy,
    namespace: &str,
    node: &str,
    status: NodeAllocationStateStatus,
) -> Result<NodeAllocationState, StoreError> {
    let client = &NodeStateClient::new(store, namespace, node);
    retry_on_conflict(retry, || async move {
        let nas = client.get().await?;
        client.update_status(&nas, status).await
    })
    .await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let store = SqliteNodeStateStore::open(&cli.state_db)?;
    let retry = RetryPolicy::default().with_max_attempts(cli.retry_attempts);
    let nas = set_status(
        Arc::new(store),
        &retry,
        &cli.namespace,
        &cli.node,
        cli.status,
    )
    .await?;

    println!(
        "NodeAllocationState {}/{} is now {}",
        nas.namespace(),
        nas.name(),
        nas.status
    );
    Ok(())
}
