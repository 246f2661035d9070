//! End-to-end happy path test.
//!
//! Runs the allocation controller and two kubelet plugins against one
//! SQLite NodeAllocationState file, each with its own connection, and walks
//! a claim through its whole life:
//!
//! 1. Plugins start and publish their inventory
//! 2. Filtering rules out the node that went NotReady
//! 3. Allocation commits the pending devices
//! 4. The plugin prepares the claim and writes its CDI spec
//! 5. Unprepare and deallocate leave the node record clean
//!
//! ## Running
//!
//! ```bash
//! cargo test -p fakedra-e2e --test happy_path
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fakedra_api::{
    rpc::NodeClaim, AllocationResult, NodeAllocationState, NodeAllocationStateStatus,
    PreparedDevices, ResourceClaim,
};
use fakedra_controller::params::InMemoryParameters;
use fakedra_controller::Driver;
use fakedra_kubelet_plugin::cdi::{cdi_vendor, qualified_name, CdiHandler};
use fakedra_kubelet_plugin::NodeDriver;
use fakedra_nodestate::{NodeStateClient, NodeStateStore, RetryPolicy, SqliteNodeStateStore};
use fakedra_testing::fixtures;
use tokio_stream::StreamExt;

fn retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(5)
        .with_backoff(Duration::from_millis(5))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

async fn start_plugin(db: &Path, cdi_root: &Path, node: &str, devices: usize) -> Arc<NodeDriver> {
    let store = Arc::new(SqliteNodeStateStore::open(db).unwrap());
    let client = NodeStateClient::new(store, fixtures::NAMESPACE, node);
    let cdi = Arc::new(CdiHandler::new(cdi_root.join(node), node).unwrap());
    Arc::new(
        NodeDriver::start(client, cdi, devices, retry())
            .await
            .unwrap(),
    )
}

async fn node_state(store: &SqliteNodeStateStore, node: &str) -> NodeAllocationState {
    store.get(fixtures::NAMESPACE, node).await.unwrap()
}

fn node_claim(claim: &ResourceClaim) -> NodeClaim {
    NodeClaim {
        namespace: claim.namespace.clone(),
        uid: claim.uid,
        name: claim.name.clone(),
        structured_resource_handle: Vec::new(),
    }
}

#[tokio::test]
async fn test_claim_lifecycle_across_controller_and_plugins() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nodestate.db");
    let cdi_root = dir.path().join("cdi");

    // 1. Plugins publish inventory; node-b then drains itself
    let plugin_a = start_plugin(&db, &cdi_root, "node-a", 2).await;
    let plugin_b = start_plugin(&db, &cdi_root, "node-b", 2).await;
    plugin_b.shutdown().await.unwrap();

    let observer = SqliteNodeStateStore::open(&db).unwrap();
    assert!(node_state(&observer, "node-a").await.is_ready());
    assert_eq!(
        node_state(&observer, "node-b").await.status,
        NodeAllocationStateStatus::NotReady
    );

    let controller = Driver::new(
        fixtures::NAMESPACE,
        Arc::new(SqliteNodeStateStore::open(&db).unwrap()),
        Arc::new(InMemoryParameters::new()),
    )
    .with_retry_policy(retry());

    // 2. Filtering
    let nodes = vec!["node-a".to_string(), "node-b".to_string()];
    let mut cas = vec![fixtures::claim_allocation("gpu", 2, 0)];
    controller
        .unsuitable_nodes(&fixtures::pod("workload"), &mut cas, &nodes)
        .await;
    assert_eq!(cas[0].unsuitable_nodes, vec!["node-b".to_string()]);

    // 3. Allocation
    let ca = &cas[0];
    let allocation = controller
        .allocate(
            &ca.claim,
            &ca.claim_parameters,
            &ca.class,
            &ca.class_parameters,
            "node-a",
        )
        .await
        .unwrap();
    assert_eq!(allocation, AllocationResult::for_node("node-a", true));

    let nas = node_state(&observer, "node-a").await;
    let allocated = nas.spec.allocated_claims.get(&ca.claim.uid).unwrap().clone();
    assert_eq!(allocated.uuids().len(), 2);

    // node-a is now full, so a second pod's claim cannot land there
    let mut second = vec![fixtures::claim_allocation("second", 1, 0)];
    controller
        .unsuitable_nodes(&fixtures::pod("other"), &mut second, &nodes)
        .await;
    assert_eq!(
        second[0].unsuitable_nodes,
        vec!["node-a".to_string(), "node-b".to_string()]
    );

    // 4. Prepare on the node
    let claim = ResourceClaim {
        allocation: Some(allocation),
        ..ca.claim.clone()
    };
    let prepared = plugin_a.prepare_resource(&node_claim(&claim)).await;
    assert_eq!(prepared.error, None);
    let expected: Vec<String> = std::iter::once(qualified_name("common"))
        .chain(
            allocated
                .uuids()
                .iter()
                .map(|uuid| qualified_name(&uuid.to_string())),
        )
        .collect();
    assert_eq!(prepared.cdi_devices, expected);

    let nas = node_state(&observer, "node-a").await;
    assert!(matches!(
        nas.spec.prepared_devices.get(&claim.uid),
        Some(PreparedDevices::Fake(fakes)) if fakes.devices.len() == 2
    ));
    assert!(cdi_root
        .join("node-a")
        .join(format!("{}_fake_{}.json", cdi_vendor(), claim.uid))
        .exists());
    assert!(nas.spec.allocated_claims.contains_key(&claim.uid));

    // 5. Tear down
    let unprepared = plugin_a.unprepare_resource(&node_claim(&claim)).await;
    assert_eq!(unprepared.error, None);
    controller.deallocate(&claim).await.unwrap();

    let nas = node_state(&observer, "node-a").await;
    assert!(nas.spec.allocated_claims.is_empty());
    assert!(nas.spec.prepared_devices.is_empty());
    assert_eq!(nas.spec.allocatable_devices.len(), 2);
    assert!(controller.pending().is_empty());

    // The inventory stream ends once the plugin shuts down
    let mut stream = plugin_a.list_and_watch();
    assert!(stream.next().await.is_some());
    plugin_a.shutdown().await.unwrap();
    assert!(stream.next().await.is_none());
}
