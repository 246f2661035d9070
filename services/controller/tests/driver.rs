//! Driver behaviour against a shared NodeAllocationState store.

use std::sync::Arc;
use std::time::Duration;

use fakedra_api::{
    AllocationResult, ClaimAllocation, ClaimParameters, DeviceClassParametersSpec, FakeClaimParameters,
    FakeClaimParametersSpec, NodeAllocationState, NodeAllocationStateStatus, ObjectMeta,
    ParametersRef, ResourceClaim, DRIVER_NAME, FAKE_CLAIM_PARAMETERS_KIND,
};
use fakedra_controller::params::InMemoryParameters;
use fakedra_controller::{Driver, DriverError};
use fakedra_nodestate::{NodeStateStore, RetryPolicy, StoreError};
use fakedra_testing::{fixtures, ConflictingStore};

struct Harness {
    store: Arc<ConflictingStore>,
    params: Arc<InMemoryParameters>,
    driver: Driver,
}

impl Harness {
    fn new(max_attempts: u32) -> Self {
        let store = Arc::new(ConflictingStore::in_memory());
        let params = Arc::new(InMemoryParameters::new());
        let driver = Driver::new(fixtures::NAMESPACE, store.clone(), params.clone())
            .with_retry_policy(
                RetryPolicy::default()
                    .with_max_attempts(max_attempts)
                    .with_backoff(Duration::from_millis(1)),
            );
        Self {
            store,
            params,
            driver,
        }
    }

    async fn add_node(&self, nas: NodeAllocationState) {
        self.store.create(&nas).await.unwrap();
    }

    async fn node(&self, name: &str) -> NodeAllocationState {
        self.store.get(fixtures::NAMESPACE, name).await.unwrap()
    }

    async fn filter(&self, cas: &mut [ClaimAllocation], nodes: &[&str]) {
        let nodes: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
        self.driver
            .unsuitable_nodes(&fixtures::pod("pod"), cas, &nodes)
            .await;
    }

    async fn allocate(
        &self,
        ca: &ClaimAllocation,
        node: &str,
    ) -> Result<AllocationResult, DriverError> {
        self.driver
            .allocate(
                &ca.claim,
                &ca.claim_parameters,
                &ca.class,
                &ca.class_parameters,
                node,
            )
            .await
    }
}

fn bound(claim: &ResourceClaim, allocation: AllocationResult) -> ResourceClaim {
    ResourceClaim {
        allocation: Some(allocation),
        ..claim.clone()
    }
}

// =============================================================================
// Allocate
// =============================================================================

#[tokio::test]
async fn test_filter_then_allocate_commits_pending_devices() {
    let h = Harness::new(5);
    h.add_node(fixtures::ready_node("node-a", 8)).await;

    let mut cas = vec![fixtures::claim_allocation("c1", 2, 0)];
    h.filter(&mut cas, &["node-a"]).await;
    assert!(cas[0].unsuitable_nodes.is_empty());

    let uid = cas[0].claim.uid;
    let proposed = h.driver.pending().get(&uid, "node-a").unwrap();
    assert_eq!(proposed.len(), 2);

    let result = h.allocate(&cas[0], "node-a").await.unwrap();
    assert_eq!(result, AllocationResult::for_node("node-a", true));

    let nas = h.node("node-a").await;
    assert_eq!(nas.spec.allocated_claims.get(&uid), Some(&proposed));
    assert!(!h.driver.pending().exists(&uid, "node-a"));
}

#[tokio::test]
async fn test_allocate_is_idempotent() {
    let h = Harness::new(5);
    h.add_node(fixtures::ready_node("node-a", 8)).await;

    let mut cas = vec![fixtures::claim_allocation("c1", 1, 0)];
    h.filter(&mut cas, &["node-a"]).await;
    h.allocate(&cas[0], "node-a").await.unwrap();
    let before = h.node("node-a").await;

    h.store.reset_update_calls();
    let again = h.allocate(&cas[0], "node-a").await.unwrap();
    assert_eq!(again, AllocationResult::for_node("node-a", true));
    assert_eq!(h.store.update_calls(), 0);
    assert_eq!(h.node("node-a").await, before);
}

#[tokio::test]
async fn test_allocate_rejects_immediate_allocation() {
    let h = Harness::new(5);
    let ca = fixtures::claim_allocation("c1", 1, 0);
    let err = h.allocate(&ca, "").await.unwrap_err();
    assert!(matches!(err, DriverError::ImmediateAllocationUnsupported));
}

#[tokio::test]
async fn test_allocate_requires_node_state() {
    let h = Harness::new(5);
    let ca = fixtures::claim_allocation("c1", 1, 0);
    let err = h.allocate(&ca, "node-a").await.unwrap_err();
    assert!(matches!(err, DriverError::Store(ref e) if e.is_not_found()));
}

#[tokio::test]
async fn test_allocate_on_not_ready_node() {
    let h = Harness::new(5);
    h.add_node(fixtures::ready_node("node-a", 8)).await;

    let mut cas = vec![fixtures::claim_allocation("c1", 1, 0)];
    h.filter(&mut cas, &["node-a"]).await;

    let mut nas = h.node("node-a").await;
    nas.status = NodeAllocationStateStatus::NotReady;
    h.store.update(&nas).await.unwrap();

    let err = h.allocate(&cas[0], "node-a").await.unwrap_err();
    assert!(matches!(err, DriverError::NotReady(ref node) if node == "node-a"));
}

#[tokio::test]
async fn test_allocate_without_filtering_first() {
    let h = Harness::new(5);
    h.add_node(fixtures::ready_node("node-a", 8)).await;

    let ca = fixtures::claim_allocation("c1", 1, 0);
    let err = h.allocate(&ca, "node-a").await.unwrap_err();
    assert!(matches!(err, DriverError::PendingNotFound { .. }));
    assert!(h.node("node-a").await.spec.allocated_claims.is_empty());
}

#[tokio::test]
async fn test_allocate_retries_conflicts() {
    let h = Harness::new(5);
    h.add_node(fixtures::ready_node("node-a", 8)).await;

    let mut cas = vec![fixtures::claim_allocation("c1", 2, 0)];
    h.filter(&mut cas, &["node-a"]).await;
    let uid = cas[0].claim.uid;
    let proposed = h.driver.pending().get(&uid, "node-a").unwrap();

    h.store.fail_next_updates(4);
    h.allocate(&cas[0], "node-a").await.unwrap();

    assert_eq!(h.store.update_calls(), 5);
    let nas = h.node("node-a").await;
    assert_eq!(nas.spec.allocated_claims.get(&uid), Some(&proposed));
}

#[tokio::test]
async fn test_allocate_gives_up_after_retry_budget() {
    let h = Harness::new(3);
    h.add_node(fixtures::ready_node("node-a", 8)).await;

    let mut cas = vec![fixtures::claim_allocation("c1", 2, 0)];
    h.filter(&mut cas, &["node-a"]).await;
    let uid = cas[0].claim.uid;
    let before = h.node("node-a").await;

    h.store.fail_next_updates(10);
    let err = h.allocate(&cas[0], "node-a").await.unwrap_err();
    assert!(matches!(
        err,
        DriverError::Store(StoreError::Persistence { attempts: 3, .. })
    ));

    assert_eq!(h.store.update_calls(), 3);
    assert_eq!(h.node("node-a").await, before);
    // The proposal survives so the framework can retry
    assert!(h.driver.pending().exists(&uid, "node-a"));
}

#[tokio::test]
async fn test_concurrent_allocations_on_one_node_get_disjoint_devices() {
    let h = Harness::new(5);
    h.add_node(fixtures::ready_node("node-a", 8)).await;

    let mut first = vec![fixtures::claim_allocation("c1", 4, 0)];
    let mut second = vec![fixtures::claim_allocation("c2", 4, 0)];
    h.filter(&mut first, &["node-a"]).await;
    h.filter(&mut second, &["node-a"]).await;

    let (a, b) = tokio::join!(
        h.allocate(&first[0], "node-a"),
        h.allocate(&second[0], "node-a")
    );
    a.unwrap();
    b.unwrap();

    let nas = h.node("node-a").await;
    let one = nas.spec.allocated_claims[&first[0].claim.uid].uuids();
    let two = nas.spec.allocated_claims[&second[0].claim.uid].uuids();
    assert_eq!(one.len() + two.len(), 8);
    assert!(one.iter().all(|uuid| !two.contains(uuid)));
}

// =============================================================================
// Deallocate
// =============================================================================

#[tokio::test]
async fn test_deallocate_releases_devices() {
    let h = Harness::new(5);
    h.add_node(fixtures::ready_node("node-a", 8)).await;

    let mut cas = vec![fixtures::claim_allocation("c1", 2, 0)];
    h.filter(&mut cas, &["node-a"]).await;
    let result = h.allocate(&cas[0], "node-a").await.unwrap();

    let claim = bound(&cas[0].claim, result);
    h.driver.deallocate(&claim).await.unwrap();

    let nas = h.node("node-a").await;
    assert!(nas.spec.allocated_claims.is_empty());
    assert!(h.driver.pending().is_empty());

    // The freed devices can be proposed again
    let mut again = vec![fixtures::claim_allocation("c2", 8, 0)];
    h.filter(&mut again, &["node-a"]).await;
    assert!(again[0].unsuitable_nodes.is_empty());
}

#[tokio::test]
async fn test_deallocate_unknown_claim_does_not_write() {
    let h = Harness::new(5);
    h.add_node(fixtures::ready_node("node-a", 8)).await;

    let claim = bound(
        &fixtures::claim("c1"),
        AllocationResult::for_node("node-a", true),
    );
    h.driver.deallocate(&claim).await.unwrap();
    assert_eq!(h.store.update_calls(), 0);
}

#[tokio::test]
async fn test_deallocate_without_allocation_is_noop() {
    let h = Harness::new(5);
    h.driver.deallocate(&fixtures::claim("c1")).await.unwrap();

    // A malformed node selector is not an error either
    let claim = bound(
        &fixtures::claim("c2"),
        AllocationResult {
            available_on_nodes: None,
            shareable: true,
        },
    );
    h.driver.deallocate(&claim).await.unwrap();
    assert_eq!(h.store.update_calls(), 0);
}

// =============================================================================
// UnsuitableNodes
// =============================================================================

#[tokio::test]
async fn test_missing_and_not_ready_nodes_are_unsuitable() {
    let h = Harness::new(5);
    h.add_node(fixtures::ready_node("node-a", 8)).await;
    let mut down = fixtures::ready_node("down", 8);
    down.status = NodeAllocationStateStatus::NotReady;
    h.add_node(down).await;

    let mut cas = vec![
        fixtures::claim_allocation("c1", 1, 0),
        fixtures::claim_allocation("c2", 1, 0),
    ];
    h.filter(&mut cas, &["missing", "node-a", "missing", "down"])
        .await;

    for ca in &cas {
        assert_eq!(ca.unsuitable_nodes, vec!["missing", "down"]);
        assert!(h.driver.pending().exists(&ca.claim.uid, "node-a"));
        assert!(!h.driver.pending().exists(&ca.claim.uid, "down"));
    }
}

#[tokio::test]
async fn test_pod_is_admitted_all_or_nothing() {
    let h = Harness::new(5);
    h.add_node(fixtures::ready_node("node-a", 4)).await;
    h.add_node(fixtures::ready_node("node-b", 8)).await;

    let mut cas = vec![
        fixtures::claim_allocation("c1", 2, 0),
        fixtures::claim_allocation("c2", 3, 0),
    ];
    h.filter(&mut cas, &["node-a", "node-b"]).await;

    for ca in &cas {
        assert_eq!(ca.unsuitable_nodes, vec!["node-a"]);
        assert!(!h.driver.pending().exists(&ca.claim.uid, "node-a"));
        assert!(h.driver.pending().exists(&ca.claim.uid, "node-b"));
    }
}

#[tokio::test]
async fn test_committed_devices_are_not_offered_again() {
    let h = Harness::new(5);
    h.add_node(fixtures::ready_node("node-a", 3)).await;

    let mut first = vec![fixtures::claim_allocation("c1", 2, 0)];
    h.filter(&mut first, &["node-a"]).await;
    h.allocate(&first[0], "node-a").await.unwrap();

    let mut second = vec![fixtures::claim_allocation("c2", 2, 0)];
    h.filter(&mut second, &["node-a"]).await;
    assert_eq!(second[0].unsuitable_nodes, vec!["node-a"]);
}

// =============================================================================
// Parameters
// =============================================================================

fn store_claim_parameters(h: &Harness, name: &str, count: u32, split: u32) {
    h.params.insert_fake_claim_parameters(FakeClaimParameters {
        metadata: ObjectMeta {
            name: name.to_string(),
            namespace: "default".to_string(),
            resource_version: 1,
        },
        spec: FakeClaimParametersSpec {
            count,
            split,
            selector: None,
        },
    });
}

#[tokio::test]
async fn test_claim_parameters_resolution() {
    let h = Harness::new(5);
    let class = fixtures::resource_class();
    store_claim_parameters(&h, "two", 2, 1);
    store_claim_parameters(&h, "broken", 0, 1);

    let params = h
        .driver
        .get_claim_parameters(&fixtures::claim("c"), &class)
        .await
        .unwrap();
    assert_eq!(
        params,
        ClaimParameters::Fake(FakeClaimParametersSpec::default())
    );

    let params = h
        .driver
        .get_claim_parameters(&fixtures::claim_with_params("c", "two"), &class)
        .await
        .unwrap();
    let ClaimParameters::Fake(spec) = params;
    assert_eq!((spec.count, spec.split), (2, 1));

    let err = h
        .driver
        .get_claim_parameters(&fixtures::claim_with_params("c", "broken"), &class)
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Validation(_)));

    let err = h
        .driver
        .get_claim_parameters(&fixtures::claim_with_params("c", "absent"), &class)
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::ParametersNotFound { .. }));
}

#[tokio::test]
async fn test_claim_parameters_reject_foreign_references() {
    let h = Harness::new(5);
    let class = fixtures::resource_class();

    let mut claim = fixtures::claim("c");
    claim.parameters_ref = Some(ParametersRef {
        api_group: "example.com".to_string(),
        kind: FAKE_CLAIM_PARAMETERS_KIND.to_string(),
        name: "p".to_string(),
    });
    let err = h
        .driver
        .get_claim_parameters(&claim, &class)
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::UnknownKind(_)));

    claim.parameters_ref = Some(ParametersRef {
        api_group: DRIVER_NAME.to_string(),
        kind: "GpuClaimParameters".to_string(),
        name: "p".to_string(),
    });
    let err = h
        .driver
        .get_claim_parameters(&claim, &class)
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::UnknownKind(_)));
}

#[tokio::test]
async fn test_class_parameters_default() {
    let h = Harness::new(5);
    let params = h
        .driver
        .get_class_parameters(&fixtures::resource_class())
        .await
        .unwrap();
    assert_eq!(params, DeviceClassParametersSpec::default());
}
