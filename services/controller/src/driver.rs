//! Cluster-facing allocation driver.
//!
//! The scheduling framework calls into [`Driver`] for parameter resolution,
//! node filtering and allocation. All mutations of a node's
//! NodeAllocationState happen under that node's lock and go through a
//! conflict-retried read-modify-write.

use std::collections::HashSet;
use std::sync::Arc;

use fakedra_api::{
    AllocatedDevices, AllocationResult, ClaimAllocation, ClaimParameters, DeviceClassParametersSpec,
    FakeClaimParameters, FakeClaimParametersSpec, Pod, ResourceClaim, ResourceClaimParameters,
    ResourceClaimParametersReference, ResourceClass, DEVICE_CLASS_PARAMETERS_KIND, DRIVER_NAME, FAKE_CLAIM_PARAMETERS_KIND, NODE_NAME_FIELD,
};
use fakedra_nodestate::{retry_on_conflict, NodeStateClient, NodeStateStore, RetryPolicy};
use tracing::{debug, info, instrument, warn};

use crate::claim_params::ResourceClaimParametersRegistry;
use crate::error::DriverError;
use crate::fake::{FakeAllocator, FakeClaimRequest, OnSuccess};
use crate::mutex::NodeLockTable;
use crate::params::ParametersSource;
use crate::pending::PendingAllocationTracker;

/// Allocation driver for fabricated devices.
pub struct Driver {
    namespace: String,
    store: Arc<dyn NodeStateStore>,
    params: Arc<dyn ParametersSource>,
    locks: NodeLockTable,
    fake: FakeAllocator,
    generated: ResourceClaimParametersRegistry,
    retry: RetryPolicy,
}

impl Driver {
    pub fn new(
        namespace: impl Into<String>,
        store: Arc<dyn NodeStateStore>,
        params: Arc<dyn ParametersSource>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            store,
            params,
            locks: NodeLockTable::new(),
            fake: FakeAllocator::new(),
            generated: ResourceClaimParametersRegistry::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pending(&self) -> &PendingAllocationTracker {
        self.fake.pending()
    }

    fn client(&self, node: &str) -> NodeStateClient {
        NodeStateClient::new(Arc::clone(&self.store), &self.namespace, node)
    }

    /// Generate ResourceClaimParameters for each vendor object.
    ///
    /// Objects that fail to convert are logged and skipped.
    pub fn publish_claim_parameters(&self, objects: &[FakeClaimParameters]) {
        for object in objects {
            if let Err(e) = self.generated.create_or_update(object) {
                warn!(
                    name = %object.metadata.name,
                    namespace = %object.metadata.namespace,
                    error = %e,
                    "Failed to generate ResourceClaimParameters"
                );
            }
        }
    }

    /// The ResourceClaimParameters generated from FakeClaimParameters `name`.
    pub fn get_resource_claim_parameters(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ResourceClaimParameters, DriverError> {
        let generated_from = ResourceClaimParametersReference {
            api_group: DRIVER_NAME.to_string(),
            kind: FAKE_CLAIM_PARAMETERS_KIND.to_string(),
            name: name.to_string(),
        };
        self.generated
            .get(namespace, &generated_from)
            .ok_or_else(|| DriverError::ParametersNotFound {
                kind: "ResourceClaimParameters".to_string(),
                name: format!("{namespace}/{name}"),
            })
    }

    pub fn list_resource_claim_parameters(
        &self,
        namespace: Option<&str>,
    ) -> Vec<ResourceClaimParameters> {
        self.generated.list(namespace)
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    #[instrument(skip(self, class), fields(class = %class.name))]
    pub async fn get_class_parameters(
        &self,
        class: &ResourceClass,
    ) -> Result<DeviceClassParametersSpec, DriverError> {
        let Some(reference) = &class.parameters_ref else {
            return Ok(DeviceClassParametersSpec::default());
        };
        if reference.api_group != DRIVER_NAME {
            return Err(DriverError::UnknownKind(format!(
                "incorrect API group: {}",
                reference.api_group
            )));
        }
        if reference.kind != DEVICE_CLASS_PARAMETERS_KIND {
            return Err(DriverError::UnknownKind(format!(
                "unknown ResourceClass.ParametersRef.Kind: {}",
                reference.kind
            )));
        }

        self.params
            .device_class_parameters(&reference.name)
            .await?
            .ok_or_else(|| DriverError::ParametersNotFound {
                kind: reference.kind.clone(),
                name: reference.name.clone(),
            })
    }

    #[instrument(skip(self, claim, _class), fields(claim_uid = %claim.uid))]
    pub async fn get_claim_parameters(
        &self,
        claim: &ResourceClaim,
        _class: &ResourceClass,
    ) -> Result<ClaimParameters, DriverError> {
        let Some(reference) = &claim.parameters_ref else {
            return Ok(ClaimParameters::Fake(FakeClaimParametersSpec::default()));
        };
        if reference.api_group != DRIVER_NAME {
            return Err(DriverError::UnknownKind(format!(
                "incorrect API group: {}",
                reference.api_group
            )));
        }

        match reference.kind.as_str() {
            FAKE_CLAIM_PARAMETERS_KIND => {
                let spec = self
                    .params
                    .fake_claim_parameters(&claim.namespace, &reference.name)
                    .await?
                    .ok_or_else(|| DriverError::ParametersNotFound {
                        kind: reference.kind.clone(),
                        name: reference.name.clone(),
                    })?;
                self.fake.validate_claim_parameters(&spec)?;
                Ok(ClaimParameters::Fake(spec))
            }
            other => Err(DriverError::UnknownKind(format!(
                "unknown ResourceClaim.ParametersRef.Kind: {other}"
            ))),
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Commit the pending allocation of `claim` on `selected_node`.
    #[instrument(skip_all, fields(claim_uid = %claim.uid, node = %selected_node))]
    pub async fn allocate(
        &self,
        claim: &ResourceClaim,
        claim_parameters: &ClaimParameters,
        _class: &ResourceClass,
        _class_parameters: &DeviceClassParametersSpec,
        selected_node: &str,
    ) -> Result<AllocationResult, DriverError> {
        if selected_node.is_empty() {
            return Err(DriverError::ImmediateAllocationUnsupported);
        }

        let lock = self.locks.get(selected_node);
        let _guard = lock.lock().await;

        let client = &self.client(selected_node);
        let uid = claim.uid;
        let on_success: Option<OnSuccess> = retry_on_conflict(&self.retry, || async move {
            let nas = client.get().await?;
            if nas.spec.allocated_claims.contains_key(&uid) {
                debug!("Claim already allocated on node");
                return Ok(None);
            }
            if !nas.is_ready() {
                return Err(DriverError::NotReady(selected_node.to_string()));
            }

            let mut spec = nas.spec.clone();
            let on_success: OnSuccess = match claim_parameters {
                ClaimParameters::Fake(_) => self.fake.allocate(&mut spec, uid, selected_node)?,
            };
            client.update(&nas, spec).await?;
            Ok::<_, DriverError>(Some(on_success))
        })
        .await?;

        if let Some(on_success) = on_success {
            on_success();
            info!("Allocated claim");
        }

        Ok(AllocationResult::for_node(selected_node, true))
    }

    /// Release whatever `claim` holds on the node it was allocated on.
    #[instrument(skip_all, fields(claim_uid = %claim.uid))]
    pub async fn deallocate(&self, claim: &ResourceClaim) -> Result<(), DriverError> {
        let Some(allocation) = &claim.allocation else {
            debug!("Claim has no allocation, nothing to do");
            return Ok(());
        };
        let Some(node) = selected_node(allocation) else {
            return Ok(());
        };

        let lock = self.locks.get(&node);
        let _guard = lock.lock().await;

        let client = &self.client(&node);
        let uid = claim.uid;
        retry_on_conflict(&self.retry, || async move {
            let nas = client.get().await?;
            let Some(devices) = nas.spec.allocated_claims.get(&uid) else {
                debug!("Claim not recorded on node");
                self.fake.deallocate(&uid);
                return Ok(());
            };

            match devices {
                AllocatedDevices::Fake(_) => self.fake.deallocate(&uid),
            }

            let mut spec = nas.spec.clone();
            spec.allocated_claims.remove(&uid);
            client.update(&nas, spec).await?;
            Ok::<_, DriverError>(())
        })
        .await?;

        info!(node = %node, "Deallocated claim");
        Ok(())
    }

    // =========================================================================
    // Filtering
    // =========================================================================

    /// Append every node in `potential_nodes` that cannot host all of the
    /// pod's claims to each claim's unsuitable list.
    #[instrument(skip_all, fields(pod = %pod.name, nodes = potential_nodes.len()))]
    pub async fn unsuitable_nodes(
        &self,
        pod: &Pod,
        claim_allocations: &mut [ClaimAllocation],
        potential_nodes: &[String],
    ) {
        for node in potential_nodes {
            self.unsuitable_node(claim_allocations, node).await;
        }

        for ca in claim_allocations.iter_mut() {
            ca.unsuitable_nodes = unique(std::mem::take(&mut ca.unsuitable_nodes));
        }
    }

    async fn unsuitable_node(&self, claim_allocations: &mut [ClaimAllocation], node: &str) {
        let lock = self.locks.get(node);
        let _guard = lock.lock().await;

        let nas = match self.client(node).get().await {
            Ok(nas) => nas,
            Err(e) => {
                debug!(node = %node, error = %e, "Cannot read NodeAllocationState, node is unsuitable");
                mark_all(claim_allocations, node);
                return;
            }
        };
        if !nas.is_ready() {
            debug!(node = %node, "Node is not ready, node is unsuitable");
            mark_all(claim_allocations, node);
            return;
        }

        // One batch per device kind.
        let fakes = fake_requests(claim_allocations);
        if !fakes.is_empty() {
            self.fake
                .unsuitable_node_for_claim_batch(&nas, &fakes, claim_allocations, node);
        }
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("namespace", &self.namespace)
            .field("retry", &self.retry)
            .finish()
    }
}

fn fake_requests(claim_allocations: &[ClaimAllocation]) -> Vec<FakeClaimRequest> {
    claim_allocations
        .iter()
        .map(|ca| match &ca.claim_parameters {
            ClaimParameters::Fake(params) => FakeClaimRequest {
                uid: ca.claim.uid,
                params: params.clone(),
            },
        })
        .collect()
}

fn mark_all(claim_allocations: &mut [ClaimAllocation], node: &str) {
    for ca in claim_allocations.iter_mut() {
        ca.unsuitable_nodes.push(node.to_string());
    }
}

/// Node an allocation result is bound to.
///
/// Reads the first value of the first field of the first term; any level
/// being absent yields `None`.
pub fn selected_node(allocation: &AllocationResult) -> Option<String> {
    let Some(selector) = &allocation.available_on_nodes else {
        warn!("Allocation result has no node selector");
        return None;
    };
    let Some(term) = selector.node_selector_terms.first() else {
        warn!("Allocation result has no node selector terms");
        return None;
    };
    let Some(field) = term.match_fields.first() else {
        warn!("Allocation result has no match fields");
        return None;
    };
    if field.key != NODE_NAME_FIELD {
        debug!(key = %field.key, "Unexpected match field key");
    }
    let Some(node) = field.values.first() else {
        warn!("Allocation result has no node name");
        return None;
    };
    Some(node.clone())
}

/// Drop duplicates, keeping the first occurrence of each.
fn unique(nodes: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(nodes.len());
    nodes
        .into_iter()
        .filter(|node| seen.insert(node.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakedra_api::{NodeSelector, NodeSelectorTerm};

    #[test]
    fn test_unique_keeps_first_seen_order() {
        let nodes = ["b", "a", "b", "c", "a"].map(String::from).to_vec();
        assert_eq!(unique(nodes), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_selected_node() {
        let allocation = AllocationResult::for_node("node-a", true);
        assert_eq!(selected_node(&allocation).as_deref(), Some("node-a"));
    }

    #[test]
    fn test_selected_node_soft_fails() {
        let mut allocation = AllocationResult {
            available_on_nodes: None,
            shareable: true,
        };
        assert!(selected_node(&allocation).is_none());

        allocation.available_on_nodes = Some(NodeSelector::default());
        assert!(selected_node(&allocation).is_none());

        allocation.available_on_nodes = Some(NodeSelector {
            node_selector_terms: vec![NodeSelectorTerm::default()],
        });
        assert!(selected_node(&allocation).is_none());

        let mut bound = AllocationResult::for_node("node-a", true);
        if let Some(selector) = bound.available_on_nodes.as_mut() {
            selector.node_selector_terms[0].match_fields[0].values.clear();
        }
        assert!(selected_node(&bound).is_none());
    }
}
