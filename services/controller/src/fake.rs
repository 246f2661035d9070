//! Allocation of fabricated devices.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use fakedra_api::{
    AllocatableDevice, AllocatedDevices, AllocatedFake, AllocatedFakes, ClaimAllocation,
    FakeClaimParametersSpec, NodeAllocationState, NodeAllocationStateSpec,
};
use fakedra_id::{ClaimUid, DeviceUuid};
use tracing::{debug, info};

use crate::error::DriverError;
use crate::pending::PendingAllocationTracker;

/// Runs once the allocation it was returned with has been persisted.
pub type OnSuccess = Box<dyn FnOnce() + Send>;

/// A fake-device claim taking part in a filtering pass.
#[derive(Debug, Clone)]
pub struct FakeClaimRequest {
    pub uid: ClaimUid,
    pub params: FakeClaimParametersSpec,
}

/// Outcome of checking one node against a batch of claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFit {
    /// Every claim got its devices; they are recorded as pending.
    Suitable,
    /// At least one claim could not be satisfied; the node was added to every
    /// claim's unsuitable list.
    Unsuitable,
}

/// Picks fabricated devices for claims and tracks proposals until commit.
#[derive(Debug, Default)]
pub struct FakeAllocator {
    pending: Arc<PendingAllocationTracker>,
}

impl FakeAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &PendingAllocationTracker {
        &self.pending
    }

    pub fn validate_claim_parameters(&self, params: &FakeClaimParametersSpec) -> Result<(), DriverError> {
        if params.count < 1 {
            return Err(DriverError::Validation(format!(
                "invalid number of Fakes requested: count={}",
                params.count
            )));
        }
        if params.split < 1 {
            return Err(DriverError::Validation(format!(
                "invalid number of virtual Fakes requested: split={}",
                params.split
            )));
        }
        Ok(())
    }

    /// Commit the pending entry for (`claim`, `node`) into `spec`.
    ///
    /// The caller persists `spec` and then runs the returned callback, which
    /// drops the claim from the pending tracker.
    pub fn allocate(
        &self,
        spec: &mut NodeAllocationStateSpec,
        claim: ClaimUid,
        node: &str,
    ) -> Result<OnSuccess, DriverError> {
        debug!(claim_uid = %claim, node = %node, "Allocating fake devices");

        let Some(devices) = self.pending.get(&claim, node) else {
            return Err(DriverError::PendingNotFound {
                claim,
                node: node.to_string(),
            });
        };
        spec.allocated_claims.insert(claim, devices);

        let pending = Arc::clone(&self.pending);
        Ok(Box::new(move || pending.remove(&claim)))
    }

    pub fn deallocate(&self, claim: &ClaimUid) {
        debug!(claim_uid = %claim, "Deallocating fake devices");
        self.pending.remove(claim);
    }

    /// Decide whether `node` can host every claim in `batch`.
    ///
    /// All claims of the pod are in `all_claims`; when any claim in `batch`
    /// cannot get its devices, `node` is appended to the unsuitable list of
    /// every one of them and nothing is recorded as pending.
    pub fn unsuitable_node_for_claim_batch(
        &self,
        nas: &NodeAllocationState,
        batch: &[FakeClaimRequest],
        all_claims: &mut [ClaimAllocation],
        node: &str,
    ) -> NodeFit {
        let mut allocated = self.sync_pending(nas, node);
        let picked = pick_devices(&nas.spec.allocatable_devices, &mut allocated, batch);

        for request in batch {
            let got = picked.get(&request.uid).map_or(0, Vec::len);
            if got < request.params.count as usize {
                info!(
                    node = %node,
                    claim_uid = %request.uid,
                    requested = request.params.count,
                    available = got,
                    "Not enough fake devices available, node is unsuitable"
                );
                mark_unsuitable(all_claims, node);
                return NodeFit::Unsuitable;
            }
        }

        for request in batch {
            let uuids = picked.get(&request.uid).cloned().unwrap_or_default();
            let devices = AllocatedDevices::Fake(AllocatedFakes {
                devices: uuids
                    .into_iter()
                    .map(|uuid| AllocatedFake {
                        uuid,
                        split: request.params.split,
                    })
                    .collect(),
            });
            debug!(node = %node, claim_uid = %request.uid, "Saving pending allocation");
            self.pending.set(request.uid, node, devices);
        }

        NodeFit::Suitable
    }

    /// Reconcile pending entries for `node` with what the node has committed.
    ///
    /// Entries already committed are dropped from the tracker. The rest are
    /// folded into the returned working copy of `allocated_claims` so their
    /// devices count as taken.
    fn sync_pending(
        &self,
        nas: &NodeAllocationState,
        node: &str,
    ) -> BTreeMap<ClaimUid, AllocatedDevices> {
        let mut allocated = nas.spec.allocated_claims.clone();
        self.pending.visit_node(node, |claim, devices| {
            if nas.spec.allocated_claims.contains_key(&claim) {
                debug!(claim_uid = %claim, "Claim already allocated, dropping pending entry");
                self.pending.remove(&claim);
            } else {
                debug!(claim_uid = %claim, "Claim not yet allocated, reserving its pending devices");
                allocated.insert(claim, devices);
            }
        });
        allocated
    }
}

/// Choose devices for each claim in `batch`.
///
/// Claims that already hold devices keep them. Others take `count` free
/// devices in UUID order; a claim may end up with fewer than it asked for.
fn pick_devices(
    allocatable: &[AllocatableDevice],
    allocated: &mut BTreeMap<ClaimUid, AllocatedDevices>,
    batch: &[FakeClaimRequest],
) -> BTreeMap<ClaimUid, Vec<DeviceUuid>> {
    let taken: BTreeSet<DeviceUuid> = allocated.values().flat_map(|d| d.uuids()).collect();
    let mut free: BTreeSet<DeviceUuid> = allocatable
        .iter()
        .filter(|d| matches!(d, AllocatableDevice::Fake(_)))
        .map(|d| d.uuid())
        .filter(|uuid| !taken.contains(uuid))
        .collect();

    let mut picked = BTreeMap::new();
    for request in batch {
        if let Some(existing) = allocated.get(&request.uid) {
            picked.insert(request.uid, existing.uuids());
            continue;
        }

        let mut devices = Vec::with_capacity(request.params.count as usize);
        for _ in 0..request.params.count {
            let Some(uuid) = free.pop_first() else {
                break;
            };
            devices.push(uuid);
        }
        picked.insert(request.uid, devices);
    }
    picked
}

fn mark_unsuitable(all_claims: &mut [ClaimAllocation], node: &str) {
    for ca in all_claims.iter_mut() {
        ca.unsuitable_nodes.push(node.to_string());
    }
}
