//! Allocations proposed by the unsuitable-nodes filter and not yet committed.
//!
//! The filter records, per (claim, node), the devices it would hand out if
//! the scheduler picked that node. `Allocate` later commits the entry for the
//! chosen node and drops the claim's entries for every node.
//!
//! # Traversal
//!
//! [`PendingAllocationTracker::visit_node`] and
//! [`PendingAllocationTracker::visit_all`] do not hold the lock while the
//! visitor runs, so a visitor may call back into the tracker (e.g. `remove`).
//! The traversal is therefore not atomic: an entry removed before the
//! traversal reaches it is skipped, entries added during the traversal may be
//! missed, and every visited entry is read at the moment it is visited.

use std::collections::HashMap;

use fakedra_api::AllocatedDevices;
use fakedra_id::ClaimUid;
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct PendingAllocationTracker {
    allocations: RwLock<HashMap<ClaimUid, HashMap<String, AllocatedDevices>>>,
}

impl PendingAllocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, claim: &ClaimUid, node: &str) -> bool {
        self.allocations
            .read()
            .get(claim)
            .is_some_and(|nodes| nodes.contains_key(node))
    }

    pub fn get(&self, claim: &ClaimUid, node: &str) -> Option<AllocatedDevices> {
        self.allocations
            .read()
            .get(claim)
            .and_then(|nodes| nodes.get(node))
            .cloned()
    }

    pub fn set(&self, claim: ClaimUid, node: &str, devices: AllocatedDevices) {
        self.allocations
            .write()
            .entry(claim)
            .or_default()
            .insert(node.to_string(), devices);
    }

    pub fn remove_node(&self, claim: &ClaimUid, node: &str) {
        let mut allocations = self.allocations.write();
        if let Some(nodes) = allocations.get_mut(claim) {
            nodes.remove(node);
            if nodes.is_empty() {
                allocations.remove(claim);
            }
        }
    }

    /// Drop the claim's entries on every node.
    pub fn remove(&self, claim: &ClaimUid) {
        self.allocations.write().remove(claim);
    }

    /// Number of claims with at least one pending entry.
    pub fn len(&self) -> usize {
        self.allocations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.read().is_empty()
    }

    /// Call `visitor` for each claim with a pending entry on `node`.
    pub fn visit_node<F>(&self, node: &str, mut visitor: F)
    where
        F: FnMut(ClaimUid, AllocatedDevices),
    {
        let claims: Vec<ClaimUid> = self.allocations.read().keys().copied().collect();
        for claim in claims {
            let entry = self.get(&claim, node);
            if let Some(devices) = entry {
                visitor(claim, devices);
            }
        }
    }

    /// Call `visitor` for every (claim, node) entry.
    pub fn visit_all<F>(&self, mut visitor: F)
    where
        F: FnMut(ClaimUid, &str, AllocatedDevices),
    {
        let keys: Vec<(ClaimUid, String)> = self
            .allocations
            .read()
            .iter()
            .flat_map(|(claim, nodes)| nodes.keys().map(move |node| (*claim, node.clone())))
            .collect();
        for (claim, node) in keys {
            let entry = self.get(&claim, &node);
            if let Some(devices) = entry {
                visitor(claim, &node, devices);
            }
        }
    }
}
