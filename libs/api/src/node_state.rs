//! The NodeAllocationState record.
//!
//! One record exists per node. The kubelet plugin creates it, publishes the
//! node's inventory into it and records prepared devices; the controller
//! records allocations. Every write is conditioned on `resource_version`.

use std::collections::{BTreeMap, BTreeSet};

use fakedra_id::{ClaimUid, DeviceUuid};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AllocatableDevice, AllocatedDevices, PreparedDevices};

/// Object metadata. `resource_version` is bumped by the store on every write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub resource_version: u64,
}

/// Readiness of a node's record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeAllocationStateStatus {
    Ready,
    #[default]
    NotReady,
}

impl NodeAllocationStateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::NotReady => "NotReady",
        }
    }
}

impl std::fmt::Display for NodeAllocationStateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown NodeAllocationState status: {0} (expected Ready or NotReady)")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for NodeAllocationStateStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ready" => Ok(Self::Ready),
            "NotReady" => Ok(Self::NotReady),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAllocationStateSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allocatable_devices: Vec<AllocatableDevice>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub allocated_claims: BTreeMap<ClaimUid, AllocatedDevices>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prepared_devices: BTreeMap<ClaimUid, PreparedDevices>,
}

impl NodeAllocationStateSpec {
    /// UUIDs of every allocatable device.
    pub fn allocatable_uuids(&self) -> BTreeSet<DeviceUuid> {
        self.allocatable_devices.iter().map(|d| d.uuid()).collect()
    }

    /// UUIDs referenced by any claim in `allocated_claims`.
    pub fn allocated_uuids(&self) -> BTreeSet<DeviceUuid> {
        self.allocated_claims
            .values()
            .flat_map(|devices| devices.uuids())
            .collect()
    }

    pub fn find_allocatable(&self, uuid: &DeviceUuid) -> Option<&AllocatableDevice> {
        self.allocatable_devices.iter().find(|d| d.uuid() == *uuid)
    }
}

/// Per-node record shared between the controller and the kubelet plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAllocationState {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: NodeAllocationStateSpec,
    #[serde(default)]
    pub status: NodeAllocationStateStatus,
}

impl NodeAllocationState {
    /// An empty, not-yet-persisted record for `name` in `namespace`.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                resource_version: 0,
            },
            spec: NodeAllocationStateSpec::default(),
            status: NodeAllocationStateStatus::NotReady,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn resource_version(&self) -> u64 {
        self.metadata.resource_version
    }

    pub fn is_ready(&self) -> bool {
        self.status == NodeAllocationStateStatus::Ready
    }
}
