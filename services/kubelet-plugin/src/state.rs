//! Node-local device state: inventory and prepared claims.

use std::collections::BTreeMap;
use std::sync::Arc;

use fakedra_api::{
    AllocatableDevice, AllocatableFake, AllocatedDevices, AllocatedFakes,
    NamedResourcesAttribute, NamedResourcesInstance, NamedResourcesResources,
    NodeAllocationStateSpec, PreparedDevices, PreparedFake, PreparedFakes, ResourceModel,
};
use fakedra_id::{ClaimUid, DeviceUuid};
use tracing::{debug, info};

use crate::cdi::CdiExporter;
use crate::emulator::{enumerate_split_devices, FakeInfo};
use crate::error::PluginError;

/// Devices prepared for one claim, by device kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedClaim {
    Fake(Vec<FakeInfo>),
}

impl PreparedClaim {
    pub fn len(&self) -> usize {
        match self {
            Self::Fake(devices) => devices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The persisted form of this claim's devices.
    pub fn to_prepared_devices(&self) -> PreparedDevices {
        match self {
            Self::Fake(devices) => PreparedDevices::Fake(PreparedFakes {
                devices: devices
                    .iter()
                    .map(|d| PreparedFake {
                        uuid: d.uuid,
                        parent_uuid: d.parent,
                    })
                    .collect(),
            }),
        }
    }
}

/// Inventory and prepared claims of this node.
///
/// Not synchronized; the node driver serializes access.
pub struct DeviceState {
    cdi: Arc<dyn CdiExporter>,
    allocatable: BTreeMap<DeviceUuid, AllocatableFake>,
    prepared: BTreeMap<ClaimUid, PreparedClaim>,
}

impl DeviceState {
    pub fn new(allocatable: Vec<AllocatableFake>, cdi: Arc<dyn CdiExporter>) -> Self {
        Self {
            cdi,
            allocatable: allocatable.into_iter().map(|d| (d.uuid, d)).collect(),
            prepared: BTreeMap::new(),
        }
    }

    pub fn allocatable(&self) -> impl Iterator<Item = &AllocatableFake> {
        self.allocatable.values()
    }

    pub fn prepared_claims(&self) -> impl Iterator<Item = (&ClaimUid, &PreparedClaim)> {
        self.prepared.iter()
    }

    pub fn is_prepared(&self, claim: &ClaimUid) -> bool {
        self.prepared.contains_key(claim)
    }

    /// Qualified CDI device names of a prepared claim.
    pub fn claim_devices(&self, claim: &ClaimUid) -> Option<Vec<String>> {
        self.prepared
            .get(claim)
            .map(|prepared| self.cdi.claim_devices(&prepared.to_prepared_devices()))
    }

    /// Prepare `allocation` for `claim` and return its CDI device names.
    ///
    /// Preparing an already prepared claim returns the existing names and
    /// has no side effects.
    pub fn prepare(
        &mut self,
        claim: ClaimUid,
        allocation: &AllocatedDevices,
    ) -> Result<Vec<String>, PluginError> {
        if let Some(devices) = self.claim_devices(&claim) {
            debug!(claim_uid = %claim, "Returning already prepared devices");
            return Ok(devices);
        }

        let prepared = match allocation {
            AllocatedDevices::Fake(fakes) => PreparedClaim::Fake(self.prepare_fakes(fakes)?),
        };

        let devices = prepared.to_prepared_devices();
        self.cdi.create_claim_spec(&claim, &devices)?;
        let names = self.cdi.claim_devices(&devices);
        self.prepared.insert(claim, prepared);

        info!(claim_uid = %claim, devices = names.len() - 1, "Prepared claim");
        Ok(names)
    }

    fn prepare_fakes(&self, allocated: &AllocatedFakes) -> Result<Vec<FakeInfo>, PluginError> {
        let mut prepared = Vec::with_capacity(allocated.devices.len());
        for device in &allocated.devices {
            let Some(info) = self.allocatable.get(&device.uuid) else {
                return Err(PluginError::DeviceNotFound(device.uuid));
            };

            if device.split > 0 {
                debug!(parent_uuid = %device.uuid, split = device.split, "Preparing split device");
                prepared.extend(enumerate_split_devices(&device.uuid, &info.model, device.split));
            } else {
                debug!(device_uuid = %device.uuid, "Preparing device");
                prepared.push(FakeInfo {
                    uuid: info.uuid,
                    model: info.model.clone(),
                    parent: None,
                });
            }
        }
        Ok(prepared)
    }

    /// Drop `claim`'s prepared devices and its CDI spec. Unknown claims are
    /// ignored.
    pub fn unprepare(&mut self, claim: &ClaimUid) -> Result<(), PluginError> {
        let Some(prepared) = self.prepared.get(claim) else {
            return Ok(());
        };

        match prepared {
            // Nothing to release for fabricated devices.
            PreparedClaim::Fake(_) => {}
        }

        self.cdi.delete_claim_spec(claim)?;
        self.prepared.remove(claim);
        info!(claim_uid = %claim, "Unprepared claim");
        Ok(())
    }

    /// `base` with this node's inventory and prepared claims written in.
    pub fn updated_spec(&self, base: &NodeAllocationStateSpec) -> NodeAllocationStateSpec {
        let mut spec = base.clone();
        spec.allocatable_devices = self
            .allocatable
            .values()
            .cloned()
            .map(AllocatableDevice::Fake)
            .collect();
        spec.prepared_devices = self
            .prepared
            .iter()
            .map(|(claim, prepared)| (*claim, prepared.to_prepared_devices()))
            .collect();
        spec
    }

    /// Rebuild the prepared claims recorded in `spec`, e.g. after a restart.
    ///
    /// Split children are matched to their parent's model; every referenced
    /// device must be part of this node's inventory.
    pub fn sync_prepared_from_spec(&mut self, spec: &NodeAllocationStateSpec) -> Result<(), PluginError> {
        let mut prepared = BTreeMap::new();
        for (claim, devices) in &spec.prepared_devices {
            match devices {
                PreparedDevices::Fake(fakes) => {
                    let mut infos = Vec::with_capacity(fakes.devices.len());
                    for device in &fakes.devices {
                        let source = device.parent_uuid.unwrap_or(device.uuid);
                        let Some(info) = self.allocatable.get(&source) else {
                            return Err(PluginError::DeviceNotFound(source));
                        };
                        infos.push(FakeInfo {
                            uuid: device.uuid,
                            model: info.model.clone(),
                            parent: device.parent_uuid,
                        });
                    }
                    prepared.insert(*claim, PreparedClaim::Fake(infos));
                }
            }
        }

        info!(claims = prepared.len(), "Restored prepared claims");
        self.prepared = prepared;
        Ok(())
    }

    /// Inventory in named-resources form: one instance per device named by
    /// its lowercase UUID, carrying `uuid` and `model` attributes.
    pub fn resource_model(&self) -> ResourceModel {
        let instances = self
            .allocatable
            .values()
            .map(|device| NamedResourcesInstance {
                name: device.uuid.to_resource_name(),
                attributes: vec![
                    NamedResourcesAttribute {
                        name: "uuid".to_string(),
                        string_value: Some(device.uuid.to_string()),
                    },
                    NamedResourcesAttribute {
                        name: "model".to_string(),
                        string_value: Some(device.model.clone()),
                    },
                ],
            })
            .collect();

        ResourceModel {
            named_resources: NamedResourcesResources { instances },
        }
    }
}

impl std::fmt::Debug for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceState")
            .field("allocatable", &self.allocatable.len())
            .field("prepared", &self.prepared.len())
            .finish()
    }
}
