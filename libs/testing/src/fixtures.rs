//! Builders for claims, classes and node records.

use fakedra_api::{
    AllocatableDevice, AllocatableFake, ClaimAllocation, ClaimParameters,
    DeviceClassParametersSpec, FakeClaimParametersSpec, NodeAllocationState,
    NodeAllocationStateStatus, ParametersRef, Pod, ResourceClaim, ResourceClass,
    DRIVER_NAME, FAKE_CLAIM_PARAMETERS_KIND, FAKE_MODEL,
};
use fakedra_id::{ClaimUid, DeviceUuid};

pub const NAMESPACE: &str = "fake-dra";

/// A Ready node record with `device_count` random devices and no claims.
pub fn ready_node(name: &str, device_count: usize) -> NodeAllocationState {
    let mut nas = NodeAllocationState::new(name, NAMESPACE);
    nas.spec.allocatable_devices = (0..device_count)
        .map(|_| {
            AllocatableDevice::Fake(AllocatableFake {
                uuid: DeviceUuid::new(),
                model: FAKE_MODEL.to_string(),
            })
        })
        .collect();
    nas.status = NodeAllocationStateStatus::Ready;
    nas
}

pub fn resource_class() -> ResourceClass {
    ResourceClass {
        name: "fake.3-shake.com".to_string(),
        parameters_ref: None,
    }
}

pub fn claim(name: &str) -> ResourceClaim {
    ResourceClaim {
        uid: ClaimUid::new(),
        name: name.to_string(),
        namespace: "default".to_string(),
        parameters_ref: None,
        allocation: None,
    }
}

/// A claim referencing FakeClaimParameters `params_name`.
pub fn claim_with_params(name: &str, params_name: &str) -> ResourceClaim {
    ResourceClaim {
        parameters_ref: Some(ParametersRef {
            api_group: DRIVER_NAME.to_string(),
            kind: FAKE_CLAIM_PARAMETERS_KIND.to_string(),
            name: params_name.to_string(),
        }),
        ..claim(name)
    }
}

pub fn fake_params(count: u32, split: u32) -> ClaimParameters {
    ClaimParameters::Fake(FakeClaimParametersSpec {
        count,
        split,
        selector: None,
    })
}

/// A pending claim allocation asking for `count` devices.
pub fn claim_allocation(name: &str, count: u32, split: u32) -> ClaimAllocation {
    ClaimAllocation {
        claim: claim(name),
        class: resource_class(),
        claim_parameters: fake_params(count, split),
        class_parameters: DeviceClassParametersSpec::default(),
        unsuitable_nodes: Vec::new(),
    }
}

pub fn pod(name: &str) -> Pod {
    Pod {
        name: name.to_string(),
        namespace: "default".to_string(),
    }
}
