//! Device variants recorded in a NodeAllocationState.
//!
//! Each variant carries a `type` discriminator on the wire so that new device
//! kinds can be added without changing existing call sites.

use fakedra_id::DeviceUuid;
use serde::{Deserialize, Serialize};

/// Model label published for every fabricated device.
pub const FAKE_MODEL: &str = "LATEST-FAKE-MODEL";

/// Kind of device a variant describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Fake,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fake => "fake",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Allocatable
// =============================================================================

/// A fabricated device published by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatableFake {
    pub uuid: DeviceUuid,
    pub model: String,
}

/// A device a node can hand out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AllocatableDevice {
    Fake(AllocatableFake),
}

impl AllocatableDevice {
    pub fn device_type(&self) -> DeviceType {
        match self {
            Self::Fake(_) => DeviceType::Fake,
        }
    }

    pub fn uuid(&self) -> DeviceUuid {
        match self {
            Self::Fake(fake) => fake.uuid,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Fake(fake) => &fake.model,
        }
    }
}

// =============================================================================
// Allocated
// =============================================================================

/// A device reserved for a claim. `split > 0` asks the node to subdivide it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedFake {
    pub uuid: DeviceUuid,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub split: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedFakes {
    #[serde(default)]
    pub devices: Vec<AllocatedFake>,
}

/// The set of devices committed to one claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AllocatedDevices {
    Fake(AllocatedFakes),
}

impl AllocatedDevices {
    pub fn device_type(&self) -> DeviceType {
        match self {
            Self::Fake(_) => DeviceType::Fake,
        }
    }

    /// UUIDs of the allocatable devices this allocation references.
    pub fn uuids(&self) -> Vec<DeviceUuid> {
        match self {
            Self::Fake(fakes) => fakes.devices.iter().map(|d| d.uuid).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Fake(fakes) => fakes.devices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Prepared
// =============================================================================

/// A device made visible to containers. `parent_uuid` is set on split children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedFake {
    pub uuid: DeviceUuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<DeviceUuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedFakes {
    #[serde(default)]
    pub devices: Vec<PreparedFake>,
}

/// The devices prepared on a node for one claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PreparedDevices {
    Fake(PreparedFakes),
}

impl PreparedDevices {
    pub fn device_type(&self) -> DeviceType {
        match self {
            Self::Fake(_) => DeviceType::Fake,
        }
    }

    pub fn uuids(&self) -> Vec<DeviceUuid> {
        match self {
            Self::Fake(fakes) => fakes.devices.iter().map(|d| d.uuid).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Fake(fakes) => fakes.devices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocated_devices_type_tag() {
        let uuid = DeviceUuid::new();
        let devices = AllocatedDevices::Fake(AllocatedFakes {
            devices: vec![AllocatedFake { uuid, split: 0 }],
        });

        let json = serde_json::to_value(&devices).unwrap();
        assert_eq!(json["type"], "fake");
        assert_eq!(json["devices"][0]["uuid"], uuid.to_string());
        assert!(json["devices"][0].get("split").is_none());
    }

    #[test]
    fn test_allocated_split_serialized_when_set() {
        let devices = AllocatedDevices::Fake(AllocatedFakes {
            devices: vec![AllocatedFake {
                uuid: DeviceUuid::new(),
                split: 3,
            }],
        });
        let json = serde_json::to_value(&devices).unwrap();
        assert_eq!(json["devices"][0]["split"], 3);
    }

    #[test]
    fn test_prepared_parent_uuid_camel_case() {
        let parent = DeviceUuid::new();
        let prepared = PreparedDevices::Fake(PreparedFakes {
            devices: vec![PreparedFake {
                uuid: DeviceUuid::new(),
                parent_uuid: Some(parent),
            }],
        });
        let json = serde_json::to_value(&prepared).unwrap();
        assert_eq!(json["devices"][0]["parentUuid"], parent.to_string());
    }

    #[test]
    fn test_unknown_device_type_rejected() {
        let json = r#"{"type": "gpu", "devices": []}"#;
        assert!(serde_json::from_str::<AllocatedDevices>(json).is_err());
    }

    #[test]
    fn test_allocatable_accessors() {
        let uuid = DeviceUuid::new();
        let device = AllocatableDevice::Fake(AllocatableFake {
            uuid,
            model: FAKE_MODEL.to_string(),
        });
        assert_eq!(device.device_type(), DeviceType::Fake);
        assert_eq!(device.uuid(), uuid);
        assert_eq!(device.model(), FAKE_MODEL);
    }
}
