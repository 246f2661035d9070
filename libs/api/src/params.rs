//! Claim and class parameter payloads.

use serde::{Deserialize, Serialize};

use crate::{DeviceType, ObjectMeta};

/// Kind of the vendor claim parameters object.
pub const FAKE_CLAIM_PARAMETERS_KIND: &str = "FakeClaimParameters";

/// Kind of the vendor class parameters object.
pub const DEVICE_CLASS_PARAMETERS_KIND: &str = "DeviceClassParameters";

// =============================================================================
// Claim parameters
// =============================================================================

/// Restricts which devices may satisfy a claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl FakeSelector {
    /// Renders the selector as a named-resources selector expression.
    pub fn to_named_resources_selector(&self) -> String {
        match &self.model {
            Some(model) => format!("attributes.string[\"model\"] == {model:?}"),
            None => "true".to_string(),
        }
    }
}

/// Parameters of a claim for fabricated devices.
///
/// `count` devices are reserved; when `split` is non-zero each of them is
/// subdivided into that many virtual devices at preparation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeClaimParametersSpec {
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub split: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<FakeSelector>,
}

impl Default for FakeClaimParametersSpec {
    /// One device, no split, no selector.
    fn default() -> Self {
        Self {
            count: 1,
            split: 0,
            selector: None,
        }
    }
}

/// A named FakeClaimParameters object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeClaimParameters {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: FakeClaimParametersSpec,
}

/// Resolved claim parameters, one variant per supported parameters kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ClaimParameters {
    #[serde(rename = "FakeClaimParameters")]
    Fake(FakeClaimParametersSpec),
}

impl ClaimParameters {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fake(_) => FAKE_CLAIM_PARAMETERS_KIND,
        }
    }

    pub fn device_type(&self) -> DeviceType {
        match self {
            Self::Fake(_) => DeviceType::Fake,
        }
    }
}

// =============================================================================
// Class parameters
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelector {
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceClassParametersSpec {
    pub device_selector: Vec<DeviceSelector>,
}

impl Default for DeviceClassParametersSpec {
    /// Selects every fabricated device.
    fn default() -> Self {
        Self {
            device_selector: vec![DeviceSelector {
                device_type: DeviceType::Fake,
                name: "*".to_string(),
            }],
        }
    }
}

/// A named, cluster-scoped DeviceClassParameters object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClassParameters {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: DeviceClassParametersSpec,
}

fn default_count() -> u32 {
    1
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}
