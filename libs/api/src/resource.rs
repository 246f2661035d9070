//! Types exchanged with the scheduling framework and the node runtime.

use fakedra_id::ClaimUid;
use serde::{Deserialize, Serialize};

use crate::{ClaimParameters, DeviceClassParametersSpec, ObjectMeta};

/// Node field used to pin an allocation to one node.
pub const NODE_NAME_FIELD: &str = "metadata.name";

// =============================================================================
// Classes, claims, pods
// =============================================================================

/// Reference to a parameters object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParametersRef {
    #[serde(default)]
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceClass {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters_ref: Option<ParametersRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceClaim {
    pub uid: ClaimUid,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters_ref: Option<ParametersRef>,
    /// Set once the claim has been allocated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation: Option<AllocationResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// One pending claim of a pod, as handed to the unsuitable-nodes filter.
/// The filter appends to `unsuitable_nodes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimAllocation {
    pub claim: ResourceClaim,
    pub class: ResourceClass,
    pub claim_parameters: ClaimParameters,
    pub class_parameters: DeviceClassParametersSpec,
    #[serde(default)]
    pub unsuitable_nodes: Vec<String>,
}

// =============================================================================
// Allocation results
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: NodeSelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorTerm {
    #[serde(default)]
    pub match_fields: Vec<NodeSelectorRequirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelector {
    #[serde(default)]
    pub node_selector_terms: Vec<NodeSelectorTerm>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_on_nodes: Option<NodeSelector>,
    #[serde(default)]
    pub shareable: bool,
}

impl AllocationResult {
    /// An allocation usable only on `node`.
    pub fn for_node(node: &str, shareable: bool) -> Self {
        Self {
            available_on_nodes: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_fields: vec![NodeSelectorRequirement {
                        key: NODE_NAME_FIELD.to_string(),
                        operator: NodeSelectorOperator::In,
                        values: vec![node.to_string()],
                    }],
                }],
            }),
            shareable,
        }
    }
}

// =============================================================================
// Inventory
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedResourcesAttribute {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResourcesInstance {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<NamedResourcesAttribute>,
}

impl NamedResourcesInstance {
    pub fn string_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.string_value.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResourcesResources {
    #[serde(default)]
    pub instances: Vec<NamedResourcesInstance>,
}

/// Inventory published by a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceModel {
    pub named_resources: NamedResourcesResources,
}

// =============================================================================
// Structured parameters
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResourcesRequest {
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequest {
    pub named_resources: NamedResourcesRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverRequests {
    pub driver_name: String,
    pub vendor_parameters: serde_json::Value,
    pub requests: Vec<ResourceRequest>,
}

/// Identifies the vendor object a ResourceClaimParameters was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceClaimParametersReference {
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

/// Generic claim parameters understood by the scheduler without the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceClaimParameters {
    pub metadata: ObjectMeta,
    pub generated_from: ResourceClaimParametersReference,
    pub driver_requests: Vec<DriverRequests>,
    pub shareable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResourcesAllocationResult {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverAllocationResult {
    pub named_resources: NamedResourcesAllocationResult,
}

/// Allocation made by the scheduler itself from a published resource model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredResourceHandle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_claim_parameters: Option<serde_json::Value>,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub results: Vec<DriverAllocationResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_result_for_node() {
        let result = AllocationResult::for_node("node-a", true);
        let json = serde_json::to_value(&result).unwrap();
        let requirement = &json["availableOnNodes"]["nodeSelectorTerms"][0]["matchFields"][0];
        assert_eq!(requirement["key"], "metadata.name");
        assert_eq!(requirement["operator"], "In");
        assert_eq!(requirement["values"][0], "node-a");
        assert_eq!(json["shareable"], true);
    }

    #[test]
    fn test_claim_without_allocation() {
        let json = r#"{"uid": "0b7f5a8e-2c1d-4f4e-9d55-3a1b2c3d4e5f", "name": "claim-a"}"#;
        let claim: ResourceClaim = serde_json::from_str(json).unwrap();
        assert!(claim.allocation.is_none());
        assert!(claim.parameters_ref.is_none());
        assert_eq!(claim.namespace, "");
    }

    #[test]
    fn test_string_attribute_lookup() {
        let instance = NamedResourcesInstance {
            name: "fake-1".to_string(),
            attributes: vec![NamedResourcesAttribute {
                name: "model".to_string(),
                string_value: Some("LATEST-FAKE-MODEL".to_string()),
            }],
        };
        assert_eq!(instance.string_attribute("model"), Some("LATEST-FAKE-MODEL"));
        assert_eq!(instance.string_attribute("uuid"), None);
    }
}
