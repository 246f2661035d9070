//! Conversions between gRPC messages and the shared data model.

use std::collections::BTreeMap;

use fakedra_api::rpc::{NodeClaim, PrepareResult, UnprepareResult};
use fakedra_api::{
    DriverAllocationResult, NamedResourcesAllocationResult, NamedResourcesAttribute,
    NamedResourcesInstance, NamedResourcesResources, ResourceModel, StructuredResourceHandle,
};
use fakedra_id::{ClaimUid, IdError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::v1alpha3 as pb;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid claim uid {uid:?}: {source}")]
    InvalidUid {
        uid: String,
        #[source]
        source: IdError,
    },

    #[error("invalid {field}: {source}")]
    InvalidJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing {0}")]
    MissingField(&'static str),
}

impl From<ConvertError> for tonic::Status {
    fn from(e: ConvertError) -> Self {
        tonic::Status::invalid_argument(e.to_string())
    }
}

/// Encode a framework object for a JSON-carrying message field.
pub fn to_json<T: Serialize>(field: &'static str, value: &T) -> Result<String, ConvertError> {
    serde_json::to_string(value).map_err(|source| ConvertError::InvalidJson { field, source })
}

/// Decode a JSON-carrying message field.
pub fn from_json<T: DeserializeOwned>(field: &'static str, raw: &str) -> Result<T, ConvertError> {
    serde_json::from_str(raw).map_err(|source| ConvertError::InvalidJson { field, source })
}

fn parse_uid(uid: &str) -> Result<ClaimUid, ConvertError> {
    ClaimUid::parse(uid).map_err(|source| ConvertError::InvalidUid {
        uid: uid.to_string(),
        source,
    })
}

// =============================================================================
// Claims
// =============================================================================

impl From<&NodeClaim> for pb::Claim {
    fn from(claim: &NodeClaim) -> Self {
        Self {
            namespace: claim.namespace.clone(),
            uid: claim.uid.to_string(),
            name: claim.name.clone(),
            structured_resource_handle: claim
                .structured_resource_handle
                .iter()
                .map(|handle| pb::StructuredResourceHandle {
                    vendor_claim_parameters: handle
                        .vendor_claim_parameters
                        .as_ref()
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                    node_name: handle.node_name.clone(),
                    results: handle
                        .results
                        .iter()
                        .map(|result| pb::DriverAllocationResult {
                            named_resources: Some(pb::NamedResourcesAllocationResult {
                                name: result.named_resources.name.clone(),
                            }),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl TryFrom<pb::Claim> for NodeClaim {
    type Error = ConvertError;

    fn try_from(claim: pb::Claim) -> Result<Self, Self::Error> {
        let structured_resource_handle = claim
            .structured_resource_handle
            .into_iter()
            .map(handle_from_proto)
            .collect::<Result<_, _>>()?;

        Ok(Self {
            namespace: claim.namespace,
            uid: parse_uid(&claim.uid)?,
            name: claim.name,
            structured_resource_handle,
        })
    }
}

fn handle_from_proto(
    handle: pb::StructuredResourceHandle,
) -> Result<StructuredResourceHandle, ConvertError> {
    let vendor_claim_parameters = if handle.vendor_claim_parameters.is_empty() {
        None
    } else {
        Some(from_json(
            "vendor_claim_parameters",
            &handle.vendor_claim_parameters,
        )?)
    };

    let results = handle
        .results
        .into_iter()
        .map(|result| {
            let named = result
                .named_resources
                .ok_or(ConvertError::MissingField("named_resources"))?;
            Ok(DriverAllocationResult {
                named_resources: NamedResourcesAllocationResult { name: named.name },
            })
        })
        .collect::<Result<_, ConvertError>>()?;

    Ok(StructuredResourceHandle {
        vendor_claim_parameters,
        node_name: handle.node_name,
        results,
    })
}

/// Claims of a prepare or unprepare request.
pub fn claims_from_proto(claims: Vec<pb::Claim>) -> Result<Vec<NodeClaim>, ConvertError> {
    claims.into_iter().map(NodeClaim::try_from).collect()
}

// =============================================================================
// Inventory
// =============================================================================

impl From<&ResourceModel> for pb::ResourceModel {
    fn from(model: &ResourceModel) -> Self {
        Self {
            named_resources: Some(pb::NamedResourcesResources {
                instances: model
                    .named_resources
                    .instances
                    .iter()
                    .map(|instance| pb::NamedResourcesInstance {
                        name: instance.name.clone(),
                        attributes: instance
                            .attributes
                            .iter()
                            .map(|a| pb::NamedResourcesAttribute {
                                name: a.name.clone(),
                                string_value: a.string_value.clone(),
                            })
                            .collect(),
                    })
                    .collect(),
            }),
        }
    }
}

impl From<pb::ResourceModel> for ResourceModel {
    fn from(model: pb::ResourceModel) -> Self {
        let instances = model
            .named_resources
            .map(|r| r.instances)
            .unwrap_or_default()
            .into_iter()
            .map(|instance| NamedResourcesInstance {
                name: instance.name,
                attributes: instance
                    .attributes
                    .into_iter()
                    .map(|a| NamedResourcesAttribute {
                        name: a.name,
                        string_value: a.string_value,
                    })
                    .collect(),
            })
            .collect();
        Self {
            named_resources: NamedResourcesResources { instances },
        }
    }
}

impl From<&[ResourceModel]> for pb::NodeListAndWatchResourcesResponse {
    fn from(resources: &[ResourceModel]) -> Self {
        Self {
            resources: resources.iter().map(pb::ResourceModel::from).collect(),
        }
    }
}

// =============================================================================
// Results
// =============================================================================

impl From<PrepareResult> for pb::NodePrepareResourceResponse {
    fn from(result: PrepareResult) -> Self {
        Self {
            cdi_devices: result.cdi_devices,
            error: result.error.unwrap_or_default(),
        }
    }
}

impl From<pb::NodePrepareResourceResponse> for PrepareResult {
    fn from(response: pb::NodePrepareResourceResponse) -> Self {
        Self {
            cdi_devices: response.cdi_devices,
            error: non_empty(response.error),
        }
    }
}

impl From<UnprepareResult> for pb::NodeUnprepareResourceResponse {
    fn from(result: UnprepareResult) -> Self {
        Self {
            error: result.error.unwrap_or_default(),
        }
    }
}

impl From<pb::NodeUnprepareResourceResponse> for UnprepareResult {
    fn from(response: pb::NodeUnprepareResourceResponse) -> Self {
        Self {
            error: non_empty(response.error),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

impl From<BTreeMap<ClaimUid, PrepareResult>> for pb::NodePrepareResourcesResponse {
    fn from(results: BTreeMap<ClaimUid, PrepareResult>) -> Self {
        Self {
            claims: results
                .into_iter()
                .map(|(uid, result)| (uid.to_string(), result.into()))
                .collect(),
        }
    }
}

impl pb::NodePrepareResourcesResponse {
    pub fn into_results(self) -> Result<BTreeMap<ClaimUid, PrepareResult>, ConvertError> {
        self.claims
            .into_iter()
            .map(|(uid, result)| Ok((parse_uid(&uid)?, result.into())))
            .collect()
    }
}

impl From<BTreeMap<ClaimUid, UnprepareResult>> for pb::NodeUnprepareResourcesResponse {
    fn from(results: BTreeMap<ClaimUid, UnprepareResult>) -> Self {
        Self {
            claims: results
                .into_iter()
                .map(|(uid, result)| (uid.to_string(), result.into()))
                .collect(),
        }
    }
}

impl pb::NodeUnprepareResourcesResponse {
    pub fn into_results(self) -> Result<BTreeMap<ClaimUid, UnprepareResult>, ConvertError> {
        self.claims
            .into_iter()
            .map(|(uid, result)| Ok((parse_uid(&uid)?, result.into())))
            .collect()
    }
}
