//! Generation of generic ResourceClaimParameters from FakeClaimParameters.
//!
//! The scheduler can only allocate from a published resource model when a
//! claim's parameters are expressed as named-resource requests. Each vendor
//! object gets one generated counterpart, recreated whenever it changes.

use std::collections::HashMap;

use fakedra_api::{
    DriverRequests, FakeClaimParameters, NamedResourcesRequest, ObjectMeta,
    ResourceClaimParameters, ResourceClaimParametersReference, ResourceRequest, DRIVER_NAME,
    FAKE_CLAIM_PARAMETERS_KIND,
};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::DriverError;

const GENERATED_NAME_PREFIX: &str = "resource-claim-parameters-";

/// Build the ResourceClaimParameters for `params`.
pub fn resource_claim_parameters(
    params: &FakeClaimParameters,
) -> Result<ResourceClaimParameters, DriverError> {
    let spec = &params.spec;
    let count = if spec.count == 0 { 1 } else { spec.count };
    let selector = spec
        .selector
        .as_ref()
        .map(|s| s.to_named_resources_selector())
        .unwrap_or_else(|| "true".to_string());

    let requests = (0..count)
        .map(|_| ResourceRequest {
            named_resources: NamedResourcesRequest {
                selector: selector.clone(),
            },
        })
        .collect();

    Ok(ResourceClaimParameters {
        metadata: ObjectMeta {
            name: format!("{GENERATED_NAME_PREFIX}{}", params.metadata.name),
            namespace: params.metadata.namespace.clone(),
            resource_version: 0,
        },
        generated_from: generated_from(params),
        driver_requests: vec![DriverRequests {
            driver_name: DRIVER_NAME.to_string(),
            vendor_parameters: serde_json::to_value(spec)?,
            requests,
        }],
        shareable: true,
    })
}

fn generated_from(params: &FakeClaimParameters) -> ResourceClaimParametersReference {
    ResourceClaimParametersReference {
        api_group: DRIVER_NAME.to_string(),
        kind: FAKE_CLAIM_PARAMETERS_KIND.to_string(),
        name: params.metadata.name.clone(),
    }
}

/// Generated objects, keyed by namespace and the object they came from.
#[derive(Debug, Default)]
pub struct ResourceClaimParametersRegistry {
    objects: RwLock<HashMap<(String, ResourceClaimParametersReference), ResourceClaimParameters>>,
}

impl ResourceClaimParametersRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the counterpart of `params` and store it, keeping the
    /// metadata of an existing object.
    pub fn create_or_update(
        &self,
        params: &FakeClaimParameters,
    ) -> Result<ResourceClaimParameters, DriverError> {
        let mut generated = resource_claim_parameters(params)?;
        let key = (
            params.metadata.namespace.clone(),
            generated.generated_from.clone(),
        );

        let mut objects = self.objects.write();
        match objects.get(&key) {
            Some(existing) => {
                generated.metadata = existing.metadata.clone();
                generated.metadata.resource_version += 1;
                debug!(name = %generated.metadata.name, "Updated ResourceClaimParameters");
            }
            None => {
                generated.metadata.resource_version = 1;
                info!(
                    name = %generated.metadata.name,
                    namespace = %generated.metadata.namespace,
                    "Created ResourceClaimParameters"
                );
            }
        }
        objects.insert(key, generated.clone());
        Ok(generated)
    }

    pub fn get(
        &self,
        namespace: &str,
        generated_from: &ResourceClaimParametersReference,
    ) -> Option<ResourceClaimParameters> {
        self.objects
            .read()
            .get(&(namespace.to_string(), generated_from.clone()))
            .cloned()
    }

    /// Generated objects in `namespace`, or in every namespace when `None`,
    /// ordered by namespace and name.
    pub fn list(&self, namespace: Option<&str>) -> Vec<ResourceClaimParameters> {
        let mut objects: Vec<_> = self
            .objects
            .read()
            .iter()
            .filter(|((ns, _), _)| namespace.map_or(true, |want| ns == want))
            .map(|(_, object)| object.clone())
            .collect();
        objects.sort_by(|a, b| {
            (&a.metadata.namespace, &a.metadata.name).cmp(&(&b.metadata.namespace, &b.metadata.name))
        });
        objects
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}
