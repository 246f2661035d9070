//! Lookup of vendor parameter objects referenced by claims and classes.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use fakedra_api::{
    DeviceClassParameters, DeviceClassParametersSpec, FakeClaimParameters,
    FakeClaimParametersSpec,
};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::info;

use crate::error::DriverError;

/// Source of parameter objects.
///
/// `Ok(None)` means the object does not exist; errors are reserved for the
/// source itself failing.
#[async_trait]
pub trait ParametersSource: Send + Sync {
    async fn device_class_parameters(
        &self,
        name: &str,
    ) -> Result<Option<DeviceClassParametersSpec>, DriverError>;

    async fn fake_claim_parameters(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<FakeClaimParametersSpec>, DriverError>;
}

/// On-disk layout accepted by [`InMemoryParameters::from_file`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParametersFile {
    #[serde(default)]
    device_class_parameters: Vec<DeviceClassParameters>,
    #[serde(default)]
    fake_claim_parameters: Vec<FakeClaimParameters>,
}

/// Parameter objects held in memory.
///
/// Class parameters are cluster scoped and keyed by name; claim parameters
/// are keyed by (namespace, name).
#[derive(Debug, Default)]
pub struct InMemoryParameters {
    classes: RwLock<HashMap<String, DeviceClassParametersSpec>>,
    claims: RwLock<HashMap<(String, String), FakeClaimParameters>>,
}

impl InMemoryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load parameter objects from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let file: ParametersFile = serde_json::from_str(&raw)?;

        let params = Self::new();
        for class in file.device_class_parameters {
            params.insert_device_class_parameters(class);
        }
        for claim in file.fake_claim_parameters {
            params.insert_fake_claim_parameters(claim);
        }

        info!(
            path = %path.display(),
            classes = params.classes.read().len(),
            claims = params.claims.read().len(),
            "Loaded parameter objects"
        );
        Ok(params)
    }

    pub fn insert_device_class_parameters(&self, params: DeviceClassParameters) {
        self.classes
            .write()
            .insert(params.metadata.name, params.spec);
    }

    pub fn insert_fake_claim_parameters(&self, params: FakeClaimParameters) {
        let key = (params.metadata.namespace.clone(), params.metadata.name.clone());
        self.claims.write().insert(key, params);
    }

    /// Every FakeClaimParameters object, ordered by namespace and name.
    pub fn fake_claim_parameters_list(&self) -> Vec<FakeClaimParameters> {
        let mut all: Vec<_> = self.claims.read().values().cloned().collect();
        all.sort_by(|a, b| {
            (&a.metadata.namespace, &a.metadata.name).cmp(&(&b.metadata.namespace, &b.metadata.name))
        });
        all
    }
}

#[async_trait]
impl ParametersSource for InMemoryParameters {
    async fn device_class_parameters(
        &self,
        name: &str,
    ) -> Result<Option<DeviceClassParametersSpec>, DriverError> {
        Ok(self.classes.read().get(name).cloned())
    }

    async fn fake_claim_parameters(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<FakeClaimParametersSpec>, DriverError> {
        let key = (namespace.to_string(), name.to_string());
        Ok(self.claims.read().get(&key).map(|p| p.spec.clone()))
    }
}
