//! Container Device Interface (CDI) spec export.
//!
//! Every node gets one common spec whose `common` device injects node-wide
//! environment. Each prepared claim gets a transient spec with one device per
//! prepared device. Containers reference devices by their qualified name
//! `<vendor>/<class>=<name>`.

use std::path::{Path, PathBuf};

use fakedra_api::{PreparedDevices, DRIVER_NAME};
use fakedra_id::ClaimUid;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PluginError;

pub const CDI_CLASS: &str = "fake";
pub const CDI_COMMON_DEVICE_NAME: &str = "common";

/// Lowest CDI spec version that supports environment edits.
const CDI_VERSION: &str = "0.3.0";

pub fn cdi_vendor() -> String {
    format!("k8s.{DRIVER_NAME}")
}

pub fn cdi_kind() -> String {
    format!("{}/{CDI_CLASS}", cdi_vendor())
}

/// `<vendor>/<class>=<name>`
pub fn qualified_name(name: &str) -> String {
    format!("{}={name}", cdi_kind())
}

/// Materializes prepared devices for the container runtime.
pub trait CdiExporter: Send + Sync {
    fn create_common_spec(&self) -> Result<(), PluginError>;

    fn create_claim_spec(&self, claim: &ClaimUid, devices: &PreparedDevices) -> Result<(), PluginError>;

    fn delete_claim_spec(&self, claim: &ClaimUid) -> Result<(), PluginError>;

    /// Qualified names for a claim: the common device first, then one per
    /// prepared device in order.
    fn claim_devices(&self, devices: &PreparedDevices) -> Vec<String> {
        std::iter::once(qualified_name(CDI_COMMON_DEVICE_NAME))
            .chain(devices.uuids().iter().map(|uuid| qualified_name(&uuid.to_string())))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    pub cdi_version: String,
    pub kind: String,
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub name: String,
    pub container_edits: ContainerEdits,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEdits {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

/// Writes CDI specs as JSON files under a root directory.
#[derive(Debug, Clone)]
pub struct CdiHandler {
    root: PathBuf,
    node_name: String,
}

impl CdiHandler {
    /// Create the handler, creating `root` if it does not exist.
    pub fn new(root: impl Into<PathBuf>, node_name: impl Into<String>) -> Result<Self, PluginError> {
        let root = root.into();
        if !root.exists() {
            debug!(dir = %root.display(), "Creating CDI spec directory");
            std::fs::create_dir_all(&root)?;
        }
        Ok(Self {
            root,
            node_name: node_name.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the transient spec identified by `id`.
    pub fn spec_path(&self, id: &str) -> PathBuf {
        self.root
            .join(format!("{}_{CDI_CLASS}_{id}.json", cdi_vendor()))
    }

    fn write_spec(&self, spec: &Spec, id: &str) -> Result<(), PluginError> {
        let path = self.spec_path(id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(spec)?)?;
        std::fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), devices = spec.devices.len(), "Wrote CDI spec");
        Ok(())
    }
}

impl CdiExporter for CdiHandler {
    fn create_common_spec(&self) -> Result<(), PluginError> {
        let spec = Spec {
            cdi_version: CDI_VERSION.to_string(),
            kind: cdi_kind(),
            devices: vec![Device {
                name: CDI_COMMON_DEVICE_NAME.to_string(),
                container_edits: ContainerEdits {
                    env: vec![
                        format!("FAKE_NODE_NAME={}", self.node_name),
                        format!("DRA_RESOURCE_DRIVER_NAME={DRIVER_NAME}"),
                    ],
                },
            }],
        };
        self.write_spec(&spec, CDI_COMMON_DEVICE_NAME)
    }

    fn create_claim_spec(&self, claim: &ClaimUid, devices: &PreparedDevices) -> Result<(), PluginError> {
        let devices = devices
            .uuids()
            .into_iter()
            .enumerate()
            .map(|(i, uuid)| Device {
                name: uuid.to_string(),
                container_edits: ContainerEdits {
                    env: vec![format!("FAKE_DEVICE_{i}={uuid}")],
                },
            })
            .collect();

        let spec = Spec {
            cdi_version: CDI_VERSION.to_string(),
            kind: cdi_kind(),
            devices,
        };
        self.write_spec(&spec, &claim.to_string())
    }

    fn delete_claim_spec(&self, claim: &ClaimUid) -> Result<(), PluginError> {
        let path = self.spec_path(&claim.to_string());
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
