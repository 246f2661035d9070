//! # fakedra-api
//!
//! Data model shared by the allocation controller and the kubelet plugin.
//!
//! ## Contents
//!
//! - [`NodeAllocationState`]: the per-node record both processes coordinate through
//! - Device variants (allocatable, allocated, prepared), tagged by device type
//! - Claim and class parameter payloads with their defaults
//! - Scheduling framework boundary types (claims, classes, pods, allocation results)
//! - Inventory resource model and generated claim parameters
//! - Claims and per-claim results of the node plugin operations

mod devices;
mod node_state;
mod params;
mod resource;
pub mod rpc;

pub use devices::*;
pub use node_state::*;
pub use params::*;
pub use resource::*;

pub use fakedra_id::{ClaimUid, DeviceUuid};

/// API group of the driver's parameter objects. Also the driver name.
pub const DRIVER_NAME: &str = "fake.resource.3-shake.com";

/// API group of the NodeAllocationState record.
pub const NAS_GROUP_NAME: &str = "nas.fake.resource.3-shake.com";

/// API version shared by both groups.
pub const API_VERSION: &str = "v1alpha1";
