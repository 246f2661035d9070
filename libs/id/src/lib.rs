//! # fakedra-id
//!
//! Typed identifiers shared by the allocation controller and the kubelet plugin.
//!
//! ## Design Principles
//!
//! - Claim UIDs and device UUIDs are distinct types and cannot be mixed up
//! - Every ID has one canonical string form with strict parsing
//! - IDs serialize as plain strings so they can key JSON maps
//!
//! ## ID Format
//!
//! - `ClaimUid`: a bare RFC 4122 UUID, e.g. `0b7f5a8e-2c1d-4f4e-9d55-3a1b2c3d4e5f`
//! - `DeviceUuid`: `FAKE-` followed by a UUID, e.g. `FAKE-6a5f...`
//!
//! Devices additionally have a resource name form (`fake-6a5f...`) used when
//! they are published as named resources.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export uuid for consumers that need raw UUID operations
pub use uuid::Uuid;
