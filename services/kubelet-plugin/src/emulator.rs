//! Deterministic generation of fabricated devices.
//!
//! Device UUIDs are drawn from a ChaCha8 stream seeded by a string hash, so
//! the same seed always yields the same devices. Node inventory is seeded by
//! the node name; split children are seeded by their parent's UUID.

use fakedra_api::{AllocatableFake, FAKE_MODEL};
use fakedra_id::{DeviceUuid, Uuid};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

/// Number of devices a node exposes unless configured otherwise.
pub const DEFAULT_DEVICE_COUNT: usize = 8;

/// A fabricated device as the plugin tracks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeInfo {
    pub uuid: DeviceUuid,
    pub model: String,
    /// Set for virtual devices produced by splitting `parent`.
    pub parent: Option<DeviceUuid>,
}

/// `h = 31 * h + c` over the characters of `s`, wrapping on overflow.
pub fn hash(s: &str) -> i64 {
    s.chars()
        .fold(0i64, |h, c| h.wrapping_mul(31).wrapping_add(c as i64))
}

pub fn generate_uuids(seed: &str, count: usize) -> Vec<DeviceUuid> {
    let mut rng = ChaCha8Rng::seed_from_u64(hash(seed) as u64);
    (0..count)
        .map(|_| {
            let mut bytes = [0u8; 16];
            rng.fill_bytes(&mut bytes);
            DeviceUuid::from_uuid(Uuid::from_bytes(bytes))
        })
        .collect()
}

/// The full inventory of a node, in generation order.
pub fn enumerate_all_possible_devices(seed: &str, count: usize) -> Vec<AllocatableFake> {
    generate_uuids(seed, count)
        .into_iter()
        .map(|uuid| {
            info!(device_uuid = %uuid, "Enumerating fake device");
            AllocatableFake {
                uuid,
                model: FAKE_MODEL.to_string(),
            }
        })
        .collect()
}

/// Virtual children of `parent`, each inheriting its model.
pub fn enumerate_split_devices(parent: &DeviceUuid, model: &str, split: u32) -> Vec<FakeInfo> {
    generate_uuids(&parent.to_string(), split as usize)
        .into_iter()
        .map(|uuid| {
            info!(parent_uuid = %parent, device_uuid = %uuid, "Enumerating split fake device");
            FakeInfo {
                uuid,
                model: model.to_string(),
                parent: Some(*parent),
            }
        })
        .collect()
}
