//! Plugin error types.

use fakedra_id::{ClaimUid, DeviceUuid};
use fakedra_nodestate::{ConflictAware, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    /// An allocation references a device this node does not have.
    #[error("requested Fake does not exist: {0}")]
    DeviceNotFound(DeviceUuid),

    #[error("no allocation recorded for claim {0}")]
    AllocationNotFound(ClaimUid),

    /// A structured resource handle could not be turned into an allocation.
    #[error("invalid structured resource handle: {0}")]
    InvalidHandle(String),

    #[error("CDI spec error: {0}")]
    Cdi(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ConflictAware for PluginError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }

    fn exhausted(attempts: u32, last: Self) -> Self {
        Self::Store(StoreError::Persistence {
            attempts,
            last_error: last.to_string(),
        })
    }
}
