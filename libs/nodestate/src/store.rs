use async_trait::async_trait;
use fakedra_api::NodeAllocationState;

use crate::StoreError;

/// Backend holding NodeAllocationState records keyed by (namespace, name).
///
/// Implementations assign `resource_version` themselves: `create` stores
/// version 1, and `update` succeeds only when the caller's version matches the
/// stored one, storing the next version. The returned record carries the new
/// version.
#[async_trait]
pub trait NodeStateStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<NodeAllocationState, StoreError>;

    /// Fails with `AlreadyExists` if a record with the same key is present.
    async fn create(&self, nas: &NodeAllocationState) -> Result<NodeAllocationState, StoreError>;

    /// Fails with `Conflict` on a version mismatch and `NotFound` if the
    /// record is gone.
    async fn update(&self, nas: &NodeAllocationState) -> Result<NodeAllocationState, StoreError>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}
