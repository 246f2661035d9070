//! Store wrapper that injects version conflicts on demand.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fakedra_api::NodeAllocationState;
use fakedra_nodestate::{MemoryNodeStateStore, NodeStateStore, StoreError};

/// Wraps a store and fails the next `n` updates with `StoreError::Conflict`
/// without touching the stored record.
pub struct ConflictingStore {
    inner: Arc<dyn NodeStateStore>,
    pending_conflicts: AtomicU32,
    update_calls: AtomicU32,
}

impl ConflictingStore {
    pub fn new(inner: Arc<dyn NodeStateStore>) -> Self {
        Self {
            inner,
            pending_conflicts: AtomicU32::new(0),
            update_calls: AtomicU32::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryNodeStateStore::new()))
    }

    /// Fail the next `n` calls to `update`.
    pub fn fail_next_updates(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    /// Number of `update` calls seen, including injected failures.
    pub fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn reset_update_calls(&self) {
        self.update_calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeStateStore for ConflictingStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<NodeAllocationState, StoreError> {
        self.inner.get(namespace, name).await
    }

    async fn create(&self, nas: &NodeAllocationState) -> Result<NodeAllocationState, StoreError> {
        self.inner.create(nas).await
    }

    async fn update(&self, nas: &NodeAllocationState) -> Result<NodeAllocationState, StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Conflict {
                namespace: nas.namespace().to_string(),
                name: nas.name().to_string(),
                expected: nas.resource_version(),
                actual: nas.resource_version() + 1,
            });
        }

        self.inner.update(nas).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.inner.delete(namespace, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_conflicts_leave_record_untouched() {
        let store = ConflictingStore::in_memory();
        let created = store
            .create(&NodeAllocationState::new("node-a", "default"))
            .await
            .unwrap();

        store.fail_next_updates(2);
        assert!(store.update(&created).await.unwrap_err().is_conflict());
        assert!(store.update(&created).await.unwrap_err().is_conflict());
        assert_eq!(store.get("default", "node-a").await.unwrap(), created);

        let updated = store.update(&created).await.unwrap();
        assert_eq!(updated.resource_version(), 2);
        assert_eq!(store.update_calls(), 3);
    }
}
