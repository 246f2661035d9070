//! In-memory store for tests and single-process runs.

use std::collections::HashMap;

use async_trait::async_trait;
use fakedra_api::NodeAllocationState;
use parking_lot::RwLock;

use crate::{NodeStateStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryNodeStateStore {
    records: RwLock<HashMap<(String, String), NodeAllocationState>>,
}

impl MemoryNodeStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

#[async_trait]
impl NodeStateStore for MemoryNodeStateStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<NodeAllocationState, StoreError> {
        self.records
            .read()
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| StoreError::not_found(namespace, name))
    }

    async fn create(&self, nas: &NodeAllocationState) -> Result<NodeAllocationState, StoreError> {
        let mut records = self.records.write();
        let k = key(nas.namespace(), nas.name());
        if records.contains_key(&k) {
            return Err(StoreError::AlreadyExists {
                namespace: k.0,
                name: k.1,
            });
        }

        let mut stored = nas.clone();
        stored.metadata.resource_version = 1;
        records.insert(k, stored.clone());
        Ok(stored)
    }

    async fn update(&self, nas: &NodeAllocationState) -> Result<NodeAllocationState, StoreError> {
        let mut records = self.records.write();
        let Some(current) = records.get_mut(&key(nas.namespace(), nas.name())) else {
            return Err(StoreError::not_found(nas.namespace(), nas.name()));
        };

        if current.resource_version() != nas.resource_version() {
            return Err(StoreError::Conflict {
                namespace: nas.namespace().to_string(),
                name: nas.name().to_string(),
                expected: nas.resource_version(),
                actual: current.resource_version(),
            });
        }

        let mut stored = nas.clone();
        stored.metadata.resource_version = current.resource_version() + 1;
        *current = stored.clone();
        Ok(stored)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(namespace, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakedra_api::NodeAllocationStateStatus;

    #[tokio::test]
    async fn test_create_assigns_first_version() {
        let store = MemoryNodeStateStore::new();
        let created = store
            .create(&NodeAllocationState::new("node-a", "default"))
            .await
            .unwrap();
        assert_eq!(created.resource_version(), 1);
        assert_eq!(store.len(), 1);

        let err = store
            .create(&NodeAllocationState::new("node-a", "default"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_update_rejects_stale_version() {
        let store = MemoryNodeStateStore::new();
        let created = store
            .create(&NodeAllocationState::new("node-a", "default"))
            .await
            .unwrap();

        let mut first = created.clone();
        first.status = NodeAllocationStateStatus::Ready;
        let updated = store.update(&first).await.unwrap();
        assert_eq!(updated.resource_version(), 2);

        // `created` still carries version 1
        let err = store.update(&created).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.get("default", "node-a").await.unwrap();
        assert!(stored.is_ready());
    }

    #[tokio::test]
    async fn test_missing_record() {
        let store = MemoryNodeStateStore::new();
        assert!(store.get("default", "nope").await.unwrap_err().is_not_found());
        assert!(store
            .update(&NodeAllocationState::new("nope", "default"))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store.delete("default", "nope").await.unwrap_err().is_not_found());
    }
}
