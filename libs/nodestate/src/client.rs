//! Handle bound to one node's NodeAllocationState.

use std::sync::Arc;

use fakedra_api::{NodeAllocationState, NodeAllocationStateSpec, NodeAllocationStateStatus};
use tracing::{debug, info};

use crate::{NodeStateStore, StoreError};

/// Client for a single (namespace, name) record.
///
/// Writes take the record they were derived from so the store can reject
/// them if someone else wrote in between.
#[derive(Clone)]
pub struct NodeStateClient {
    store: Arc<dyn NodeStateStore>,
    namespace: String,
    name: String,
}

impl NodeStateClient {
    pub fn new(
        store: Arc<dyn NodeStateStore>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn get(&self) -> Result<NodeAllocationState, StoreError> {
        self.store.get(&self.namespace, &self.name).await
    }

    /// Fetch the record, creating an empty NotReady one if there is none.
    pub async fn get_or_create(&self) -> Result<NodeAllocationState, StoreError> {
        match self.get().await {
            Ok(nas) => Ok(nas),
            Err(e) if e.is_not_found() => {
                info!(
                    node = %self.name,
                    namespace = %self.namespace,
                    "NodeAllocationState not found, creating"
                );
                self.create().await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create(&self) -> Result<NodeAllocationState, StoreError> {
        self.store
            .create(&NodeAllocationState::new(&self.name, &self.namespace))
            .await
    }

    /// Replace the spec of `base` and write it back.
    pub async fn update(
        &self,
        base: &NodeAllocationState,
        spec: NodeAllocationStateSpec,
    ) -> Result<NodeAllocationState, StoreError> {
        let mut nas = base.clone();
        nas.spec = spec;
        let updated = self.store.update(&nas).await?;
        debug!(
            node = %self.name,
            resource_version = updated.resource_version(),
            "Updated NodeAllocationState spec"
        );
        Ok(updated)
    }

    /// Replace the status of `base` and write it back.
    pub async fn update_status(
        &self,
        base: &NodeAllocationState,
        status: NodeAllocationStateStatus,
    ) -> Result<NodeAllocationState, StoreError> {
        let mut nas = base.clone();
        nas.status = status;
        let updated = self.store.update(&nas).await?;
        debug!(
            node = %self.name,
            status = %status,
            resource_version = updated.resource_version(),
            "Updated NodeAllocationState status"
        );
        Ok(updated)
    }

    /// Delete the record. A missing record is not an error.
    pub async fn delete(&self) -> Result<(), StoreError> {
        match self.store.delete(&self.namespace, &self.name).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }
}

impl std::fmt::Debug for NodeStateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStateClient")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .finish()
    }
}
