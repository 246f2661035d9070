//! Node-facing driver: inventory publication and claim preparation.
//!
//! One lock guards all preparation state, so Prepare and Unprepare calls for
//! this node run one at a time. Every write to NodeAllocationState is a
//! conflict-retried read-modify-write on a fresh copy of the record.

use std::collections::BTreeMap;
use std::sync::Arc;

use fakedra_api::rpc::{NodeClaim, PrepareResult, UnprepareResult};
use fakedra_api::{
    AllocatedDevices, AllocatedFake, AllocatedFakes, FakeClaimParametersSpec,
    NodeAllocationStateStatus, ResourceModel, StructuredResourceHandle,
};
use fakedra_id::{ClaimUid, DeviceUuid};
use fakedra_nodestate::{retry_on_conflict, NodeStateClient, RetryPolicy};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, instrument, warn};

use crate::cdi::CdiExporter;
use crate::emulator::enumerate_all_possible_devices;
use crate::error::PluginError;
use crate::state::DeviceState;

pub struct NodeDriver {
    client: NodeStateClient,
    state: Mutex<DeviceState>,
    retry: RetryPolicy,
    done: watch::Sender<bool>,
}

impl NodeDriver {
    /// Publish this node's inventory and mark its record Ready.
    ///
    /// The record is created if missing. Claims it lists as prepared are
    /// restored into local state.
    #[instrument(skip_all, fields(node = %client.name()))]
    pub async fn start(
        client: NodeStateClient,
        cdi: Arc<dyn CdiExporter>,
        device_count: usize,
        retry: RetryPolicy,
    ) -> Result<Self, PluginError> {
        let client_ref = &client;
        let cdi = &cdi;
        let state = retry_on_conflict(&retry, || async move {
            debug!("Creating or adopting NodeAllocationState");
            let nas = client_ref.get_or_create().await?;
            let nas = client_ref
                .update_status(&nas, NodeAllocationStateStatus::NotReady)
                .await?;

            let allocatable = enumerate_all_possible_devices(client_ref.name(), device_count);
            cdi.create_common_spec()?;
            let mut state = DeviceState::new(allocatable, Arc::clone(cdi));
            state.sync_prepared_from_spec(&nas.spec)?;

            debug!("Publishing allocatable devices");
            let nas = client_ref.update(&nas, state.updated_spec(&nas.spec)).await?;
            client_ref
                .update_status(&nas, NodeAllocationStateStatus::Ready)
                .await?;
            Ok::<_, PluginError>(state)
        })
        .await?;

        info!(devices = device_count, "Node driver ready");
        let (done, _) = watch::channel(false);
        Ok(Self {
            client,
            state: Mutex::new(state),
            retry,
            done,
        })
    }

    pub fn client(&self) -> &NodeStateClient {
        &self.client
    }

    /// Mark the record NotReady and end open inventory streams.
    pub async fn shutdown(&self) -> Result<(), PluginError> {
        info!(node = %self.client.name(), "Marking NodeAllocationState NotReady before shutting down");
        let client = &self.client;
        let result = retry_on_conflict(&self.retry, || async move {
            let nas = client.get().await?;
            client
                .update_status(&nas, NodeAllocationStateStatus::NotReady)
                .await?;
            Ok::<_, PluginError>(())
        })
        .await;

        self.done.send_replace(true);
        result
    }

    pub async fn resource_model(&self) -> ResourceModel {
        self.state.lock().await.resource_model()
    }

    /// Send the inventory once, then keep the stream open until shutdown or
    /// until the receiver is dropped.
    pub fn list_and_watch(self: &Arc<Self>) -> ReceiverStream<Vec<ResourceModel>> {
        let (tx, rx) = mpsc::channel(1);
        let driver = Arc::clone(self);
        let mut done = self.done.subscribe();

        tokio::spawn(async move {
            let model = driver.resource_model().await;
            if tx.send(vec![model]).await.is_err() {
                return;
            }
            tokio::select! {
                _ = wait_for_shutdown(&mut done) => debug!("Closing inventory stream on shutdown"),
                _ = tx.closed() => debug!("Inventory stream receiver went away"),
            }
        });

        ReceiverStream::new(rx)
    }

    // =========================================================================
    // Prepare
    // =========================================================================

    pub async fn prepare_resources(&self, claims: &[NodeClaim]) -> BTreeMap<ClaimUid, PrepareResult> {
        info!(claims = claims.len(), "Preparing resources");
        let mut results = BTreeMap::new();
        for claim in claims {
            results.insert(claim.uid, self.prepare_resource(claim).await);
        }
        results
    }

    pub async fn prepare_resource(&self, claim: &NodeClaim) -> PrepareResult {
        let mut state = self.state.lock().await;
        match self.prepare_locked(&mut state, claim).await {
            Ok(cdi_devices) => PrepareResult {
                cdi_devices,
                error: None,
            },
            Err(e) => {
                warn!(claim_uid = %claim.uid, error = %e, "Failed to prepare claim");
                PrepareResult {
                    cdi_devices: Vec::new(),
                    error: Some(format!("error preparing devices for claim {}: {e}", claim.uid)),
                }
            }
        }
    }

    #[instrument(skip_all, fields(claim_uid = %claim.uid))]
    async fn prepare_locked(
        &self,
        state: &mut DeviceState,
        claim: &NodeClaim,
    ) -> Result<Vec<String>, PluginError> {
        let nas = self.client.get().await?;
        if let Some(devices) = state.claim_devices(&claim.uid) {
            info!("Returning cached devices for claim");
            return Ok(devices);
        }

        let allocation = match claim.structured_resource_handle.first() {
            Some(handle) => self.allocate_devices(claim.uid, handle).await?,
            None => nas
                .spec
                .allocated_claims
                .get(&claim.uid)
                .cloned()
                .ok_or(PluginError::AllocationNotFound(claim.uid))?,
        };

        let devices = state.prepare(claim.uid, &allocation)?;

        if let Err(e) = self.persist(state, None).await {
            match state.unprepare(&claim.uid) {
                Ok(()) => error!(error = %e, "Failed to record prepared devices, unprepared claim"),
                Err(nested) => error!(
                    error = %e,
                    unprepare_error = %nested,
                    "Failed to record prepared devices and to unprepare claim"
                ),
            }
            return Err(e);
        }

        Ok(devices)
    }

    /// Record the allocation carried by a structured resource handle.
    async fn allocate_devices(
        &self,
        claim: ClaimUid,
        handle: &StructuredResourceHandle,
    ) -> Result<AllocatedDevices, PluginError> {
        let allocated = allocation_from_handle(handle)?;
        debug!(claim_uid = %claim, devices = allocated.len(), "Recording structured allocation");

        let client = &self.client;
        let allocated_ref = &allocated;
        retry_on_conflict(&self.retry, || async move {
            let nas = client.get().await?;
            let mut spec = nas.spec.clone();
            spec.allocated_claims.insert(claim, allocated_ref.clone());
            client.update(&nas, spec).await?;
            Ok::<_, PluginError>(())
        })
        .await?;

        Ok(allocated)
    }

    // =========================================================================
    // Unprepare
    // =========================================================================

    pub async fn unprepare_resources(
        &self,
        claims: &[NodeClaim],
    ) -> BTreeMap<ClaimUid, UnprepareResult> {
        info!(claims = claims.len(), "Unpreparing resources");
        let mut results = BTreeMap::new();
        for claim in claims {
            results.insert(claim.uid, self.unprepare_resource(claim).await);
        }
        results
    }

    pub async fn unprepare_resource(&self, claim: &NodeClaim) -> UnprepareResult {
        let mut state = self.state.lock().await;
        match self.unprepare_locked(&mut state, claim).await {
            Ok(()) => UnprepareResult::default(),
            Err(e) => {
                warn!(claim_uid = %claim.uid, error = %e, "Failed to unprepare claim");
                UnprepareResult {
                    error: Some(format!("error unpreparing devices for claim {}: {e}", claim.uid)),
                }
            }
        }
    }

    /// The record is updated before local state and the CDI spec are
    /// dropped, so a failed call leaves the claim prepared and can be
    /// retried.
    #[instrument(skip_all, fields(claim_uid = %claim.uid))]
    async fn unprepare_locked(
        &self,
        state: &mut DeviceState,
        claim: &NodeClaim,
    ) -> Result<(), PluginError> {
        let nas = self.client.get().await?;
        if !state.is_prepared(&claim.uid) {
            if nas.spec.prepared_devices.contains_key(&claim.uid) {
                debug!("Clearing stale prepared entry from record");
                return self.persist(state, None).await;
            }
            debug!("Claim already unprepared");
            return Ok(());
        }

        if !claim.structured_resource_handle.is_empty() {
            self.deallocate_devices(claim.uid).await?;
        }

        self.persist(state, Some(claim.uid)).await?;
        state.unprepare(&claim.uid)
    }

    async fn deallocate_devices(&self, claim: ClaimUid) -> Result<(), PluginError> {
        debug!(claim_uid = %claim, "Removing structured allocation");
        let client = &self.client;
        retry_on_conflict(&self.retry, || async move {
            let nas = client.get().await?;
            if !nas.spec.allocated_claims.contains_key(&claim) {
                return Ok(());
            }
            let mut spec = nas.spec.clone();
            spec.allocated_claims.remove(&claim);
            client.update(&nas, spec).await?;
            Ok::<_, PluginError>(())
        })
        .await
    }

    /// Write inventory and prepared claims into a fresh copy of the record,
    /// leaving out `released` if given.
    async fn persist(
        &self,
        state: &DeviceState,
        released: Option<ClaimUid>,
    ) -> Result<(), PluginError> {
        let client = &self.client;
        retry_on_conflict(&self.retry, || async move {
            let nas = client.get().await?;
            let mut spec = state.updated_spec(&nas.spec);
            if let Some(claim) = &released {
                spec.prepared_devices.remove(claim);
            }
            client.update(&nas, spec).await?;
            Ok::<_, PluginError>(())
        })
        .await
    }
}

impl std::fmt::Debug for NodeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDriver")
            .field("client", &self.client)
            .field("retry", &self.retry)
            .finish()
    }
}

async fn wait_for_shutdown(done: &mut watch::Receiver<bool>) {
    loop {
        if *done.borrow() {
            break;
        }
        if done.changed().await.is_err() {
            break;
        }
    }
}

/// Translate named-resource results back into allocated devices.
fn allocation_from_handle(handle: &StructuredResourceHandle) -> Result<AllocatedDevices, PluginError> {
    let params: FakeClaimParametersSpec = match &handle.vendor_claim_parameters {
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| PluginError::InvalidHandle(format!("vendor claim parameters: {e}")))?,
        None => {
            return Err(PluginError::InvalidHandle(
                "missing vendor claim parameters".to_string(),
            ))
        }
    };

    let devices = handle
        .results
        .iter()
        .map(|result| {
            let name = &result.named_resources.name;
            let uuid = DeviceUuid::from_resource_name(name)
                .map_err(|e| PluginError::InvalidHandle(format!("resource {name:?}: {e}")))?;
            Ok(AllocatedFake {
                uuid,
                split: params.split,
            })
        })
        .collect::<Result<Vec<_>, PluginError>>()?;

    Ok(AllocatedDevices::Fake(AllocatedFakes { devices }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakedra_api::{DriverAllocationResult, NamedResourcesAllocationResult};
    use rstest::rstest;
    use serde_json::json;

    fn handle(names: &[String], params: Option<serde_json::Value>) -> StructuredResourceHandle {
        StructuredResourceHandle {
            vendor_claim_parameters: params,
            node_name: "node-a".to_string(),
            results: names
                .iter()
                .map(|name| DriverAllocationResult {
                    named_resources: NamedResourcesAllocationResult { name: name.clone() },
                })
                .collect(),
        }
    }

    #[test]
    fn test_allocation_from_handle() {
        let a = DeviceUuid::new();
        let b = DeviceUuid::new();
        let names = vec![a.to_resource_name(), b.to_resource_name()];

        let allocated =
            allocation_from_handle(&handle(&names, Some(json!({"count": 2, "split": 3})))).unwrap();
        let AllocatedDevices::Fake(fakes) = allocated;
        assert_eq!(
            fakes.devices,
            vec![
                AllocatedFake { uuid: a, split: 3 },
                AllocatedFake { uuid: b, split: 3 },
            ]
        );
    }

    #[rstest]
    #[case::missing_parameters(None, true)]
    #[case::parameters_not_an_object(Some(json!("fake")), true)]
    #[case::count_not_a_number(Some(json!({"count": "two"})), true)]
    #[case::unknown_resource_name(Some(json!({})), false)]
    fn test_allocation_from_bad_handle(
        #[case] params: Option<serde_json::Value>,
        #[case] valid_names: bool,
    ) {
        let names = if valid_names {
            vec![DeviceUuid::new().to_resource_name()]
        } else {
            vec!["gpu-0".to_string()]
        };
        assert!(matches!(
            allocation_from_handle(&handle(&names, params)),
            Err(PluginError::InvalidHandle(_))
        ));
    }
}
