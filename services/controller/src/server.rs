//! gRPC service the scheduling framework talks to.
//!
//! Framework objects travel as JSON in the shape of the `fakedra-api` types.
//! At most `workers` requests run at once across all connections.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fakedra_api::{
    ClaimAllocation, ClaimParameters, DeviceClassParametersSpec, Pod, ResourceClaim, ResourceClass,
};
use fakedra_proto::controller::{
    AllocateRequest, AllocateResponse, Controller, ControllerServer, DeallocateRequest,
    DeallocateResponse, GetClaimParametersRequest, GetClassParametersRequest,
    GetResourceClaimParametersRequest, ListResourceClaimParametersRequest,
    ListResourceClaimParametersResponse, ParametersResponse, ResourceClaimParametersResponse,
    UnsuitableNodesRequest, UnsuitableNodesResponse,
};
use fakedra_proto::convert::{from_json, to_json};
use fakedra_proto::{uds, DEFAULT_MAX_MESSAGE_SIZE};
use tokio::net::UnixListener;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::driver::Driver;
use crate::error::DriverError;

/// The Controller service backed by a [`Driver`].
pub struct ControllerService {
    driver: Arc<Driver>,
    workers: Arc<Semaphore>,
}

impl ControllerService {
    pub fn new(driver: Arc<Driver>, workers: usize) -> Self {
        Self {
            driver,
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit, Status> {
        Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| Status::unavailable("server is shutting down"))
    }
}

fn failed(e: DriverError) -> Status {
    warn!(error = %e, "Request failed");
    Status::from(e)
}

#[tonic::async_trait]
impl Controller for ControllerService {
    async fn get_class_parameters(
        &self,
        request: Request<GetClassParametersRequest>,
    ) -> Result<Response<ParametersResponse>, Status> {
        let class: ResourceClass = from_json("class", &request.into_inner().class)?;
        let _permit = self.permit().await?;

        let parameters = self
            .driver
            .get_class_parameters(&class)
            .await
            .map_err(failed)?;
        Ok(Response::new(ParametersResponse {
            parameters: to_json("parameters", &parameters)?,
        }))
    }

    async fn get_claim_parameters(
        &self,
        request: Request<GetClaimParametersRequest>,
    ) -> Result<Response<ParametersResponse>, Status> {
        let request = request.into_inner();
        let claim: ResourceClaim = from_json("claim", &request.claim)?;
        let class: ResourceClass = from_json("class", &request.class)?;
        let _permit = self.permit().await?;

        let parameters = self
            .driver
            .get_claim_parameters(&claim, &class)
            .await
            .map_err(failed)?;
        Ok(Response::new(ParametersResponse {
            parameters: to_json("parameters", &parameters)?,
        }))
    }

    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> Result<Response<AllocateResponse>, Status> {
        let request = request.into_inner();
        let claim: ResourceClaim = from_json("claim", &request.claim)?;
        let claim_parameters: ClaimParameters =
            from_json("claim_parameters", &request.claim_parameters)?;
        let class: ResourceClass = from_json("class", &request.class)?;
        let class_parameters: DeviceClassParametersSpec =
            from_json("class_parameters", &request.class_parameters)?;
        let _permit = self.permit().await?;

        let allocation = self
            .driver
            .allocate(
                &claim,
                &claim_parameters,
                &class,
                &class_parameters,
                &request.selected_node,
            )
            .await
            .map_err(failed)?;
        Ok(Response::new(AllocateResponse {
            allocation: to_json("allocation", &allocation)?,
        }))
    }

    async fn deallocate(
        &self,
        request: Request<DeallocateRequest>,
    ) -> Result<Response<DeallocateResponse>, Status> {
        let claim: ResourceClaim = from_json("claim", &request.into_inner().claim)?;
        let _permit = self.permit().await?;

        self.driver.deallocate(&claim).await.map_err(failed)?;
        Ok(Response::new(DeallocateResponse {}))
    }

    async fn unsuitable_nodes(
        &self,
        request: Request<UnsuitableNodesRequest>,
    ) -> Result<Response<UnsuitableNodesResponse>, Status> {
        let request = request.into_inner();
        let pod: Pod = from_json("pod", &request.pod)?;
        let mut claim_allocations = request
            .claim_allocations
            .iter()
            .map(|raw| from_json::<ClaimAllocation>("claim_allocations", raw))
            .collect::<Result<Vec<_>, _>>()?;
        let _permit = self.permit().await?;

        self.driver
            .unsuitable_nodes(&pod, &mut claim_allocations, &request.potential_nodes)
            .await;
        Ok(Response::new(UnsuitableNodesResponse {
            claim_allocations: claim_allocations
                .iter()
                .map(|ca| to_json("claim_allocations", ca))
                .collect::<Result<_, _>>()?,
        }))
    }

    async fn get_resource_claim_parameters(
        &self,
        request: Request<GetResourceClaimParametersRequest>,
    ) -> Result<Response<ResourceClaimParametersResponse>, Status> {
        let request = request.into_inner();
        let parameters = self
            .driver
            .get_resource_claim_parameters(&request.namespace, &request.name)
            .map_err(failed)?;
        Ok(Response::new(ResourceClaimParametersResponse {
            parameters: to_json("parameters", &parameters)?,
        }))
    }

    async fn list_resource_claim_parameters(
        &self,
        request: Request<ListResourceClaimParametersRequest>,
    ) -> Result<Response<ListResourceClaimParametersResponse>, Status> {
        let namespace = request.into_inner().namespace;
        let namespace = (!namespace.is_empty()).then_some(namespace.as_str());
        let items = self
            .driver
            .list_resource_claim_parameters(namespace)
            .iter()
            .map(|object| to_json("items", object))
            .collect::<Result<_, _>>()?;
        Ok(Response::new(ListResourceClaimParametersResponse { items }))
    }
}

pub struct FrameworkServer {
    service: ControllerService,
    listener: UnixListener,
    path: PathBuf,
    max_message_size: usize,
}

impl FrameworkServer {
    /// Bind `path`, replacing a stale socket file left by a previous run.
    pub fn bind(path: impl AsRef<Path>, driver: Arc<Driver>, workers: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let listener = uds::bind(&path)?;
        info!(socket = %path.display(), workers, "Framework socket bound");

        Ok(Self {
            service: ControllerService::new(driver, workers),
            listener,
            path,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        })
    }

    /// Reject requests larger than `limit` bytes.
    pub fn with_max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = limit;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serve until `shutdown` flips to true, then remove the socket file.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), tonic::transport::Error> {
        let service =
            ControllerServer::new(self.service).max_decoding_message_size(self.max_message_size);
        let result = Server::builder()
            .trace_fn(|request| tracing::info_span!("grpc", method = %request.uri().path()))
            .add_service(service)
            .serve_with_incoming_shutdown(
                UnixListenerStream::new(self.listener),
                uds::shutdown_signal(shutdown),
            )
            .await;

        info!("Framework socket shutting down");
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(error = %e, "Failed to remove socket file");
        }
        result
    }
}
