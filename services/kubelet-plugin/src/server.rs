//! gRPC service the node runtime uses to reach the plugin.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use fakedra_proto::convert::claims_from_proto;
use fakedra_proto::uds;
use fakedra_proto::v1alpha3::{
    Node, NodeListAndWatchResourcesRequest, NodeListAndWatchResourcesResponse,
    NodePrepareResourcesRequest, NodePrepareResourcesResponse, NodeServer,
    NodeUnprepareResourcesRequest, NodeUnprepareResourcesResponse,
};
use fakedra_proto::DEFAULT_MAX_MESSAGE_SIZE;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio_stream::wrappers::UnixListenerStream;
use tokio_stream::{Stream, StreamExt};
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use crate::driver::NodeDriver;

type ResourceStream =
    Pin<Box<dyn Stream<Item = Result<NodeListAndWatchResourcesResponse, Status>> + Send>>;

/// The Node service backed by a [`NodeDriver`].
pub struct NodeService {
    driver: Arc<NodeDriver>,
}

impl NodeService {
    pub fn new(driver: Arc<NodeDriver>) -> Self {
        Self { driver }
    }
}

#[tonic::async_trait]
impl Node for NodeService {
    type NodeListAndWatchResourcesStream = ResourceStream;

    async fn node_list_and_watch_resources(
        &self,
        _request: Request<NodeListAndWatchResourcesRequest>,
    ) -> Result<Response<Self::NodeListAndWatchResourcesStream>, Status> {
        debug!("Inventory stream opened");
        let stream = self.driver.list_and_watch().map(|resources| {
            Ok::<_, Status>(NodeListAndWatchResourcesResponse::from(
                resources.as_slice(),
            ))
        });
        Ok(Response::new(Box::pin(stream) as ResourceStream))
    }

    async fn node_prepare_resources(
        &self,
        request: Request<NodePrepareResourcesRequest>,
    ) -> Result<Response<NodePrepareResourcesResponse>, Status> {
        let claims = claims_from_proto(request.into_inner().claims)?;
        let results = self.driver.prepare_resources(&claims).await;
        Ok(Response::new(results.into()))
    }

    async fn node_unprepare_resources(
        &self,
        request: Request<NodeUnprepareResourcesRequest>,
    ) -> Result<Response<NodeUnprepareResourcesResponse>, Status> {
        let claims = claims_from_proto(request.into_inner().claims)?;
        let results = self.driver.unprepare_resources(&claims).await;
        Ok(Response::new(results.into()))
    }
}

pub struct PluginServer {
    service: NodeService,
    listener: UnixListener,
    path: PathBuf,
    max_message_size: usize,
}

impl PluginServer {
    /// Bind `path`, replacing a stale socket file left by a previous run.
    pub fn bind(path: impl AsRef<Path>, driver: Arc<NodeDriver>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let listener = uds::bind(&path)?;
        info!(socket = %path.display(), "Plugin socket bound");

        Ok(Self {
            service: NodeService::new(driver),
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

    /// Serve until `shutdown` flips to true, then remove the socket file.
    ///
    /// Open inventory streams hold shutdown until the driver ends them.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), tonic::transport::Error> {
        let service = NodeServer::new(self.service).max_decoding_message_size(self.max_message_size);
        let result = Server::builder()
            .trace_fn(|request| tracing::info_span!("grpc", method = %request.uri().path()))
            .add_service(service)
            .serve_with_incoming_shutdown(
                UnixListenerStream::new(self.listener),
                uds::shutdown_signal(shutdown),
            )
            .await;

        info!("Plugin socket shutting down");
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(error = %e, "Failed to remove socket file");
        }
        result
    }
}
