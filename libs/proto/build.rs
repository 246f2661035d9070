use tonic_build::manual::{Builder, Method, Service};

const PROST_CODEC: &str = "tonic::codec::ProstCodec";

fn unary(name: &str, route: &str, input: &str, output: &str, package: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::{package}::{input}"))
        .output_type(format!("crate::{package}::{output}"))
        .codec_path(PROST_CODEC)
        .build()
}

fn main() {
    // Node runtime <-> kubelet plugin
    let node = Service::builder()
        .name("Node")
        .package("v1alpha3")
        .method(
            Method::builder()
                .name("node_list_and_watch_resources")
                .route_name("NodeListAndWatchResources")
                .input_type("crate::v1alpha3::NodeListAndWatchResourcesRequest")
                .output_type("crate::v1alpha3::NodeListAndWatchResourcesResponse")
                .codec_path(PROST_CODEC)
                .server_streaming()
                .build(),
        )
        .method(unary(
            "node_prepare_resources",
            "NodePrepareResources",
            "NodePrepareResourcesRequest",
            "NodePrepareResourcesResponse",
            "v1alpha3",
        ))
        .method(unary(
            "node_unprepare_resources",
            "NodeUnprepareResources",
            "NodeUnprepareResourcesRequest",
            "NodeUnprepareResourcesResponse",
            "v1alpha3",
        ))
        .build();

    // Scheduling framework <-> allocation controller
    let pkg = "controller";
    let controller = Service::builder()
        .name("Controller")
        .package("fakedra.controller.v1")
        .method(unary(
            "get_class_parameters",
            "GetClassParameters",
            "GetClassParametersRequest",
            "ParametersResponse",
            pkg,
        ))
        .method(unary(
            "get_claim_parameters",
            "GetClaimParameters",
            "GetClaimParametersRequest",
            "ParametersResponse",
            pkg,
        ))
        .method(unary("allocate", "Allocate", "AllocateRequest", "AllocateResponse", pkg))
        .method(unary(
            "deallocate",
            "Deallocate",
            "DeallocateRequest",
            "DeallocateResponse",
            pkg,
        ))
        .method(unary(
            "unsuitable_nodes",
            "UnsuitableNodes",
            "UnsuitableNodesRequest",
            "UnsuitableNodesResponse",
            pkg,
        ))
        .method(unary(
            "get_resource_claim_parameters",
            "GetResourceClaimParameters",
            "GetResourceClaimParametersRequest",
            "ResourceClaimParametersResponse",
            pkg,
        ))
        .method(unary(
            "list_resource_claim_parameters",
            "ListResourceClaimParameters",
            "ListResourceClaimParametersRequest",
            "ListResourceClaimParametersResponse",
            pkg,
        ))
        .build();

    Builder::new().compile(&[node, controller]);
    println!("cargo:rerun-if-changed=build.rs");
}
