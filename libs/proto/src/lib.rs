//! # fakedra-proto
//!
//! gRPC services spoken on the driver's two Unix sockets.
//!
//! - [`v1alpha3`]: the node runtime's view of the kubelet plugin
//!   (ListAndWatch, Prepare, Unprepare)
//! - [`controller`]: the scheduling framework's view of the allocation
//!   controller. Framework objects travel as JSON strings in the shape of
//!   the `fakedra-api` types.
//!
//! Message types are declared here; clients and servers are generated by
//! the build script.

pub mod convert;
pub mod uds;

/// Messages above this size are rejected unless a server overrides it.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

pub mod v1alpha3 {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodeListAndWatchResourcesRequest {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodeListAndWatchResourcesResponse {
        #[prost(message, repeated, tag = "1")]
        pub resources: ::prost::alloc::vec::Vec<ResourceModel>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ResourceModel {
        #[prost(message, optional, tag = "1")]
        pub named_resources: ::core::option::Option<NamedResourcesResources>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NamedResourcesResources {
        #[prost(message, repeated, tag = "1")]
        pub instances: ::prost::alloc::vec::Vec<NamedResourcesInstance>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NamedResourcesInstance {
        #[prost(string, tag = "1")]
        pub name: ::prost::alloc::string::String,
        #[prost(message, repeated, tag = "2")]
        pub attributes: ::prost::alloc::vec::Vec<NamedResourcesAttribute>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NamedResourcesAttribute {
        #[prost(string, tag = "1")]
        pub name: ::prost::alloc::string::String,
        #[prost(string, optional, tag = "2")]
        pub string_value: ::core::option::Option<::prost::alloc::string::String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodePrepareResourcesRequest {
        #[prost(message, repeated, tag = "1")]
        pub claims: ::prost::alloc::vec::Vec<Claim>,
    }

    /// Per-claim results keyed by claim UID.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodePrepareResourcesResponse {
        #[prost(map = "string, message", tag = "1")]
        pub claims: ::std::collections::HashMap<
            ::prost::alloc::string::String,
            NodePrepareResourceResponse,
        >,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodePrepareResourceResponse {
        #[prost(string, repeated, tag = "1")]
        pub cdi_devices: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
        /// Empty on success.
        #[prost(string, tag = "2")]
        pub error: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodeUnprepareResourcesRequest {
        #[prost(message, repeated, tag = "1")]
        pub claims: ::prost::alloc::vec::Vec<Claim>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodeUnprepareResourcesResponse {
        #[prost(map = "string, message", tag = "1")]
        pub claims: ::std::collections::HashMap<
            ::prost::alloc::string::String,
            NodeUnprepareResourceResponse,
        >,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodeUnprepareResourceResponse {
        #[prost(string, tag = "1")]
        pub error: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Claim {
        #[prost(string, tag = "1")]
        pub namespace: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub uid: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub name: ::prost::alloc::string::String,
        #[prost(message, repeated, tag = "4")]
        pub structured_resource_handle: ::prost::alloc::vec::Vec<StructuredResourceHandle>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StructuredResourceHandle {
        /// JSON object; empty when the claim carried no vendor parameters.
        #[prost(string, tag = "1")]
        pub vendor_claim_parameters: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub node_name: ::prost::alloc::string::String,
        #[prost(message, repeated, tag = "3")]
        pub results: ::prost::alloc::vec::Vec<DriverAllocationResult>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DriverAllocationResult {
        #[prost(message, optional, tag = "1")]
        pub named_resources: ::core::option::Option<NamedResourcesAllocationResult>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NamedResourcesAllocationResult {
        #[prost(string, tag = "1")]
        pub name: ::prost::alloc::string::String,
    }

    include!(concat!(env!("OUT_DIR"), "/v1alpha3.Node.rs"));

    pub use node_client::NodeClient;
    pub use node_server::{Node, NodeServer};
}

pub mod controller {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetClassParametersRequest {
        #[prost(string, tag = "1")]
        pub class: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetClaimParametersRequest {
        #[prost(string, tag = "1")]
        pub claim: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub class: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ParametersResponse {
        #[prost(string, tag = "1")]
        pub parameters: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AllocateRequest {
        #[prost(string, tag = "1")]
        pub claim: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub claim_parameters: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub class: ::prost::alloc::string::String,
        #[prost(string, tag = "4")]
        pub class_parameters: ::prost::alloc::string::String,
        /// Empty for immediate allocation.
        #[prost(string, tag = "5")]
        pub selected_node: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AllocateResponse {
        #[prost(string, tag = "1")]
        pub allocation: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DeallocateRequest {
        #[prost(string, tag = "1")]
        pub claim: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DeallocateResponse {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct UnsuitableNodesRequest {
        #[prost(string, tag = "1")]
        pub pod: ::prost::alloc::string::String,
        #[prost(string, repeated, tag = "2")]
        pub claim_allocations: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
        #[prost(string, repeated, tag = "3")]
        pub potential_nodes: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }

    /// The request's claim allocations with their unsuitable lists filled in.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct UnsuitableNodesResponse {
        #[prost(string, repeated, tag = "1")]
        pub claim_allocations: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }

    /// Look up the object generated from FakeClaimParameters `name`.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetResourceClaimParametersRequest {
        #[prost(string, tag = "1")]
        pub namespace: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub name: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ResourceClaimParametersResponse {
        #[prost(string, tag = "1")]
        pub parameters: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListResourceClaimParametersRequest {
        /// Empty lists every namespace.
        #[prost(string, tag = "1")]
        pub namespace: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListResourceClaimParametersResponse {
        #[prost(string, repeated, tag = "1")]
        pub items: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }

    include!(concat!(
        env!("OUT_DIR"),
        "/fakedra.controller.v1.Controller.rs"
    ));

    pub use controller_client::ControllerClient;
    pub use controller_server::{Controller, ControllerServer};
}
