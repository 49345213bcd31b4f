//! RadioServer Protocol Definitions
//!
//! This crate contains the protobuf definitions and generated tonic code for
//! the RadioServer gRPC API.

pub mod iq;

pub mod radio {
    #![allow(clippy::all)]
    #![allow(warnings)]

    tonic::include_proto!("radioserver");
}

/// Encoded file descriptor set, for gRPC server reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("radioserver_descriptor");

pub use iq::IqData;
pub use radio::radio_service_client::RadioServiceClient;
pub use radio::radio_service_server::{RadioService, RadioServiceServer};
