pub mod grpc;
pub mod http;
pub mod server;

pub use server::RadioServer;
