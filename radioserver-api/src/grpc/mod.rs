pub mod codec;
pub mod convert;
pub mod radio_service;
pub mod stream;

pub use codec::{decode_samples, SampleBufferPool};
pub use radio_service::RadioServiceImpl;
pub use stream::{DeliveryContext, Termination};

use radioserver_core::Config;
use radioserver_proto::{RadioServiceServer, FILE_DESCRIPTOR_SET};
use tonic::transport::server::Router;
use tonic::transport::Server;
use tonic_reflection::server::Builder as ReflectionBuilder;

/// Build the gRPC router: radio service, health and (optionally) reflection
pub async fn build_router(config: &Config, delivery: DeliveryContext) -> anyhow::Result<Router> {
    let service = RadioServiceImpl::new(
        config.server.name.clone(),
        delivery,
        config.session.stream_channel_capacity,
    );

    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<RadioServiceServer<RadioServiceImpl>>()
        .await;

    let reflection_service = if config.server.enable_reflection {
        let reflection = ReflectionBuilder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()
            .map_err(|e| anyhow::anyhow!("Failed to build reflection service: {e}"))?;

        tracing::info!("gRPC reflection enabled");
        Some(reflection)
    } else {
        None
    };

    let router = Server::builder()
        .add_service(health_service)
        .add_service(RadioServiceServer::new(service))
        .add_optional_service(reflection_service);

    Ok(router)
}
