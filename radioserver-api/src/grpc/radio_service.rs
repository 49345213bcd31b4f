use std::pin::Pin;
use std::sync::Arc;

use radioserver_core::session::SessionRegistry;
use radioserver_core::{Error, ProtocolVersion};
use radioserver_proto::radio::{
    DeviceConfig, DeviceList, DeviceState, Empty, ProvisionResponse, ServerInfoResponse,
    SessionToken, TuneRequest,
};
use radioserver_proto::{IqData, RadioService};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::info;

use super::convert::{
    device_config_from_proto, device_config_to_proto, device_info_to_proto,
    device_state_from_proto, version_to_proto,
};
use super::stream::{spawn_delivery, DeliveryContext};

/// `RadioService` implementation
#[derive(Clone)]
pub struct RadioServiceImpl {
    name: String,
    version: ProtocolVersion,
    registry: Arc<SessionRegistry>,
    delivery: DeliveryContext,
    stream_channel_capacity: usize,
}

impl RadioServiceImpl {
    #[must_use]
    pub fn new(name: String, delivery: DeliveryContext, stream_channel_capacity: usize) -> Self {
        Self {
            name,
            version: ProtocolVersion::CURRENT,
            registry: Arc::clone(&delivery.registry),
            delivery,
            stream_channel_capacity: stream_channel_capacity.max(1),
        }
    }
}

#[tonic::async_trait]
impl RadioService for RadioServiceImpl {
    async fn server_info(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<ServerInfoResponse>, Status> {
        Ok(Response::new(ServerInfoResponse {
            name: self.name.clone(),
            version: Some(version_to_proto(self.version)),
        }))
    }

    async fn list_devices(&self, _request: Request<Empty>) -> Result<Response<DeviceList>, Status> {
        let devices = self
            .registry
            .frontends()
            .list_devices()
            .into_iter()
            .map(device_info_to_proto)
            .collect();
        Ok(Response::new(DeviceList { devices }))
    }

    async fn provision(
        &self,
        request: Request<DeviceState>,
    ) -> Result<Response<ProvisionResponse>, Status> {
        let state = device_state_from_proto(request.into_inner())?;
        let session = self.registry.provision(state).await?;

        Ok(Response::new(ProvisionResponse {
            info: Some(device_info_to_proto(session.device_info())),
            config: Some(device_config_to_proto(session.device_config())),
            session_token: session.id().to_string(),
        }))
    }

    async fn tune(&self, request: Request<TuneRequest>) -> Result<Response<DeviceConfig>, Status> {
        let req = request.into_inner();
        let config = req
            .config
            .ok_or_else(|| Error::InvalidInput("device config is required".to_string()))?;

        let applied = self
            .registry
            .tune(&req.session_token, device_config_from_proto(config))
            .await?;
        Ok(Response::new(device_config_to_proto(applied)))
    }

    async fn destroy(&self, request: Request<SessionToken>) -> Result<Response<Empty>, Status> {
        self.registry.destroy(&request.into_inner().token).await?;
        Ok(Response::new(Empty {}))
    }

    async fn keep_alive(&self, request: Request<SessionToken>) -> Result<Response<Empty>, Status> {
        self.registry.keep_alive(&request.into_inner().token)?;
        Ok(Response::new(Empty {}))
    }

    type StreamSamplesStream =
        Pin<Box<dyn tokio_stream::Stream<Item = Result<IqData, Status>> + Send + 'static>>;

    async fn stream_samples(
        &self,
        request: Request<SessionToken>,
    ) -> Result<Response<Self::StreamSamplesStream>, Status> {
        let token = request.into_inner().token;
        let session = self
            .registry
            .lookup(&token)
            .ok_or_else(|| Error::SessionNotFound(token.clone()))?;
        session.start_streaming()?;

        info!(session_id = %token, "Streaming started");
        let (tx, rx) = mpsc::channel(self.stream_channel_capacity);
        spawn_delivery(session, tx, self.delivery.clone());

        Ok(Response::new(
            Box::pin(ReceiverStream::new(rx)) as Self::StreamSamplesStream
        ))
    }
}
