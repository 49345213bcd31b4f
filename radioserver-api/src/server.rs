//! Server lifecycle management
//!
//! Owns the session registry and runs, between `listen` and `stop`:
//! - the gRPC server
//! - the session sweeper
//! - the optional HTTP observability server

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use radioserver_core::frontend::FrontendRegistry;
use radioserver_core::session::SessionRegistry;
use radioserver_core::{Config, Error, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::grpc::{build_router, DeliveryContext};

/// Upper bound on waiting for the gRPC server to drain on stop
const GRPC_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    shutdown: CancellationToken,
    local_addr: SocketAddr,
    grpc: JoinHandle<()>,
    http: Option<JoinHandle<()>>,
    sweeper: JoinHandle<()>,
}

pub struct RadioServer {
    config: Config,
    registry: Arc<SessionRegistry>,
    running: AtomicBool,
    state: Mutex<Option<Running>>,
}

impl RadioServer {
    /// Server exposing the software frontends enabled in `config`
    #[must_use]
    pub fn new(config: Config) -> Self {
        let frontends = Arc::new(FrontendRegistry::with_defaults(&config.devices));
        Self::with_frontends(config, frontends)
    }

    #[must_use]
    pub fn with_frontends(config: Config, frontends: Arc<FrontendRegistry>) -> Self {
        let registry = Arc::new(SessionRegistry::new(frontends, config.session.clone()));
        Self {
            config,
            registry,
            running: AtomicBool::new(false),
            state: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Address the gRPC listener is bound to, while running
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().as_ref().map(|r| r.local_addr)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Bind `address` and start serving in the background.
    ///
    /// Returns the bound address. Fails with [`Error::AlreadyRunning`] if the
    /// server is already listening.
    pub async fn listen(&self, address: &str) -> Result<SocketAddr> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }

        match self.start(address).await {
            Ok(running) => {
                let addr = running.local_addr;
                *self.state.lock() = Some(running);
                Ok(addr)
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    async fn start(&self, address: &str) -> Result<Running> {
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();

        let delivery = DeliveryContext {
            registry: Arc::clone(&self.registry),
            poll_interval: self.config.session.stream_poll_interval(),
            release_on_disconnect: self.config.session.release_on_disconnect,
            shutdown: shutdown.clone(),
        };
        let router = build_router(&self.config, delivery)
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let http = match self.config.metrics_address() {
            Some(addr) => Some(self.start_http(&addr, shutdown.clone()).await?),
            None => None,
        };

        let sweeper = self.registry.start_sweeper(shutdown.child_token());

        let grpc_shutdown = shutdown.clone();
        let grpc = tokio::spawn(async move {
            let incoming = TcpListenerStream::new(listener);
            if let Err(e) = router
                .serve_with_incoming_shutdown(incoming, grpc_shutdown.cancelled_owned())
                .await
            {
                error!("gRPC server error: {e}");
            }
            info!("gRPC server stopped");
        });

        info!(
            name = %self.config.server.name,
            version = %radioserver_core::ProtocolVersion::CURRENT,
            "RadioServer listening on {local_addr}"
        );

        Ok(Running {
            shutdown,
            local_addr,
            grpc,
            http,
            sweeper,
        })
    }

    async fn start_http(&self, address: &str, shutdown: CancellationToken) -> Result<JoinHandle<()>> {
        let listener = TcpListener::bind(address).await?;
        let addr = listener.local_addr()?;
        let router = crate::http::create_router(Arc::clone(&self.registry));

        info!("HTTP observability server listening on {addr}");
        Ok(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!("HTTP server error: {e}");
            }
            info!("HTTP server shut down gracefully");
        }))
    }

    /// Stop serving and release every session.
    pub async fn stop(&self) -> Result<()> {
        let running = self.state.lock().take().ok_or(Error::NotRunning)?;
        info!("Shutting down RadioServer...");

        running.shutdown.cancel();
        if let Err(e) = running.sweeper.await {
            warn!("Sweeper task failed: {e}");
        }

        match tokio::time::timeout(GRPC_DRAIN_TIMEOUT, running.grpc).await {
            Ok(Err(e)) => warn!("gRPC server task failed: {e}"),
            Err(_) => warn!("gRPC server did not drain within {GRPC_DRAIN_TIMEOUT:?}"),
            Ok(Ok(())) => {}
        }

        self.registry.shutdown().await;

        if let Some(http) = running.http {
            if let Err(e) = http.await {
                warn!("HTTP server task failed: {e}");
            }
        }

        self.running.store(false, Ordering::Release);
        info!("RadioServer shut down complete");
        Ok(())
    }
}
