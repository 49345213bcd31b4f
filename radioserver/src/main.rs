use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use radioserver_api::RadioServer;
use radioserver_core::{config::load_config, logging, ProtocolVersion};

#[derive(Parser, Debug)]
#[command(name = "radioserver")]
#[command(about = "gRPC server multiplexing SDR receivers into sample streams", long_about = None)]
struct Args {
    /// Config file (YAML or TOML)
    #[arg(long, env = "RADIOSERVER_CONFIG_PATH")]
    config: Option<String>,

    /// gRPC listen address, overrides server.host and server.grpc_port
    #[arg(long, env = "RADIOSERVER_LISTEN")]
    listen: Option<String>,

    /// Server name reported by ServerInfo
    #[arg(long)]
    name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(name) = args.name {
        config.server.name = name;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    logging::init_logging(&config.logging)?;
    info!(
        "RadioServer {} starting (protocol {})",
        env!("CARGO_PKG_VERSION"),
        ProtocolVersion::CURRENT
    );

    let address = args.listen.unwrap_or_else(|| config.grpc_address());
    let server = RadioServer::new(config);
    let devices = server.registry().frontends().list_devices();
    info!("{} device(s) available", devices.len());
    for device in &devices {
        info!(kind = %device.kind, serial = %device.serial, "{}", device.description);
    }

    server
        .listen(&address)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to listen on {address}: {e}"))?;

    shutdown_signal().await;
    info!("Shutdown signal received, starting graceful shutdown...");

    if let Err(e) = server.stop().await {
        error!("Error during shutdown: {e}");
    }
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to install Ctrl+C handler: {e}"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => error!("Failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
