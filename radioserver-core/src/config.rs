use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::frontend::file::IqFormat;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub devices: DevicesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name reported by the `ServerInfo` RPC
    pub name: String,
    pub host: String,
    pub grpc_port: u16,
    /// HTTP port for `/health` and `/metrics` (0 disables the HTTP listener)
    pub metrics_port: u16,
    pub enable_reflection: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "helium".to_string(),
            host: "0.0.0.0".to_string(),
            grpc_port: 4050,
            metrics_port: 0,
            enable_reflection: true,
        }
    }
}

/// Session lifecycle and pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// A session with no activity for longer than this is expired by the sweep
    pub idle_timeout_ms: u64,
    /// Minimum time between two sweeps
    pub sweep_interval_ms: u64,
    /// How often the sweep task wakes up to check whether a sweep is due
    pub sweep_check_interval_ms: u64,
    /// Capacity (in batches) of both the generator input queue and the session output queue
    pub queue_capacity: usize,
    /// Liveness timeout of the channel generator wait
    pub generator_wake_interval_ms: u64,
    /// Sleep of the delivery loop when the output queue is empty
    pub stream_poll_interval_ms: u64,
    /// Frames buffered between the delivery loop and the transport
    pub stream_channel_capacity: usize,
    /// Fully release the session when its streaming client disconnects
    pub release_on_disconnect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 120_000,
            sweep_interval_ms: 10_000,
            sweep_check_interval_ms: 2_000,
            queue_capacity: 4096,
            generator_wake_interval_ms: 1_000,
            stream_poll_interval_ms: 1,
            stream_channel_capacity: 64,
            release_on_disconnect: false,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    #[must_use]
    pub const fn sweep_check_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_check_interval_ms)
    }

    #[must_use]
    pub const fn generator_wake_interval(&self) -> Duration {
        Duration::from_millis(self.generator_wake_interval_ms)
    }

    #[must_use]
    pub const fn stream_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stream_poll_interval_ms)
    }
}

/// Software devices exposed by the server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub simulated: SimulatedDeviceConfig,
    pub files: Vec<FileDeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedDeviceConfig {
    pub enabled: bool,
    /// Complex samples per delivered batch
    pub block_size: usize,
    /// Offset of the generated tone from the tuned centre frequency, in Hz
    pub tone_offset_hz: f64,
    pub default_sample_rate: f64,
    pub maximum_sample_rate: f64,
}

impl Default for SimulatedDeviceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_size: 16_384,
            tone_offset_hz: 25_000.0,
            default_sample_rate: 2_500_000.0,
            maximum_sample_rate: 10_000_000.0,
        }
    }
}

/// An IQ recording replayed as a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDeviceConfig {
    /// Serial number clients use to select this recording
    pub serial: String,
    pub path: String,
    #[serde(default)]
    pub format: IqFormat,
    pub sample_rate: f64,
    #[serde(default)]
    pub center_frequency: f64,
    #[serde(default = "default_file_block_size")]
    pub block_size: usize,
    #[serde(default = "default_true")]
    pub looped: bool,
}

const fn default_file_block_size() -> usize {
    65_536
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file
    /// 3. Defaults
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables (RADIOSERVER_SERVER__GRPC_PORT, etc.)
        builder = builder.add_source(
            Environment::with_prefix("RADIOSERVER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get gRPC address
    #[must_use]
    pub fn grpc_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.grpc_port)
    }

    /// Get HTTP observability address, if enabled
    #[must_use]
    pub fn metrics_address(&self) -> Option<String> {
        (self.server.metrics_port != 0)
            .then(|| format!("{}:{}", self.server.host, self.server.metrics_port))
    }

    /// Check the configuration, returning every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let session = &self.session;

        if self.server.name.trim().is_empty() {
            errors.push("server.name must not be empty".to_string());
        }
        if session.queue_capacity == 0 {
            errors.push("session.queue_capacity must be greater than 0".to_string());
        }
        if session.stream_channel_capacity == 0 {
            errors.push("session.stream_channel_capacity must be greater than 0".to_string());
        }
        for (name, value) in [
            ("session.idle_timeout_ms", session.idle_timeout_ms),
            ("session.sweep_interval_ms", session.sweep_interval_ms),
            ("session.sweep_check_interval_ms", session.sweep_check_interval_ms),
            ("session.generator_wake_interval_ms", session.generator_wake_interval_ms),
            ("session.stream_poll_interval_ms", session.stream_poll_interval_ms),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be greater than 0"));
            }
        }
        if session.sweep_check_interval_ms > session.sweep_interval_ms {
            errors.push(
                "session.sweep_check_interval_ms must not exceed session.sweep_interval_ms"
                    .to_string(),
            );
        }
        if session.stream_poll_interval_ms >= session.idle_timeout_ms {
            errors.push(
                "session.stream_poll_interval_ms must be shorter than session.idle_timeout_ms"
                    .to_string(),
            );
        }

        if self.devices.simulated.enabled && self.devices.simulated.block_size == 0 {
            errors.push("devices.simulated.block_size must be greater than 0".to_string());
        }

        let mut serials = HashSet::new();
        for file in &self.devices.files {
            if !serials.insert(file.serial.as_str()) {
                errors.push(format!("duplicate file device serial: {}", file.serial));
            }
            if file.sample_rate <= 0.0 {
                errors.push(format!("file device {}: sample_rate must be positive", file.serial));
            }
            if file.block_size == 0 {
                errors.push(format!("file device {}: block_size must be greater than 0", file.serial));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Load configuration from a config file or environment variables
///
/// Config file search order:
/// 1. Explicit path (CLI flag)
/// 2. `RADIOSERVER_CONFIG_PATH` environment variable
/// 3. ./config.yaml (current working directory)
/// 4. Fall back to environment variables only
pub fn load_config(explicit_path: Option<&str>) -> anyhow::Result<Config> {
    let config_path = explicit_path
        .map(ToString::to_string)
        .or_else(|| {
            std::env::var("RADIOSERVER_CONFIG_PATH")
                .ok()
                .filter(|p| Path::new(p).exists())
        })
        .or_else(|| {
            let cwd = "config.yaml";
            Path::new(cwd).exists().then(|| cwd.to_string())
        });

    let config = match config_path {
        Some(path) => {
            eprintln!("Loading config from {path}");
            Config::from_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config from {path}: {e}"))?
        }
        None => {
            eprintln!("No config file found, using environment variables");
            Config::from_env().unwrap_or_else(|e| {
                eprintln!("Failed to load config: {e}");
                eprintln!("Using default configuration");
                Config::default()
            })
        }
    };

    if let Err(errors) = config.validate() {
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    info!("Configuration loaded and validated");
    Ok(config)
}
