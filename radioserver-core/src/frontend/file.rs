//! IQ recording replayed as a device.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;

use num_complex::Complex32;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{Frontend, FrontendError, Producer, SamplesCallback};
use crate::config::FileDeviceConfig;
use crate::device::{DeviceConfig, DeviceInfo};
use crate::dsp::SampleBatch;

pub const KIND: &str = "file";

/// On-disk sample encoding, interleaved little-endian I/Q
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IqFormat {
    /// 32-bit float
    #[default]
    Cf32,
    /// 16-bit signed integer
    Ci16,
    /// 8-bit signed integer
    Ci8,
}

impl IqFormat {
    /// Bytes per complex sample
    #[must_use]
    pub const fn sample_size(self) -> usize {
        match self {
            Self::Cf32 => 8,
            Self::Ci16 => 4,
            Self::Ci8 => 2,
        }
    }

    /// Decode whole samples, normalized to `[-1, 1]` for integer formats.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> SampleBatch {
        let size = self.sample_size();
        let half = size / 2;
        bytes
            .chunks_exact(size)
            .map(|s| {
                let (i, q) = s.split_at(half);
                Complex32::new(self.component(i), self.component(q))
            })
            .collect()
    }

    fn component(self, b: &[u8]) -> f32 {
        match self {
            Self::Cf32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            Self::Ci16 => f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0,
            Self::Ci8 => f32::from(i8::from_le_bytes([b[0]])) / 128.0,
        }
    }
}

/// Device entry for one configured recording
#[must_use]
pub fn device_info(recording: &FileDeviceConfig) -> DeviceInfo {
    let bits = match recording.format {
        IqFormat::Cf32 => 32,
        IqFormat::Ci16 => 16,
        IqFormat::Ci8 => 8,
    };
    DeviceInfo {
        kind: KIND.to_string(),
        serial: recording.serial.clone(),
        description: format!("IQ recording {}", recording.path),
        maximum_sample_rate: recording.sample_rate,
        minimum_frequency: recording.center_frequency,
        maximum_frequency: recording.center_frequency,
        adc_resolution: bits,
        maximum_rx_channels: 1,
        maximum_tx_channels: 0,
    }
}

struct ReplayState {
    config: DeviceConfig,
    callback: Option<SamplesCallback>,
}

/// Replays a recording at its native sample rate, optionally looping at EOF.
///
/// The recording fixes the sample rate; tuning requests only update the
/// reported channel settings.
pub struct FileFrontend {
    info: DeviceInfo,
    recording: FileDeviceConfig,
    state: Arc<Mutex<ReplayState>>,
    producer: Mutex<Option<Producer>>,
}

impl FileFrontend {
    pub fn new(recording: FileDeviceConfig, config: DeviceConfig) -> Result<Self, FrontendError> {
        let frontend = Self {
            info: device_info(&recording),
            recording,
            state: Arc::new(Mutex::new(ReplayState {
                config: DeviceConfig::default(),
                callback: None,
            })),
            producer: Mutex::new(None),
        };
        frontend.set_device_config(config)?;
        Ok(frontend)
    }
}

/// Read until `buf` is full or EOF. Returns bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl Frontend for FileFrontend {
    fn init(&self) -> Result<(), FrontendError> {
        let len = std::fs::metadata(&self.recording.path)?.len();
        if len < self.recording.format.sample_size() as u64 {
            return Err(FrontendError::Init(format!(
                "recording {} holds no complete sample",
                self.recording.path
            )));
        }
        Ok(())
    }

    fn start(&self) -> Result<(), FrontendError> {
        let mut producer = self.producer.lock();
        if producer.is_some() {
            return Ok(());
        }

        info!(serial = %self.info.serial, path = %self.recording.path, "Starting file frontend");
        let mut reader = BufReader::new(File::open(&self.recording.path)?);
        let state = Arc::clone(&self.state);
        let format = self.recording.format;
        let looped = self.recording.looped;
        let sample_rate = self.recording.sample_rate;
        let serial = self.info.serial.clone();
        let mut buf = vec![0u8; self.recording.block_size * format.sample_size()];

        *producer = Some(Producer::spawn("file-frontend", move || {
            let mut filled = match read_full(&mut reader, &mut buf) {
                Ok(n) => n,
                Err(e) => {
                    error!(serial = %serial, "Recording read failed: {e}");
                    return None;
                }
            };
            if filled < format.sample_size() && looped {
                if let Err(e) = reader.seek(SeekFrom::Start(0)) {
                    error!(serial = %serial, "Recording rewind failed: {e}");
                    return None;
                }
                filled = read_full(&mut reader, &mut buf).ok()?;
            }

            let batch = format.decode(&buf[..filled]);
            if batch.is_empty() {
                info!(serial = %serial, "Recording finished");
                return None;
            }
            let samples = batch.len();
            let callback = state.lock().callback.clone();
            if let Some(callback) = callback {
                callback(batch);
            }
            Some(Duration::from_secs_f64(samples as f64 / sample_rate))
        })?);
        Ok(())
    }

    fn stop(&self) {
        let producer = self.producer.lock().take();
        if let Some(producer) = producer {
            info!(serial = %self.info.serial, "Stopping file frontend");
            producer.stop();
        }
    }

    fn destroy(&self) {
        self.stop();
        self.state.lock().callback = None;
    }

    fn device_info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn device_config(&self) -> DeviceConfig {
        self.state.lock().config.clone()
    }

    fn set_device_config(&self, mut config: DeviceConfig) -> Result<DeviceConfig, FrontendError> {
        if config.rx_channels.len() > 1 {
            return Err(FrontendError::InvalidConfig(
                "recordings have a single channel".to_string(),
            ));
        }
        config.sample_rate = self.recording.sample_rate;
        config.oversample = 1;
        self.state.lock().config = config.clone();
        Ok(config)
    }

    fn set_samples_available_callback(&self, callback: SamplesCallback) {
        self.state.lock().callback = Some(callback);
    }
}

impl Drop for FileFrontend {
    fn drop(&mut self) {
        self.stop();
    }
}
