use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use num_complex::Complex32;
use parking_lot::Mutex;
use tracing::info;

use super::{Frontend, FrontendError, Producer, SamplesCallback};
use crate::config::SimulatedDeviceConfig;
use crate::device::{ChannelConfig, DeviceConfig, DeviceInfo};
use crate::dsp::SampleBatch;

pub const KIND: &str = "simulated";
pub const SERIAL: &str = "sim0";

const MINIMUM_SAMPLE_RATE: f64 = 10e3;

/// Description advertised for the simulated receiver
#[must_use]
pub fn device_info(settings: &SimulatedDeviceConfig) -> DeviceInfo {
    DeviceInfo {
        kind: KIND.to_string(),
        serial: SERIAL.to_string(),
        description: "Simulated receiver (complex tone)".to_string(),
        maximum_sample_rate: settings.maximum_sample_rate,
        minimum_frequency: 0.0,
        maximum_frequency: 6e9,
        adc_resolution: 32,
        maximum_rx_channels: 1,
        maximum_tx_channels: 0,
    }
}

struct ToneState {
    config: DeviceConfig,
    callback: Option<SamplesCallback>,
    phase: f64,
}

/// Software receiver producing a complex tone offset from the tuned centre.
///
/// The amplitude follows the first channel's normalized gain. Blocks are
/// delivered from a producer thread paced to the configured sample rate.
pub struct SimulatedFrontend {
    info: DeviceInfo,
    settings: SimulatedDeviceConfig,
    state: Arc<Mutex<ToneState>>,
    producer: Mutex<Option<Producer>>,
}

impl SimulatedFrontend {
    pub fn new(
        settings: SimulatedDeviceConfig,
        config: DeviceConfig,
    ) -> Result<Self, FrontendError> {
        let frontend = Self {
            info: device_info(&settings),
            settings,
            state: Arc::new(Mutex::new(ToneState {
                config: DeviceConfig::default(),
                callback: None,
                phase: 0.0,
            })),
            producer: Mutex::new(None),
        };
        frontend.set_device_config(config)?;
        Ok(frontend)
    }

    fn normalize(&self, mut config: DeviceConfig) -> Result<DeviceConfig, FrontendError> {
        if config.sample_rate <= 0.0 {
            config.sample_rate = self.settings.default_sample_rate;
        }
        if config.sample_rate < MINIMUM_SAMPLE_RATE
            || config.sample_rate > self.settings.maximum_sample_rate
        {
            return Err(FrontendError::InvalidConfig(format!(
                "sample rate {} outside [{MINIMUM_SAMPLE_RATE}, {}]",
                config.sample_rate, self.settings.maximum_sample_rate
            )));
        }
        if config.oversample == 0 {
            config.oversample = 1;
        }
        if config.rx_channels.is_empty() {
            config.rx_channels.push(ChannelConfig {
                normalized_gain: 0.5,
                ..ChannelConfig::default()
            });
        }
        if config.rx_channels.len() > self.info.maximum_rx_channels as usize {
            return Err(FrontendError::InvalidConfig(format!(
                "{} rx channels requested, device has {}",
                config.rx_channels.len(),
                self.info.maximum_rx_channels
            )));
        }
        for channel in &mut config.rx_channels {
            channel.normalized_gain = channel.normalized_gain.clamp(0.0, 1.0);
        }
        Ok(config)
    }
}

/// Fill one block of the tone, advancing `phase`.
fn tone_block(
    len: usize,
    sample_rate: f64,
    offset_hz: f64,
    amplitude: f32,
    phase: &mut f64,
) -> SampleBatch {
    let step = TAU * offset_hz / sample_rate;
    (0..len)
        .map(|_| {
            let sample = Complex32::from_polar(amplitude, *phase as f32);
            *phase = (*phase + step).rem_euclid(TAU);
            sample
        })
        .collect()
}

impl Frontend for SimulatedFrontend {
    fn init(&self) -> Result<(), FrontendError> {
        Ok(())
    }

    fn start(&self) -> Result<(), FrontendError> {
        let mut producer = self.producer.lock();
        if producer.is_some() {
            return Ok(());
        }

        info!(serial = %self.info.serial, "Starting simulated frontend");
        let state = Arc::clone(&self.state);
        let block_size = self.settings.block_size;
        let offset_hz = self.settings.tone_offset_hz;

        *producer = Some(Producer::spawn("simulated-frontend", move || {
            let (batch, callback, sample_rate) = {
                let mut state = state.lock();
                let sample_rate = state.config.sample_rate;
                let amplitude = state
                    .config
                    .rx_channels
                    .first()
                    .map_or(0.5, |c| c.normalized_gain);
                let ToneState {
                    phase, callback, ..
                } = &mut *state;
                let batch = tone_block(block_size, sample_rate, offset_hz, amplitude, phase);
                (batch, callback.clone(), sample_rate)
            };
            if let Some(callback) = callback {
                callback(batch);
            }
            Some(Duration::from_secs_f64(block_size as f64 / sample_rate))
        })?);
        Ok(())
    }

    fn stop(&self) {
        let producer = self.producer.lock().take();
        if let Some(producer) = producer {
            info!(serial = %self.info.serial, "Stopping simulated frontend");
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

    fn set_device_config(&self, config: DeviceConfig) -> Result<DeviceConfig, FrontendError> {
        let config = self.normalize(config)?;
        if let Some(freq) = config.center_frequency() {
            info!(serial = %self.info.serial, center_frequency = freq, "Tuning");
        }
        self.state.lock().config = config.clone();
        Ok(config)
    }

    fn set_samples_available_callback(&self, callback: SamplesCallback) {
        self.state.lock().callback = Some(callback);
    }
}

impl Drop for SimulatedFrontend {
    fn drop(&mut self) {
        self.stop();
    }
}
