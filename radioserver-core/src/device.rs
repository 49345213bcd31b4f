//! Device description and configuration passed between clients and frontends.
//!
//! The pipeline forwards these values opaquely; only frontends interpret them.

use serde::{Deserialize, Serialize};

/// Static capabilities of a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device type name, the key used to find its factory
    pub kind: String,
    pub serial: String,
    pub description: String,
    pub maximum_sample_rate: f64,
    pub minimum_frequency: f64,
    pub maximum_frequency: f64,
    pub adc_resolution: u32,
    pub maximum_rx_channels: u32,
    pub maximum_tx_channels: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub center_frequency: f64,
    /// Gain in `[0, 1]`
    pub normalized_gain: f32,
    pub antenna: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub sample_rate: f64,
    pub oversample: u32,
    pub rx_channels: Vec<ChannelConfig>,
}

impl DeviceConfig {
    /// Centre frequency of the first receive channel, if any
    #[must_use]
    pub fn center_frequency(&self) -> Option<f64> {
        self.rx_channels.first().map(|c| c.center_frequency)
    }
}

/// A device request: which device, and how to configure it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub info: DeviceInfo,
    pub config: DeviceConfig,
}
