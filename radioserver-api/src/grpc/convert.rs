//! Conversions between protobuf messages and core device types.

use radioserver_core::device::{ChannelConfig, DeviceConfig, DeviceInfo, DeviceState};
use radioserver_core::{Error, ProtocolVersion};
use radioserver_proto::radio;

pub fn device_info_to_proto(info: DeviceInfo) -> radio::DeviceInfo {
    radio::DeviceInfo {
        kind: info.kind,
        serial: info.serial,
        description: info.description,
        maximum_sample_rate: info.maximum_sample_rate,
        minimum_frequency: info.minimum_frequency,
        maximum_frequency: info.maximum_frequency,
        adc_resolution: info.adc_resolution,
        maximum_rx_channels: info.maximum_rx_channels,
        maximum_tx_channels: info.maximum_tx_channels,
    }
}

pub fn device_info_from_proto(info: radio::DeviceInfo) -> DeviceInfo {
    DeviceInfo {
        kind: info.kind,
        serial: info.serial,
        description: info.description,
        maximum_sample_rate: info.maximum_sample_rate,
        minimum_frequency: info.minimum_frequency,
        maximum_frequency: info.maximum_frequency,
        adc_resolution: info.adc_resolution,
        maximum_rx_channels: info.maximum_rx_channels,
        maximum_tx_channels: info.maximum_tx_channels,
    }
}

pub fn device_config_to_proto(config: DeviceConfig) -> radio::DeviceConfig {
    radio::DeviceConfig {
        sample_rate: config.sample_rate,
        oversample: config.oversample,
        rx_channels: config
            .rx_channels
            .into_iter()
            .map(|c| radio::ChannelConfig {
                center_frequency: c.center_frequency,
                normalized_gain: c.normalized_gain,
                antenna: c.antenna,
            })
            .collect(),
    }
}

pub fn device_config_from_proto(config: radio::DeviceConfig) -> DeviceConfig {
    DeviceConfig {
        sample_rate: config.sample_rate,
        oversample: config.oversample,
        rx_channels: config
            .rx_channels
            .into_iter()
            .map(|c| ChannelConfig {
                center_frequency: c.center_frequency,
                normalized_gain: c.normalized_gain,
                antenna: c.antenna,
            })
            .collect(),
    }
}

/// A provision request must name a device type.
pub fn device_state_from_proto(state: radio::DeviceState) -> Result<DeviceState, Error> {
    let info = state
        .info
        .ok_or_else(|| Error::InvalidInput("device info is required".to_string()))?;
    if info.kind.is_empty() {
        return Err(Error::InvalidInput("device kind is required".to_string()));
    }
    Ok(DeviceState {
        info: device_info_from_proto(info),
        config: state.config.map(device_config_from_proto).unwrap_or_default(),
    })
}

pub const fn version_to_proto(version: ProtocolVersion) -> radio::Version {
    radio::Version {
        major: version.major,
        minor: version.minor,
        hash: version.hash,
    }
}
