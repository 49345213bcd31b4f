use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::{file, simulated, FileFrontend, Frontend, FrontendError, SimulatedFrontend};
use crate::config::DevicesConfig;
use crate::device::{DeviceInfo, DeviceState};
use crate::{Error, Result};

pub type FactoryResult = std::result::Result<Arc<dyn Frontend>, FrontendError>;

/// Constructs a frontend for a device request
pub type FrontendFactory = Arc<dyn Fn(&DeviceState) -> FactoryResult + Send + Sync>;

/// Enumerates the devices of one family that are currently available
pub type DeviceFinder = Arc<dyn Fn() -> Vec<DeviceInfo> + Send + Sync>;

/// Device-type keyed factories and device discovery.
#[derive(Default)]
pub struct FrontendRegistry {
    factories: RwLock<HashMap<String, FrontendFactory>>,
    finders: RwLock<Vec<(String, DeviceFinder)>>,
}

impl FrontendRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the software frontends enabled in `devices`.
    #[must_use]
    pub fn with_defaults(devices: &DevicesConfig) -> Self {
        let registry = Self::new();

        if devices.simulated.enabled {
            let settings = devices.simulated.clone();
            let info = simulated::device_info(&settings);
            registry.register_factory(
                simulated::KIND,
                Arc::new(move |state: &DeviceState| -> FactoryResult {
                    let frontend = SimulatedFrontend::new(settings.clone(), state.config.clone())?;
                    Ok(Arc::new(frontend) as Arc<dyn Frontend>)
                }),
            );
            registry.register_finder(simulated::KIND, Arc::new(move || vec![info.clone()]));
        }

        if !devices.files.is_empty() {
            let recordings = Arc::new(devices.files.clone());
            let factory_recordings = Arc::clone(&recordings);
            registry.register_factory(
                file::KIND,
                Arc::new(move |state: &DeviceState| -> FactoryResult {
                    let recording = factory_recordings
                        .iter()
                        .find(|r| r.serial == state.info.serial)
                        .ok_or_else(|| {
                            FrontendError::Unavailable(format!(
                                "no recording with serial {}",
                                state.info.serial
                            ))
                        })?;
                    let frontend = FileFrontend::new(recording.clone(), state.config.clone())?;
                    Ok(Arc::new(frontend) as Arc<dyn Frontend>)
                }),
            );
            registry.register_finder(
                file::KIND,
                Arc::new(move || recordings.iter().map(file::device_info).collect()),
            );
        }

        registry
    }

    pub fn register_factory(&self, kind: impl Into<String>, factory: FrontendFactory) {
        let kind = kind.into();
        info!(kind = %kind, "Registered frontend factory");
        self.factories.write().insert(kind, factory);
    }

    pub fn register_finder(&self, name: impl Into<String>, finder: DeviceFinder) {
        self.finders.write().push((name.into(), finder));
    }

    /// Every device reported by the registered finders
    #[must_use]
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        let finders: Vec<DeviceFinder> =
            self.finders.read().iter().map(|(_, f)| Arc::clone(f)).collect();
        finders.iter().flat_map(|find| find()).collect()
    }

    /// Construct and initialize a frontend for `state.info.kind`.
    ///
    /// A frontend that fails to initialize is destroyed before the error is
    /// returned.
    pub fn create(&self, state: &DeviceState) -> Result<Arc<dyn Frontend>> {
        let kind = &state.info.kind;
        let factory = self
            .factories
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::UnknownDevice(kind.clone()))?;

        let frontend = factory(state)?;
        if let Err(e) = frontend.init() {
            warn!(kind = %kind, serial = %state.info.serial, "Frontend init failed: {e}");
            frontend.destroy();
            return Err(e.into());
        }
        Ok(frontend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileDeviceConfig;
    use crate::device::{DeviceConfig, DeviceInfo};
    use crate::frontend::SamplesCallback;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingInit {
        destroyed: Arc<AtomicUsize>,
    }

    impl Frontend for FailingInit {
        fn init(&self) -> std::result::Result<(), FrontendError> {
            Err(FrontendError::Init("no hardware".to_string()))
        }
        fn start(&self) -> std::result::Result<(), FrontendError> {
            Ok(())
        }
        fn stop(&self) {}
        fn destroy(&self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
        fn device_info(&self) -> DeviceInfo {
            DeviceInfo::default()
        }
        fn device_config(&self) -> DeviceConfig {
            DeviceConfig::default()
        }
        fn set_device_config(
            &self,
            config: DeviceConfig,
        ) -> std::result::Result<DeviceConfig, FrontendError> {
            Ok(config)
        }
        fn set_samples_available_callback(&self, _callback: SamplesCallback) {}
    }

    fn request(kind: &str, serial: &str) -> DeviceState {
        DeviceState {
            info: DeviceInfo {
                kind: kind.to_string(),
                serial: serial.to_string(),
                ..DeviceInfo::default()
            },
            config: DeviceConfig::default(),
        }
    }

    #[test]
    fn test_unknown_kind() {
        let registry = FrontendRegistry::new();
        let err = registry.create(&request("LimeSDRMini", "0")).err().unwrap();
        assert!(matches!(err, Error::UnknownDevice(kind) if kind == "LimeSDRMini"));
    }

    #[test]
    fn test_failed_init_destroys_frontend() {
        let registry = FrontendRegistry::new();
        let destroyed = Arc::new(AtomicUsize::new(0));
        let factory_destroyed = Arc::clone(&destroyed);
        registry.register_factory(
            "broken",
            Arc::new(move |_: &DeviceState| -> FactoryResult {
                Ok(Arc::new(FailingInit {
                    destroyed: Arc::clone(&factory_destroyed),
                }) as Arc<dyn Frontend>)
            }),
        );

        let err = registry.create(&request("broken", "0")).err().unwrap();
        assert!(matches!(err, Error::Acquisition(FrontendError::Init(_))));
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_defaults_list_and_create() {
        let devices = DevicesConfig {
            files: vec![FileDeviceConfig {
                serial: "rec0".to_string(),
                path: "/nonexistent/capture.cf32".to_string(),
                format: Default::default(),
                sample_rate: 1e6,
                center_frequency: 0.0,
                block_size: 1024,
                looped: true,
            }],
            ..DevicesConfig::default()
        };
        let registry = FrontendRegistry::with_defaults(&devices);

        let kinds: Vec<String> = registry.list_devices().into_iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec!["simulated".to_string(), "file".to_string()]);

        let frontend = registry.create(&request("simulated", "sim0")).unwrap();
        assert_eq!(frontend.device_info().serial, "sim0");

        // Known kind, unknown serial
        assert!(matches!(
            registry.create(&request("file", "missing")),
            Err(Error::Acquisition(FrontendError::Unavailable(_)))
        ));
        // Known serial, missing recording
        assert!(matches!(
            registry.create(&request("file", "rec0")),
            Err(Error::Acquisition(FrontendError::Io(_)))
        ));
    }
}
