//! Test fixtures for radioserver-core tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use num_complex::Complex32;
use parking_lot::Mutex;

use crate::config::SessionConfig;
use crate::device::{DeviceConfig, DeviceInfo, DeviceState};
use crate::dsp::SampleBatch;
use crate::frontend::{FactoryResult, Frontend, FrontendError, FrontendRegistry, SamplesCallback};

pub const SCRIPTED_KIND: &str = "scripted";

/// Frontend driven by the test: batches are emitted with [`ScriptedFrontend::emit`]
#[derive(Default)]
pub struct ScriptedFrontend {
    callback: Mutex<Option<SamplesCallback>>,
    config: Mutex<DeviceConfig>,
    running: Mutex<bool>,
    pub starts: AtomicUsize,
    /// Stops that actually stopped a running frontend
    pub stops: AtomicUsize,
    pub destroys: AtomicUsize,
}

impl ScriptedFrontend {
    pub fn emit(&self, batch: SampleBatch) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(batch);
        }
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Frontend for ScriptedFrontend {
    fn init(&self) -> Result<(), FrontendError> {
        Ok(())
    }

    fn start(&self) -> Result<(), FrontendError> {
        let mut running = self.running.lock();
        if !*running {
            *running = true;
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn stop(&self) {
        let mut running = self.running.lock();
        if *running {
            *running = false;
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn destroy(&self) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        *self.callback.lock() = None;
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            kind: SCRIPTED_KIND.to_string(),
            serial: "script0".to_string(),
            ..DeviceInfo::default()
        }
    }

    fn device_config(&self) -> DeviceConfig {
        self.config.lock().clone()
    }

    fn set_device_config(&self, config: DeviceConfig) -> Result<DeviceConfig, FrontendError> {
        *self.config.lock() = config.clone();
        Ok(config)
    }

    fn set_samples_available_callback(&self, callback: SamplesCallback) {
        *self.callback.lock() = Some(callback);
    }
}

/// Frontend registry producing [`ScriptedFrontend`]s, plus every instance it created
pub fn scripted_registry() -> (Arc<FrontendRegistry>, Arc<Mutex<Vec<Arc<ScriptedFrontend>>>>) {
    let registry = FrontendRegistry::new();
    let created = Arc::new(Mutex::new(Vec::new()));
    let factory_created = Arc::clone(&created);
    registry.register_factory(
        SCRIPTED_KIND,
        Arc::new(move |state: &DeviceState| -> FactoryResult {
            let frontend = Arc::new(ScriptedFrontend::default());
            frontend.set_device_config(state.config.clone())?;
            factory_created.lock().push(Arc::clone(&frontend));
            Ok(frontend as Arc<dyn Frontend>)
        }),
    );
    (Arc::new(registry), created)
}

pub fn scripted_request() -> DeviceState {
    DeviceState {
        info: DeviceInfo {
            kind: SCRIPTED_KIND.to_string(),
            ..DeviceInfo::default()
        },
        config: DeviceConfig {
            sample_rate: 1e6,
            ..DeviceConfig::default()
        },
    }
}

pub fn test_session_config() -> SessionConfig {
    SessionConfig {
        generator_wake_interval_ms: 20,
        ..SessionConfig::default()
    }
}

pub fn tagged_batch(tag: usize, len: usize) -> SampleBatch {
    (0..len)
        .map(|i| Complex32::new(tag as f32, i as f32))
        .collect()
}
