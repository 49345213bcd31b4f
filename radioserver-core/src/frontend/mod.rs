//! Sample sources.
//!
//! A [`Frontend`] wraps one receiver device. The pipeline only depends on
//! this trait; concrete device families register a factory with the
//! [`FrontendRegistry`].

pub mod file;
pub mod registry;
pub mod simulated;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender, TryRecvError};
use thiserror::Error;

use crate::device::{DeviceConfig, DeviceInfo};
use crate::dsp::SampleBatch;

pub use file::FileFrontend;
pub use registry::{DeviceFinder, FactoryResult, FrontendFactory, FrontendRegistry};
pub use simulated::SimulatedFrontend;

/// Invoked by a frontend, on its own thread, with every captured batch
pub type SamplesCallback = Arc<dyn Fn(SampleBatch) + Send + Sync>;

#[derive(Error, Debug)]
pub enum FrontendError {
    #[error("device unavailable: {0}")]
    Unavailable(String),

    #[error("device initialization failed: {0}")]
    Init(String),

    #[error("invalid device configuration: {0}")]
    InvalidConfig(String),

    #[error("device io: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability interface of a receiver device.
///
/// Methods take `&self`: a frontend is shared between the session that owns
/// it and the task that eventually tears it down. `stop` and `destroy` must
/// be harmless when repeated or called concurrently.
pub trait Frontend: Send + Sync {
    fn init(&self) -> Result<(), FrontendError>;

    fn start(&self) -> Result<(), FrontendError>;

    fn stop(&self);

    /// Release the device. The frontend is not used afterwards.
    fn destroy(&self);

    fn device_info(&self) -> DeviceInfo;

    fn device_config(&self) -> DeviceConfig;

    /// Apply a configuration and return what the device actually uses.
    fn set_device_config(&self, config: DeviceConfig) -> Result<DeviceConfig, FrontendError>;

    fn set_samples_available_callback(&self, callback: SamplesCallback);
}

/// Background thread that produces blocks at a fixed pace until stopped.
///
/// Stopping drops the sender of a never-used channel; the thread sees the
/// disconnect from its paced `recv_deadline` and exits.
pub(crate) struct Producer {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Producer {
    /// `step` emits one block and returns how long that block lasts, or
    /// `None` when there is nothing left to produce.
    pub(crate) fn spawn<F>(name: &str, mut step: F) -> std::io::Result<Self>
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut deadline = Instant::now();
                loop {
                    if matches!(stop_rx.try_recv(), Err(TryRecvError::Disconnected)) {
                        break;
                    }
                    let Some(period) = step() else { break };
                    deadline += period;

                    match stop_rx.recv_deadline(deadline) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    // Fell behind by more than a block; don't try to catch up
                    let now = Instant::now();
                    if now > deadline + period {
                        deadline = now;
                    }
                }
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to exit.
    pub(crate) fn stop(mut self) {
        self.signal();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn signal(&mut self) {
        self.stop_tx.take();
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.signal();
    }
}
