//! Producer/consumer stage between a frontend and a session.
//!
//! The frontend pushes batches from its own thread. A dedicated processing
//! thread drains the input queue and forwards each batch to the sink while
//! output is enabled, discarding it otherwise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{SampleBatch, SampleQueue, SampleSink, DEFAULT_QUEUE_CAPACITY};
use crate::Result;

/// Liveness timeout of the processing loop wait
pub const DEFAULT_WAKE_INTERVAL: Duration = Duration::from_secs(1);

struct Settings {
    output_enabled: bool,
    sink: Option<SampleSink>,
}

struct Inner {
    input: SampleQueue,
    running: AtomicBool,
    /// Held for a whole drain pass
    settings: Mutex<Settings>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    wake_interval: Duration,
}

impl Inner {
    fn run(&self) {
        while self.running.load(Ordering::Acquire) {
            select! {
                recv(self.input.receiver()) -> batch => {
                    if let Ok(batch) = batch {
                        self.drain(batch);
                    }
                }
                recv(self.stop_rx) -> _ => {}
                // Timeout only forces a re-check of `running`
                default(self.wake_interval) => {}
            }
        }

        let discarded = self.input.clear();
        debug!(discarded, "Channel generator loop exited");
    }

    /// Forward `first` and whatever was already queued behind it.
    ///
    /// The pass is bounded by the queue length at entry so a busy producer
    /// cannot keep the settings lock forever.
    fn drain(&self, first: SampleBatch) {
        let settings = self.settings.lock();
        let pending = self.input.len();
        let batches = std::iter::once(first).chain(self.input.receiver().try_iter().take(pending));

        for batch in batches {
            if !settings.output_enabled || !self.running.load(Ordering::Acquire) {
                continue;
            }
            if let Some(sink) = &settings.sink {
                sink(batch);
            }
        }
    }
}

/// Bounded, never-blocking hand-off from a frontend callback to a sink.
pub struct ChannelGenerator {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelGenerator {
    #[must_use]
    pub fn new(capacity: usize, wake_interval: Duration) -> Self {
        let (stop_tx, stop_rx) = channel::bounded(1);
        Self {
            inner: Arc::new(Inner {
                input: SampleQueue::new(capacity, "generator"),
                running: AtomicBool::new(false),
                settings: Mutex::new(Settings {
                    output_enabled: false,
                    sink: None,
                }),
                stop_tx,
                stop_rx,
                wake_interval,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the processing loop. No-op if already running.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if self.inner.running.load(Ordering::Acquire) {
            return Ok(());
        }

        // A previous loop has been told to stop; wait for it so there is
        // never more than one consumer.
        if let Some(previous) = worker.take() {
            let _ = previous.join();
        }
        // Nothing queued before this start may be forwarded by it
        while self.inner.stop_rx.try_recv().is_ok() {}
        self.inner.input.clear();

        info!("Starting channel generator");
        self.inner.running.store(true, Ordering::Release);
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("channel-generator".to_string())
            .spawn(move || inner.run())
            .inspect_err(|_| self.inner.running.store(false, Ordering::Release))?;
        *worker = Some(handle);
        Ok(())
    }

    /// Signal the loop to exit and wake it. Does not wait for the thread.
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::AcqRel) {
            info!("Stopping channel generator");
            let _ = self.inner.stop_tx.try_send(());
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn enable_output(&self) {
        self.inner.settings.lock().output_enabled = true;
        info!("Enabling IQ output");
    }

    pub fn disable_output(&self) {
        self.inner.settings.lock().output_enabled = false;
        info!("Disabling IQ output");
    }

    /// Enable output unless it already is. Returns whether this call enabled it.
    ///
    /// `prepare` runs under the settings lock right before output is turned
    /// on, so no batch is forwarded while it runs.
    pub fn try_enable_output_with(&self, prepare: impl FnOnce()) -> bool {
        let mut settings = self.inner.settings.lock();
        if settings.output_enabled {
            return false;
        }
        prepare();
        settings.output_enabled = true;
        drop(settings);
        info!("Enabling IQ output");
        true
    }

    #[must_use]
    pub fn output_enabled(&self) -> bool {
        self.inner.settings.lock().output_enabled
    }

    pub fn set_sink(&self, sink: SampleSink) {
        self.inner.settings.lock().sink = Some(sink);
    }

    /// Called from the frontend's thread. Never blocks; drops the batch if
    /// the generator is stopped or its queue is full.
    pub fn push_samples(&self, batch: SampleBatch) {
        if !self.inner.running.load(Ordering::Acquire) {
            return;
        }
        if self.inner.input.push(batch) && !self.inner.running.load(Ordering::Acquire) {
            // Stopped between the check and the push; the loop may already
            // have done its final clear.
            self.inner.input.clear();
        }
    }

    /// Batches rejected by the input queue
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.input.dropped()
    }
}

impl Default for ChannelGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_WAKE_INTERVAL)
    }
}

impl Drop for ChannelGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}
