use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::device::{DeviceConfig, DeviceInfo, DeviceState};
use crate::dsp::{ChannelGenerator, SampleBatch, SampleQueue};
use crate::frontend::{Frontend, FrontendRegistry};
use crate::{Error, Result};

/// One client's handle on one provisioned device and its sample pipeline.
///
/// Frontend callback → channel generator → output queue. The output queue
/// is drained by at most one streaming call at a time. Once fully stopped a
/// session never delivers again.
pub struct Session {
    id: String,
    frontend: Arc<dyn Frontend>,
    generator: Arc<ChannelGenerator>,
    output: Arc<SampleQueue>,
    last_activity: Mutex<Instant>,
    idle_timeout: Duration,
    full_stopped: Arc<AtomicBool>,
}

impl Session {
    /// Acquire a frontend for `request` and start its pipeline.
    ///
    /// Blocking: frontend construction and start may touch hardware.
    pub fn provision(
        frontends: &FrontendRegistry,
        request: &DeviceState,
        config: &SessionConfig,
    ) -> Result<Self> {
        let frontend = frontends.create(request)?;
        let generator = Arc::new(ChannelGenerator::new(
            config.queue_capacity,
            config.generator_wake_interval(),
        ));
        let output = Arc::new(SampleQueue::new(config.queue_capacity, "session"));
        let full_stopped = Arc::new(AtomicBool::new(false));

        {
            let output = Arc::clone(&output);
            let full_stopped = Arc::clone(&full_stopped);
            generator.set_sink(Arc::new(move |batch| {
                if !full_stopped.load(Ordering::Acquire) {
                    output.push(batch);
                }
            }));
        }
        {
            let generator = Arc::clone(&generator);
            frontend.set_samples_available_callback(Arc::new(move |batch| {
                generator.push_samples(batch);
            }));
        }

        let session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            frontend,
            generator,
            output,
            last_activity: Mutex::new(Instant::now()),
            idle_timeout: config.idle_timeout(),
            full_stopped,
        };

        let started = session
            .generator
            .start()
            .and_then(|()| session.frontend.start().map_err(Error::from));
        if let Err(e) = started {
            warn!(session_id = %session.id, "Failed to start session pipeline: {e}");
            session.full_stop();
            return Err(e);
        }

        info!(
            session_id = %session.id,
            kind = %request.info.kind,
            serial = %request.info.serial,
            "Session provisioned"
        );
        Ok(session)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn keep_alive(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// True once more than the idle timeout has passed since the last activity
    #[must_use]
    pub fn expired(&self) -> bool {
        self.expired_at(Instant::now())
    }

    #[must_use]
    pub fn expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_activity()) > self.idle_timeout
    }

    #[must_use]
    pub fn is_full_stopped(&self) -> bool {
        self.full_stopped.load(Ordering::Acquire)
    }

    /// Stop the frontend and the generator and release the device.
    ///
    /// Terminal. Concurrent and repeated calls are no-ops after the first;
    /// returns whether this call did the teardown.
    pub fn full_stop(&self) -> bool {
        if self.full_stopped.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.frontend.stop();
        self.generator.disable_output();
        self.generator.stop();
        self.frontend.destroy();
        let discarded = self.output.clear();

        info!(session_id = %self.id, discarded, "Session fully stopped");
        true
    }

    /// Claim the output for a streaming call.
    ///
    /// Fails if the session is stopped or another call is already streaming.
    /// Batches left over from an earlier stream are discarded.
    pub fn start_streaming(&self) -> Result<()> {
        if self.is_full_stopped() {
            return Err(Error::SessionExpired(self.id.clone()));
        }
        // Cleared under the generator's settings lock so nothing forwarded
        // for this stream can be discarded with the stale batches
        let claimed = self.generator.try_enable_output_with(|| {
            self.output.clear();
        });
        if !claimed {
            return Err(Error::AlreadyStreaming(self.id.clone()));
        }
        self.keep_alive();
        Ok(())
    }

    pub fn stop_streaming(&self) {
        self.generator.disable_output();
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.generator.output_enabled()
    }

    /// Next batch waiting for delivery, if any
    #[must_use]
    pub fn next_batch(&self) -> Option<SampleBatch> {
        self.output.pop()
    }

    /// Forward a configuration to the frontend. Blocking.
    pub fn tune(&self, config: DeviceConfig) -> Result<DeviceConfig> {
        if self.is_full_stopped() {
            return Err(Error::SessionExpired(self.id.clone()));
        }
        let applied = self.frontend.set_device_config(config)?;
        self.keep_alive();
        Ok(applied)
    }

    #[must_use]
    pub fn device_info(&self) -> DeviceInfo {
        self.frontend.device_info()
    }

    #[must_use]
    pub fn device_config(&self) -> DeviceConfig {
        self.frontend.device_config()
    }

    /// Batches lost to overflow in either pipeline stage
    #[must_use]
    pub fn dropped_batches(&self) -> u64 {
        self.generator.dropped() + self.output.dropped()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("streaming", &self.is_streaming())
            .field("full_stopped", &self.is_full_stopped())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{scripted_registry, scripted_request, tagged_batch, test_session_config};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant as StdInstant;

    fn wait_for_batch(session: &Session) -> Option<SampleBatch> {
        let deadline = StdInstant::now() + Duration::from_secs(5);
        while StdInstant::now() < deadline {
            if let Some(batch) = session.next_batch() {
                return Some(batch);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_boundary() {
        let (frontends, _) = scripted_registry();
        let session =
            Session::provision(&frontends, &scripted_request(), &test_session_config()).unwrap();
        let start = session.last_activity();
        let timeout = Duration::from_secs(120);

        assert!(!session.expired_at(start + timeout - Duration::from_millis(1)));
        assert!(!session.expired_at(start + timeout));
        assert!(session.expired_at(start + timeout + Duration::from_millis(1)));

        tokio::time::advance(timeout - Duration::from_millis(1)).await;
        assert!(!session.expired());
        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(session.expired());

        session.keep_alive();
        assert!(!session.expired());
        session.full_stop();
    }

    #[test]
    fn test_unknown_device_fails_provision() {
        let (frontends, created) = scripted_registry();
        let mut request = scripted_request();
        request.info.kind = "LimeSDRMini".to_string();

        let err = Session::provision(&frontends, &request, &test_session_config()).unwrap_err();
        assert!(matches!(err, Error::UnknownDevice(_)));
        assert!(created.lock().is_empty());
    }

    #[test]
    fn test_pipeline_delivers_only_while_streaming() {
        let (frontends, created) = scripted_registry();
        let session =
            Session::provision(&frontends, &scripted_request(), &test_session_config()).unwrap();
        let frontend = Arc::clone(&created.lock()[0]);
        assert_eq!(frontend.starts.load(Ordering::SeqCst), 1);

        // Not streaming yet: discarded by the generator
        frontend.emit(tagged_batch(0, 8));
        std::thread::sleep(Duration::from_millis(50));
        assert!(session.next_batch().is_none());

        session.start_streaming().unwrap();
        assert!(matches!(session.start_streaming(), Err(Error::AlreadyStreaming(_))));

        for tag in 1..=3 {
            frontend.emit(tagged_batch(tag, 8));
        }
        for tag in 1..=3 {
            let batch = wait_for_batch(&session).unwrap();
            assert_eq!(batch, tagged_batch(tag, 8));
        }

        session.stop_streaming();
        assert!(!session.is_streaming());
        session.start_streaming().unwrap();
        session.full_stop();
    }

    #[test]
    fn test_stream_start_keeps_every_batch_of_running_producer() {
        let (frontends, created) = scripted_registry();
        let session =
            Session::provision(&frontends, &scripted_request(), &test_session_config()).unwrap();
        let frontend = Arc::clone(&created.lock()[0]);

        // Stays below the queue capacity so nothing can overflow
        let limit = 3000;
        let emitted = Arc::new(AtomicUsize::new(0));
        let halt = Arc::new(AtomicBool::new(false));
        let producer = {
            let frontend = Arc::clone(&frontend);
            let emitted = Arc::clone(&emitted);
            let halt = Arc::clone(&halt);
            std::thread::spawn(move || {
                for tag in 0..limit {
                    if halt.load(Ordering::SeqCst) {
                        break;
                    }
                    frontend.emit(tagged_batch(tag, 2));
                    emitted.store(tag + 1, Ordering::SeqCst);
                    if tag % 16 == 0 {
                        std::thread::sleep(Duration::from_micros(200));
                    }
                }
            })
        };

        while emitted.load(Ordering::SeqCst) < 100 {
            std::thread::yield_now();
        }
        session.start_streaming().unwrap();
        std::thread::sleep(Duration::from_millis(10));
        halt.store(true, Ordering::SeqCst);
        producer.join().unwrap();
        let last = emitted.load(Ordering::SeqCst) - 1;

        let mut tags = Vec::new();
        while tags.last() != Some(&last) {
            let batch = wait_for_batch(&session).unwrap();
            tags.push(batch[0].re as usize);
        }

        assert!(tags.windows(2).all(|w| w[1] == w[0] + 1), "gap in {tags:?}");
        assert_eq!(session.dropped_batches(), 0);
        session.full_stop();
    }

    #[test]
    fn test_full_stop_is_terminal_and_idempotent() {
        let (frontends, created) = scripted_registry();
        let session =
            Session::provision(&frontends, &scripted_request(), &test_session_config()).unwrap();
        let frontend = Arc::clone(&created.lock()[0]);
        session.start_streaming().unwrap();

        assert!(session.full_stop());
        assert!(!session.full_stop());
        assert_eq!(frontend.stop_count(), 1);
        assert_eq!(frontend.destroys.load(Ordering::SeqCst), 1);

        frontend.emit(tagged_batch(1, 4));
        std::thread::sleep(Duration::from_millis(50));
        assert!(session.next_batch().is_none());
        assert!(matches!(session.start_streaming(), Err(Error::SessionExpired(_))));
        assert!(matches!(
            session.tune(DeviceConfig::default()),
            Err(Error::SessionExpired(_))
        ));
    }

    #[test]
    fn test_tune_forwards_to_frontend() {
        let (frontends, _) = scripted_registry();
        let session =
            Session::provision(&frontends, &scripted_request(), &test_session_config()).unwrap();
        let config = DeviceConfig {
            sample_rate: 2e6,
            oversample: 2,
            rx_channels: vec![crate::device::ChannelConfig {
                center_frequency: 433.92e6,
                normalized_gain: 0.7,
                antenna: "LNAL".to_string(),
            }],
        };

        assert_eq!(session.tune(config.clone()).unwrap(), config);
        assert_eq!(session.device_config(), config);
        session.full_stop();
    }
}
