use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, warn};

use super::SampleBatch;
use crate::metrics::BATCHES_DROPPED;

/// Drops between two overflow warnings
const OVERFLOW_LOG_EVERY: u64 = 1024;

/// Fixed-capacity FIFO of sample batches.
///
/// A push onto a full queue is rejected and the batch is dropped; the caller
/// is never blocked. Accepted batches keep their arrival order.
pub struct SampleQueue {
    tx: Sender<SampleBatch>,
    rx: Receiver<SampleBatch>,
    dropped: AtomicU64,
    stage: &'static str,
}

impl SampleQueue {
    /// `stage` labels the overflow metric and log lines.
    #[must_use]
    pub fn new(capacity: usize, stage: &'static str) -> Self {
        // A zero-capacity channel is a rendezvous and would reject every try_send
        let (tx, rx) = channel::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: AtomicU64::new(0),
            stage,
        }
    }

    /// Enqueue a batch. Returns `false` if the queue was full and the batch was dropped.
    pub fn push(&self, batch: SampleBatch) -> bool {
        // Both ends live in `self`, so the only failure is a full channel
        if self.tx.try_send(batch).is_ok() {
            return true;
        }
        self.record_drop();
        false
    }

    fn record_drop(&self) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        BATCHES_DROPPED.with_label_values(&[self.stage]).inc();
        if dropped == 1 || dropped % OVERFLOW_LOG_EVERY == 0 {
            warn!(stage = self.stage, dropped, "Sample queue overflowing");
        } else {
            debug!(stage = self.stage, dropped, "Sample queue overflowing");
        }
    }

    pub fn pop(&self) -> Option<SampleBatch> {
        self.rx.try_recv().ok()
    }

    /// Receiving end, for waiting on the queue alongside other channels
    pub(crate) fn receiver(&self) -> &Receiver<SampleBatch> {
        &self.rx
    }

    /// Discard every queued batch, returning how many were removed.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Total batches rejected since creation
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SampleQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleQueue")
            .field("stage", &self.stage)
            .field("len", &self.len())
            .field("capacity", &self.rx.capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}
