//! Sample pipeline primitives.

pub mod channel_generator;
pub mod queue;

use std::sync::Arc;

use num_complex::Complex32;

pub use channel_generator::ChannelGenerator;
pub use queue::SampleQueue;

/// A contiguous group of complex samples produced together by a frontend.
///
/// Ownership moves with the batch; nothing aliases it after hand-off.
pub type SampleBatch = Vec<Complex32>;

/// Receiver of forwarded batches.
pub type SampleSink = Arc<dyn Fn(SampleBatch) + Send + Sync>;

/// Reference capacity (in batches) for both pipeline stages
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;
