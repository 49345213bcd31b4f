//! Sample batch message.
//!
//! Declared by hand rather than generated so that `samples` is a
//! [`bytes::Bytes`]: the server hands its pooled buffer to the transport
//! without copying and reclaims the allocation once the frame is written.

use bytes::Bytes;

/// Bytes used by one complex sample on the wire (two little-endian `f32`).
pub const BYTES_PER_SAMPLE: usize = 8;

/// One batch of I/Q samples (`radioserver.IqData`).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IqData {
    #[prost(uint64, tag = "1")]
    pub timestamp_ns: u64,
    #[prost(uint32, tag = "2")]
    pub num_samples: u32,
    /// Interleaved little-endian f32 I/Q pairs.
    #[prost(bytes = "bytes", tag = "3")]
    pub samples: Bytes,
    #[prost(uint64, tag = "4")]
    pub dropped_batches: u64,
}
