//! Sample batch wire encoding.
//!
//! Batches travel as interleaved little-endian `f32` I/Q pairs. Encoding
//! goes through [`SampleBufferPool`], which keeps one allocation alive across
//! messages of the same size.

use bytes::{BufMut, Bytes, BytesMut};
use num_complex::Complex32;
use radioserver_core::dsp::SampleBatch;
use radioserver_proto::iq::BYTES_PER_SAMPLE;

/// Reusable payload buffer for one streaming call.
///
/// The buffer is sized to the last batch. While batches keep the same size
/// the allocation handed to the transport is reclaimed once the transport
/// drops the frame; a size change replaces it.
#[derive(Debug, Default)]
pub struct SampleBufferPool {
    buf: BytesMut,
    last_len: usize,
    reallocations: u64,
}

impl SampleBufferPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `batch` into a frozen payload.
    pub fn encode(&mut self, batch: &[Complex32]) -> Bytes {
        let len = batch.len() * BYTES_PER_SAMPLE;
        if len == self.last_len {
            // Reclaims the previous allocation if its frame has been released
            self.buf.reserve(len);
        } else {
            self.buf = BytesMut::with_capacity(len);
            self.last_len = len;
            self.reallocations += 1;
        }

        for sample in batch {
            self.buf.put_f32_le(sample.re);
            self.buf.put_f32_le(sample.im);
        }
        self.buf.split().freeze()
    }

    /// Times the buffer was replaced because the batch size changed
    #[must_use]
    pub const fn reallocations(&self) -> u64 {
        self.reallocations
    }
}

/// Decode an `IqData.samples` payload. A trailing partial sample is ignored.
#[must_use]
pub fn decode_samples(payload: &[u8]) -> SampleBatch {
    payload
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|c| {
            Complex32::new(
                f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(len: usize) -> SampleBatch {
        (0..len)
            .map(|i| Complex32::new(i as f32 * 0.5, -(i as f32)))
            .collect()
    }

    #[test]
    fn test_encode_layout() {
        let mut pool = SampleBufferPool::new();
        let payload = pool.encode(&[Complex32::new(1.0, -2.0)]);

        let mut expected = Vec::new();
        expected.extend_from_slice(&1.0f32.to_le_bytes());
        expected.extend_from_slice(&(-2.0f32).to_le_bytes());
        assert_eq!(payload.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_decode_preserves_values_and_order() {
        let mut pool = SampleBufferPool::new();
        let original = batch(1000);
        assert_eq!(decode_samples(&pool.encode(&original)), original);
    }

    #[test]
    fn test_reallocates_only_on_size_change() {
        let mut pool = SampleBufferPool::new();

        for _ in 0..5 {
            let payload = pool.encode(&batch(64));
            assert_eq!(payload.len(), 64 * BYTES_PER_SAMPLE);
        }
        assert_eq!(pool.reallocations(), 1);

        pool.encode(&batch(32));
        pool.encode(&batch(32));
        assert_eq!(pool.reallocations(), 2);

        // Frames still held elsewhere are never overwritten
        let held = pool.encode(&batch(32));
        let next = pool.encode(&[Complex32::new(9.0, 9.0); 32]);
        assert_eq!(decode_samples(&held), batch(32));
        assert_eq!(decode_samples(&next)[0], Complex32::new(9.0, 9.0));
    }

    #[test]
    fn test_decode_ignores_partial_sample() {
        let mut payload = 1.0f32.to_le_bytes().to_vec();
        payload.extend_from_slice(&2.0f32.to_le_bytes());
        payload.extend_from_slice(&[0, 1, 2]);

        assert_eq!(decode_samples(&payload), vec![Complex32::new(1.0, 2.0)]);
    }
}
