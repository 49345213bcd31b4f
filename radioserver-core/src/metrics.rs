//! Prometheus metrics for the sample pipeline
//!
//! All metrics live in a crate-local registry and are rendered by [`gather`]
//! for the `/metrics` endpoint.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};
use std::sync::LazyLock;

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Batches rejected by a full queue, labeled by pipeline stage
pub static BATCHES_DROPPED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        "radioserver_batches_dropped_total",
        "Sample batches dropped because a queue was full",
        &["stage"],
        REGISTRY.clone()
    )
    .expect("Failed to register BATCHES_DROPPED")
});

/// Batches handed to the transport
pub static BATCHES_SENT: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter_with_registry!(
        "radioserver_batches_sent_total",
        "Sample batches sent to streaming clients",
        REGISTRY.clone()
    )
    .expect("Failed to register BATCHES_SENT")
});

/// Complex samples handed to the transport
pub static SAMPLES_SENT: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter_with_registry!(
        "radioserver_samples_sent_total",
        "Complex samples sent to streaming clients",
        REGISTRY.clone()
    )
    .expect("Failed to register SAMPLES_SENT")
});

pub static SESSIONS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "radioserver_sessions_active",
        "Sessions currently held in the registry",
        REGISTRY.clone()
    )
    .expect("Failed to register SESSIONS_ACTIVE")
});

pub static STREAMS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "radioserver_streams_active",
        "Streaming calls currently delivering samples",
        REGISTRY.clone()
    )
    .expect("Failed to register STREAMS_ACTIVE")
});

pub static SESSIONS_EXPIRED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter_with_registry!(
        "radioserver_sessions_expired_total",
        "Sessions removed by the idle sweep",
        REGISTRY.clone()
    )
    .expect("Failed to register SESSIONS_EXPIRED")
});

/// Render all metrics in the Prometheus text exposition format
#[must_use]
pub fn gather() -> String {
    // Touch the lazies so every series is present even before first use
    LazyLock::force(&BATCHES_DROPPED);
    LazyLock::force(&BATCHES_SENT);
    LazyLock::force(&SAMPLES_SENT);
    LazyLock::force(&SESSIONS_ACTIVE);
    LazyLock::force(&STREAMS_ACTIVE);
    LazyLock::force(&SESSIONS_EXPIRED);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
