//! Streaming delivery loop.
//!
//! One task per `StreamSamples` call drains the session's output queue into
//! the response channel, polling while the queue is empty.

use std::sync::Arc;
use std::time::Duration;

use radioserver_core::metrics::{BATCHES_SENT, SAMPLES_SENT, STREAMS_ACTIVE};
use radioserver_core::session::{Session, SessionRegistry};
use radioserver_proto::IqData;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::{debug, info, warn};

use super::codec::SampleBufferPool;

pub type StreamSender = mpsc::Sender<Result<IqData, Status>>;

/// Settings shared by every delivery loop of a server
#[derive(Clone)]
pub struct DeliveryContext {
    pub registry: Arc<SessionRegistry>,
    pub poll_interval: Duration,
    /// Fully release the session when the client goes away
    pub release_on_disconnect: bool,
    pub shutdown: CancellationToken,
}

/// Why a delivery loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The client went away or a send failed
    Disconnected,
    /// The session was stopped underneath the stream
    Expired,
    /// The server is shutting down
    Shutdown,
}

/// Spawn the delivery loop for a session whose output is already claimed.
pub fn spawn_delivery(
    session: Arc<Session>,
    tx: StreamSender,
    ctx: DeliveryContext,
) -> JoinHandle<Termination> {
    tokio::spawn(async move {
        STREAMS_ACTIVE.inc();
        let termination = deliver(&session, &tx, &ctx).await;
        STREAMS_ACTIVE.dec();
        finish(&session, &tx, &ctx, termination).await;
        termination
    })
}

async fn deliver(session: &Session, tx: &StreamSender, ctx: &DeliveryContext) -> Termination {
    let mut pool = SampleBufferPool::new();

    loop {
        if session.is_full_stopped() {
            return Termination::Expired;
        }
        if ctx.shutdown.is_cancelled() {
            return Termination::Shutdown;
        }

        while let Some(batch) = session.next_batch() {
            let message = IqData {
                timestamp_ns: timestamp_ns(),
                num_samples: batch.len() as u32,
                samples: pool.encode(&batch),
                dropped_batches: session.dropped_batches(),
            };

            if tx.send(Ok(message)).await.is_err() {
                return Termination::Disconnected;
            }
            session.keep_alive();
            BATCHES_SENT.inc();
            SAMPLES_SENT.inc_by(batch.len() as u64);

            if session.is_full_stopped() {
                return Termination::Expired;
            }
        }

        tokio::select! {
            () = tokio::time::sleep(ctx.poll_interval) => {}
            () = tx.closed() => return Termination::Disconnected,
            () = ctx.shutdown.cancelled() => return Termination::Shutdown,
        }
    }
}

async fn finish(session: &Arc<Session>, tx: &StreamSender, ctx: &DeliveryContext, termination: Termination) {
    let session_id = session.id();
    match termination {
        Termination::Expired => {
            warn!(session_id = %session_id, "Session expired while streaming");
            let _ = tx
                .send(Err(Status::aborted(format!("session expired: {session_id}"))))
                .await;
            release(session, ctx).await;
        }
        Termination::Disconnected if ctx.release_on_disconnect => {
            info!(session_id = %session_id, "Stream client disconnected, releasing session");
            release(session, ctx).await;
        }
        Termination::Disconnected => {
            info!(session_id = %session_id, "Stream client disconnected");
            session.stop_streaming();
        }
        Termination::Shutdown => {
            debug!(session_id = %session_id, "Stream ended by server shutdown");
            session.stop_streaming();
            let _ = tx
                .send(Err(Status::unavailable("server shutting down")))
                .await;
        }
    }
}

/// Remove the session if still registered and make sure it is stopped.
async fn release(session: &Arc<Session>, ctx: &DeliveryContext) {
    ctx.registry.remove(session.id());
    if let Err(e) = ctx.registry.teardown(Arc::clone(session)).await {
        warn!(session_id = %session.id(), "Session teardown failed: {e}");
    }
}

fn timestamp_ns() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .map_or(0, |ns| ns.max(0) as u64)
}
