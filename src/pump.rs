//! The poll loop behind a tail session.
//!
//! One spawned task per session: tick, fetch a snapshot over RPC, reconcile,
//! push the delta into a capacity-1 handoff channel. The channel is the only
//! backpressure point; a consumer that stops reading blocks the pump at the
//! send, never more than one delta ahead. Terminal errors are delivered as the
//! channel's final message; cancellation just closes the channel.

use crate::error::{Error, Result};
use crate::reconcile::{Reconciler, Snapshot};
use crate::transport::Transport;
use crate::value::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Capacity of the delta handoff channel. One undelivered delta, no more.
pub(crate) const HANDOFF_CAPACITY: usize = 1;

pub(crate) struct PumpConfig {
    pub name: String,
    /// `supervisor.tailProcessStdoutLog` or `supervisor.tailProcessStderrLog`.
    pub method: &'static str,
    pub read_buf_size: usize,
    pub seed_lines: usize,
    pub poll_interval: Duration,
}

/// Runs until cancelled, the consumer goes away, or the session hits a
/// terminal error.
pub(crate) async fn run(
    transport: Arc<dyn Transport>,
    config: PumpConfig,
    tx: mpsc::Sender<Result<Vec<u8>>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut reconciler = Reconciler::new(config.seed_lines);
    let mut ticker = tokio::time::interval(config.poll_interval);
    // A delivery stalled on a slow consumer must not queue up extra polls
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!(name = %config.name, "tail cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        let params = vec![
            Value::String(config.name.clone()),
            Value::Int(reconciler.offset()),
            Value::Int(config.read_buf_size as i64),
        ];
        let reply = match transport.invoke(config.method, params).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!(name = %config.name, error = %e, "tail poll failed");
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        let snapshot = match decode_tail_reply(&config.name, reply) {
            Ok(Some(snapshot)) => snapshot,
            // Chunk field absent for this tick; not worth killing the tail
            Ok(None) => continue,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        let delta = match reconciler.reconcile(snapshot) {
            Ok(delta) => delta,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        if delta.is_empty() {
            continue;
        }

        // The send blocks while the previous delta is undelivered; cancellation
        // must still be able to get through.
        tokio::select! {
            _ = shutdown.recv() => {
                debug!(name = %config.name, "tail cancelled during delivery");
                return;
            }
            sent = tx.send(Ok(delta)) => {
                if sent.is_err() {
                    // Consumer dropped the stream
                    return;
                }
            }
        }
    }
}

/// Decodes the `(chunk, end_offset[, overflowed])` tuple of a tail reply.
///
/// `Ok(None)` means the chunk was not a string (seen when a log file does not
/// exist yet); the pump skips that tick, matching how supervisorctl tolerates
/// it. A reply that is not the expected tuple at all is a protocol error.
fn decode_tail_reply(name: &str, reply: Value) -> Result<Option<Snapshot>> {
    let items = reply
        .as_array()
        .ok_or_else(|| Error::Protocol("tail reply is not an array".to_string()))?;

    let Some(chunk) = items.first().and_then(Value::as_str) else {
        debug!(name, "tail reply chunk is not a string; skipping tick");
        return Ok(None);
    };
    let end_offset = items
        .get(1)
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Protocol("tail reply has no integer offset".to_string()))?;

    if let Some(true) = items.get(2).and_then(Value::as_bool) {
        warn!(name, end_offset, "tail window overflowed; some log bytes were skipped");
    }

    Ok(Some(Snapshot {
        bytes: chunk.as_bytes().to_vec(),
        end_offset,
    }))
}
