//! The caller-visible side of a tail session: line splitting and cancellation.

use crate::error::Result;
use crate::pump::{self, HANDOFF_CAPACITY, PumpConfig};
use crate::transport::Transport;
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// A stream of log lines tailed from a remote process.
///
/// Yields each appended line once its terminator arrives; a line split across
/// poll windows is held back until complete. The stream ends after yielding a
/// single `Err` on transport or protocol failure, or silently after
/// [`cancel`](Self::cancel) or drop.
pub struct TailStream {
    receiver: mpsc::Receiver<Result<Vec<u8>>>,
    shutdown_tx: broadcast::Sender<()>,
    /// Bytes of an incomplete trailing line, carried across deltas.
    partial: Vec<u8>,
    /// Complete lines not yet handed to the caller.
    ready: VecDeque<String>,
    finished: bool,
    _task_handle: JoinHandle<()>,
}

impl std::fmt::Debug for TailStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailStream")
            .field("partial", &self.partial)
            .field("ready", &self.ready)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl TailStream {
    /// Spawns the poll task and wires it to a new stream handle.
    pub(crate) fn spawn(transport: Arc<dyn Transport>, config: PumpConfig) -> Self {
        let (tx, rx) = mpsc::channel(HANDOFF_CAPACITY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task_handle = tokio::spawn(pump::run(transport, config, tx, shutdown_rx));

        TailStream {
            receiver: rx,
            shutdown_tx,
            partial: Vec::new(),
            ready: VecDeque::new(),
            finished: false,
            _task_handle: task_handle,
        }
    }

    /// Stops the session. Idempotent; calling it after the stream has already
    /// terminated is a no-op. Cancellation is not an error: the stream simply
    /// ends once the poll task has wound down.
    pub fn cancel(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Splits complete lines out of the accumulated bytes. Conversion to text
    /// is per line, so a UTF-8 sequence broken across deltas is rejoined
    /// before it is decoded.
    fn absorb(&mut self, delta: Vec<u8>) {
        self.partial.extend(delta);
        while let Some(newline) = self.partial.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=newline).collect();
            self.ready
                .push_back(String::from_utf8_lossy(&line).into_owned());
        }
    }

    /// Check if the stream's poll task side has been torn down
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl Drop for TailStream {
    fn drop(&mut self) {
        // Stop the poll loop; a blocked delivery is interrupted by this too
        self.cancel();
    }
}

impl Stream for TailStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(line) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.receiver).poll_recv(cx) {
                Poll::Ready(Some(Ok(delta))) => this.absorb(delta),
                Poll::Ready(Some(Err(e))) => {
                    // Terminal: one error entry, nothing after it
                    this.finished = true;
                    this.partial.clear();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    // Cooperative shutdown; flush an unterminated trailing line
                    this.finished = true;
                    if !this.partial.is_empty() {
                        let rest = String::from_utf8_lossy(&this.partial).into_owned();
                        this.partial.clear();
                        return Poll::Ready(Some(Ok(rest)));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
