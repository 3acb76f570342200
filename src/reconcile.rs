//! Turns overlapping log-window snapshots into non-overlapping byte deltas.
//!
//! supervisord's tail call returns a bounded window of bytes that always ends
//! at the log's current position, together with that position. Consecutive
//! windows overlap; the reconciler tracks the last seen offset and cuts each
//! window down to the bytes written since the previous poll. The first poll is
//! special: it is trimmed to the last `seed_lines` lines so a fresh tail
//! behaves like `tail -n K`, not like dumping the whole window.

use crate::error::{Error, Result};

/// One reply from the tail call: the window bytes and the absolute offset the
/// window ends at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Snapshot {
    pub bytes: Vec<u8>,
    pub end_offset: i64,
}

/// Per-session reconciliation state. Owned by exactly one pump task.
#[derive(Debug)]
pub(crate) struct Reconciler {
    /// `None` until the first snapshot; distinct from a log genuinely at
    /// offset 0.
    last_offset: Option<i64>,
    seed_lines: usize,
}

impl Reconciler {
    pub(crate) fn new(seed_lines: usize) -> Self {
        Self {
            last_offset: None,
            seed_lines,
        }
    }

    /// The offset to request the next window from. The wire has no
    /// "uninitialized" encoding, so the first request asks from 0.
    pub(crate) fn offset(&self) -> i64 {
        self.last_offset.unwrap_or(0)
    }

    /// Folds a snapshot into the state and returns the bytes judged new.
    ///
    /// An empty delta is normal: nothing was appended, or the remote log
    /// shrank (rotation/truncation), which is deliberately not an error. The
    /// offset resynchronizes to `end_offset` in every case.
    pub(crate) fn reconcile(&mut self, snapshot: Snapshot) -> Result<Vec<u8>> {
        let Some(last_offset) = self.last_offset else {
            self.last_offset = Some(snapshot.end_offset);
            return Ok(trim_to_last_lines(snapshot.bytes, self.seed_lines));
        };

        let advance = snapshot.end_offset - last_offset;
        self.last_offset = Some(snapshot.end_offset);

        if advance <= 0 {
            // No new data, or the file shrank; keep polling.
            return Ok(Vec::new());
        }
        if snapshot.bytes.is_empty() {
            return Err(Error::Protocol(format!(
                "log advanced by {advance} bytes but the window is empty"
            )));
        }

        let advance = advance as usize;
        let mut bytes = snapshot.bytes;
        if advance < bytes.len() {
            // The window is a fixed-size suffix ending at end_offset, so all
            // but the last `advance` bytes were already seen.
            bytes.drain(..bytes.len() - advance);
        }
        // advance >= window: the writer outran the window and bytes were
        // skipped; the whole window is new. Lossy, but the best a bounded
        // snapshot can do.
        Ok(bytes)
    }
}

/// Keeps the last `keep` newline-terminated lines of `bytes`, plus any
/// trailing partial line. Content with `keep` or fewer lines is untouched.
pub(crate) fn trim_to_last_lines(bytes: Vec<u8>, keep: usize) -> Vec<u8> {
    let newlines = bytecount(&bytes, b'\n');
    if newlines <= keep {
        return bytes;
    }

    let skip = newlines - keep;
    let mut seen = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'\n' {
            seen += 1;
            if seen == skip {
                return bytes[i + 1..].to_vec();
            }
        }
    }
    bytes
}

fn bytecount(bytes: &[u8], needle: u8) -> usize {
    bytes.iter().filter(|b| **b == needle).count()
}
