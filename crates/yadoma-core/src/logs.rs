//! Log-stream orchestration.
//!
//! Containers attached to a TTY produce a single raw stream; all others
//! produce the framed stdout/stderr format. The caller decides which one it
//! has from container metadata before opening the stream, then hands the
//! opened source to [`relay_logs`].

use std::future::Future;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::demux::{self, DemuxEnd};
use crate::error::RelayError;
use crate::relay::{RelaySummary, relay_bytes_with};

/// Shape of a container's log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// One logical channel, forwarded verbatim.
    Raw,
    /// Framed stdout/stderr that must be demultiplexed first.
    Multiplexed,
}

impl StreamKind {
    /// TTY containers write a single raw stream.
    pub const fn for_tty(tty: bool) -> Self {
        if tty { Self::Raw } else { Self::Multiplexed }
    }
}

/// Relay a container log stream to `send`.
///
/// Takes ownership of `source`; it is dropped exactly once, after the relay
/// loop has finished and, for multiplexed streams, after the demultiplexer
/// task has exited. A demultiplexer task that fails to join is logged and
/// does not change the returned outcome.
pub async fn relay_logs<R, F, Fut, E>(
    source: R,
    kind: StreamKind,
    chunk_size: usize,
    send: F,
) -> Result<RelaySummary, RelayError<E>>
where
    R: AsyncRead + Send + Unpin + 'static,
    F: FnMut(Bytes) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    match kind {
        StreamKind::Raw => {
            let mut source = source;
            relay_bytes_with(&mut source, chunk_size, send).await
        }
        StreamKind::Multiplexed => {
            let (mut reader, task) = demux::spawn(source);
            let outcome = relay_bytes_with(&mut reader, chunk_size, send).await;
            // Unblocks a demultiplexer waiting on the pipe or the source.
            drop(reader);

            match task.await {
                Ok(summary) if summary.end == DemuxEnd::Failed => {
                    debug!(frames = summary.frames, "Demultiplexer stopped on source error");
                }
                Ok(summary) => {
                    debug!(frames = summary.frames, bytes = summary.bytes, end = ?summary.end, "Demultiplexer joined");
                }
                Err(e) => warn!(error = %e, "Demultiplexer task did not complete"),
            }
            outcome
        }
    }
}
