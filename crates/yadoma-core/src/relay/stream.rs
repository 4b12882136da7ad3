//! Byte relay: forwards a source to a sink in fixed-size chunks.

use std::future::Future;
use std::io::ErrorKind;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::RelaySummary;
use crate::error::RelayError;

/// Reference chunk size: small enough to bound memory and keep interactive
/// latency low, large enough to amortise per-send overhead.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Relay `source` to `send` using [`DEFAULT_CHUNK_SIZE`].
pub async fn relay_bytes<R, F, Fut, E>(
    source: &mut R,
    send: F,
) -> Result<RelaySummary, RelayError<E>>
where
    R: AsyncRead + Unpin + ?Sized,
    F: FnMut(Bytes) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    relay_bytes_with(source, DEFAULT_CHUNK_SIZE, send).await
}

/// Relay `source` to `send`, reading at most `chunk_size` bytes per send.
///
/// Every non-empty read becomes exactly one `send` call, in source order.
/// Chunks are never merged, so a chunk is shorter than `chunk_size` whenever
/// the source hands out less. `send` is awaited before the next read, so at
/// most one send is in flight.
pub async fn relay_bytes_with<R, F, Fut, E>(
    source: &mut R,
    chunk_size: usize,
    mut send: F,
) -> Result<RelaySummary, RelayError<E>>
where
    R: AsyncRead + Unpin + ?Sized,
    F: FnMut(Bytes) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut summary = RelaySummary::default();

    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(chunks = summary.items, bytes = summary.bytes, error = %e, "Byte relay source failed");
                return Err(RelayError::Source(e));
            }
        };

        send(Bytes::copy_from_slice(&buf[..n]))
            .await
            .map_err(RelayError::Sink)?;
        summary.items += 1;
        summary.bytes += n as u64;
    }

    debug!(chunks = summary.items, bytes = summary.bytes, "Byte relay reached end of stream");
    Ok(summary)
}
