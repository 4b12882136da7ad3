//! Byte-source adapters.
//!
//! Both the engine's HTTP bodies and the demultiplexer pipe arrive as a
//! stream of owned chunks. [`ChunkReader`] turns such a stream into an
//! ordered [`AsyncRead`] so that the relays only ever deal with one kind of
//! source.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_stream::Stream;

/// An owned, request-scoped byte source. Dropping it releases the
/// underlying connection.
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Sequential reader over a stream of byte chunks.
///
/// A chunk is handed out across as many reads as the caller's buffers
/// need. An `Err` item is returned from the read that reaches it; after
/// that, and after the stream ends, every read reports end-of-stream.
#[derive(Debug)]
pub struct ChunkReader<S> {
    stream: S,
    pending: Bytes,
    done: bool,
}

impl<S> ChunkReader<S> {
    pub const fn new(stream: S) -> Self {
        Self {
            stream,
            pending: Bytes::new(),
            done: false,
        }
    }
}

impl<S> AsyncRead for ChunkReader<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending[..n]);
                this.pending.advance(n);
                return Poll::Ready(Ok(()));
            }
            if this.done {
                return Poll::Ready(Ok(()));
            }
            match ready!(Pin::new(&mut this.stream).poll_next(cx)) {
                // Empty chunks are skipped so they never look like EOF.
                Some(Ok(chunk)) => this.pending = chunk,
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Err(e));
                }
                None => {
                    this.done = true;
                    return Poll::Ready(Ok(()));
                }
            }
        }
    }
}
