//! In-memory pipe between the demultiplexer task and the byte relay.
//!
//! The channel holds a single chunk, so a producer that gets ahead of the
//! consumer waits in [`PipeWriter::write`] until the previous chunk has been
//! taken. A slow sink therefore throttles the demultiplexer, which in turn
//! stops reading from the engine.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::io::ChunkReader;

const PIPE_DEPTH: usize = 1;

/// Create a connected writer/reader pair.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(PIPE_DEPTH);
    (
        PipeWriter { tx },
        PipeReader {
            inner: ChunkReader::new(ReceiverStream::new(rx)),
        },
    )
}

/// Producer half. Dropping it is a clean end-of-stream for the reader.
#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl PipeWriter {
    /// Hand `chunk` to the reader, waiting while the previous chunk is
    /// still unread. Fails with `BrokenPipe` once the reader is gone.
    pub async fn write(&self, chunk: Bytes) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))
    }

    /// Close the pipe so the reader's next read after the buffered data
    /// fails with `err`. A no-op if the reader is already gone.
    pub async fn close_with_error(self, err: io::Error) {
        let _ = self.tx.send(Err(err)).await;
    }

    /// Resolves when the reader is dropped.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// Consumer half, readable as a sequential byte source.
#[derive(Debug)]
pub struct PipeReader {
    inner: ChunkReader<ReceiverStream<io::Result<Bytes>>>,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
