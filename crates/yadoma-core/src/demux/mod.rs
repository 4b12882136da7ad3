//! Frame demultiplexer.
//!
//! Flattens the engine's framed stdout/stderr stream into one ordered byte
//! stream. Frames from every channel are forwarded in arrival order and
//! their channel tag is dropped.
//!
//! The demultiplexer runs as its own task and hands payloads to the
//! consumer through a [`pipe`]. Protocol and read errors are delivered
//! through the pipe, so the consumer sees them as a failed read.

pub mod frame;
pub mod pipe;

use std::io;

use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

pub use frame::{Channel, FrameHeader, HEADER_LEN, encode_frame};
pub use pipe::{PipeReader, PipeWriter, pipe};

/// How a demultiplexer run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxEnd {
    /// The source ended on a frame boundary.
    Clean,
    /// The source failed; the error was passed to the reader.
    Failed,
    /// The reader went away before the source ended.
    ReaderGone,
}

/// What a demultiplexer run forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemuxSummary {
    pub frames: u64,
    pub bytes: u64,
    pub end: DemuxEnd,
}

enum Step {
    Frame(FrameHeader, bytes::Bytes),
    End,
}

async fn next_frame<R>(source: &mut R) -> io::Result<Step>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let Some(header) = frame::read_header(source).await? else {
        return Ok(Step::End);
    };
    let payload = frame::read_payload(source, header).await?;
    Ok(Step::Frame(header, payload))
}

/// Copy every frame payload from `source` into `writer` until the source
/// ends, fails, or the reader is dropped.
///
/// At most one payload is held in memory. The writer is consumed: on return
/// the pipe is closed, carrying the source error if there was one. The
/// source is dropped when this function returns.
pub async fn demultiplex<R>(mut source: R, writer: PipeWriter) -> DemuxSummary
where
    R: AsyncRead + Unpin,
{
    let mut frames = 0u64;
    let mut bytes = 0u64;

    let end = loop {
        // A reader that gives up must not leave us parked on a source that
        // may stay silent indefinitely (e.g. a followed log).
        let step = tokio::select! {
            biased;
            () = writer.closed() => break DemuxEnd::ReaderGone,
            step = next_frame(&mut source) => step,
        };

        match step {
            Ok(Step::Frame(header, payload)) => {
                trace!(channel = ?header.channel, len = header.len, "Frame");
                if writer.write(payload).await.is_err() {
                    break DemuxEnd::ReaderGone;
                }
                frames += 1;
                bytes += u64::from(header.len);
            }
            Ok(Step::End) => break DemuxEnd::Clean,
            Err(e) => {
                debug!(frames, error = %e, "Demultiplexer source failed");
                writer.close_with_error(e).await;
                break DemuxEnd::Failed;
            }
        }
    };

    debug!(frames, bytes, ?end, "Demultiplexer finished");
    DemuxSummary { frames, bytes, end }
}

/// Start [`demultiplex`] on its own task and return the reading end.
pub fn spawn<R>(source: R) -> (PipeReader, JoinHandle<DemuxSummary>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (writer, reader) = pipe();
    let handle = tokio::spawn(demultiplex(source, writer));
    (reader, handle)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, ReadBuf};

    use super::*;
    use crate::error::FrameError;
    use crate::io::ChunkReader;

    #[tokio::test]
    async fn merges_channels_in_arrival_order() {
        let mut input = encode_frame(Channel::Stdout, b"out-1 ");
        input.extend(encode_frame(Channel::Stderr, b"err-1 "));
        input.extend(encode_frame(Channel::Stdout, b"out-2"));

        let (mut reader, handle) = spawn(std::io::Cursor::new(input));
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();

        assert_eq!(out, "out-1 err-1 out-2");
        let summary = handle.await.unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.bytes, 17);
        assert_eq!(summary.end, DemuxEnd::Clean);
    }

    #[tokio::test]
    async fn empty_frames_are_skipped() {
        let mut input = encode_frame(Channel::Stdout, b"");
        input.extend(encode_frame(Channel::Stdout, b"x"));
        let (mut reader, handle) = spawn(std::io::Cursor::new(input));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"x");
        assert_eq!(handle.await.unwrap().frames, 2);
    }

    #[tokio::test]
    async fn overlong_length_surfaces_to_reader() {
        let mut input = encode_frame(Channel::Stdout, b"fine");
        input.extend(FrameHeader { channel: Channel::Stderr, len: 4096 }.encode());
        input.extend_from_slice(b"short");

        let (mut reader, handle) = spawn(std::io::Cursor::new(input));
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();

        assert_eq!(out, b"fine");
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<FrameError>());
        assert_eq!(
            inner,
            Some(&FrameError::TruncatedPayload { expected: 4096, read: 5 })
        );
        assert_eq!(handle.await.unwrap().end, DemuxEnd::Failed);
    }

    #[tokio::test]
    async fn headers_split_across_reads_are_reassembled() {
        let frame = encode_frame(Channel::Stdout, b"split");
        let parts: Vec<std::io::Result<Bytes>> = frame
            .chunks(3)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let source = ChunkReader::new(tokio_stream::iter(parts));

        let (mut reader, _handle) = spawn(source);
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "split");
    }

    #[tokio::test]
    async fn stops_when_reader_dropped_on_silent_source() {
        // One frame, then a source that never produces more data.
        let (mut engine, source) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut engine, &encode_frame(Channel::Stdout, b"hi"))
            .await
            .unwrap();

        let (mut reader, handle) = spawn(source);
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).await.unwrap();
        drop(reader);

        let summary = handle.await.unwrap();
        assert_eq!(summary.end, DemuxEnd::ReaderGone);
        assert_eq!(summary.frames, 1);
        drop(engine);
    }

    /// Cursor that records how many bytes have been pulled from it.
    struct CountingSource {
        inner: std::io::Cursor<Vec<u8>>,
        pulled: Arc<AtomicUsize>,
    }

    impl AsyncRead for CountingSource {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            let before = buf.filled().len();
            let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
            this.pulled
                .fetch_add(buf.filled().len() - before, Ordering::SeqCst);
            poll
        }
    }

    #[tokio::test]
    async fn idle_reader_stops_reads_from_the_source() {
        const FRAMES: usize = 50;
        let mut input = Vec::new();
        for i in 0..FRAMES {
            input.extend(encode_frame(Channel::Stdout, format!("line {i:02}").as_bytes()));
        }
        let frame_len = input.len() / FRAMES;
        let total = input.len();
        let pulled = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            inner: std::io::Cursor::new(input),
            pulled: Arc::clone(&pulled),
        };

        let (mut reader, handle) = spawn(source);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // One payload waits in the pipe, the next one in the blocked write.
        let idle = pulled.load(Ordering::SeqCst);
        assert!(idle > 0);
        assert!(idle <= 2 * frame_len, "pulled {idle} bytes with nobody reading");

        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out.matches("line ").count(), FRAMES);
        assert_eq!(pulled.load(Ordering::SeqCst), total);
        assert_eq!(handle.await.unwrap().end, DemuxEnd::Clean);
    }
}
