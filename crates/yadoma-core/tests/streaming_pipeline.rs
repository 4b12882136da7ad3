#![allow(clippy::unwrap_used, clippy::panic)] // Integration tests use unwrap for brevity

//! End-to-end tests for the streaming core.
//!
//! Drives the public relay, record and log entry points with scripted
//! sources that fragment, fail, or signal cancellation at chosen points.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use serde::Deserialize;
use tokio::io::{AsyncRead, ReadBuf};

use yadoma_core::demux::{Channel, FrameHeader, encode_frame};
use yadoma_core::logs::{StreamKind, relay_logs};
use yadoma_core::{FrameError, RelayError, relay_bytes, relay_records};

/// A source that answers each read with the next scripted item and counts
/// how many times it has been dropped.
struct ScriptedSource {
    items: std::collections::VecDeque<io::Result<Vec<u8>>>,
    drops: Arc<AtomicUsize>,
}

impl ScriptedSource {
    fn new(items: Vec<io::Result<Vec<u8>>>) -> (Self, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        (
            Self {
                items: items.into(),
                drops: Arc::clone(&drops),
            },
            drops,
        )
    }
}

impl AsyncRead for ScriptedSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.items.pop_front() {
            Some(Ok(mut data)) => {
                let n = data.len().min(buf.remaining());
                buf.put_slice(&data[..n]);
                if n < data.len() {
                    self.items.push_front(Ok(data.split_off(n)));
                }
                Poll::Ready(Ok(()))
            }
            Some(Err(e)) => Poll::Ready(Err(e)),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

type Received = Arc<Mutex<Vec<Bytes>>>;

fn byte_sink() -> (
    Received,
    impl FnMut(Bytes) -> std::future::Ready<Result<(), String>>,
) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    (received, move |chunk| {
        sink.lock().unwrap().push(chunk);
        std::future::ready(Ok(()))
    })
}

// =========================================================================
// Demultiplexed log streams
// =========================================================================

#[tokio::test]
async fn read_error_after_second_frame_is_reported_after_both_payloads() {
    let mut frames = encode_frame(Channel::Stdout, b"chunk-1\n");
    frames.extend(encode_frame(Channel::Stderr, b"stream err\n"));
    let (source, drops) = ScriptedSource::new(vec![
        Ok(frames),
        Err(io::Error::new(io::ErrorKind::ConnectionAborted, "engine went away")),
    ]);
    let (received, send) = byte_sink();

    let err = relay_logs(source, StreamKind::Multiplexed, 1024, send)
        .await
        .unwrap_err();

    let chunks = received.lock().unwrap().clone();
    assert_eq!(chunks, vec!["chunk-1\n", "stream err\n"]);
    match err {
        RelayError::Source(e) => {
            assert_eq!(e.kind(), io::ErrorKind::ConnectionAborted);
            assert_eq!(e.to_string(), "engine went away");
        }
        other => panic!("expected source error, got {other:?}"),
    }
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_length_is_observed_by_the_relay() {
    let mut input = encode_frame(Channel::Stdout, b"before\n");
    input.extend(
        FrameHeader {
            channel: Channel::Stdout,
            len: 1_000,
        }
        .encode(),
    );
    input.extend_from_slice(b"not enough");
    let (source, drops) = ScriptedSource::new(vec![Ok(input)]);
    let (received, send) = byte_sink();

    let err = relay_logs(source, StreamKind::Multiplexed, 1024, send)
        .await
        .unwrap_err();

    assert_eq!(received.lock().unwrap().clone(), vec!["before\n"]);
    let RelayError::Source(e) = err else {
        panic!("expected source error");
    };
    assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
    let frame_err = e.get_ref().and_then(|inner| inner.downcast_ref::<FrameError>());
    assert_eq!(
        frame_err,
        Some(&FrameError::TruncatedPayload {
            expected: 1_000,
            read: 10
        })
    );
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn partial_header_at_end_is_a_protocol_error() {
    let mut input = encode_frame(Channel::Stdout, b"ok");
    input.extend_from_slice(&[2, 0, 0, 0, 0]);
    let (source, _drops) = ScriptedSource::new(vec![Ok(input)]);
    let (_received, send) = byte_sink();

    let err = relay_logs(source, StreamKind::Multiplexed, 1024, send)
        .await
        .unwrap_err();

    let RelayError::Source(e) = err else {
        panic!("expected source error");
    };
    let frame_err = e.get_ref().and_then(|inner| inner.downcast_ref::<FrameError>());
    assert_eq!(frame_err, Some(&FrameError::TruncatedHeader { read: 5 }));
}

#[tokio::test]
async fn sink_failure_stops_demultiplexed_relay_and_releases_source() {
    let mut input = Vec::new();
    for i in 0..10 {
        input.extend(encode_frame(Channel::Stdout, format!("line {i}\n").as_bytes()));
    }
    let (source, drops) = ScriptedSource::new(vec![Ok(input)]);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let err = relay_logs(source, StreamKind::Multiplexed, 1024, move |_chunk| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        std::future::ready(if n == 3 { Err("client gone") } else { Ok(()) })
    })
    .await
    .unwrap_err();

    assert!(matches!(err, RelayError::Sink("client gone")));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reassembly_is_independent_of_source_fragmentation() {
    let mut input = Vec::new();
    let mut expected = Vec::new();
    for (i, channel) in [Channel::Stdout, Channel::Stderr].iter().cycle().take(40).enumerate() {
        let payload = format!("{i}:{}\n", "x".repeat(i * 7));
        expected.extend_from_slice(payload.as_bytes());
        input.extend(encode_frame(*channel, payload.as_bytes()));
    }

    for fragment in [1, 3, 8, 13, 1000] {
        let parts = input.chunks(fragment).map(|c| Ok(c.to_vec())).collect();
        let (source, _drops) = ScriptedSource::new(parts);
        let (received, send) = byte_sink();

        relay_logs(source, StreamKind::Multiplexed, 64, send)
            .await
            .unwrap();

        let joined = received.lock().unwrap().concat();
        assert_eq!(joined, expected, "fragment size {fragment}");
    }
}

// =========================================================================
// Raw byte relay
// =========================================================================

#[tokio::test]
async fn cancellation_on_third_read_reports_two_sends_then_the_error() {
    let (mut source, drops) = ScriptedSource::new(vec![
        Ok(b"first".to_vec()),
        Ok(b"second".to_vec()),
        Err(io::Error::other("context canceled")),
        Ok(b"never read".to_vec()),
    ]);
    let (received, send) = byte_sink();

    let err = relay_bytes(&mut source, send).await.unwrap_err();

    assert_eq!(received.lock().unwrap().len(), 2);
    assert!(matches!(&err, RelayError::Source(e) if e.to_string() == "context canceled"));
    // The relay borrows the source; closing it is the caller's job.
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(source);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn clean_end_has_no_trailing_send() {
    let (mut source, _drops) = ScriptedSource::new(vec![Ok(b"abc".to_vec()), Ok(b"def".to_vec())]);
    let (received, send) = byte_sink();

    let summary = relay_bytes(&mut source, send).await.unwrap();

    assert_eq!(summary.items, 2);
    assert_eq!(received.lock().unwrap().concat(), b"abcdef");
}

// =========================================================================
// Record relay
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct Metric {
    name: String,
    value: u32,
}

#[tokio::test]
async fn k_records_yield_k_sends_in_order() {
    let k = 25;
    let body: String = (0..k)
        .map(|i| format!(r#"{{"name":"m{i}","value":{i}}}"#))
        .collect::<Vec<_>>()
        .join("\n");
    let parts = body.as_bytes().chunks(17).map(|c| Ok(c.to_vec())).collect();
    let (mut source, _drops) = ScriptedSource::new(parts);
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);

    let summary = relay_records(&mut source, move |metric: Metric| {
        sink.lock().unwrap().push(metric);
        std::future::ready(Ok::<(), String>(()))
    })
    .await
    .unwrap();

    let metrics = received.lock().unwrap().clone();
    assert_eq!(summary.items, k as u64);
    assert_eq!(metrics.len(), k);
    for (i, metric) in metrics.iter().enumerate() {
        assert_eq!(metric.name, format!("m{i}"));
        assert_eq!(metric.value as usize, i);
    }
}
