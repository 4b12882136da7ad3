//! Server-streaming plumbing shared by the services.
//!
//! Each streaming RPC runs its relay on a spawned task that feeds a bounded
//! channel; the receiving half is the RPC's response stream. When the client
//! goes away tonic drops the receiver, the channel closes, and the task stops
//! at its next send or, if it is parked on the engine, straight away.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use tracing::{Instrument, debug, warn};
use yadoma_core::{RelayError, RelaySummary};

use super::convert::relay_status;

/// Boxed response stream, as returned from streaming RPC handlers.
pub type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// The client stopped reading its response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("client disconnected")]
pub struct ClientGone;

/// Sending half of a response stream.
#[derive(Debug)]
pub struct ClientSink<T> {
    tx: mpsc::Sender<Result<T, Status>>,
}

impl<T> ClientSink<T> {
    /// Queue one message, waiting while the client is behind.
    pub async fn send(&self, message: T) -> Result<(), ClientGone> {
        self.tx.send(Ok(message)).await.map_err(|_| ClientGone)
    }
}

/// Run `relay` on its own task and return the stream it feeds.
///
/// `buffer` bounds how many messages may wait for the client. A relay that
/// fails on its source or decoding ends the stream with a status; a relay
/// stopped by the client leaves nothing to report.
pub fn spawn_relay<T, F, Fut>(what: &'static str, buffer: usize, relay: F) -> ResponseStream<T>
where
    T: Send + 'static,
    F: FnOnce(ClientSink<T>) -> Fut,
    Fut: Future<Output = Result<RelaySummary, RelayError<ClientGone>>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let relay = relay(ClientSink { tx: tx.clone() });

    tokio::spawn(
        async move {
            let outcome = tokio::select! {
                outcome = relay => outcome,
                () = tx.closed() => Err(RelayError::Sink(ClientGone)),
            };
            match outcome {
                Ok(summary) => {
                    debug!(items = summary.items, bytes = summary.bytes, "Stream completed");
                }
                Err(RelayError::Sink(ClientGone)) => debug!("Client disconnected, stream stopped"),
                Err(e) => {
                    warn!(error = %e, "Stream failed");
                    let _ = tx.send(Err(relay_status(what, &e))).await;
                }
            }
        }
        .instrument(tracing::Span::current()),
    );

    Box::pin(ReceiverStream::new(rx))
}
