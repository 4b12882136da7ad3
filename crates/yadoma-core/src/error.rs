//! Error types for the Yadoma streaming core.

use thiserror::Error;

/// Outcome of a failed relay loop.
///
/// The wrapped errors are the ones the source or sink produced, untouched.
/// Cancellation is not a separate variant: it reaches the relay either as a
/// source read error or as a sink error and is reported through the same
/// path as any other failure.
#[derive(Debug, Error)]
pub enum RelayError<E> {
    /// The byte source failed before clean end-of-stream.
    #[error("source failed: {0}")]
    Source(#[source] std::io::Error),

    /// The record stream could not be decoded.
    #[error("record decoding failed: {0}")]
    Decode(#[source] DecodeError),

    /// The sink rejected a chunk or record.
    #[error("sink failed: {0}")]
    Sink(#[source] E),
}

impl<E> From<DecodeError> for RelayError<E> {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Io(e) => Self::Source(e),
            other => Self::Decode(other),
        }
    }
}

/// Errors produced while decoding one record from a concatenated stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Reading from the underlying source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes were not a valid value, or the stream ended mid-value.
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),

    /// A single record grew past the configured limit without completing.
    #[error("record exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Protocol violations in the framed stdout/stderr wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("stream ended inside a frame header ({read} of 8 bytes)")]
    TruncatedHeader { read: usize },

    #[error("stream ended inside a frame payload ({read} of {expected} bytes)")]
    TruncatedPayload { expected: u32, read: u64 },
}

impl From<FrameError> for std::io::Error {
    fn from(err: FrameError) -> Self {
        Self::new(std::io::ErrorKind::UnexpectedEof, err)
    }
}
