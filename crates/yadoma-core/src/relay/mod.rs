//! Relays from a source to a sink callback.
//!
//! Two flavours share the same stopping rules:
//! - [`stream`]: opaque bytes in fixed-size chunks
//! - [`record`]: one decoded JSON value at a time
//!
//! A relay stops on clean end-of-stream (success), on a source or decode
//! error, or on the first sink error, and reports that error unchanged. It
//! never retries and never closes the source; the caller owns it.

pub mod record;
pub mod stream;

pub use record::{DEFAULT_MAX_RECORD_BYTES, RecordDecoder, relay_decoded, relay_records};
pub use stream::{DEFAULT_CHUNK_SIZE, relay_bytes, relay_bytes_with};

/// What a completed relay forwarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Number of successful sink invocations.
    pub items: u64,
    /// Bytes consumed from the source.
    pub bytes: u64,
}
