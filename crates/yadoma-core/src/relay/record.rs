//! Record relay: decodes concatenated JSON values and forwards each one.
//!
//! Values carry no length prefix. A byte scan tracks nesting and string state
//! across reads to spot where an object, array or string may end; only then
//! is the buffered value parsed. Whitespace (including the newlines of
//! NDJSON) between values is skipped.

use std::future::Future;
use std::io::ErrorKind;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use super::RelaySummary;
use crate::error::{DecodeError, RelayError};

/// Upper bound for a single buffered record.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 16 * 1024 * 1024;

const READ_SIZE: usize = 8 * 1024;

/// Incremental decoder for a stream of concatenated JSON values.
#[derive(Debug)]
pub struct RecordDecoder<R> {
    source: R,
    buf: Vec<u8>,
    consumed: u64,
    eof: bool,
    max_record_bytes: usize,
    scan: Scan,
    #[cfg(test)]
    parse_attempts: u32,
}

impl<R> RecordDecoder<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(source: R) -> Self {
        Self {
            source,
            buf: Vec::new(),
            consumed: 0,
            eof: false,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            scan: Scan::default(),
            #[cfg(test)]
            parse_attempts: 0,
        }
    }

    /// Fail with [`DecodeError::TooLarge`] instead of buffering past `limit`.
    #[must_use]
    pub fn with_max_record_bytes(mut self, limit: usize) -> Self {
        self.max_record_bytes = limit.max(1);
        self
    }

    /// Bytes consumed by successfully decoded records.
    pub const fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Decode the next value.
    ///
    /// Returns `Ok(None)` on clean end-of-stream: the source is exhausted and
    /// nothing but whitespace is left. A value cut off by end-of-stream is a
    /// [`DecodeError::Json`] error, as is any malformed input.
    pub async fn next_record<T: DeserializeOwned>(&mut self) -> Result<Option<T>, DecodeError> {
        loop {
            if let Some(record) = self.try_decode()? {
                return Ok(Some(record));
            }
            if self.eof {
                return Ok(None);
            }
            self.fill().await?;
        }
    }

    /// Try to take one complete value from the buffer. `Ok(None)` means more
    /// input is needed (or, at EOF, that only whitespace remains).
    fn try_decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, DecodeError> {
        // Before end-of-stream, only parse once a value may be complete. At
        // end-of-stream the parser decides, so truncation is still reported.
        if !self.eof {
            match self.scan.advance(&self.buf) {
                Progress::Blank => {
                    self.buf.clear();
                    self.scan = Scan::default();
                    return Ok(None);
                }
                Progress::Incomplete => return Ok(None),
                Progress::Ready => {}
            }
        }

        #[cfg(test)]
        {
            self.parse_attempts += 1;
        }
        let (next, offset) = {
            let mut values = serde_json::Deserializer::from_slice(&self.buf).into_iter::<T>();
            let next = values.next();
            (next, values.byte_offset())
        };

        match next {
            None => {
                self.buf.clear();
                self.scan = Scan::default();
                Ok(None)
            }
            // A number that runs up to the end of the buffer may continue in
            // the next read.
            Some(Ok(_)) if !self.eof && offset == self.buf.len() && ends_with_digit(&self.buf) => {
                Ok(None)
            }
            Some(Ok(value)) => {
                self.buf.drain(..offset);
                self.consumed += offset as u64;
                self.scan = Scan::default();
                Ok(Some(value))
            }
            Some(Err(e)) if e.is_eof() && !self.eof => Ok(None),
            Some(Err(e)) => Err(DecodeError::Json(e)),
        }
    }

    async fn fill(&mut self) -> Result<(), DecodeError> {
        if self.buf.len() >= self.max_record_bytes {
            return Err(DecodeError::TooLarge {
                limit: self.max_record_bytes,
            });
        }
        self.buf.reserve(READ_SIZE);
        loop {
            match self.source.read_buf(&mut self.buf).await {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(DecodeError::Io(e)),
            }
        }
    }
}

fn ends_with_digit(buf: &[u8]) -> bool {
    buf.last().is_some_and(u8::is_ascii_digit)
}

/// Result of scanning the buffered bytes of the next value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    /// Only whitespace so far.
    Blank,
    /// An object, array or string that has not been closed yet.
    Incomplete,
    /// Worth handing to the parser: a closed object, array or string, or a
    /// bare scalar.
    Ready,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    #[default]
    Idle,
    Nested,
    Scalar,
    Complete,
}

/// Incremental boundary scan of the value at the head of the buffer.
///
/// Tracks nesting depth and string/escape state across reads, so every
/// buffered byte is looked at once and a large record costs one parse
/// instead of one per read. Brackets are not matched by kind; a mismatch
/// is left for the parser to reject.
#[derive(Debug, Default)]
struct Scan {
    pos: usize,
    state: ScanState,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Scan {
    fn advance(&mut self, buf: &[u8]) -> Progress {
        while !matches!(self.state, ScanState::Scalar | ScanState::Complete) {
            let Some(&b) = buf.get(self.pos) else {
                break;
            };
            self.pos += 1;

            match self.state {
                ScanState::Idle => match b {
                    b' ' | b'\t' | b'\n' | b'\r' => {}
                    b'{' | b'[' => {
                        self.state = ScanState::Nested;
                        self.depth = 1;
                    }
                    b'"' => {
                        self.state = ScanState::Nested;
                        self.in_string = true;
                    }
                    _ => self.state = ScanState::Scalar,
                },
                ScanState::Nested if self.in_string => {
                    if self.escaped {
                        self.escaped = false;
                    } else if b == b'\\' {
                        self.escaped = true;
                    } else if b == b'"' {
                        self.in_string = false;
                        if self.depth == 0 {
                            self.state = ScanState::Complete;
                        }
                    }
                }
                ScanState::Nested => match b {
                    b'"' => self.in_string = true,
                    b'{' | b'[' => self.depth += 1,
                    b'}' | b']' => {
                        self.depth = self.depth.saturating_sub(1);
                        if self.depth == 0 {
                            self.state = ScanState::Complete;
                        }
                    }
                    _ => {}
                },
                ScanState::Scalar | ScanState::Complete => {}
            }
        }

        match self.state {
            ScanState::Idle => Progress::Blank,
            ScanState::Nested => Progress::Incomplete,
            ScanState::Scalar | ScanState::Complete => Progress::Ready,
        }
    }
}

/// Decode values of type `T` from `source` and forward each to `send`.
pub async fn relay_records<T, R, F, Fut, E>(
    source: &mut R,
    send: F,
) -> Result<RelaySummary, RelayError<E>>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin + ?Sized,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    relay_decoded(RecordDecoder::new(source), send).await
}

/// Drive an already configured decoder to completion.
pub async fn relay_decoded<T, R, F, Fut, E>(
    mut decoder: RecordDecoder<R>,
    mut send: F,
) -> Result<RelaySummary, RelayError<E>>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut summary = RelaySummary::default();

    loop {
        let record = match decoder.next_record::<T>().await {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => {
                debug!(records = summary.items, error = %e, "Record relay stopped on decode failure");
                return Err(e.into());
            }
        };
        trace!(index = summary.items, "Decoded record");
        send(record).await.map_err(RelayError::Sink)?;
        summary.items += 1;
        summary.bytes = decoder.consumed();
    }

    debug!(records = summary.items, bytes = summary.bytes, "Record relay reached end of stream");
    Ok(summary)
}
