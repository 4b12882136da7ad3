//! Wire format of the engine's combined stdout/stderr stream.
//!
//! ```text
//! +---------+----------+---------------------+------------------+
//! | tag (1) | zero (3) | payload length (4)  | payload (length) |
//! +---------+----------+---------------------+------------------+
//! ```
//!
//! The length is a big-endian `u32`. Frames follow each other with no
//! separators and no trailer.

use std::io::ErrorKind;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::FrameError;

/// Size of a frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Logical channel a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdin,
    Stdout,
    Stderr,
    Other(u8),
}

impl From<u8> for Channel {
    fn from(tag: u8) -> Self {
        match tag {
            0 => Self::Stdin,
            1 => Self::Stdout,
            2 => Self::Stderr,
            other => Self::Other(other),
        }
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Stdin => 0,
            Channel::Stdout => 1,
            Channel::Stderr => 2,
            Channel::Other(tag) => tag,
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub channel: Channel,
    pub len: u32,
}

impl FrameHeader {
    /// Parse a header. Bytes 1-3 are reserved and ignored.
    pub fn parse(raw: [u8; HEADER_LEN]) -> Self {
        Self {
            channel: Channel::from(raw[0]),
            len: u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let [a, b, c, d] = self.len.to_be_bytes();
        [u8::from(self.channel), 0, 0, 0, a, b, c, d]
    }
}

/// Encode `payload` as frames on `channel`. Used to build fixtures and by
/// tools that replay captured output.
///
/// A payload longer than `u32::MAX` bytes is split over several frames; an
/// empty payload still yields one (empty) frame.
pub fn encode_frame(channel: Channel, payload: &[u8]) -> Vec<u8> {
    let max_len = usize::try_from(u32::MAX).unwrap_or(usize::MAX);
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    let mut rest = payload;
    loop {
        let (part, tail) = rest.split_at(rest.len().min(max_len));
        let header = FrameHeader {
            channel,
            len: u32::try_from(part.len()).unwrap_or(u32::MAX),
        };
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(part);
        rest = tail;
        if rest.is_empty() {
            return out;
        }
    }
}

/// Read the next header.
///
/// `Ok(None)` means the stream ended cleanly on a frame boundary. Ending
/// after part of a header is [`FrameError::TruncatedHeader`].
pub async fn read_header<R>(source: &mut R) -> std::io::Result<Option<FrameHeader>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut raw = [0u8; HEADER_LEN];
    let mut read = 0;
    while read < HEADER_LEN {
        match source.read(&mut raw[read..]).await {
            Ok(0) if read == 0 => return Ok(None),
            Ok(0) => return Err(FrameError::TruncatedHeader { read }.into()),
            Ok(n) => read += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(Some(FrameHeader::parse(raw)))
}

/// Read exactly `header.len` payload bytes.
///
/// The buffer grows with the bytes actually received, so a header claiming
/// more data than the stream holds does not allocate the claimed size up
/// front.
pub async fn read_payload<R>(source: &mut R, header: FrameHeader) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let expected = u64::from(header.len);
    let mut payload = Vec::new();
    let read = (&mut *source).take(expected).read_to_end(&mut payload).await? as u64;
    if read < expected {
        return Err(FrameError::TruncatedPayload {
            expected: header.len,
            read,
        }
        .into());
    }
    Ok(Bytes::from(payload))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_bit_exact() {
        let header = FrameHeader::parse([2, 0xAA, 0xBB, 0xCC, 0x00, 0x01, 0x02, 0x03]);
        assert_eq!(header.channel, Channel::Stderr);
        assert_eq!(header.len, 0x0001_0203);
    }

    #[test]
    fn encode_zeroes_reserved_bytes() {
        let header = FrameHeader {
            channel: Channel::Stdout,
            len: 8,
        };
        assert_eq!(header.encode(), [1, 0, 0, 0, 0, 0, 0, 8]);
    }

    #[test]
    fn unknown_tags_are_kept() {
        assert_eq!(Channel::from(7), Channel::Other(7));
        assert_eq!(u8::from(Channel::Other(7)), 7);
    }

    #[tokio::test]
    async fn clean_end_on_frame_boundary() {
        let mut source: &[u8] = &[];
        assert!(read_header(&mut source).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_header_is_a_protocol_error() {
        let mut source: &[u8] = &[1, 0, 0];
        let err = read_header(&mut source).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<FrameError>());
        assert_eq!(inner, Some(&FrameError::TruncatedHeader { read: 3 }));
    }

    #[tokio::test]
    async fn short_payload_is_a_protocol_error() {
        let mut frame = FrameHeader {
            channel: Channel::Stdout,
            len: 100,
        }
        .encode()
        .to_vec();
        frame.extend_from_slice(b"only ten b");
        let mut source = frame.as_slice();

        let header = read_header(&mut source).await.unwrap().unwrap();
        let err = read_payload(&mut source, header).await.unwrap_err();
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<FrameError>());
        assert_eq!(
            inner,
            Some(&FrameError::TruncatedPayload {
                expected: 100,
                read: 10
            })
        );
    }

    #[tokio::test]
    async fn payload_is_read_exactly() {
        let mut bytes = encode_frame(Channel::Stdout, b"chunk-1\n");
        bytes.extend(encode_frame(Channel::Stderr, b"boom"));
        let mut source = bytes.as_slice();

        let first = read_header(&mut source).await.unwrap().unwrap();
        assert_eq!(read_payload(&mut source, first).await.unwrap(), "chunk-1\n");
        let second = read_header(&mut source).await.unwrap().unwrap();
        assert_eq!(second.channel, Channel::Stderr);
        assert_eq!(read_payload(&mut source, second).await.unwrap(), "boom");
        assert!(read_header(&mut source).await.unwrap().is_none());
    }
}
