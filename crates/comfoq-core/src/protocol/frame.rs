//! Incremental frame reassembly for a TCP byte stream.
//!
//! Reads from a socket return arbitrary slices of the stream: half a frame,
//! three frames and a bit, and so on.  [`FrameDecoder`] buffers the bytes
//! and hands out whole messages one at a time.

use tracing::trace;

use crate::protocol::codec::{decode_message, peek_frame_len, ProtocolError};
use crate::protocol::messages::Message;

/// Accumulates stream bytes and yields complete [`Message`]s.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the next complete message, or `Ok(None)` if more bytes are
    /// needed.
    ///
    /// A frame that is complete but cannot be decoded is removed from the
    /// buffer before the error is returned, so the caller can log it and
    /// keep calling.  Fatal errors ([`ProtocolError::is_fatal`]) leave the
    /// buffer untouched; the stream cannot be resynchronised and the caller
    /// should drop the connection.
    ///
    /// # Errors
    ///
    /// Returns the [`ProtocolError`] for the offending frame.
    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        let total = match peek_frame_len(&self.buf) {
            Ok(total) => total,
            Err(ProtocolError::InsufficientData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if self.buf.len() < total {
            return Ok(None);
        }

        let result = decode_message(&self.buf[..total]);
        self.buf.drain(..total);
        match result {
            Ok((msg, _)) => {
                trace!(kind = ?msg.kind(), reference = ?msg.reference(), "frame decoded");
                Ok(Some(msg))
            }
            Err(e) => {
                trace!(error = %e, len = total, "frame discarded");
                Err(e)
            }
        }
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discards everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::encode_message;
    use crate::protocol::messages::{Body, GatewayOperation, Message, MIN_FRAME_LEN};
    use prost::Message as _;
    use uuid::Uuid;

    fn keepalive(reference: u32) -> Vec<u8> {
        encode_message(&Message::request(Uuid::nil(), Uuid::nil(), reference, Body::KeepAlive))
            .unwrap()
    }

    fn unknown_kind_frame() -> Vec<u8> {
        let op = GatewayOperation {
            r#type: Some(250),
            ..Default::default()
        }
        .encode_to_vec();
        let mut buf = Vec::new();
        buf.extend_from_slice(&((MIN_FRAME_LEN + op.len()) as u32).to_be_bytes());
        buf.extend_from_slice(&[0u8; 32]);
        buf.extend_from_slice(&(op.len() as u16).to_be_bytes());
        buf.extend_from_slice(&op);
        buf
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        // Arrange
        let bytes = keepalive(1);
        let mut decoder = FrameDecoder::new();

        // Act
        decoder.push(&bytes[..10]);
        let first = decoder.next_message().unwrap();
        decoder.push(&bytes[10..]);
        let second = decoder.next_message().unwrap();

        // Assert
        assert!(first.is_none());
        assert_eq!(second.unwrap().reference(), Some(1));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_concatenated_frames_yield_in_order() {
        let mut decoder = FrameDecoder::new();
        let mut stream = keepalive(1);
        stream.extend(keepalive(2));
        stream.extend(keepalive(3));
        decoder.push(&stream);

        let refs: Vec<_> = std::iter::from_fn(|| decoder.next_message().unwrap())
            .map(|m| m.reference())
            .collect();
        assert_eq!(refs, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let bytes = keepalive(5);
        let mut decoder = FrameDecoder::new();
        let mut decoded = None;
        for b in &bytes {
            decoder.push(&[*b]);
            if let Some(msg) = decoder.next_message().unwrap() {
                decoded = Some(msg);
            }
        }
        assert_eq!(decoded.unwrap().reference(), Some(5));
    }

    #[test]
    fn test_recoverable_error_skips_only_bad_frame() {
        // Arrange
        let mut decoder = FrameDecoder::new();
        decoder.push(&unknown_kind_frame());
        decoder.push(&keepalive(8));

        // Act
        let first = decoder.next_message();
        let second = decoder.next_message().unwrap();

        // Assert
        assert_eq!(first.unwrap_err(), ProtocolError::UnknownOperationType(250));
        assert_eq!(second.unwrap().reference(), Some(8));
    }

    #[test]
    fn test_fatal_error_keeps_buffer() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0, 0, 0, 3, 1, 2, 3]);
        let err = decoder.next_message().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(decoder.buffered(), 7);
        decoder.clear();
        assert_eq!(decoder.buffered(), 0);
    }
}
