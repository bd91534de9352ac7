//! Binary codec for encoding and decoding ComfoConnect gateway frames.
//!
//! Wire format:
//! ```text
//! [frame_len:4][src_uuid:16][dst_uuid:16][op_len:2][operation:op_len][body:N]
//! ```
//! `frame_len` counts everything after itself, so it equals
//! `34 + op_len + N`.  Both length fields are big-endian.  `operation` is a
//! protobuf `GatewayOperation`; `body` is the protobuf message matching the
//! operation type.
//!
//! # Why two length fields? (for beginners)
//!
//! TCP is a byte stream, not a message stream.  The outer `frame_len` tells
//! the reader where one frame ends and the next begins.  The inner `op_len`
//! splits the frame payload into the operation header and the body, since
//! protobuf messages are not self-delimiting.

use prost::Message as _;
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::messages::{
    Body, CnAlarmNotification, CnNodeNotification, CnRmiRequest, CnRmiResponse, CnRpdoNotification,
    CnRpdoRequest, CnTimeConfirm, CnTimeRequest, GatewayNotification, GatewayOperation, Message,
    Operation, OperationType, RegisterAppRequest, ResultCode, StartSessionConfirm,
    StartSessionRequest, VersionConfirm, ADDRESS_SIZE, LENGTH_PREFIX_SIZE, MAX_FRAME_LEN,
    MIN_FRAME_LEN, OPERATION_LENGTH_SIZE,
};

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// The byte slice does not yet hold a complete frame.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The length prefix is smaller than the fixed frame header.
    #[error("invalid frame length {0}: must be at least {MIN_FRAME_LEN}")]
    InvalidFrameLength(usize),

    /// The length prefix exceeds [`MAX_FRAME_LEN`].
    #[error("frame too large: {len} bytes exceeds maximum of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// The operation header length runs past the end of the frame.
    #[error("operation header length {declared} overruns frame payload of {available} bytes")]
    OperationOverrun { declared: usize, available: usize },

    /// The operation type is not one this codec understands.
    #[error("unknown operation type: {0}")]
    UnknownOperationType(u32),

    /// The result code is not one this codec understands.
    #[error("unknown result code: {0}")]
    UnknownResultCode(u32),

    /// The operation header has no type field.
    #[error("operation header carries no type")]
    MissingOperationType,

    /// A protobuf section could not be parsed or serialized.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl ProtocolError {
    /// Returns `true` when the error leaves the stream position unknown.
    ///
    /// A frame whose own length prefix is invalid cannot be skipped, so the
    /// connection must be torn down.  Every other error is confined to a
    /// single frame whose boundaries are still known.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidFrameLength(_) | ProtocolError::FrameTooLarge { .. }
        )
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Message`] into a length-prefixed frame.
///
/// The result code is only written when it differs from
/// [`ResultCode::Ok`], which is what the gateway itself does.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the encoded frame would not
/// fit in [`MAX_FRAME_LEN`], or [`ProtocolError::MalformedPayload`] if the
/// operation header exceeds the 16-bit length field.
///
/// # Examples
///
/// ```rust
/// use comfoq_core::protocol::{decode_message, encode_message, Body, Message};
/// use uuid::Uuid;
///
/// let msg = Message::request(Uuid::nil(), Uuid::nil(), 7, Body::KeepAlive);
/// let bytes = encode_message(&msg).unwrap();
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    let op = GatewayOperation {
        r#type: Some(msg.kind() as u32),
        result: match msg.operation.result {
            ResultCode::Ok => None,
            other => Some(other as u32),
        },
        result_description: msg.operation.description.clone(),
        reference: msg.operation.reference,
    };
    let op_bytes = op.encode_to_vec();
    let body_bytes = encode_body(&msg.body);

    if op_bytes.len() > u16::MAX as usize {
        return Err(ProtocolError::MalformedPayload(format!(
            "operation header of {} bytes exceeds u16 length field",
            op_bytes.len()
        )));
    }

    let frame_len = MIN_FRAME_LEN + op_bytes.len() + body_bytes.len();
    if frame_len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: frame_len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + frame_len);
    buf.extend_from_slice(&(frame_len as u32).to_be_bytes());
    buf.extend_from_slice(msg.src.as_bytes());
    buf.extend_from_slice(msg.dst.as_bytes());
    buf.extend_from_slice(&(op_bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(&op_bytes);
    buf.extend_from_slice(&body_bytes);
    Ok(buf)
}

/// Reads only the length prefix and returns the total frame size in bytes
/// (prefix included), validating it against the legal range.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when fewer than four bytes are
/// available, or one of the fatal length errors.
pub fn peek_frame_len(bytes: &[u8]) -> Result<usize, ProtocolError> {
    if bytes.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: LENGTH_PREFIX_SIZE,
            available: bytes.len(),
        });
    }
    let frame_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if frame_len < MIN_FRAME_LEN {
        return Err(ProtocolError::InvalidFrameLength(frame_len));
    }
    if frame_len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: frame_len,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(LENGTH_PREFIX_SIZE + frame_len)
}

/// Decodes one [`Message`] from the beginning of `bytes`.
///
/// Returns the decoded message and the number of bytes consumed so the
/// caller can advance its read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are incomplete or malformed.
pub fn decode_message(bytes: &[u8]) -> Result<(Message, usize), ProtocolError> {
    let total = peek_frame_len(bytes)?;
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let frame = &bytes[LENGTH_PREFIX_SIZE..total];
    let src = read_uuid(&frame[0..16]);
    let dst = read_uuid(&frame[16..ADDRESS_SIZE]);
    let op_len =
        u16::from_be_bytes([frame[ADDRESS_SIZE], frame[ADDRESS_SIZE + 1]]) as usize;
    let rest = &frame[ADDRESS_SIZE + OPERATION_LENGTH_SIZE..];
    if op_len > rest.len() {
        return Err(ProtocolError::OperationOverrun {
            declared: op_len,
            available: rest.len(),
        });
    }
    let (op_bytes, body_bytes) = rest.split_at(op_len);

    let op = GatewayOperation::decode(op_bytes)
        .map_err(|e| ProtocolError::MalformedPayload(format!("operation header: {e}")))?;
    let raw_type = op.r#type.ok_or(ProtocolError::MissingOperationType)?;
    let kind = OperationType::try_from(raw_type)
        .map_err(|_| ProtocolError::UnknownOperationType(raw_type))?;
    let result = match op.result {
        None => ResultCode::Ok,
        Some(code) => {
            ResultCode::try_from(code).map_err(|_| ProtocolError::UnknownResultCode(code))?
        }
    };

    let body = decode_body(kind, body_bytes)?;
    let message = Message {
        src,
        dst,
        operation: Operation {
            result,
            description: op.result_description,
            reference: op.reference,
        },
        body,
    };
    Ok((message, total))
}

// ── Body encoding ─────────────────────────────────────────────────────────────

fn encode_body(body: &Body) -> Vec<u8> {
    match body {
        Body::RegisterAppRequest(m) => m.encode_to_vec(),
        Body::StartSessionRequest(m) => m.encode_to_vec(),
        Body::StartSessionConfirm(m) => m.encode_to_vec(),
        Body::VersionConfirm(m) => m.encode_to_vec(),
        Body::CnTimeRequest(m) => m.encode_to_vec(),
        Body::CnTimeConfirm(m) => m.encode_to_vec(),
        Body::CnNodeNotification(m) => m.encode_to_vec(),
        Body::CnRmiRequest(m) => m.encode_to_vec(),
        Body::CnRmiResponse(m) => m.encode_to_vec(),
        Body::CnRpdoRequest(m) => m.encode_to_vec(),
        Body::CnRpdoNotification(m) => m.encode_to_vec(),
        Body::CnAlarmNotification(m) => m.encode_to_vec(),
        Body::GatewayNotification(m) => m.encode_to_vec(),
        Body::RegisterAppConfirm
        | Body::CloseSessionRequest
        | Body::CloseSessionConfirm
        | Body::VersionRequest
        | Body::CnRpdoConfirm
        | Body::KeepAlive => Vec::new(),
    }
}

// ── Body decoding ─────────────────────────────────────────────────────────────

fn decode_body(kind: OperationType, bytes: &[u8]) -> Result<Body, ProtocolError> {
    let body = match kind {
        OperationType::RegisterAppRequest => {
            Body::RegisterAppRequest(parse::<RegisterAppRequest>(kind, bytes)?)
        }
        OperationType::StartSessionRequest => {
            Body::StartSessionRequest(parse::<StartSessionRequest>(kind, bytes)?)
        }
        OperationType::StartSessionConfirm => {
            Body::StartSessionConfirm(parse::<StartSessionConfirm>(kind, bytes)?)
        }
        OperationType::VersionConfirm => Body::VersionConfirm(parse::<VersionConfirm>(kind, bytes)?),
        OperationType::CnTimeRequest => Body::CnTimeRequest(parse::<CnTimeRequest>(kind, bytes)?),
        OperationType::CnTimeConfirm => Body::CnTimeConfirm(parse::<CnTimeConfirm>(kind, bytes)?),
        OperationType::CnNodeNotification => {
            Body::CnNodeNotification(parse::<CnNodeNotification>(kind, bytes)?)
        }
        OperationType::CnRmiRequest => Body::CnRmiRequest(parse::<CnRmiRequest>(kind, bytes)?),
        OperationType::CnRmiResponse => Body::CnRmiResponse(parse::<CnRmiResponse>(kind, bytes)?),
        OperationType::CnRpdoRequest => Body::CnRpdoRequest(parse::<CnRpdoRequest>(kind, bytes)?),
        OperationType::CnRpdoNotification => {
            Body::CnRpdoNotification(parse::<CnRpdoNotification>(kind, bytes)?)
        }
        OperationType::CnAlarmNotification => {
            Body::CnAlarmNotification(parse::<CnAlarmNotification>(kind, bytes)?)
        }
        OperationType::GatewayNotification => {
            Body::GatewayNotification(parse::<GatewayNotification>(kind, bytes)?)
        }
        // Empty bodies: any trailing bytes are ignored, as the gateway does.
        OperationType::RegisterAppConfirm => Body::RegisterAppConfirm,
        OperationType::CloseSessionRequest => Body::CloseSessionRequest,
        OperationType::CloseSessionConfirm => Body::CloseSessionConfirm,
        OperationType::VersionRequest => Body::VersionRequest,
        OperationType::CnRpdoConfirm => Body::CnRpdoConfirm,
        OperationType::KeepAlive => Body::KeepAlive,
    };
    Ok(body)
}

fn parse<M: prost::Message + Default>(kind: OperationType, bytes: &[u8]) -> Result<M, ProtocolError> {
    M::decode(bytes).map_err(|e| ProtocolError::MalformedPayload(format!("{kind:?} body: {e}")))
}

fn read_uuid(bytes: &[u8]) -> Uuid {
    let mut raw = [0u8; 16];
    raw.copy_from_slice(bytes);
    Uuid::from_bytes(raw)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
