//! All ComfoConnect gateway message types.
//!
//! A frame carries a routing header (source and destination UUID), an
//! operation header describing the message kind and result, and a
//! kind-specific body.  Operation headers and bodies are protobuf messages;
//! they are modelled here with `prost` derives so no build step is needed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Protocol constants ────────────────────────────────────────────────────────

/// TCP and UDP port the gateway listens on.
pub const GATEWAY_PORT: u16 = 56747;

/// Size of the big-endian frame length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Source UUID + destination UUID.
pub const ADDRESS_SIZE: usize = 32;

/// Size of the big-endian operation header length field.
pub const OPERATION_LENGTH_SIZE: usize = 2;

/// Smallest legal value of the frame length prefix (addresses + op length).
pub const MIN_FRAME_LEN: usize = ADDRESS_SIZE + OPERATION_LENGTH_SIZE;

/// Largest frame the codec accepts.  Gateway frames are a few hundred bytes
/// at most; anything larger means the stream is out of sync.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

// ── Operation types ───────────────────────────────────────────────────────────

/// Message kind carried in the operation header (`GatewayOperation.type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum OperationType {
    RegisterAppRequest = 2,
    StartSessionRequest = 3,
    CloseSessionRequest = 4,
    VersionRequest = 18,
    CnTimeRequest = 30,
    CnTimeConfirm = 31,
    CnNodeNotification = 32,
    CnRmiRequest = 33,
    CnRmiResponse = 34,
    CnRpdoRequest = 38,
    CnRpdoConfirm = 39,
    CnRpdoNotification = 40,
    CnAlarmNotification = 41,
    RegisterAppConfirm = 52,
    StartSessionConfirm = 53,
    CloseSessionConfirm = 54,
    VersionConfirm = 68,
    GatewayNotification = 100,
    KeepAlive = 101,
}

impl TryFrom<u32> for OperationType {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            2 => Ok(OperationType::RegisterAppRequest),
            3 => Ok(OperationType::StartSessionRequest),
            4 => Ok(OperationType::CloseSessionRequest),
            18 => Ok(OperationType::VersionRequest),
            30 => Ok(OperationType::CnTimeRequest),
            31 => Ok(OperationType::CnTimeConfirm),
            32 => Ok(OperationType::CnNodeNotification),
            33 => Ok(OperationType::CnRmiRequest),
            34 => Ok(OperationType::CnRmiResponse),
            38 => Ok(OperationType::CnRpdoRequest),
            39 => Ok(OperationType::CnRpdoConfirm),
            40 => Ok(OperationType::CnRpdoNotification),
            41 => Ok(OperationType::CnAlarmNotification),
            52 => Ok(OperationType::RegisterAppConfirm),
            53 => Ok(OperationType::StartSessionConfirm),
            54 => Ok(OperationType::CloseSessionConfirm),
            68 => Ok(OperationType::VersionConfirm),
            100 => Ok(OperationType::GatewayNotification),
            101 => Ok(OperationType::KeepAlive),
            _ => Err(()),
        }
    }
}

impl OperationType {
    /// Returns `true` for kinds the gateway sends in answer to a request.
    pub fn is_response(self) -> bool {
        matches!(
            self,
            OperationType::RegisterAppConfirm
                | OperationType::StartSessionConfirm
                | OperationType::CloseSessionConfirm
                | OperationType::VersionConfirm
                | OperationType::CnTimeConfirm
                | OperationType::CnRmiResponse
                | OperationType::CnRpdoConfirm
        )
    }

    /// Returns `true` for unsolicited gateway-to-app messages.
    pub fn is_notification(self) -> bool {
        matches!(
            self,
            OperationType::CnNodeNotification
                | OperationType::CnRpdoNotification
                | OperationType::CnAlarmNotification
                | OperationType::GatewayNotification
        )
    }
}

// ── Result codes ──────────────────────────────────────────────────────────────

/// Result carried in the operation header (`GatewayOperation.result`).
///
/// An absent result on the wire means [`ResultCode::Ok`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u32)]
pub enum ResultCode {
    #[default]
    Ok = 0,
    BadRequest = 1,
    InternalError = 2,
    NotReachable = 3,
    OtherSession = 4,
    NotAllowed = 5,
    NoResources = 6,
    NotExist = 7,
    RmiError = 8,
}

impl TryFrom<u32> for ResultCode {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0 => Ok(ResultCode::Ok),
            1 => Ok(ResultCode::BadRequest),
            2 => Ok(ResultCode::InternalError),
            3 => Ok(ResultCode::NotReachable),
            4 => Ok(ResultCode::OtherSession),
            5 => Ok(ResultCode::NotAllowed),
            6 => Ok(ResultCode::NoResources),
            7 => Ok(ResultCode::NotExist),
            8 => Ok(ResultCode::RmiError),
            _ => Err(()),
        }
    }
}

// ── Operation header ──────────────────────────────────────────────────────────

/// Decoded operation header minus the kind (which is implied by [`Body`]).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Operation {
    /// Outcome reported by the gateway; always `Ok` on requests.
    pub result: ResultCode,
    /// Optional human-readable detail accompanying an error result.
    pub description: Option<String>,
    /// Request/response correlation number.  Notifications carry none.
    pub reference: Option<u32>,
}

impl Operation {
    /// Header for an outbound request with the given reference.
    pub fn request(reference: u32) -> Self {
        Self {
            result: ResultCode::Ok,
            description: None,
            reference: Some(reference),
        }
    }

    /// Header for an unreferenced message (keep-alive, notification).
    pub fn unreferenced() -> Self {
        Self::default()
    }

    /// Header for a reply to `reference` carrying `result`.
    pub fn reply(reference: Option<u32>, result: ResultCode) -> Self {
        Self {
            result,
            description: None,
            reference,
        }
    }
}

/// Wire representation of the operation header.
#[derive(Clone, PartialEq, ::prost::Message)]
pub(crate) struct GatewayOperation {
    #[prost(uint32, optional, tag = "1")]
    pub r#type: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub result: Option<u32>,
    #[prost(string, optional, tag = "3")]
    pub result_description: Option<String>,
    #[prost(uint32, optional, tag = "4")]
    pub reference: Option<u32>,
}

// ── Per-kind bodies ───────────────────────────────────────────────────────────

/// REGISTER_APP_REQUEST (2): registers this app's UUID with the gateway.
/// The gateway checks `pin` against its configured PIN.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterAppRequest {
    #[prost(bytes = "vec", required, tag = "1")]
    pub uuid: Vec<u8>,
    #[prost(uint32, required, tag = "2")]
    pub pin: u32,
    #[prost(string, required, tag = "3")]
    pub devicename: String,
}

/// START_SESSION_REQUEST (3).  `takeover` asks the gateway to evict any
/// other app currently holding the session.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartSessionRequest {
    #[prost(bool, optional, tag = "1")]
    pub takeover: Option<bool>,
}

/// START_SESSION_CONFIRM (53).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartSessionConfirm {
    #[prost(string, optional, tag = "1")]
    pub devicename: Option<String>,
    #[prost(bool, optional, tag = "2")]
    pub resumed: Option<bool>,
}

/// VERSION_CONFIRM (68).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VersionConfirm {
    #[prost(uint32, required, tag = "1")]
    pub gateway_version: u32,
    #[prost(string, required, tag = "2")]
    pub serial_number: String,
    #[prost(uint32, required, tag = "3")]
    pub comfo_net_version: u32,
}

/// CN_TIME_REQUEST (30).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnTimeRequest {
    #[prost(uint32, optional, tag = "1")]
    pub set_time: Option<u32>,
}

/// CN_TIME_CONFIRM (31).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnTimeConfirm {
    #[prost(uint32, required, tag = "1")]
    pub current_time: u32,
}

/// CN_NODE_NOTIFICATION (32): a ComfoNet node came online or changed mode.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnNodeNotification {
    #[prost(uint32, required, tag = "1")]
    pub node_id: u32,
    #[prost(uint32, optional, tag = "2")]
    pub product_id: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub zone_id: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub mode: Option<u32>,
}

/// CN_RMI_REQUEST (33): raw remote-method call addressed to a ComfoNet node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnRmiRequest {
    #[prost(uint32, required, tag = "1")]
    pub node_id: u32,
    #[prost(bytes = "vec", required, tag = "2")]
    pub message: Vec<u8>,
}

/// CN_RMI_RESPONSE (34).  A non-zero `result` is an RMI-level failure.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnRmiResponse {
    #[prost(uint32, optional, tag = "1")]
    pub result: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub message: Option<Vec<u8>>,
}

/// CN_RPDO_REQUEST (38): subscribe to a sensor PDO.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnRpdoRequest {
    #[prost(uint32, required, tag = "1")]
    pub pdid: u32,
    #[prost(uint32, optional, tag = "2")]
    pub zone: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub r#type: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub timeout: Option<u32>,
}

/// CN_RPDO_NOTIFICATION (40): a new value for a subscribed PDO.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnRpdoNotification {
    #[prost(uint32, required, tag = "1")]
    pub pdid: u32,
    #[prost(bytes = "vec", required, tag = "2")]
    pub data: Vec<u8>,
    #[prost(uint32, optional, tag = "3")]
    pub zone: Option<u32>,
}

/// CN_ALARM_NOTIFICATION (41).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CnAlarmNotification {
    #[prost(uint32, optional, tag = "1")]
    pub zone: Option<u32>,
    #[prost(uint32, optional, tag = "2")]
    pub product_id: Option<u32>,
    #[prost(string, optional, tag = "4")]
    pub serial_number: Option<String>,
    #[prost(uint32, optional, tag = "7")]
    pub error_id: Option<u32>,
    #[prost(uint32, optional, tag = "8")]
    pub node_id: Option<u32>,
}

/// GATEWAY_NOTIFICATION (100).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GatewayNotification {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub push_uuids: Vec<Vec<u8>>,
}

// ── Message envelope ──────────────────────────────────────────────────────────

/// Kind-specific payload.  Kinds whose protobuf body is empty are unit
/// variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    RegisterAppRequest(RegisterAppRequest),
    RegisterAppConfirm,
    StartSessionRequest(StartSessionRequest),
    StartSessionConfirm(StartSessionConfirm),
    CloseSessionRequest,
    CloseSessionConfirm,
    VersionRequest,
    VersionConfirm(VersionConfirm),
    CnTimeRequest(CnTimeRequest),
    CnTimeConfirm(CnTimeConfirm),
    CnNodeNotification(CnNodeNotification),
    CnRmiRequest(CnRmiRequest),
    CnRmiResponse(CnRmiResponse),
    CnRpdoRequest(CnRpdoRequest),
    CnRpdoConfirm,
    CnRpdoNotification(CnRpdoNotification),
    CnAlarmNotification(CnAlarmNotification),
    GatewayNotification(GatewayNotification),
    KeepAlive,
}

impl Body {
    /// Returns the [`OperationType`] for this body.
    pub fn kind(&self) -> OperationType {
        match self {
            Body::RegisterAppRequest(_) => OperationType::RegisterAppRequest,
            Body::RegisterAppConfirm => OperationType::RegisterAppConfirm,
            Body::StartSessionRequest(_) => OperationType::StartSessionRequest,
            Body::StartSessionConfirm(_) => OperationType::StartSessionConfirm,
            Body::CloseSessionRequest => OperationType::CloseSessionRequest,
            Body::CloseSessionConfirm => OperationType::CloseSessionConfirm,
            Body::VersionRequest => OperationType::VersionRequest,
            Body::VersionConfirm(_) => OperationType::VersionConfirm,
            Body::CnTimeRequest(_) => OperationType::CnTimeRequest,
            Body::CnTimeConfirm(_) => OperationType::CnTimeConfirm,
            Body::CnNodeNotification(_) => OperationType::CnNodeNotification,
            Body::CnRmiRequest(_) => OperationType::CnRmiRequest,
            Body::CnRmiResponse(_) => OperationType::CnRmiResponse,
            Body::CnRpdoRequest(_) => OperationType::CnRpdoRequest,
            Body::CnRpdoConfirm => OperationType::CnRpdoConfirm,
            Body::CnRpdoNotification(_) => OperationType::CnRpdoNotification,
            Body::CnAlarmNotification(_) => OperationType::CnAlarmNotification,
            Body::GatewayNotification(_) => OperationType::GatewayNotification,
            Body::KeepAlive => OperationType::KeepAlive,
        }
    }
}

/// One complete gateway frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Sender UUID (the app for requests, the gateway for replies).
    pub src: Uuid,
    /// Recipient UUID.
    pub dst: Uuid,
    pub operation: Operation,
    pub body: Body,
}

impl Message {
    /// Builds a referenced request from `src` to `dst`.
    pub fn request(src: Uuid, dst: Uuid, reference: u32, body: Body) -> Self {
        Self {
            src,
            dst,
            operation: Operation::request(reference),
            body,
        }
    }

    /// Returns the kind of this message.
    pub fn kind(&self) -> OperationType {
        self.body.kind()
    }

    /// Shortcut for `self.operation.reference`.
    pub fn reference(&self) -> Option<u32> {
        self.operation.reference
    }

    /// Shortcut for `self.operation.result`.
    pub fn result(&self) -> ResultCode {
        self.operation.result
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_type_try_from_round_trips_every_kind() {
        let kinds = [
            OperationType::RegisterAppRequest,
            OperationType::StartSessionRequest,
            OperationType::CloseSessionRequest,
            OperationType::VersionRequest,
            OperationType::CnTimeRequest,
            OperationType::CnTimeConfirm,
            OperationType::CnNodeNotification,
            OperationType::CnRmiRequest,
            OperationType::CnRmiResponse,
            OperationType::CnRpdoRequest,
            OperationType::CnRpdoConfirm,
            OperationType::CnRpdoNotification,
            OperationType::CnAlarmNotification,
            OperationType::RegisterAppConfirm,
            OperationType::StartSessionConfirm,
            OperationType::CloseSessionConfirm,
            OperationType::VersionConfirm,
            OperationType::GatewayNotification,
            OperationType::KeepAlive,
        ];
        for kind in kinds {
            assert_eq!(OperationType::try_from(kind as u32), Ok(kind));
        }
    }

    #[test]
    fn test_notification_and_version_confirm_codes_match_gateway() {
        assert_eq!(OperationType::CnRpdoNotification as u32, 40);
        assert_eq!(OperationType::VersionConfirm as u32, 68);
    }

    #[test]
    fn test_unknown_operation_type_is_rejected() {
        assert!(OperationType::try_from(0).is_err());
        assert!(OperationType::try_from(999).is_err());
    }

    #[test]
    fn test_result_code_default_is_ok() {
        assert_eq!(ResultCode::default(), ResultCode::Ok);
        assert_eq!(ResultCode::try_from(4), Ok(ResultCode::OtherSession));
        assert!(ResultCode::try_from(42).is_err());
    }

    #[test]
    fn test_response_and_notification_classification() {
        assert!(OperationType::CnRpdoConfirm.is_response());
        assert!(!OperationType::CnRpdoNotification.is_response());
        assert!(OperationType::CnRpdoNotification.is_notification());
        assert!(!OperationType::KeepAlive.is_notification());
        assert!(!OperationType::KeepAlive.is_response());
    }

    #[test]
    fn test_body_kind_matches_variant() {
        assert_eq!(Body::KeepAlive.kind(), OperationType::KeepAlive);
        assert_eq!(
            Body::CnRpdoNotification(CnRpdoNotification {
                pdid: 117,
                data: vec![10],
                zone: None,
            })
            .kind(),
            OperationType::CnRpdoNotification
        );
    }
}
