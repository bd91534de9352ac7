//! Encoding of the UDP gateway discovery exchange.
//!
//! The app broadcasts a `SearchGatewayRequest` to port 56747; each gateway
//! on the LAN answers with its address, UUID and firmware version.  Both
//! datagrams are bare protobuf `DiscoveryOperation` messages with no frame
//! header.

use prost::Message as _;
use uuid::Uuid;

use crate::protocol::codec::ProtocolError;

#[derive(Clone, PartialEq, ::prost::Message)]
struct DiscoveryOperation {
    #[prost(message, optional, tag = "1")]
    search_gateway_request: Option<SearchGatewayRequest>,
    #[prost(message, optional, tag = "2")]
    search_gateway_response: Option<SearchGatewayResponse>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
struct SearchGatewayRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
struct SearchGatewayResponse {
    #[prost(string, required, tag = "1")]
    ipaddress: String,
    #[prost(bytes = "vec", required, tag = "2")]
    uuid: Vec<u8>,
    #[prost(uint32, required, tag = "3")]
    version: u32,
}

/// What a gateway reports about itself in a discovery reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayAnnouncement {
    /// Address the gateway claims; may be empty, in which case the datagram
    /// source address should be used.
    pub address: String,
    pub uuid: Uuid,
    pub version: u32,
}

/// Returns the discovery probe datagram.
pub fn encode_search_request() -> Vec<u8> {
    DiscoveryOperation {
        search_gateway_request: Some(SearchGatewayRequest {}),
        search_gateway_response: None,
    }
    .encode_to_vec()
}

/// Encodes a discovery reply.  Used by test gateways.
pub fn encode_search_response(announcement: &GatewayAnnouncement) -> Vec<u8> {
    DiscoveryOperation {
        search_gateway_request: None,
        search_gateway_response: Some(SearchGatewayResponse {
            ipaddress: announcement.address.clone(),
            uuid: announcement.uuid.as_bytes().to_vec(),
            version: announcement.version,
        }),
    }
    .encode_to_vec()
}

/// Returns `true` if `bytes` is a discovery probe.
pub fn is_search_request(bytes: &[u8]) -> bool {
    DiscoveryOperation::decode(bytes)
        .map(|op| op.search_gateway_request.is_some())
        .unwrap_or(false)
}

/// Parses a discovery reply.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if the datagram is not a
/// search response or its UUID is not 16 bytes.
pub fn decode_search_response(bytes: &[u8]) -> Result<GatewayAnnouncement, ProtocolError> {
    let op = DiscoveryOperation::decode(bytes)
        .map_err(|e| ProtocolError::MalformedPayload(format!("discovery datagram: {e}")))?;
    let resp = op.search_gateway_response.ok_or_else(|| {
        ProtocolError::MalformedPayload("discovery datagram is not a search response".into())
    })?;
    let uuid = Uuid::from_slice(&resp.uuid).map_err(|_| {
        ProtocolError::MalformedPayload(format!("gateway uuid has {} bytes", resp.uuid.len()))
    })?;
    Ok(GatewayAnnouncement {
        address: resp.ipaddress,
        uuid,
        version: resp.version,
    })
}
