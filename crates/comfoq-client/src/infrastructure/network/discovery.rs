//! UDP broadcast gateway discovery.
//!
//! The client sends a `SearchGatewayRequest` datagram to the broadcast
//! address on port 56747 and waits for the first gateway to answer.
//!
//! # How UDP discovery works (for beginners)
//!
//! UDP is connectionless and does not guarantee delivery, which makes it a
//! good fit for "is anyone out there?" broadcasts:
//!
//! 1. The client sends one packet to the LAN broadcast address (e.g.
//!    `255.255.255.255`).  Every device on the segment receives it.
//!
//! 2. A gateway listening on port 56747 answers with a unicast datagram
//!    holding its IP address, UUID and firmware version.
//!
//! 3. The client now knows where to open the TCP session.
//!
//! Replies that do not parse are ignored; the wait continues until the
//! overall timeout.

use std::net::SocketAddr;
use std::time::Duration;

use comfoq_core::protocol::discovery::{decode_search_response, encode_search_request};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::application::link::DeviceDescriptor;

/// Error type for gateway discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound or configured.
    #[error("failed to set up discovery socket: {0}")]
    Socket(#[source] std::io::Error),
    /// The probe could not be sent.
    #[error("failed to send discovery probe to {addr}: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// No valid reply arrived in time.
    #[error("no gateway answered within {0:?}")]
    Timeout(Duration),
}

/// Broadcasts a probe to `broadcast` and returns the first gateway that
/// answers with a valid reply.
///
/// # Errors
///
/// Returns [`DiscoveryError::Timeout`] if nothing valid arrives within
/// `timeout`, or a socket error.
pub async fn discover_gateway(
    broadcast: SocketAddr,
    timeout: Duration,
) -> Result<DeviceDescriptor, DiscoveryError> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(DiscoveryError::Socket)?;
    socket.set_broadcast(true).map_err(DiscoveryError::Socket)?;

    socket
        .send_to(&encode_search_request(), broadcast)
        .await
        .map_err(|source| DiscoveryError::Send {
            addr: broadcast,
            source,
        })?;
    debug!("discovery probe sent to {broadcast}");

    let deadline = Instant::now() + timeout;
    let mut buf = vec![0u8; 1024];
    loop {
        let (len, src) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => return Err(DiscoveryError::Timeout(timeout)),
            Ok(Err(e)) => {
                warn!("discovery recv error: {e}");
                continue;
            }
            Ok(Ok(pair)) => pair,
        };

        let datagram = &buf[..len];
        match decode_search_response(datagram) {
            Ok(announcement) => {
                let host = if announcement.address.is_empty() {
                    src.ip().to_string()
                } else {
                    announcement.address
                };
                info!(
                    "gateway {} found at {host} (version {})",
                    announcement.uuid, announcement.version
                );
                return Ok(DeviceDescriptor {
                    host,
                    uuid: announcement.uuid,
                    version: Some(announcement.version),
                });
            }
            Err(e) => debug!("ignoring datagram from {src}: {e}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
