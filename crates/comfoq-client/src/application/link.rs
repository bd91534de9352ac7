//! Transport seam between the session logic and the network.
//!
//! The session state machine only ever talks to a [`DeviceConnector`] and
//! the [`DeviceLink`] it hands out.  The TCP implementation lives in
//! `infrastructure::network`; tests plug in an in-memory gateway instead.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use comfoq_core::protocol::{Message, ProtocolError};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while finding or reaching the gateway.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No gateway answered the discovery broadcast in time.
    #[error("no gateway answered discovery within {0:?}")]
    DiscoveryTimeout(Duration),

    /// TCP connect was refused or failed.
    #[error("failed to connect to gateway at {addr}: {reason}")]
    ConnectFailed { addr: String, reason: String },

    /// TCP connect did not complete in time.
    #[error("timed out connecting to gateway at {0}")]
    ConnectTimeout(String),

    /// An I/O error occurred on an established link.
    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link was already closed.
    #[error("link closed")]
    Closed,
}

/// Identity of a gateway found by discovery or given in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// IP address or host name.
    pub host: String,
    pub uuid: Uuid,
    /// Firmware version reported during discovery.
    pub version: Option<u32>,
}

/// What a link produced on its inbound side.
#[derive(Debug)]
pub enum LinkEvent {
    /// A complete, decoded message.
    Message(Message),
    /// One frame could not be decoded and was dropped; the stream is intact.
    Skipped(ProtocolError),
    /// The stream is out of sync and can no longer be read.
    Corrupt(ProtocolError),
    /// The peer closed the connection or the link was closed locally.
    Closed,
}

/// Finds gateways and opens links to them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Broadcasts a discovery probe to `broadcast` and returns the first
    /// gateway that answers.
    async fn discover(
        &self,
        broadcast: SocketAddr,
        timeout: Duration,
    ) -> Result<DeviceDescriptor, LinkError>;

    /// Opens a framed byte link to the gateway at `host:port`.
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn DeviceLink>, LinkError>;
}

/// A connected, framed link to one gateway.
#[async_trait]
pub trait DeviceLink: Send {
    /// Writes one already-encoded frame.
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), LinkError>;

    /// Waits for the next inbound event.
    ///
    /// Must be cancel-safe: dropping the future before it completes must not
    /// lose a message.  After [`LinkEvent::Closed`] or
    /// [`LinkEvent::Corrupt`] every further call returns `Closed`.
    async fn next_event(&mut self) -> LinkEvent;

    /// Closes the link.  Idempotent.
    async fn close(&mut self);
}
