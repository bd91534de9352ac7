//! Events delivered to the consumer of a running client.

use comfoq_core::{SensorId, SensorValue};
use serde::Serialize;

/// A debounced sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorUpdate {
    pub sensor_id: SensorId,
    /// Normalised camelCase key, e.g. `fanExhaustDuty`.
    pub name: String,
    /// Gateway label, e.g. `SENSOR_FAN_EXHAUST_DUTY`.
    pub label: String,
    pub value: SensorValue,
    pub unit: String,
}

/// Gateway firmware information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub comfonet_version: u32,
    pub serial_number: String,
    pub gateway_version: u32,
}

/// Why the client stopped talking to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Another app took over the session; no reconnect is attempted.
    SessionStolen,
    /// The gateway rejected the PIN.
    AuthenticationFailed,
    /// The handshake could not complete.
    ConnectionFailed(String),
    /// The link dropped and every reconnect attempt failed.
    ReconnectExhausted { attempts: u32 },
    /// [`crate::application::session::ClientHandle::shutdown`] was called.
    Shutdown,
}

/// Everything the client reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// `true` once a session is active, `false` whenever it stops being so.
    ConnectionStateChanged(bool),
    SensorUpdate(SensorUpdate),
    VersionInfo(VersionInfo),
    Disconnected(DisconnectReason),
}
