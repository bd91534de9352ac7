//! Errors surfaced to callers of the session client.

use std::time::Duration;

use comfoq_core::protocol::{OperationType, ProtocolError, ResultCode};
use comfoq_core::UnknownCommand;
use thiserror::Error;

/// Every failure a [`crate::application::session::ClientHandle`] call can
/// report.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// No gateway answered the discovery broadcast.
    #[error("gateway discovery timed out after {0:?}")]
    DiscoveryTimeout(Duration),

    /// The TCP connection could not be established or was lost.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The gateway refused to register this app for a reason other than
    /// a bad PIN.
    #[error("app registration rejected: {0:?}")]
    Registration(ResultCode),

    /// The gateway rejected the PIN or the session start.
    #[error("authentication failed: gateway rejected the PIN")]
    Authentication,

    /// A frame could not be decoded.
    #[error("protocol decode error: {0}")]
    ProtocolDecode(ProtocolError),

    /// Another app took over the gateway session.
    #[error("session taken over by another app")]
    SessionStolen,

    /// The gateway did not answer a request within the retry budget.
    #[error("{kind:?} timed out")]
    RequestTimeout { kind: OperationType },

    /// The gateway answered a request with a non-OK result.
    #[error("{kind:?} rejected by gateway: {result:?}")]
    Rejected {
        kind: OperationType,
        result: ResultCode,
    },

    /// The command name is not in the command table.
    #[error(transparent)]
    UnknownCommand(#[from] UnknownCommand),

    /// The operation needs an active session.
    #[error("no active session")]
    NotActive,

    /// The operation was abandoned because the client is shutting down.
    #[error("operation cancelled")]
    Cancelled,

    /// The client has shut down.
    #[error("client closed")]
    Closed,
}
