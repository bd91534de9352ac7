//! comfoq-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does comfoq-client do? (for beginners)
//!
//! A ComfoAir Q ventilation unit is reachable on the LAN through its
//! ComfoConnect gateway.  Only one app at a time may hold a session with the
//! gateway.  The client:
//!
//! 1. Finds the gateway with a UDP broadcast (unless its address is known).
//! 2. Connects over TCP, registers this app with the gateway PIN and starts
//!    a session, taking over from any other app.
//! 3. Subscribes to the configured sensors and forwards their values,
//!    debounced, as [`application::events::ClientEvent`]s.
//! 4. Sends ventilation commands (fan speed, boost, bypass, ...) on request.
//! 5. Keeps the session alive and reconnects when the link drops, but stops
//!    for good if another app takes the session over.

/// Application layer: session state machine, subscriptions, commands.
pub mod application;

/// Infrastructure layer: sockets and configuration files.
pub mod infrastructure;

pub use application::error::SessionError;
pub use application::events::{ClientEvent, DisconnectReason, SensorUpdate, VersionInfo};
pub use application::session::{
    Client, ClientConfig, ClientHandle, DeviceIdentity, SessionState, SessionStatus, SessionTiming,
};
