//! # comfoq-core
//!
//! Shared library for talking to a Zehnder ComfoAir Q ventilation unit
//! through its ComfoConnect LAN C gateway.  It contains the frame codec,
//! the discovery datagrams, and the domain tables for sensors and commands.
//!
//! The crate does no I/O.  Sockets, timers and the session state machine
//! live in `comfoq-client`.
//!
//! # Architecture overview (for beginners)
//!
//! - **`protocol`** – How bytes travel over the network.  Every message is a
//!   length-prefixed frame holding two UUIDs, a protobuf operation header and
//!   a protobuf body.  [`protocol::FrameDecoder`] turns a raw TCP stream back
//!   into typed [`protocol::Message`] values.
//!
//! - **`domain`** – The sensor catalogue (ids, units, value layouts), the
//!   command table (names and RMI payloads), and the naming rules that turn
//!   gateway labels like `SENSOR_FAN_EXHAUST_DUTY` into `fanExhaustDuty`.

pub mod domain;
pub mod protocol;

pub use domain::commands::{Command, UnknownCommand, COMMAND_GROUP};
pub use domain::sensors::{SensorId, SensorValue};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::{Body, Message, OperationType, ResultCode};
