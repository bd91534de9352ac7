//! Application layer: the gateway session and everything it coordinates.
//!
//! # What lives here?
//!
//! - **`session`** – The actor that drives discovery, the register/start
//!   handshake, keep-alives, reconnects and shutdown.  [`session::Client`]
//!   spawns it and hands back a [`session::ClientHandle`].
//!
//! - **`subscriptions`** – Which sensors are subscribed, and the per-sensor
//!   debounce window that coalesces bursts of notifications.
//!
//! - **`commands`** – Resolves command names to RMI requests and checks the
//!   gateway's acknowledgement.
//!
//! - **`pending`** – Requests waiting for a reply, keyed by reference.
//!
//! - **`link`** – The traits the session uses to reach the network.  The
//!   real TCP/UDP implementation is injected from the infrastructure layer.

pub mod commands;
pub mod error;
pub mod events;
pub mod link;
pub mod pending;
pub mod session;
pub mod subscriptions;
