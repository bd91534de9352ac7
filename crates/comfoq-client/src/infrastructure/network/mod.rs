//! Network adapters behind the application's link traits.
//!
//! - `discovery` – UDP broadcast probe that finds the gateway.
//! - `connection` – [`TcpConnector`]/[`TcpLink`], the production transport.
//! - `mock` – [`MockGateway`], an in-memory gateway used by the tests.

pub mod connection;
pub mod discovery;
pub mod mock;

pub use connection::{TcpConnector, TcpLink};
pub use discovery::{discover_gateway, DiscoveryError};
pub use mock::{MockGateway, MockLink};
