//! Protocol module containing message types, the frame codec and the
//! discovery datagrams.

pub mod codec;
pub mod discovery;
pub mod frame;
pub mod messages;
pub mod reference;

pub use codec::{decode_message, encode_message, peek_frame_len, ProtocolError};
pub use discovery::GatewayAnnouncement;
pub use frame::FrameDecoder;
pub use messages::*;
pub use reference::ReferenceCounter;
