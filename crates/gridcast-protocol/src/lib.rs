//! Wire protocol for Gridcast.
//!
//! This crate defines the bytes that clients and servers exchange:
//!
//! - **Types** ([`Message`], [`Movement`], [`StateSnapshot`], [`Chat`]):
//!   the closed set of messages.
//! - **Header** ([`Header`]): the fixed 8-byte frame prefix that tells a
//!   stream reader how many payload bytes follow.
//! - **Codec** ([`encode`], [`decode_payload`], [`decode_frame`]):
//!   conversion between messages and frames.
//! - **Errors** ([`ProtocolError`]): every way a frame can be malformed.
//!
//! The protocol layer does no I/O. It sits between the transport (raw bytes)
//! and the session layer (who is where):
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Session (registry)
//! ```

mod codec;
mod error;
mod header;
mod types;

pub use codec::{
    MOVEMENT_PAYLOAD_LEN, decode_frame, decode_payload, encode, encode_payload,
};
pub use error::ProtocolError;
pub use header::{HEADER_SIZE, Header, MAX_PAYLOAD_LEN};
pub use types::{
    Chat, Direction, Message, MessageType, Movement, PROTOCOL_VERSION,
    ParticipantId, ParticipantState, Position, StateSnapshot,
};
