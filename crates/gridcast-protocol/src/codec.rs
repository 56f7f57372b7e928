//! Binary encoding and decoding of messages.
//!
//! A frame is an 8-byte [`Header`] followed by exactly `payload_len` payload
//! bytes. Payload layouts (all integers big-endian):
//!
//! ```text
//! Movement       participant:u32 | direction:u8 | reserved:u8[3]
//! StateSnapshot  focus:u32 | count:u32 | count x (participant:u32 | x:i32 | y:i32)
//! Chat           participant:u32 | text:u8[payload_len - 4]
//! ```
//!
//! Encoding is pure and infallible. Decoding is split in two so that a
//! stream reader can validate the header before it reads the payload:
//! [`Header::decode`] first, then [`decode_payload`] once exactly
//! `payload_len` bytes are in hand. [`decode_frame`] does both for a
//! buffer that already holds a whole frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    Chat, Direction, HEADER_SIZE, Header, Message, MessageType, Movement,
    ParticipantId, ParticipantState, Position, ProtocolError, StateSnapshot,
};

/// Movement payloads are fixed-width: id, direction, three zero bytes.
pub const MOVEMENT_PAYLOAD_LEN: usize = 8;
const MOVEMENT_RESERVED_LEN: usize = 3;

/// Bytes per snapshot entry: id, x, y.
const SNAPSHOT_ENTRY_LEN: usize = 12;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn payload_len(message: &Message) -> usize {
    match message {
        Message::Movement(_) => MOVEMENT_PAYLOAD_LEN,
        Message::StateSnapshot(snapshot) => {
            8 + snapshot.participants.len() * SNAPSHOT_ENTRY_LEN
        }
        Message::Chat(chat) => 4 + chat.text.len(),
    }
}

fn put_payload(buf: &mut BytesMut, message: &Message) {
    match message {
        Message::Movement(movement) => {
            buf.put_u32(movement.participant.0);
            buf.put_u8(movement.direction.code());
            buf.put_bytes(0, MOVEMENT_RESERVED_LEN);
        }
        Message::StateSnapshot(snapshot) => {
            buf.put_u32(snapshot.focus.0);
            buf.put_u32(snapshot.participants.len() as u32);
            for entry in &snapshot.participants {
                buf.put_u32(entry.participant.0);
                buf.put_i32(entry.position.x);
                buf.put_i32(entry.position.y);
            }
        }
        Message::Chat(chat) => {
            buf.put_u32(chat.participant.0);
            buf.put_slice(&chat.text);
        }
    }
}

/// Encodes only the payload of `message`, without a header.
pub fn encode_payload(message: &Message) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload_len(message));
    put_payload(&mut buf, message);
    buf.freeze()
}

/// Encodes `message` as a complete frame: header followed by payload.
///
/// The header's `payload_len` is always the exact length of the payload
/// that follows it.
pub fn encode(message: &Message) -> Bytes {
    let len = payload_len(message);
    debug_assert!(len <= u32::MAX as usize);
    let header = Header::new(message.message_type(), len as u32);

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + len);
    header.put(&mut buf);
    put_payload(&mut buf, message);
    debug_assert_eq!(buf.len(), HEADER_SIZE + len);
    buf.freeze()
}

impl Message {
    /// Shorthand for [`encode`].
    pub fn encode(&self) -> Bytes {
        encode(self)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Fails with `Truncated` unless `needed` more bytes are readable.
///
/// The `Buf` getters panic on short input, so every read is guarded.
fn ensure(buf: &[u8], needed: usize) -> Result<(), ProtocolError> {
    let available = buf.remaining();
    if available < needed {
        return Err(ProtocolError::Truncated { needed, available });
    }
    Ok(())
}

fn get_u32(buf: &mut &[u8]) -> Result<u32, ProtocolError> {
    ensure(*buf, 4)?;
    Ok(buf.get_u32())
}

fn get_i32(buf: &mut &[u8]) -> Result<i32, ProtocolError> {
    ensure(*buf, 4)?;
    Ok(buf.get_i32())
}

fn get_u8(buf: &mut &[u8]) -> Result<u8, ProtocolError> {
    ensure(*buf, 1)?;
    Ok(buf.get_u8())
}

/// Fails with `SizeMismatch` if anything is left unread.
fn finish(buf: &[u8], payload_len: usize) -> Result<(), ProtocolError> {
    if buf.has_remaining() {
        return Err(ProtocolError::SizeMismatch {
            expected: payload_len - buf.remaining(),
            actual: payload_len,
        });
    }
    Ok(())
}

fn decode_movement(payload: &[u8]) -> Result<Movement, ProtocolError> {
    let mut buf = payload;
    let participant = ParticipantId(get_u32(&mut buf)?);
    let code = get_u8(&mut buf)?;
    // Reserved bytes are skipped, never interpreted.
    ensure(buf, MOVEMENT_RESERVED_LEN)?;
    buf.advance(MOVEMENT_RESERVED_LEN);

    let direction = Direction::from_code(code)
        .ok_or(ProtocolError::InvalidPayload("direction code out of range"))?;
    finish(buf, payload.len())?;

    Ok(Movement {
        participant,
        direction,
    })
}

fn decode_snapshot(payload: &[u8]) -> Result<StateSnapshot, ProtocolError> {
    let mut buf = payload;
    let focus = ParticipantId(get_u32(&mut buf)?);
    let count = get_u32(&mut buf)? as usize;

    // `count` is untrusted; never reserve more than the bytes can hold.
    let mut participants =
        Vec::with_capacity(count.min(buf.remaining() / SNAPSHOT_ENTRY_LEN));
    for _ in 0..count {
        let participant = ParticipantId(get_u32(&mut buf)?);
        let x = get_i32(&mut buf)?;
        let y = get_i32(&mut buf)?;
        participants.push(ParticipantState {
            participant,
            position: Position::new(x, y),
        });
    }
    finish(buf, payload.len())?;

    Ok(StateSnapshot {
        focus,
        participants,
    })
}

fn decode_chat(payload: &[u8]) -> Result<Chat, ProtocolError> {
    let mut buf = payload;
    let participant = ParticipantId(get_u32(&mut buf)?);
    Ok(Chat {
        participant,
        text: buf.to_vec(),
    })
}

/// Decodes a payload whose header has already been validated.
///
/// # Errors
/// - [`ProtocolError::SizeMismatch`] if `payload.len()` differs from
///   `header.payload_len`, or bytes remain after a fixed-layout payload
/// - [`ProtocolError::Truncated`] if a field runs past the payload end
/// - [`ProtocolError::InvalidPayload`] for a direction code above 3
pub fn decode_payload(
    header: &Header,
    payload: &[u8],
) -> Result<Message, ProtocolError> {
    if payload.len() != header.payload_len as usize {
        return Err(ProtocolError::SizeMismatch {
            expected: header.payload_len as usize,
            actual: payload.len(),
        });
    }

    match header.message_type {
        MessageType::Movement => decode_movement(payload).map(Message::Movement),
        MessageType::StateSnapshot => {
            decode_snapshot(payload).map(Message::StateSnapshot)
        }
        MessageType::Chat => decode_chat(payload).map(Message::Chat),
    }
}

/// Decodes one complete frame held in `bytes`.
///
/// # Errors
/// Header errors as in [`Header::decode`]; [`ProtocolError::Truncated`] if
/// fewer payload bytes follow than declared; [`ProtocolError::SizeMismatch`]
/// if more follow; otherwise as in [`decode_payload`].
pub fn decode_frame(bytes: &[u8]) -> Result<Message, ProtocolError> {
    let header = Header::decode(bytes)?;
    let body = &bytes[HEADER_SIZE..];
    let declared = header.payload_len as usize;

    if body.len() < declared {
        return Err(ProtocolError::Truncated {
            needed: declared,
            available: body.len(),
        });
    }
    decode_payload(&header, body)
}
