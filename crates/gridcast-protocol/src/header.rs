//! The fixed 8-byte frame header.
//!
//! ```text
//! 0       2       4               8
//! +-------+-------+---------------+
//! |version| type  |  payload_len  |   all big-endian
//! +-------+-------+---------------+
//! ```

use bytes::{Buf, BufMut};

use crate::{MessageType, PROTOCOL_VERSION, ProtocolError};

/// Size of the serialized header.
pub const HEADER_SIZE: usize = 8;

/// Largest payload a header may declare (1 MiB).
///
/// Checked at header decode time so that a peer cannot make the receiver
/// allocate an arbitrary buffer before the payload is even read.
pub const MAX_PAYLOAD_LEN: u32 = 1 << 20;

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub message_type: MessageType,
    pub payload_len: u32,
}

impl Header {
    /// A header for the current protocol version.
    pub fn new(message_type: MessageType, payload_len: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_type,
            payload_len,
        }
    }

    /// Serializes the header in network byte order.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        self.put(&mut &mut bytes[..]);
        bytes
    }

    /// Appends the header to `buf`.
    pub fn put(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.version);
        buf.put_u16(self.message_type.tag());
        buf.put_u32(self.payload_len);
    }

    /// Parses a header from the first [`HEADER_SIZE`] bytes of `bytes`.
    ///
    /// Validation order is fixed: length, then version, then type tag,
    /// then the payload size limit. A frame with both a bad version and a
    /// bad tag therefore reports [`ProtocolError::VersionMismatch`].
    ///
    /// # Errors
    /// - [`ProtocolError::Truncated`] if fewer than 8 bytes are given
    /// - [`ProtocolError::VersionMismatch`] if the version is not ours
    /// - [`ProtocolError::UnknownType`] for an unrecognised tag
    /// - [`ProtocolError::SizeMismatch`] if the payload exceeds
    ///   [`MAX_PAYLOAD_LEN`]
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let mut buf = &bytes[..HEADER_SIZE];
        let version = buf.get_u16();
        let tag = buf.get_u16();
        let payload_len = buf.get_u32();

        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: version,
            });
        }

        let message_type =
            MessageType::from_tag(tag).ok_or(ProtocolError::UnknownType(tag))?;

        if payload_len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::SizeMismatch {
                expected: MAX_PAYLOAD_LEN as usize,
                actual: payload_len as usize,
            });
        }

        Ok(Self {
            version,
            message_type,
            payload_len,
        })
    }
}
