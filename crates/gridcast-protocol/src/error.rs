//! Error types for the protocol layer.
//!
//! Decoding never panics on hostile input: every way a frame can be
//! malformed maps to exactly one [`ProtocolError`] variant, and callers
//! decide what to do with it (the server drops the connection).

/// Errors that can occur while decoding a frame.
///
/// Encoding is total, so this type only describes decode failures. The
/// set is closed: there is no catch-all variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The header carries a protocol version this build does not speak.
    #[error("version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u16, actual: u16 },

    /// The header's type tag is not one of the known message types.
    #[error("unknown message type {0}")]
    UnknownType(u16),

    /// A field needed more bytes than were available.
    #[error("truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// The declared payload length disagrees with what was received or
    /// with what the payload structure implies.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The payload parsed structurally but carries a meaningless value,
    /// e.g. a direction code outside 0-3.
    #[error("invalid payload: {0}")]
    InvalidPayload(&'static str),
}
