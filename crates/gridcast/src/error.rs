//! Unified error type for Gridcast.

use gridcast_protocol::ProtocolError;
use gridcast_session::SessionError;
use gridcast_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates a `From` impl, so `?`
/// converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GridcastError {
    /// A transport-level error (resolve, connect, bind, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A malformed frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A registry error (id space exhausted).
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl GridcastError {
    /// Returns `true` if this is an orderly close rather than a fault.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_closed())
    }
}
