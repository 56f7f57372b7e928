//! Transport abstraction layer for Gridcast.
//!
//! Provides the [`Transport`] and [`Connection`] traits: a listener that
//! hands out connections, and a reliable ordered byte stream with
//! exact-length reads and whole-buffer writes. [`TcpTransport`] and
//! [`TcpConnection`] implement them over tokio's TCP types.
//!
//! Framing is not this layer's concern. A connection moves bytes; the
//! protocol crate decides how many bytes make a message.

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::{DEFAULT_BACKLOG, TcpConnection, TcpTransport};

use std::fmt;
use std::future::Future;

/// Opaque identifier for a connection.
///
/// This is a transport-level handle for logging. It is unrelated to the
/// participant id the server assigns at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    ///
    /// A failed accept does not take the listener out of service; the
    /// caller may simply call `accept` again.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Stops accepting. Pending and later `accept` calls fail.
    fn shutdown(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A single reliable, ordered byte stream to a peer.
///
/// Both directions may be used concurrently from different tasks. Sends
/// are serialized internally so that two writers never interleave bytes.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Writes the whole buffer, or fails.
    fn send_all(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Reads exactly `len` bytes. Never returns a short buffer: end of
    /// stream before `len` bytes is an error.
    fn receive_exact(
        &self,
        len: usize,
    ) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send;

    /// Shuts the connection down. Safe to call any number of times, from
    /// any task; only the first call has an effect. Wakes any task blocked
    /// in `send_all` or `receive_exact` on this connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns `true` once `close` has been called.
    fn is_closed(&self) -> bool;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
