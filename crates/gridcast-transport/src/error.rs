/// Errors that can occur in the transport layer.
///
/// Any error returned from a connection's send or receive is terminal for
/// that connection; nothing here is retried by the caller.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Host name resolution failed.
    #[error("could not resolve {host}: {source}")]
    ResolveFailed {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Every resolved address refused or failed the connection attempt.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// No resolved address could be bound.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// The bound socket could not be put into listening mode.
    #[error("listen failed: {0}")]
    ListenFailed(#[source] std::io::Error),

    /// Accepting a single incoming connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The connection was closed, by the peer or locally.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The socket is non-blocking and the operation would have blocked.
    #[error("operation would block")]
    WouldBlock,

    /// The operation is not valid for the handle's current state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Returns `true` for an orderly close rather than a fault.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_) | Self::Shutdown)
    }
}
