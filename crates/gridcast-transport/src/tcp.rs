//! TCP transport implementation using tokio.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Mutex, watch};

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Listen backlog used when the caller has no preference.
pub const DEFAULT_BACKLOG: u32 = 1024;

/// Resolves `host:port`, keeping the resolver's order.
async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, TransportError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| TransportError::ResolveFailed {
            host: host.to_string(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::ResolveFailed {
            host: host.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses"),
        });
    }
    Ok(addrs)
}

// ---------------------------------------------------------------------------
// TcpTransport
// ---------------------------------------------------------------------------

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
    shutdown: watch::Sender<bool>,
}

impl TcpTransport {
    /// Binds to the first usable address for `host:port` and starts
    /// listening with the given backlog.
    ///
    /// Address reuse is enabled so a restarted server can rebind while old
    /// sockets linger in `TIME_WAIT`.
    ///
    /// # Errors
    /// - [`TransportError::ResolveFailed`] if `host` does not resolve
    /// - [`TransportError::BindFailed`] if no candidate address binds
    /// - [`TransportError::ListenFailed`] if `listen` fails
    pub async fn bind(
        host: &str,
        port: u16,
        backlog: u32,
    ) -> Result<Self, TransportError> {
        let mut last_error = None;

        for addr in resolve(host, port).await? {
            let socket = match new_socket(addr) {
                Ok(socket) => socket,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };
            if let Err(e) = socket.set_reuseaddr(true) {
                tracing::debug!(%addr, error = %e, "SO_REUSEADDR not set");
            }
            if let Err(e) = socket.bind(addr) {
                tracing::debug!(%addr, error = %e, "bind attempt failed");
                last_error = Some(e);
                continue;
            }

            let listener =
                socket.listen(backlog).map_err(TransportError::ListenFailed)?;
            let (shutdown, _) = watch::channel(false);
            tracing::info!(
                addr = %listener.local_addr().unwrap_or(addr),
                "TCP transport listening"
            );
            return Ok(Self { listener, shutdown });
        }

        Err(TransportError::BindFailed(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no usable address")
        })))
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

fn new_socket(addr: SocketAddr) -> io::Result<TcpSocket> {
    if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let mut shutdown = self.shutdown.subscribe();

        let accepted = tokio::select! {
            biased;
            _ = shutdown.wait_for(|down| *down) => {
                return Err(TransportError::Shutdown);
            }
            accepted = self.listener.accept() => accepted,
        };

        let (stream, addr) = accepted.map_err(TransportError::AcceptFailed)?;
        let conn = TcpConnection::from_stream(stream, addr);
        tracing::debug!(id = %conn.id(), %addr, "accepted TCP connection");
        Ok(conn)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        self.shutdown.send_replace(true);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TcpConnection
// ---------------------------------------------------------------------------

/// A single TCP connection.
///
/// The stream is split so a task blocked in `receive_exact` never holds up
/// a sender. The write-half mutex is the connection's send gate: whoever
/// holds it writes a whole buffer before anyone else may start.
pub struct TcpConnection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    closed: watch::Sender<bool>,
}

impl TcpConnection {
    /// Connects to `host:port`, trying each resolved address in order and
    /// returning the first that succeeds.
    ///
    /// # Errors
    /// - [`TransportError::ResolveFailed`] if `host` does not resolve
    /// - [`TransportError::ConnectFailed`] once every candidate has failed
    pub async fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        let mut failures = Vec::new();

        for addr in resolve(host, port).await? {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    let conn = Self::from_stream(stream, addr);
                    tracing::debug!(id = %conn.id, %addr, "connected");
                    return Ok(conn);
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connect attempt failed");
                    failures.push(format!("{addr}: {e}"));
                }
            }
        }

        Err(TransportError::ConnectFailed(format!(
            "{host}:{port} ({})",
            failures.join("; ")
        )))
    }

    fn from_stream(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        // Small frames go out immediately.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer_addr, error = %e, "TCP_NODELAY not set");
        }
        let (reader, writer) = stream.into_split();
        let (closed, _) = watch::channel(false);

        Self {
            id: ConnectionId::new(
                NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            ),
            peer_addr,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed,
        }
    }

    /// Returns the remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

fn closed_locally() -> TransportError {
    TransportError::ConnectionClosed("closed locally".into())
}

impl Connection for TcpConnection {
    type Error = TransportError;

    async fn send_all(&self, data: &[u8]) -> Result<(), Self::Error> {
        if self.is_closed() {
            return Err(TransportError::InvalidState("send on closed connection"));
        }
        let mut closed = self.closed.subscribe();

        let mut writer = tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => return Err(closed_locally()),
            writer = self.writer.lock() => writer,
        };

        let mut sent = 0;
        while sent < data.len() {
            let result = tokio::select! {
                biased;
                _ = closed.wait_for(|c| *c) => return Err(closed_locally()),
                result = writer.write(&data[sent..]) => result,
            };
            match result {
                Ok(0) => {
                    return Err(TransportError::ConnectionClosed(
                        "peer stopped accepting data".into(),
                    ));
                }
                Ok(n) => sent += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Err(TransportError::WouldBlock);
                }
                Err(e) => return Err(TransportError::SendFailed(e)),
            }
        }
        Ok(())
    }

    async fn receive_exact(&self, len: usize) -> Result<Vec<u8>, Self::Error> {
        if self.is_closed() {
            return Err(TransportError::InvalidState(
                "receive on closed connection",
            ));
        }
        let mut closed = self.closed.subscribe();

        let mut reader = tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => return Err(closed_locally()),
            reader = self.reader.lock() => reader,
        };

        let mut buf = vec![0u8; len];
        let mut received = 0;
        while received < len {
            let result = tokio::select! {
                biased;
                _ = closed.wait_for(|c| *c) => return Err(closed_locally()),
                result = reader.read(&mut buf[received..]) => result,
            };
            match result {
                Ok(0) => {
                    return Err(TransportError::ConnectionClosed(
                        "peer closed the connection".into(),
                    ));
                }
                Ok(n) => received += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Err(TransportError::WouldBlock);
                }
                Err(e) => return Err(TransportError::ReceiveFailed(e)),
            }
        }
        Ok(buf)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        let first = self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });
        if !first {
            return Ok(());
        }

        tracing::debug!(id = %self.id, peer = %self.peer_addr, "closing connection");
        // Any sender holding the gate has been woken by the flag above and
        // releases it promptly.
        let mut writer = self.writer.lock().await;
        match writer.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::SendFailed(e)),
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
