//! `GridcastServer` builder and accept loop.
//!
//! This is the entry point for running a Gridcast server. It ties the
//! layers together: transport → protocol → session.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use gridcast_session::{GridConfig, SessionRegistry};
use gridcast_transport::{
    Connection, DEFAULT_BACKLOG, TcpConnection, TcpTransport, Transport,
    TransportError,
};

use crate::GridcastError;
use crate::handler::handle_connection;

/// The port a server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 40500;

/// Pause after a failed accept before listening again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Everything needed to start a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind. `0.0.0.0` listens on all of them.
    pub host: String,
    pub port: u16,
    /// Listen backlog handed to the OS.
    pub backlog: u32,
    pub grid: GridConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            grid: GridConfig::default(),
        }
    }
}

/// Shared server state passed to each connection task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The
/// registry does its own locking.
pub(crate) struct ServerState<C> {
    pub(crate) registry: SessionRegistry<C>,
}

impl<C> ServerState<C> {
    pub(crate) fn new(grid: GridConfig) -> Self {
        Self {
            registry: SessionRegistry::new(grid),
        }
    }
}

/// Builder for configuring and starting a Gridcast server.
///
/// # Example
///
/// ```rust,no_run
/// use gridcast::prelude::*;
///
/// # async fn start() -> Result<(), GridcastError> {
/// let server = GridcastServer::builder()
///     .host("127.0.0.1")
///     .port(40500)
///     .grid(GridConfig::new(40, 20))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct GridcastServerBuilder {
    config: ServerConfig,
}

impl GridcastServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interface to bind.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the port to listen on. `0` lets the OS choose.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets host and port together.
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.host = addr.ip().to_string();
        self.config.port = addr.port();
        self
    }

    /// Sets the listen backlog.
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.config.backlog = backlog;
        self
    }

    /// Sets the grid size.
    pub fn grid(mut self, grid: GridConfig) -> Self {
        self.config.grid = grid;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener and returns a server ready to [`run`].
    ///
    /// # Errors
    /// Resolve, bind, or listen failures from the transport. These are the
    /// only errors fatal to a server process.
    ///
    /// [`run`]: GridcastServer::run
    pub async fn build(self) -> Result<GridcastServer, GridcastError> {
        let ServerConfig {
            host,
            port,
            backlog,
            grid,
        } = self.config;

        let transport = TcpTransport::bind(&host, port, backlog).await?;
        let state = Arc::new(ServerState::new(grid));

        Ok(GridcastServer { transport, state })
    }
}

/// A bound Gridcast server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct GridcastServer {
    transport: TcpTransport,
    state: Arc<ServerState<TcpConnection>>,
}

impl GridcastServer {
    /// Creates a new builder.
    pub fn builder() -> GridcastServerBuilder {
        GridcastServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), GridcastError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `signal` completes.
    ///
    /// Each accepted connection is registered right here, so participant
    /// ids follow accept order, and then handed to its own task. A failed
    /// accept is logged and the loop keeps listening.
    ///
    /// When `signal` fires the listener is shut down and every connected
    /// participant is disconnected; their tasks finish on their own.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), GridcastError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            grid_width = self.state.registry.grid().width,
            grid_height = self.state.registry.grid().height,
            "Gridcast server running"
        );
        tokio::pin!(signal);

        loop {
            let accepted = tokio::select! {
                _ = &mut signal => break,
                accepted = self.transport.accept() => accepted,
            };

            match accepted {
                Ok(conn) => self.admit(conn).await,
                Err(TransportError::Shutdown) => break,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    if !back_off(signal.as_mut()).await {
                        break;
                    }
                }
            }
        }

        tracing::info!("Gridcast server shutting down");
        self.transport.shutdown().await?;
        for (participant, conn) in self.state.registry.recipients() {
            if let Err(e) = conn.close().await {
                tracing::debug!(%participant, error = %e, "close failed");
            }
        }
        Ok(())
    }

    /// Registers a fresh connection and spawns its handler.
    async fn admit(&self, conn: TcpConnection) {
        let conn_id = conn.id();
        let peer = conn.peer_addr();
        let conn = Arc::new(conn);

        let participant = match self.state.registry.register(Arc::clone(&conn)) {
            Ok((participant, _)) => participant,
            Err(e) => {
                tracing::warn!(%conn_id, %peer, error = %e, "rejecting connection");
                let _ = conn.close().await;
                return;
            }
        };

        tracing::debug!(%participant, %conn_id, %peer, "connection registered");

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            handle_connection(participant, conn, state).await;
        });
    }
}

/// Sleeps for [`ACCEPT_RETRY_DELAY`] so a persistent accept failure, such
/// as running out of file descriptors, doesn't spin the loop. Returns
/// `false` if `signal` fired first.
async fn back_off<F>(signal: Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = signal => false,
        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => true,
    }
}
