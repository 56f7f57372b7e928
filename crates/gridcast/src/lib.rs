//! # Gridcast
//!
//! A small real-time session server for a shared 2-D grid.
//!
//! Clients connect over TCP, each gets an entity on the grid, and the
//! server broadcasts the authoritative position list to everyone whenever
//! it changes. Chat lines are relayed to all participants.
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Session (registry) → broadcast
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridcast::prelude::*;
//!
//! # async fn start() -> Result<(), GridcastError> {
//! let server = GridcastServer::builder().port(40500).build().await?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

pub mod client;
mod error;
pub mod framing;
mod handler;
mod server;
#[cfg(test)]
mod test_support;

pub use error::GridcastError;
pub use server::{
    DEFAULT_PORT, GridcastServer, GridcastServerBuilder, ServerConfig,
};

/// Re-exports of the sub-crates, for callers that need more than the
/// prelude.
pub use gridcast_protocol as protocol;
pub use gridcast_session as session;
pub use gridcast_transport as transport;

pub mod prelude {
    //! Commonly used types, importable with `use gridcast::prelude::*`.

    pub use crate::client::{
        ChatEntry, ClientView, GridcastClient, MAX_CHAT_INPUT_LEN,
        MAX_CHAT_LOG,
    };
    pub use crate::{
        DEFAULT_PORT, GridcastError, GridcastServer, GridcastServerBuilder,
        ServerConfig,
    };
    pub use gridcast_protocol::{
        Chat, Direction, Message, Movement, ParticipantId, Position,
        ProtocolError, StateSnapshot,
    };
    pub use gridcast_session::{GridConfig, SessionError};
    pub use gridcast_transport::TransportError;
}
