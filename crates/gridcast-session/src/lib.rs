//! Participant registry for Gridcast.
//!
//! This crate answers one question: who is connected, and where are they?
//!
//! 1. **Grid geometry** ([`GridConfig`]): bounds, clamping, spawn cells
//! 2. **Registry** ([`SessionRegistry`]): id allocation, movement, removal,
//!    and point-in-time snapshots under a single lock
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)  ← registers connections, applies movement, broadcasts
//!     ↕
//! Session Layer (this crate)  ← owns positions and outbound handles
//!     ↕
//! Protocol Layer (below)  ← provides ParticipantId, Position, StateSnapshot
//! ```

mod error;
mod grid;
mod registry;

pub use error::SessionError;
pub use grid::GridConfig;
pub use registry::{FanOut, SessionRegistry};
