//! Error types for the session layer.

/// Errors that can occur while managing participants.
///
/// Almost nothing in the registry is an error: movement for an unknown id
/// and removing an id twice are both quiet no-ops. The one hard failure is
/// running out of ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Every 32-bit participant id has been handed out. Ids are never
    /// reused, so no further participant can register in this process.
    #[error("participant ids exhausted")]
    IdsExhausted,
}
