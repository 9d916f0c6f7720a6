//! Error types for the presence engine.
//!
//! Heartbeat-internal write failures are logged and dropped rather than
//! returned, and registry read failures surface on the view itself; this
//! type covers the calls a host makes directly.

/// All errors that can surface from presence operations.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("No signed-in user; presence is not ready")]
    NotReady,

    #[error("Invalid presence record: {0}")]
    InvalidRecord(String),

    #[error("Store write failed: {0}")]
    StoreWrite(String),
}

/// Convenience alias for Results using PresenceError.
pub type Result<T> = std::result::Result<T, PresenceError>;
