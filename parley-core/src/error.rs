/// Parley connection error types
///
/// Error handling for the non-blocking connection layer.
use std::io;
use thiserror::Error;

/// Error type for connection operations.
///
/// "Would block" conditions are not errors at this layer: `Connection::read`
/// returns an empty batch and `Connection::write` reports zero flushed bytes
/// instead. Everything that does surface here is connection-fatal and leaves
/// the socket unusable until `Connection::reset` is called.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// IO error during socket operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Peer closed the connection (EOF on read)
    #[error("connection closed by peer")]
    ClosedByPeer,

    /// The socket faulted earlier and must be reset before reconnecting
    #[error("socket faulted, reset the connection before reconnecting")]
    RequiresReset,
}

/// Result type alias for connection operations
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Check whether an I/O error kind is transient.
///
/// Transient conditions are swallowed by the connection layer; every other
/// kind marks the socket as faulted.
#[must_use]
pub fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

impl ConnectionError {
    /// Check if this error requires a `reset` + reconnect cycle.
    ///
    /// All `ConnectionError`s do; the method exists so callers holding a
    /// broader error type can classify uniformly.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        true
    }
}
