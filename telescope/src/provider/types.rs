//! Transport error types.

use thiserror::Error;

/// Failures reported by a [`Transport`](super::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("HTTP {0}")]
    Status(u16),
    /// DNS, connection, timeout or body read failure.
    #[error("network error: {0}")]
    Network(String),
}
