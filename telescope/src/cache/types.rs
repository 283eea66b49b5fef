//! Error types shared by the cache tiers and the engine.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by cache operations.
///
/// The type is `Clone` so a single fetch outcome can be broadcast to every
/// coalesced waiter; I/O errors are held behind an `Arc` for that reason.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The resource identifier is not a usable absolute URL.
    #[error("Invalid resource identifier '{0}'")]
    InvalidIdentifier(String),

    /// Network-layer failure (DNS, connection, timeout, body read).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// The payload could not be decoded as a supported image format.
    #[error("Response is not a supported image: {0}")]
    NotAnImage(String),

    /// A tagged variant was requested but never stored.
    #[error("No edit stored for tag '{0}'")]
    EditNotFound(String),

    /// Disk read, write or directory failure.
    #[error("Cache I/O error: {0}")]
    Io(Arc<io::Error>),

    /// The codec failed to encode a decoded image.
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// One or more identifiers failed during a bulk refresh.
    #[error("{} identifier(s) failed to refresh", failures.len())]
    Refresh { failures: Vec<RefreshFailure> },

    /// Unreachable code path. Observing this indicates a logic bug.
    #[error("Unknown cache error")]
    Unknown,
}

impl From<io::Error> for CacheError {
    fn from(e: io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

/// A single failed identifier from `refresh_all`.
#[derive(Debug, Clone)]
pub struct RefreshFailure {
    /// The identifier whose refresh failed.
    pub identifier: String,
    /// Why it failed.
    pub error: CacheError,
}
