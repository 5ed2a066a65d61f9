//! Top-level error type for the `shmchan` binary.

use thiserror::Error;

/// Errors that can terminate the process, each mapped to a nonzero exit
/// code by `main`.
#[derive(Debug, Error)]
pub enum ShmchanError {
    /// The command line did not match the single supported invocation form.
    #[error("{0}")]
    Usage(String),

    /// Rendezvous or layout failure.
    #[error(transparent)]
    Transport(#[from] shmchan_transport::TransportError),

    /// A ring buffer operation failed (a pump talks to its ring directly,
    /// without going through the transport layer).
    #[error(transparent)]
    Ring(#[from] shmchan_core::Error),

    /// A standard stream read/write failed.
    #[error("standard stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the `shmchan` binary.
pub type Result<T> = std::result::Result<T, ShmchanError>;
