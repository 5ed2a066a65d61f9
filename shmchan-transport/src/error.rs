//! Error types for the rendezvous and shared-memory layout layer.

use thiserror::Error;

/// Errors that can arise while creating, attaching to, or laying out a
/// shared memory channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The kernel rejected the shared-object name outright (`EINVAL`).
    #[error("invalid shared memory name: {name:?}")]
    InvalidName {
        /// The name that was rejected.
        name: String,
    },

    /// The system page is too small to fit two usable ring slabs.
    #[error("page size {page_size} bytes too small for ring metadata ({metadata_size} bytes)")]
    PageTooSmall {
        /// The system page size.
        page_size: u64,
        /// Bytes required for the fixed metadata (ready word + two control blocks).
        metadata_size: u64,
    },

    /// A lower-level ring buffer operation failed.
    #[error(transparent)]
    Ring(#[from] shmchan_core::Error),

    /// Any unexpected OS-level failure: `shm_open`, `ftruncate`, `mmap`,
    /// `munmap`, `close`, `shm_unlink`, or the ready-word futex syscalls.
    #[error("shared memory I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for `shmchan-transport` operations.
pub type Result<T> = std::result::Result<T, TransportError>;
