//! Error types for ring buffer operations.

use thiserror::Error;

/// Core error type for ring buffer operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The slab size passed to `init` was not usable.
    #[error("ring slab size must be greater than 1, got {0}")]
    InvalidSlabSize(usize),

    /// A POSIX mutex/condvar primitive reported a failure.
    ///
    /// `pthread_*` functions return the error code directly rather than
    /// setting `errno`; we wrap it in an `io::Error` for a uniform type.
    #[error("synchronization primitive failure: {0}")]
    Sync(#[from] std::io::Error),
}

/// Result type alias for `shmchan-core` operations.
pub type Result<T> = std::result::Result<T, Error>;
