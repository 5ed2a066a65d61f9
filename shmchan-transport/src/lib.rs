//! Rendezvous and layout for a bidirectional shared-memory byte channel.
//!
//! This crate turns a user-supplied name into a mapped shared region
//! containing two [`shmchan_core::Ring`]s, synchronizing the two
//! cooperating processes so that neither observes the other's
//! half-initialized control blocks.

mod error;
mod layout;
mod readyword;
mod shm;

pub use error::{Result, TransportError};
pub use layout::Layout;
pub use shm::{Channel, PendingRegion, Role, validate_name};
