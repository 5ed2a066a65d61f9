//! Blocking SPSC byte ring buffer with a cross-process-shared control block.
//!
//! This crate provides the data structure at the heart of a bidirectional
//! shared-memory channel: a fixed-capacity byte slab plus a
//! [`control::RingControl`] block whose mutex and condition variables are
//! configured for use across independent address spaces. It does not know
//! anything about shared memory segments, process roles, or naming -- see
//! the transport layer built on top of it for that.

pub mod control;
mod error;
pub mod ring;

pub use control::RingControl;
pub use error::{Error, Result};
pub use ring::Ring;
