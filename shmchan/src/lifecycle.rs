//! Process-wide cleanup, shared between the normal exit path and the
//! signal-driven one.
//!
//! `std::process::exit` (and the forced termination a delivered signal can
//! cause) skips Rust's `Drop` glue entirely, so nothing here can rely on
//! being dropped normally. Cleanup state is instead tracked explicitly in
//! a process-global slot and reclaimed exactly once, from whichever path
//! gets there first: the end of [`crate::run`], or the signal-handling
//! thread.
//!
//! The slot has two live states, not one: a [`shmchan_transport::Channel`]
//! does not exist until after the shared object has been mapped, its ring
//! control blocks initialized, and (for an opener) the ready-word wait has
//! returned -- a window that includes the only unbounded wait in the
//! program. A signal delivered during that window must still be able to
//! close the descriptor and, for the creator, unlink the name, so rendezvous
//! registers a [`shmchan_transport::PendingRegion`] first and only upgrades
//! the slot to the full `Channel` once it exists.

use std::io;
use std::sync::Mutex;

use shmchan_transport::{Channel, PendingRegion};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

enum Slot {
    Empty,
    Pending(PendingRegion),
    Registered(*mut Channel),
    Done,
}

// `*mut Channel` is not `Send` on its own, but it is only ever dereferenced
// by `cleanup`'s `Box::from_raw`, itself guarded by `SLOT`'s mutex, so at
// most one thread ever touches the pointee.
unsafe impl Send for Slot {}

static SLOT: Mutex<Slot> = Mutex::new(Slot::Empty);

/// Registers a not-yet-mapped shared object for cleanup, ahead of the rest
/// of rendezvous.
///
/// No-op if a registration already exists (normal registration always
/// happens from a single sequential rendezvous, so this only guards
/// against misuse).
pub fn register_pending(pending: PendingRegion) {
    let mut slot = SLOT.lock().unwrap();
    if matches!(*slot, Slot::Empty) {
        *slot = Slot::Pending(pending);
    }
}

/// Hands ownership of `channel` to the process-global slot and returns a
/// `'static` reference to it, for use by the pump threads and by
/// [`cleanup`].
///
/// Supersedes any `Pending` registration: the channel's own shared-region
/// cleanup now covers that same descriptor, so the pending snapshot is
/// simply dropped, never run.
pub fn register(channel: Channel) -> &'static Channel {
    let leaked: &'static mut Channel = Box::leak(Box::new(channel));
    let mut slot = SLOT.lock().unwrap();
    *slot = Slot::Registered(leaked as *mut Channel);
    leaked
}

/// Runs cleanup for whatever has been registered so far.
///
/// Idempotent: only the first call -- whichever thread gets here first,
/// normal return or signal -- actually does anything.
pub fn cleanup() {
    let taken = {
        let mut slot = SLOT.lock().unwrap();
        std::mem::replace(&mut *slot, Slot::Done)
    };

    match taken {
        Slot::Pending(pending) => {
            tracing::debug!("running shared memory cleanup for an unmapped region");
            pending.cleanup();
        }
        Slot::Registered(ptr) => {
            tracing::debug!("running shared memory cleanup");
            drop(unsafe { Box::from_raw(ptr) });
        }
        Slot::Empty | Slot::Done => {}
    }
}

/// Spawns a background thread that runs [`cleanup`] and exits the process
/// on `SIGTERM` or `SIGINT`, mirroring mapping both signals to the normal
/// exit path.
pub fn install_signal_handlers() -> io::Result<()> {
    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            cleanup();
            std::process::exit(0);
        }
    });
    Ok(())
}
