//! One-shot rendezvous primitive built directly on the ready word.
//!
//! The creator publishes once after both rings are initialized; the
//! opener waits before touching either control block. Using a futex here
//! (rather than a second process-shared mutex/condvar pair) avoids
//! requiring a fully constructed synchronization object before anything
//! has been published into the region.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::Result;

/// The value published into the ready word once initialization is complete.
pub const MAGIC: u32 = 0x1234_5678;

/// Stores `MAGIC` into `word` and wakes one waiter.
///
/// # Safety
/// `word` must point to a valid, shared `AtomicU32` that every waiter
/// reads via [`wait`].
pub unsafe fn publish(word: *const AtomicU32) -> Result<()> {
    let word = unsafe { &*word };
    word.store(MAGIC, Ordering::SeqCst);
    tracing::trace!("ready word published");
    futex_wake(word)
}

/// Blocks until `word` holds `MAGIC`.
///
/// Tolerates spurious wakeups and lost wakeups: if the creator publishes
/// before this function starts waiting, the initial load already observes
/// `MAGIC` and the call returns immediately without ever sleeping.
///
/// # Safety
/// `word` must point to a valid, shared `AtomicU32`.
pub unsafe fn wait(word: *const AtomicU32) -> Result<()> {
    let word = unsafe { &*word };
    tracing::trace!("waiting for ready word");
    loop {
        if word.load(Ordering::SeqCst) == MAGIC {
            tracing::trace!("ready word observed");
            return Ok(());
        }
        futex_wait(word)?;
    }
}

#[cfg(target_os = "linux")]
fn futex_wait(word: &AtomicU32) -> Result<()> {
    // Sleep only if the word is still zero at the instant the kernel checks;
    // if it changed (to MAGIC) between our load above and this syscall, the
    // kernel returns EAGAIN immediately instead of sleeping.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32,
            libc::FUTEX_WAIT,
            0i32,
            std::ptr::null::<libc::timespec>(),
        )
    };
    if ret == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(()),
        _ => Err(err.into()),
    }
}

#[cfg(target_os = "linux")]
fn futex_wake(word: &AtomicU32) -> Result<()> {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32,
            libc::FUTEX_WAKE,
            1i32,
        )
    };
    if ret == -1 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

/// Non-Linux Unix fallback: briefly spin-wait with a yield, since this
/// platform's libc does not expose a raw futex syscall. Correctness is
/// unaffected -- only the sleep is replaced with a spin -- because `wait`
/// always rechecks the word itself before trusting a wakeup.
#[cfg(all(unix, not(target_os = "linux")))]
fn futex_wait(_word: &AtomicU32) -> Result<()> {
    std::thread::yield_now();
    Ok(())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn futex_wake(_word: &AtomicU32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn wait_returns_immediately_if_already_published() {
        let word = Arc::new(AtomicU32::new(0));
        unsafe { publish(word.as_ref() as *const AtomicU32) }.unwrap();
        unsafe { wait(word.as_ref() as *const AtomicU32) }.unwrap();
    }

    #[test]
    fn wait_unblocks_on_publish_from_another_thread() {
        let word = Arc::new(AtomicU32::new(0));
        let publisher = Arc::clone(&word);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            unsafe { publish(publisher.as_ref() as *const AtomicU32) }.unwrap();
        });

        unsafe { wait(word.as_ref() as *const AtomicU32) }.unwrap();
        handle.join().unwrap();
    }
}
