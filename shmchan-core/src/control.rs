//! The cross-process-shared control block for a ring buffer.
//!
//! [`RingControl`] is placed directly inside the shared memory mapping by
//! both cooperating processes. Its mutex and condition variables are
//! configured with `PTHREAD_PROCESS_SHARED` so that locking one process's
//! copy of the struct also locks the other's -- there is only one struct,
//! mapped at (possibly) different addresses.

use std::io;
use std::mem::MaybeUninit;

use crate::error::{Error, Result};

/// Converts a raw `pthread_*` return code into a `Result`.
///
/// Unlike most libc calls, `pthread_*` functions return the error code
/// directly instead of setting `errno`.
fn check(code: i32) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(Error::Sync(io::Error::from_raw_os_error(code)))
    }
}

/// Metadata and synchronization primitives for one direction of a
/// bidirectional byte channel, living in shared memory.
///
/// The byte slab itself is *not* part of this struct: it is addressed
/// separately (and at a potentially different virtual address in each
/// process), since only `head`/`tail`/`size` need to be shared.
#[repr(C)]
pub struct RingControl {
    mtx: libc::pthread_mutex_t,
    has_data: libc::pthread_cond_t,
    has_space: libc::pthread_cond_t,
    closed: bool,
    head: u64,
    tail: u64,
    size: u64,
}

impl RingControl {
    /// Initializes a freshly-mapped `RingControl` in place.
    ///
    /// # Safety
    /// `control` must point to valid, writable memory at least
    /// `size_of::<RingControl>()` bytes long, shared between the processes
    /// that will use it. `slab_size` must be greater than 1.
    pub unsafe fn init(control: *mut RingControl, slab_size: u64) -> Result<()> {
        if slab_size <= 1 {
            return Err(Error::InvalidSlabSize(slab_size as usize));
        }

        let mut m_attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        check(unsafe { libc::pthread_mutexattr_init(m_attr.as_mut_ptr()) })?;
        let mut m_attr = unsafe { m_attr.assume_init() };
        check(unsafe {
            libc::pthread_mutexattr_setpshared(&mut m_attr, libc::PTHREAD_PROCESS_SHARED)
        })?;

        let mut c_attr = MaybeUninit::<libc::pthread_condattr_t>::uninit();
        check(unsafe { libc::pthread_condattr_init(c_attr.as_mut_ptr()) })?;
        let mut c_attr = unsafe { c_attr.assume_init() };
        check(unsafe {
            libc::pthread_condattr_setpshared(&mut c_attr, libc::PTHREAD_PROCESS_SHARED)
        })?;

        unsafe {
            (*control).closed = false;
            (*control).head = 0;
            (*control).tail = 0;
            (*control).size = slab_size;

            check(libc::pthread_mutex_init(&raw mut (*control).mtx, &m_attr))?;
            check(libc::pthread_cond_init(&raw mut (*control).has_data, &c_attr))?;
            check(libc::pthread_cond_init(&raw mut (*control).has_space, &c_attr))?;
        }

        unsafe {
            libc::pthread_mutexattr_destroy(&mut m_attr);
            libc::pthread_condattr_destroy(&mut c_attr);
        }

        Ok(())
    }

    /// Destroys the mutex and condition variables.
    ///
    /// # Safety
    /// The mutex must be unlocked and no thread may be waiting on either
    /// condition variable. Callers must not use `control` afterwards
    /// (other than to re-`init` it).
    pub unsafe fn destroy(control: *mut RingControl) -> Result<()> {
        unsafe {
            check(libc::pthread_mutex_destroy(&raw mut (*control).mtx))?;
            check(libc::pthread_cond_destroy(&raw mut (*control).has_data))?;
            check(libc::pthread_cond_destroy(&raw mut (*control).has_space))?;
        }
        Ok(())
    }

    /// Size of the backing byte slab, in bytes.
    pub fn slab_size(&self) -> u64 {
        self.size
    }

    /// Usable capacity: one slot is always kept empty so that `head == tail`
    /// unambiguously means "empty".
    pub fn capacity(&self) -> u64 {
        self.size - 1
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn bytes_used(&self) -> u64 {
        if self.head <= self.tail {
            self.tail - self.head
        } else {
            self.size - (self.head - self.tail)
        }
    }

    pub(crate) fn bytes_free(&self) -> u64 {
        self.capacity() - self.bytes_used()
    }

    pub(crate) fn head(&self) -> u64 {
        self.head
    }

    pub(crate) fn tail(&self) -> u64 {
        self.tail
    }

    pub(crate) fn set_head(&mut self, value: u64) {
        self.head = value % self.size;
    }

    pub(crate) fn set_tail(&mut self, value: u64) {
        self.tail = value % self.size;
    }

    pub(crate) fn mark_closed(&mut self) {
        self.closed = true;
    }
}

/// RAII guard holding the lock on a [`RingControl`]'s mutex.
///
/// Dropping the guard unlocks the mutex. `wait_data`/`wait_space` call
/// `pthread_cond_wait`, which atomically unlocks for the duration of the
/// wait and relocks before returning -- the guard remains valid throughout.
pub(crate) struct ControlGuard {
    control: *mut RingControl,
}

impl ControlGuard {
    /// Locks `control`'s mutex and returns a guard.
    ///
    /// # Safety
    /// `control` must point to a `RingControl` initialized by [`RingControl::init`]
    /// and must outlive the guard.
    pub(crate) unsafe fn lock(control: *mut RingControl) -> Result<Self> {
        check(unsafe { libc::pthread_mutex_lock(&raw mut (*control).mtx) })?;
        Ok(Self { control })
    }

    pub(crate) fn get(&self) -> &RingControl {
        unsafe { &*self.control }
    }

    pub(crate) fn get_mut(&mut self) -> &mut RingControl {
        unsafe { &mut *self.control }
    }

    pub(crate) fn wait_data(&mut self) -> Result<()> {
        check(unsafe {
            libc::pthread_cond_wait(&raw mut (*self.control).has_data, &raw mut (*self.control).mtx)
        })
    }

    pub(crate) fn wait_space(&mut self) -> Result<()> {
        check(unsafe {
            libc::pthread_cond_wait(&raw mut (*self.control).has_space, &raw mut (*self.control).mtx)
        })
    }

    pub(crate) fn signal_data(&mut self) -> Result<()> {
        check(unsafe { libc::pthread_cond_signal(&raw mut (*self.control).has_data) })
    }

    pub(crate) fn signal_space(&mut self) -> Result<()> {
        check(unsafe { libc::pthread_cond_signal(&raw mut (*self.control).has_space) })
    }
}

impl Drop for ControlGuard {
    fn drop(&mut self) {
        let code = unsafe { libc::pthread_mutex_unlock(&raw mut (*self.control).mtx) };
        debug_assert_eq!(code, 0, "pthread_mutex_unlock failed: {code}");
    }
}

// `RingControl` lives in memory shared between processes and is only ever
// accessed through a locked `ControlGuard`; the pointers it is reached
// through are `Send` in the same sense `Arc<Mutex<T>>` internals are.
unsafe impl Send for ControlGuard {}
