//! Blocking SPSC byte ring buffer over a shared-memory slab.

use std::marker::PhantomData;
use std::ptr;

use crate::control::{ControlGuard, RingControl};
use crate::error::Result;

/// A handle to one direction of a bidirectional channel: a [`RingControl`]
/// block plus the byte slab it describes.
///
/// `Ring` does not own the memory it points into -- it borrows it for the
/// lifetime `'a`, typically tied to a shared memory mapping. Cloning a
/// `Ring` (it is `Copy`) is cheap and safe: all state lives behind the
/// control block's mutex.
pub struct Ring<'a> {
    control: *mut RingControl,
    slab: *mut u8,
    _marker: PhantomData<&'a ()>,
}

impl<'a> Ring<'a> {
    /// Wraps an already-initialized control block and its slab.
    ///
    /// # Safety
    /// `control` must point to a `RingControl` previously initialized with
    /// [`RingControl::init`], and `slab` must point to at least
    /// `control.slab_size()` writable bytes. Both must outlive `'a` and be
    /// valid for access from this process (e.g. mapped shared memory).
    pub unsafe fn new(control: *mut RingControl, slab: *mut u8) -> Ring<'a> {
        Ring {
            control,
            slab,
            _marker: PhantomData,
        }
    }

    fn lock(&self) -> Result<ControlGuard> {
        unsafe { ControlGuard::lock(self.control) }
    }

    /// Usable capacity of the ring, in bytes.
    pub fn capacity(&self) -> Result<u64> {
        let guard = self.lock()?;
        Ok(guard.get().capacity())
    }

    /// Blocks until there is space in the ring buffer to write `data`.
    ///
    /// If `data.len()` is greater than [`Ring::capacity`], this blocks
    /// forever: the caller is expected to chunk writes to at most the
    /// ring's capacity beforehand.
    pub fn push(&self, data: &[u8]) -> Result<()> {
        let len = data.len() as u64;
        let mut guard = self.lock()?;

        while guard.get().bytes_free() < len {
            guard.wait_space()?;
        }

        let size = guard.get().slab_size();
        let tail = guard.get().tail();
        let to_copy = len.min(size - tail);

        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.slab.add(tail as usize), to_copy as usize);
        }
        guard.get_mut().set_tail(tail + to_copy);

        if to_copy < len {
            let more = len - to_copy;
            unsafe {
                ptr::copy_nonoverlapping(data[to_copy as usize..].as_ptr(), self.slab, more as usize);
            }
            let tail = guard.get().tail();
            guard.get_mut().set_tail(tail + more);
        }

        guard.signal_data()?;
        tracing::trace!(bytes = len, "pushed to ring");
        Ok(())
    }

    /// Reads at most `buf.len()` bytes from the ring buffer into `buf`,
    /// removing them from the buffer.
    ///
    /// Blocks while the buffer is empty and open. Returns the number of
    /// bytes written into `buf` (always greater than zero), or `0` once
    /// the buffer has been closed and fully drained.
    pub fn pop(&self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.lock()?;

        while guard.get().is_empty() && !guard.get().is_closed() {
            guard.wait_data()?;
        }

        if guard.get().is_empty() && guard.get().is_closed() {
            return Ok(0);
        }

        let len = (buf.len() as u64).min(guard.get().bytes_used());
        let size = guard.get().slab_size();
        let head = guard.get().head();
        let to_copy = len.min(size - head);

        unsafe {
            ptr::copy_nonoverlapping(self.slab.add(head as usize), buf.as_mut_ptr(), to_copy as usize);
        }
        guard.get_mut().set_head(head + to_copy);

        if to_copy < len {
            let more = len - to_copy;
            unsafe {
                ptr::copy_nonoverlapping(self.slab, buf[to_copy as usize..].as_mut_ptr(), more as usize);
            }
            let head = guard.get().head();
            guard.get_mut().set_head(head + more);
        }

        guard.signal_space()?;
        tracing::trace!(bytes = len, "popped from ring");
        Ok(len as usize)
    }

    /// Marks the ring as closed and wakes any reader blocked in [`Ring::pop`].
    ///
    /// Closing never unblocks a writer stuck in [`Ring::push`]: a closed
    /// ring still rejects writes past its capacity, matching the
    /// "push never unblocked by close" contract readers rely on when a
    /// peer has already hung up.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.lock()?;
        guard.get_mut().mark_closed();
        guard.signal_data()?;
        tracing::debug!("ring closed");
        Ok(())
    }

    /// Destroys the ring's mutex and condition variables.
    ///
    /// # Safety
    /// The caller must be the sole remaining user of this ring: the mutex
    /// must be unlocked and no thread may be waiting on either condition
    /// variable. In this system that holds exactly when a pop has just
    /// returned `0` on a closed, drained ring -- its producer is gone and
    /// no one else will call [`Ring::push`] or [`Ring::pop`] afterward.
    pub unsafe fn destroy(&self) -> Result<()> {
        unsafe { RingControl::destroy(self.control) }?;
        tracing::debug!("ring destroyed");
        Ok(())
    }
}

impl Clone for Ring<'_> {
    fn clone(&self) -> Self {
        *self
    }
}

impl Copy for Ring<'_> {}

unsafe impl Send for Ring<'_> {}
unsafe impl Sync for Ring<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::RingControl;
    use std::alloc::{Layout, alloc, dealloc};

    struct Fixture {
        control: *mut RingControl,
        control_layout: Layout,
        slab: *mut u8,
        slab_layout: Layout,
    }

    impl Fixture {
        fn new(slab_size: u64) -> Self {
            let control_layout = Layout::new::<RingControl>();
            let control = unsafe { alloc(control_layout) } as *mut RingControl;
            unsafe { RingControl::init(control, slab_size).unwrap() };

            let slab_layout = Layout::array::<u8>(slab_size as usize).unwrap();
            let slab = unsafe { alloc(slab_layout) };

            Self {
                control,
                control_layout,
                slab,
                slab_layout,
            }
        }

        fn ring(&self) -> Ring<'_> {
            unsafe { Ring::new(self.control, self.slab) }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            unsafe {
                RingControl::destroy(self.control).unwrap();
                dealloc(self.control as *mut u8, self.control_layout);
                dealloc(self.slab, self.slab_layout);
            }
        }
    }

    #[test]
    fn push_then_pop_roundtrips() {
        let fixture = Fixture::new(16);
        let ring = fixture.ring();

        ring.push(b"hello").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(ring.pop(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn capacity_is_slab_size_minus_one() {
        let fixture = Fixture::new(16);
        assert_eq!(fixture.ring().capacity().unwrap(), 15);
    }

    #[test]
    fn minimal_slab_holds_exactly_one_byte() {
        let fixture = Fixture::new(2);
        let ring = fixture.ring();
        assert_eq!(ring.capacity().unwrap(), 1);

        for byte in [b'x', b'y', b'z'] {
            ring.push(&[byte]).unwrap();
            let mut buf = [0u8; 1];
            assert_eq!(ring.pop(&mut buf).unwrap(), 1);
            assert_eq!(buf[0], byte);
        }
    }

    #[test]
    fn wraparound_copy_is_correct() {
        let fixture = Fixture::new(8);
        let ring = fixture.ring();

        // Fill near the end of the slab so the next push wraps.
        ring.push(b"12345").unwrap();
        let mut buf = [0u8; 5];
        ring.pop(&mut buf).unwrap();

        ring.push(b"abcdefg").unwrap();
        let mut buf = [0u8; 7];
        assert_eq!(ring.pop(&mut buf).unwrap(), 7);
        assert_eq!(&buf, b"abcdefg");
    }

    #[test]
    fn close_on_empty_ring_yields_zero_from_pop() {
        let fixture = Fixture::new(16);
        let ring = fixture.ring();

        ring.close().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(ring.pop(&mut buf).unwrap(), 0);
    }

    #[test]
    fn close_drains_before_reporting_closed() {
        let fixture = Fixture::new(16);
        let ring = fixture.ring();

        ring.push(b"hi").unwrap();
        ring.close().unwrap();

        let mut buf = [0u8; 2];
        assert_eq!(ring.pop(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"hi");

        let mut buf = [0u8; 2];
        assert_eq!(ring.pop(&mut buf).unwrap(), 0);
    }

    #[test]
    fn partial_reads_honor_buffer_len() {
        let fixture = Fixture::new(16);
        let ring = fixture.ring();

        ring.push(b"hello world").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(ring.pop(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        let mut buf = [0u8; 6];
        assert_eq!(ring.pop(&mut buf).unwrap(), 6);
        assert_eq!(&buf, b" world");
    }

    #[test]
    fn pop_blocks_until_a_push_arrives() {
        let fixture = Fixture::new(16);
        let ring = fixture.ring();

        let reader = std::thread::spawn(move || {
            let mut buf = [0u8; 5];
            let n = ring.pop(&mut buf).unwrap();
            (n, buf)
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        ring.push(b"hello").unwrap();

        let (n, buf) = reader.join().unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn closing_twice_is_not_an_error() {
        let fixture = Fixture::new(16);
        let ring = fixture.ring();

        ring.close().unwrap();
        ring.close().unwrap();

        let mut buf = [0u8; 1];
        assert_eq!(ring.pop(&mut buf).unwrap(), 0);
    }
}
