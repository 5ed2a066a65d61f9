//! Named POSIX shared memory: create-or-attach plus cleanup.

use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::ptr;
use std::sync::atomic::AtomicU32;

use crate::error::{Result, TransportError};
use crate::layout::Layout;
use crate::readyword;
use shmchan_core::{Ring, RingControl};

/// Which side of the rendezvous this process played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This process created the shared object.
    Creator,
    /// This process attached to an object that already existed.
    Opener,
}

/// Checks the name against the naming rules this platform's `shm_open`
/// enforces, so a malformed name fails with [`TransportError::InvalidName`]
/// before the kernel is ever consulted.
pub fn validate_name(name: &str) -> Result<()> {
    let reject = || TransportError::InvalidName {
        name: name.to_string(),
    };

    if !name.starts_with('/') {
        return Err(reject());
    }
    if name[1..].contains('/') {
        return Err(reject());
    }
    if name.len() <= 1 || name.len() > 255 {
        return Err(reject());
    }
    Ok(())
}

/// A mapped, named POSIX shared memory region.
///
/// On `Drop`, the mapping is unmapped and the file descriptor is closed.
/// If this process created the object (`owns_name`), it is also unlinked --
/// the name is the creator's to retire.
struct SharedRegion {
    fd: RawFd,
    ptr: *mut u8,
    len: usize,
    name: CString,
    owns_name: bool,
}

impl SharedRegion {
    fn open_or_create(name: &str) -> Result<(Self, Role)> {
        let c_name = CString::new(name)
            .map_err(|_| TransportError::InvalidName { name: name.to_string() })?;

        let mut fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                (libc::S_IRUSR
                    | libc::S_IWUSR
                    | libc::S_IRGRP
                    | libc::S_IWGRP
                    | libc::S_IROTH
                    | libc::S_IWOTH) as libc::mode_t,
            )
        };

        let role = if fd >= 0 {
            Role::Creator
        } else {
            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINVAL) => {
                    return Err(TransportError::InvalidName {
                        name: name.to_string(),
                    });
                }
                Some(libc::EEXIST) => {
                    fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
                    if fd < 0 {
                        return Err(std::io::Error::last_os_error().into());
                    }
                    Role::Opener
                }
                _ => return Err(err.into()),
            }
        };

        tracing::debug!(?role, "opened shared memory object");

        Ok((
            Self {
                fd,
                ptr: ptr::null_mut(),
                len: 0,
                name: c_name,
                owns_name: role == Role::Creator,
            },
            role,
        ))
    }

    fn map(&mut self, len: usize) -> Result<()> {
        if unsafe { libc::ftruncate(self.fd, len as libc::off_t) } != 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error().into());
        }

        self.ptr = ptr as *mut u8;
        self.len = len;
        tracing::debug!(len, "mapped shared memory region");
        Ok(())
    }

    /// Snapshots enough state to close and (if this process owns the name)
    /// unlink the shared object before it has been mapped or laid out --
    /// for registering emergency cleanup ahead of the rest of rendezvous.
    fn pending(&self) -> PendingRegion {
        PendingRegion {
            fd: self.fd,
            name: self.name.clone(),
            owns_name: self.owns_name,
        }
    }
}

/// A not-yet-mapped shared memory object's descriptor and name, kept
/// outside the eventual [`Channel`] so a caller can register it for
/// cleanup immediately after creation -- before mapping, ring
/// initialization, or the ready-word wait have run.
pub struct PendingRegion {
    fd: RawFd,
    name: CString,
    owns_name: bool,
}

impl PendingRegion {
    /// Closes the descriptor and, if this process created the object,
    /// unlinks its name.
    ///
    /// Only ever invoked instead of the [`Channel`]-level cleanup that
    /// would otherwise run over the same descriptor, never alongside it --
    /// callers must stop holding a `PendingRegion` once the full `Channel`
    /// it describes exists.
    pub fn cleanup(self) {
        unsafe {
            libc::close(self.fd);
        }
        if self.owns_name {
            let ret = unsafe { libc::shm_unlink(self.name.as_ptr()) };
            if ret != 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ENOENT) {
                    tracing::warn!(%err, "failed to unlink shared memory object");
                }
            }
        }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr as *mut libc::c_void, self.len);
            }
        }
        if self.fd >= 0 {
            unsafe {
                libc::close(self.fd);
            }
        }
        if self.owns_name {
            let ret = unsafe { libc::shm_unlink(self.name.as_ptr()) };
            if ret != 0 {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ENOENT) {
                    tracing::warn!(%err, "failed to unlink shared memory object");
                }
            }
        }
    }
}

/// A rendezvoused bidirectional channel: a mapped shared region plus the
/// two ring handles into it, bound to this process's role.
pub struct Channel {
    region: SharedRegion,
    layout: Layout,
}

impl Channel {
    /// Creates or attaches to the named shared memory channel.
    ///
    /// Returns the channel along with the [`Role`] this process played,
    /// since the caller needs the role to decide which ring is outbound
    /// versus inbound.
    pub fn open_or_create(name: &str) -> Result<(Self, Role)> {
        Self::open_or_create_with(name, |_pending| {})
    }

    /// Like [`Channel::open_or_create`], but calls `on_region_created` with
    /// a [`PendingRegion`] as soon as the shared object exists -- before
    /// mapping, ring initialization, or the ready-word wait -- so a caller
    /// can register it for cleanup ahead of the rest of rendezvous instead
    /// of only after this function returns.
    pub fn open_or_create_with(
        name: &str,
        on_region_created: impl FnOnce(PendingRegion),
    ) -> Result<(Self, Role)> {
        validate_name(name)?;

        let (mut region, role) = SharedRegion::open_or_create(name)?;
        on_region_created(region.pending());

        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        region.map(page_size)?;

        let layout = Layout::calculate(page_size)?;

        let ready_word = region.ptr as *const AtomicU32;
        let ring_a_control = unsafe { region.ptr.add(layout.ring_a_control_offset) } as *mut RingControl;
        let ring_b_control = unsafe { region.ptr.add(layout.ring_b_control_offset) } as *mut RingControl;

        match role {
            Role::Creator => {
                tracing::info!(name, slab_size = layout.slab_size, "initializing ring buffers");
                unsafe {
                    RingControl::init(ring_a_control, layout.slab_size)?;
                    RingControl::init(ring_b_control, layout.slab_size)?;
                    readyword::publish(ready_word)?;
                }
            }
            Role::Opener => {
                unsafe { readyword::wait(ready_word)? };
            }
        }

        Ok((Self { region, layout }, role))
    }

    /// Handle to ring A.
    pub fn ring_a(&self) -> Ring<'_> {
        let control = unsafe { self.region.ptr.add(self.layout.ring_a_control_offset) } as *mut RingControl;
        let slab = unsafe { self.region.ptr.add(self.layout.ring_a_slab_offset) };
        unsafe { Ring::new(control, slab) }
    }

    /// Handle to ring B.
    pub fn ring_b(&self) -> Ring<'_> {
        let control = unsafe { self.region.ptr.add(self.layout.ring_b_control_offset) } as *mut RingControl;
        let slab = unsafe { self.region.ptr.add(self.layout.ring_b_slab_offset) };
        unsafe { Ring::new(control, slab) }
    }
}

// The mapping is process-shared memory; the pump threads within this
// process access it only through the mutex-guarded `Ring` handles above.
unsafe impl Send for Channel {}
unsafe impl Sync for Channel {}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/shmchan-test-{tag}-{}", std::process::id())
    }

    #[test]
    fn rejects_name_without_leading_slash() {
        assert!(validate_name("no-leading-slash").is_err());
    }

    #[test]
    fn rejects_name_with_embedded_slash() {
        assert!(validate_name("/a/b").is_err());
    }

    #[test]
    fn accepts_well_formed_name() {
        assert!(validate_name("/shmchan-ok").is_ok());
    }

    #[test]
    fn first_opener_becomes_creator() {
        let name = unique_name("creator");
        let (channel, role) = Channel::open_or_create(&name).unwrap();
        assert_eq!(role, Role::Creator);
        drop(channel);
    }

    #[test]
    fn open_or_create_with_calls_hook_before_returning() {
        let name = unique_name("hook");
        let mut saw_owns_name = None;

        let (channel, role) = Channel::open_or_create_with(&name, |pending| {
            saw_owns_name = Some(pending.owns_name);
        })
        .unwrap();

        assert_eq!(role, Role::Creator);
        assert_eq!(saw_owns_name, Some(true));
        drop(channel);
    }

    #[test]
    fn second_opener_attaches_to_existing_region() {
        let name = unique_name("attach");
        let (creator, role_a) = Channel::open_or_create(&name).unwrap();
        assert_eq!(role_a, Role::Creator);

        let (opener, role_b) = Channel::open_or_create(&name).unwrap();
        assert_eq!(role_b, Role::Opener);

        creator.ring_a().push(b"hi").unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(opener.ring_a().pop(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"hi");
    }
}
