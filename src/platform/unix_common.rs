//! Shared double-mmap machinery used by both unix back-ends
//! (`posix_shm`, `memfd`). Factored out the same way
//! `backtrace-labs-slitter::file_backed_mapper` reuses
//! `backtrace-labs-slitter::map`'s `reserve_region`/`allocate_region`: the
//! two back-ends differ only in how they obtain the named file descriptor,
//! not in how they place the primary/mirror views.
//!
//! Grounded on the `doublemap` trick in `erenon-cueue::lib`: reserve one
//! anonymous range big enough for header + 2*buffer, then overlay two
//! `MAP_FIXED` mappings of the same backing fd so the second aliases the
//! first.
use std::io;
use std::os::unix::io::{OwnedFd, RawFd};
use std::ptr::NonNull;

use libc::{c_void, MAP_FAILED, MAP_FIXED, MAP_PRIVATE, MAP_SHARED, PROT_NONE, PROT_READ, PROT_WRITE};

use crate::layout::Layout;
use crate::mapper::Access;

/// Per-mapping unix resources released on close.
#[derive(Debug)]
pub(crate) struct UnixBacking {
    pub(crate) fd: OwnedFd,
    /// Label used to find this object again: a `/name` for POSIX shm, or
    /// an opaque registry key for memfd (see `platform::memfd`).
    pub(crate) name: String,
    /// Whether `close` should attempt to remove the name from its
    /// namespace (POSIX shm's `shm_unlink`; memfd has nothing to unlink).
    pub(crate) unlink_on_close: bool,
}

fn prot_for(access: Access) -> i32 {
    match access {
        Access::ReadOnly => PROT_READ,
        Access::ReadWrite => PROT_READ | PROT_WRITE,
    }
}

/// Reserves `layout.total_reservation` bytes of address space, then maps
/// `fd` twice so that the mirror's first byte immediately follows the
/// primary buffer's last byte. `fd`'s backing object must already be sized
/// to at least `layout.mirror_offset` bytes (header + one aligned buffer).
///
/// # Safety
///
/// `fd` must refer to a shareable file-like object (a POSIX shm object or
/// a memfd) at least `layout.mirror_offset` bytes long.
pub(crate) unsafe fn double_map(
    fd: RawFd,
    layout: &Layout,
    access: Access,
) -> io::Result<NonNull<u8>> {
    let prot = prot_for(access);
    let object_size = layout.mirror_offset;

    let anon = libc::mmap(
        std::ptr::null_mut(),
        layout.total_reservation,
        PROT_NONE,
        MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
    );
    if anon == MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    let base = anon as *mut u8;

    let primary = libc::mmap(
        base as *mut c_void,
        object_size,
        prot,
        MAP_SHARED | MAP_FIXED,
        fd,
        0,
    );
    if primary != base as *mut c_void {
        let err = io::Error::last_os_error();
        libc::munmap(anon, layout.total_reservation);
        return Err(err);
    }

    let mirror_addr = base.add(layout.mirror_offset);
    let mirror = libc::mmap(
        mirror_addr as *mut c_void,
        layout.aligned_buffer_size,
        prot,
        MAP_SHARED | MAP_FIXED,
        fd,
        layout.buffer_offset as libc::off_t,
    );
    if mirror == MAP_FAILED {
        let err = io::Error::last_os_error();
        libc::munmap(anon, layout.total_reservation);
        return Err(err);
    }
    if mirror != mirror_addr as *mut c_void {
        // MAP_FIXED either lands exactly or fails; this branch guards
        // against a platform that silently relocates the mapping instead.
        libc::munmap(anon, layout.total_reservation);
        return Err(io::Error::new(
            io::ErrorKind::Other,
            "mirror mapping did not land adjacent to the primary",
        ));
    }

    Ok(NonNull::new_unchecked(base))
}

/// Unmaps the full `total_reservation`-byte range obtained from
/// `double_map`. One `munmap` call tears down both the primary and mirror
/// sub-mappings since they all live inside the same reserved range.
pub(crate) unsafe fn unmap_all(base: NonNull<u8>, total_reservation: usize) {
    libc::munmap(base.as_ptr() as *mut c_void, total_reservation);
}
