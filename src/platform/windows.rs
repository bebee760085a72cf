//! Windows back-end (`spec.md` §4.2.3): placeholder splitting +
//! `MapViewOfFile3`, since `mmap(MAP_FIXED)` semantics have no Windows
//! equivalent.
//!
//! Grounded on `DataDog-libdatadog::mem_handle` for the
//! `CreateFileMapping`/`OpenFileMapping` shape and `Local\`-namespacing of
//! names, and on `Shadlock0133-mimalloc-rs::os`'s use of `VirtualAlloc2`
//! for the newer placeholder-reservation API that POSIX's `MAP_FIXED`
//! trick has no need for.
use std::ffi::c_void;
use std::io;
use std::ptr::{self, NonNull};

use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::System::Memory::{
    MapViewOfFile3, OpenFileMappingW, UnmapViewOfFile2, VirtualAlloc2, VirtualFree,
    CreateFileMappingW, MEM_EXTENDED_PARAMETER, MEM_PRESERVE_PLACEHOLDER, MEM_RELEASE,
    MEM_REPLACE_PLACEHOLDER, MEM_RESERVE, MEM_RESERVE_PLACEHOLDER, PAGE_NOACCESS,
    PAGE_READWRITE, FILE_MAP_WRITE, FILE_MAP_READ,
};

use crate::error::{MapError, MapResult};
use crate::layout::Layout;
use crate::mapper::{Access, BackendHandle, Mapping, PlatformMapper};

#[derive(Debug)]
pub(crate) struct WindowsMapper;

/// Per-mapping Windows resources released on close, in the order `spec.md`
/// §4.2.3 specifies: mirror, then primary, then header, then the section.
#[derive(Debug)]
pub(crate) struct WindowsBacking {
    section: HANDLE,
    header_view: *mut c_void,
    primary_view: *mut c_void,
    mirror_view: *mut c_void,
}

unsafe impl Send for WindowsBacking {}

fn to_wide(s: &str) -> Vec<u16> {
    use std::iter::once;
    s.encode_utf16().chain(once(0)).collect()
}

fn last_error(name: &str) -> MapError {
    MapError::from_os_error(name, io::Error::last_os_error())
}

/// Reserves one contiguous placeholder of `layout.total_reservation` bytes,
/// then splits it into header / primary / mirror placeholders per §4.2.3
/// step 3.
unsafe fn reserve_and_split(layout: &Layout, name: &str) -> MapResult<*mut c_void> {
    let base = VirtualAlloc2(
        0 as HANDLE,
        ptr::null(),
        layout.total_reservation,
        MEM_RESERVE | MEM_RESERVE_PLACEHOLDER,
        PAGE_NOACCESS,
        ptr::null_mut::<MEM_EXTENDED_PARAMETER>(),
        0,
    );
    if base.is_null() {
        return Err(last_error(name));
    }

    // Split off the header placeholder: [base, base + aligned_header).
    if VirtualFree(
        base,
        layout.aligned_header_size,
        MEM_RELEASE | MEM_PRESERVE_PLACEHOLDER,
    ) == 0
    {
        return Err(last_error(name));
    }
    // Split off the primary placeholder: [base + aligned_header, base +
    // aligned_header + aligned_buffer). What remains past that point is
    // the mirror placeholder.
    let primary_addr = (base as usize + layout.aligned_header_size) as *mut c_void;
    if VirtualFree(
        primary_addr,
        layout.aligned_buffer_size,
        MEM_RELEASE | MEM_PRESERVE_PLACEHOLDER,
    ) == 0
    {
        return Err(last_error(name));
    }

    Ok(base)
}

unsafe fn map_view(
    section: HANDLE,
    addr: *mut c_void,
    size: usize,
    file_offset: u64,
    name: &str,
) -> MapResult<*mut c_void> {
    let view = MapViewOfFile3(
        section,
        0 as HANDLE,
        addr,
        file_offset,
        size,
        MEM_REPLACE_PLACEHOLDER,
        PAGE_READWRITE,
        ptr::null_mut::<MEM_EXTENDED_PARAMETER>(),
        0,
    );
    if view.is_null() {
        return Err(last_error(name));
    }
    if view != addr {
        return Err(MapError::MapsNotAdjacent {
            name: name.to_owned(),
        });
    }
    Ok(view)
}

unsafe fn map_all_views(section: HANDLE, layout: &Layout, name: &str) -> MapResult<(NonNull<u8>, WindowsBacking)> {
    let base = match reserve_and_split(layout, name) {
        Ok(b) => b,
        Err(e) => return Err(e),
    };

    let header_addr = base;
    let primary_addr = (base as usize + layout.aligned_header_size) as *mut c_void;
    let mirror_addr = (base as usize + layout.mirror_offset) as *mut c_void;

    let header_view = match map_view(section, header_addr, layout.aligned_header_size, 0, name) {
        Ok(v) => v,
        Err(e) => return Err(e),
    };
    let primary_view = match map_view(
        section,
        primary_addr,
        layout.aligned_buffer_size,
        layout.buffer_offset as u64,
        name,
    ) {
        Ok(v) => v,
        Err(e) => return Err(e),
    };
    // Both the primary and mirror placeholders map the same file offset
    // (`buffer_offset`): this is what makes the mirror alias the primary.
    let mirror_view = match map_view(
        section,
        mirror_addr,
        layout.aligned_buffer_size,
        layout.buffer_offset as u64,
        name,
    ) {
        Ok(v) => v,
        Err(e) => return Err(e),
    };

    Ok((
        NonNull::new_unchecked(base as *mut u8),
        WindowsBacking {
            section,
            header_view,
            primary_view,
            mirror_view,
        },
    ))
}

fn high_low(size: usize) -> (u32, u32) {
    ((size >> 32) as u32, (size & 0xFFFF_FFFF) as u32)
}

impl PlatformMapper for WindowsMapper {
    fn backend_name(&self) -> &'static str {
        "windows"
    }

    fn create(&self, name: &str, layout: &Layout) -> MapResult<Mapping> {
        log::debug!("windows: create {name:?} ({} bytes)", layout.total_reservation);
        let wide_name = to_wide(name);
        let object_size = layout.mirror_offset;
        let (size_high, size_low) = high_low(object_size);

        let section = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                ptr::null(),
                PAGE_READWRITE,
                size_high,
                size_low,
                wide_name.as_ptr(),
            )
        };
        if section == 0 {
            return Err(last_error(name));
        }
        if io::Error::last_os_error().raw_os_error() == Some(183)
        /* ERROR_ALREADY_EXISTS */
        {
            unsafe { CloseHandle(section) };
            return Err(MapError::AlreadyExists {
                name: name.to_owned(),
            });
        }

        let (base, backing) = match unsafe { map_all_views(section, layout, name) } {
            Ok(v) => v,
            Err(e) => {
                unsafe { CloseHandle(section) };
                return Err(e);
            }
        };

        Ok(Mapping {
            base,
            total_reservation: layout.total_reservation,
            backend: BackendHandle::Windows(backing),
        })
    }

    fn open(&self, name: &str, layout: &Layout, access: Access) -> MapResult<Mapping> {
        log::debug!("windows: open {name:?}");
        let wide_name = to_wide(name);
        let desired = match access {
            Access::ReadOnly => FILE_MAP_READ,
            Access::ReadWrite => FILE_MAP_WRITE,
        };

        let section = unsafe { OpenFileMappingW(desired, 0, wide_name.as_ptr()) };
        if section == 0 {
            let err = io::Error::last_os_error();
            return Err(if err.raw_os_error() == Some(2) {
                MapError::DoesNotExist {
                    name: name.to_owned(),
                }
            } else {
                MapError::from_os_error(name, err)
            });
        }

        let (base, backing) = match unsafe { map_all_views(section, layout, name) } {
            Ok(v) => v,
            Err(e) => {
                unsafe { CloseHandle(section) };
                return Err(e);
            }
        };

        Ok(Mapping {
            base,
            total_reservation: layout.total_reservation,
            backend: BackendHandle::Windows(backing),
        })
    }

    fn close(&self, mapping: Mapping, name: &str) -> MapResult<()> {
        log::debug!("windows: close {name:?}");
        let backing = match mapping.backend {
            BackendHandle::Windows(backing) => backing,
            #[allow(unreachable_patterns)]
            _ => unreachable!("windows mappings always carry a WindowsBacking"),
        };

        unsafe {
            UnmapViewOfFile2(0 as HANDLE, backing.mirror_view, 0);
            UnmapViewOfFile2(0 as HANDLE, backing.primary_view, 0);
            UnmapViewOfFile2(0 as HANDLE, backing.header_view, 0);
            CloseHandle(backing.section);
        }
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        let wide_name = to_wide(name);
        let section = unsafe { OpenFileMappingW(FILE_MAP_READ, 0, wide_name.as_ptr()) };
        if section == 0 {
            false
        } else {
            unsafe { CloseHandle(section) };
            true
        }
    }
}
