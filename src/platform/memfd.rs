//! Linux/FreeBSD memfd back-end (`spec.md` §4.2.2).
//!
//! Grounded on `erenon-cueue::memoryfile`'s Linux branch (`memfd_create`,
//! then `ftruncate`, then the same `doublemap` trick). memfd objects have
//! no shared namespace: a second process discovers one only via
//! `/proc/<pid>/fd/<n>`, which is also how this back-end treats an `open`
//! name that isn't one of its own in-process labels. Secondary openers get
//! a read-only mapping even when `Access::ReadWrite` is requested — §4.2.2
//! calls this "a known asymmetry, preserved intentionally", carried
//! forward from Open Question 1 in `spec.md` §9.
use std::collections::HashMap;
use std::ffi::CString;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Mutex;

use crate::error::{MapError, MapResult};
use crate::layout::Layout;
use crate::mapper::{Access, BackendHandle, Mapping, PlatformMapper};
use crate::platform::unix_common::{double_map, unmap_all, UnixBacking};

#[derive(Debug)]
pub(crate) struct MemfdMapper;

// memfd objects have no OS-level name registry; this process-local table
// lets `open`/`exists` find an object this same process created by label,
// the way a test (or a single process opening its own rings twice) would
// expect. Cross-process opens must instead pass a `/proc/<pid>/fd/<n>`
// path as `name`.
lazy_static::lazy_static! {
    static ref LOCAL_MEMFDS: Mutex<HashMap<String, RawFd>> = Mutex::new(HashMap::new());
}

fn proc_fd_path(name: &str) -> Option<&str> {
    if name.starts_with("/proc/") {
        Some(name)
    } else {
        None
    }
}

impl PlatformMapper for MemfdMapper {
    fn backend_name(&self) -> &'static str {
        "memfd"
    }

    fn create(&self, name: &str, layout: &Layout) -> MapResult<Mapping> {
        log::debug!("memfd: create {name:?} ({} bytes)", layout.total_reservation);
        let cname = CString::new(name).map_err(|_| MapError::NameTooLong {
            name: name.to_owned(),
        })?;

        let fd: RawFd = unsafe { libc::memfd_create(cname.as_ptr(), 0) };
        if fd < 0 {
            return Err(MapError::from_os_error(name, io::Error::last_os_error()));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let object_size = layout.mirror_offset as libc::off_t;
        if unsafe { libc::ftruncate(fd.as_raw_fd(), object_size) } != 0 {
            return Err(MapError::from_os_error(name, io::Error::last_os_error()));
        }

        let base = unsafe { double_map(fd.as_raw_fd(), layout, Access::ReadWrite) }
            .map_err(|e| MapError::from_os_error(name, e))?;

        LOCAL_MEMFDS
            .lock()
            .unwrap()
            .insert(name.to_owned(), fd.as_raw_fd());
        // The registry keeps a borrowed-looking raw fd alongside the
        // `OwnedFd` in `UnixBacking`; it is purely a lookup key and is
        // scrubbed in `close`, never independently closed.

        Ok(Mapping {
            base,
            total_reservation: layout.total_reservation,
            backend: BackendHandle::Unix(UnixBacking {
                fd,
                name: name.to_owned(),
                unlink_on_close: false,
            }),
        })
    }

    fn open(&self, name: &str, layout: &Layout, access: Access) -> MapResult<Mapping> {
        log::debug!("memfd: open {name:?}");

        // Secondary opens are always read-only, regardless of what the
        // caller asked for: this is the documented memfd asymmetry.
        let _ = access;
        let effective_access = Access::ReadOnly;

        let fd: RawFd = if let Some(path) = proc_fd_path(name) {
            let cpath = CString::new(path).map_err(|_| MapError::NameTooLong {
                name: name.to_owned(),
            })?;
            unsafe { libc::open(cpath.as_ptr(), libc::O_RDONLY) }
        } else {
            let registry = LOCAL_MEMFDS.lock().unwrap();
            match registry.get(name) {
                Some(&existing) => unsafe { libc::dup(existing) },
                None => {
                    return Err(MapError::DoesNotExist {
                        name: name.to_owned(),
                    })
                }
            }
        };
        if fd < 0 {
            return Err(MapError::from_os_error(name, io::Error::last_os_error()));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let base = unsafe { double_map(fd.as_raw_fd(), layout, effective_access) }
            .map_err(|e| MapError::from_os_error(name, e))?;

        Ok(Mapping {
            base,
            total_reservation: layout.total_reservation,
            backend: BackendHandle::Unix(UnixBacking {
                fd,
                name: name.to_owned(),
                unlink_on_close: false,
            }),
        })
    }

    fn close(&self, mapping: Mapping, name: &str) -> MapResult<()> {
        log::debug!("memfd: close {name:?}");
        let backing = match mapping.backend {
            BackendHandle::Unix(backing) => backing,
            #[allow(unreachable_patterns)]
            _ => unreachable!("memfd mappings always carry a UnixBacking"),
        };

        unsafe { unmap_all(mapping.base, mapping.total_reservation) };
        drop(backing.fd);
        LOCAL_MEMFDS.lock().unwrap().remove(name);
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        LOCAL_MEMFDS.lock().unwrap().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_open_close_roundtrip() {
        let mapper = MemfdMapper;
        let name = format!("magicring-memfd-{}", std::process::id());
        let layout = crate::layout::compute(8, 64, 24);

        assert!(!mapper.exists(&name));
        let mapping = mapper.create(&name, &layout).expect("create should succeed");
        assert!(mapper.exists(&name));

        mapper.close(mapping, &name).expect("close should succeed");
        assert!(!mapper.exists(&name));
    }

    #[test]
    fn secondary_open_is_read_only() {
        let mapper = MemfdMapper;
        let name = format!("magicring-memfd-ro-{}", std::process::id());
        let layout = crate::layout::compute(8, 64, 24);

        let creator = mapper.create(&name, &layout).expect("create should succeed");
        let opener = mapper
            .open(&name, &layout, Access::ReadWrite)
            .expect("open should succeed even though it silently downgrades access");

        mapper.close(opener, &name).unwrap();
        mapper.close(creator, &name).unwrap();
    }
}
