//! POSIX named shared memory back-end (`spec.md` §4.2.1).
use std::ffi::CString;
use std::io;
use std::os::unix::io::{FromRawFd, OwnedFd, RawFd};

use crate::error::{MapError, MapResult};
use crate::layout::Layout;
use crate::mapper::{Access, BackendHandle, Mapping, PlatformMapper};
use crate::platform::unix_common::{double_map, unmap_all, UnixBacking};

#[derive(Debug)]
pub(crate) struct PosixShmMapper;

fn to_cname(name: &str) -> MapResult<CString> {
    assert!(name.starts_with('/'), "POSIX shm names must begin with '/'");
    CString::new(name).map_err(|_| MapError::NameTooLong {
        name: name.to_owned(),
    })
}

impl PlatformMapper for PosixShmMapper {
    fn backend_name(&self) -> &'static str {
        "shm"
    }

    fn create(&self, name: &str, layout: &Layout) -> MapResult<Mapping> {
        log::debug!("posix_shm: create {name:?} ({} bytes)", layout.total_reservation);
        let cname = to_cname(name)?;

        let fd: RawFd = unsafe {
            libc::shm_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o666,
            )
        };
        if fd < 0 {
            return Err(MapError::from_os_error(name, io::Error::last_os_error()));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let object_size = layout.mirror_offset as libc::off_t;
        if unsafe { libc::ftruncate(std::os::unix::io::AsRawFd::as_raw_fd(&fd), object_size) } != 0 {
            let err = MapError::from_os_error(name, io::Error::last_os_error());
            unsafe { libc::shm_unlink(cname.as_ptr()) };
            return Err(err);
        }

        let base = unsafe {
            double_map(std::os::unix::io::AsRawFd::as_raw_fd(&fd), layout, Access::ReadWrite)
        }
        .map_err(|e| MapError::from_os_error(name, e))?;

        // The mapped region is zero-initialised by the kernel for a
        // freshly truncated shm object; no explicit zero-fill is needed.

        Ok(Mapping {
            base,
            total_reservation: layout.total_reservation,
            backend: BackendHandle::Unix(UnixBacking {
                fd,
                name: name.to_owned(),
                unlink_on_close: true,
            }),
        })
    }

    fn open(&self, name: &str, layout: &Layout, access: Access) -> MapResult<Mapping> {
        log::debug!("posix_shm: open {name:?}");
        let cname = to_cname(name)?;

        let flags = match access {
            Access::ReadOnly => libc::O_RDONLY,
            Access::ReadWrite => libc::O_RDWR,
        };
        let fd: RawFd = unsafe { libc::shm_open(cname.as_ptr(), flags, 0) };
        if fd < 0 {
            return Err(MapError::from_os_error(name, io::Error::last_os_error()));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let base = unsafe {
            double_map(std::os::unix::io::AsRawFd::as_raw_fd(&fd), layout, access)
        }
        .map_err(|e| MapError::from_os_error(name, e))?;

        Ok(Mapping {
            base,
            total_reservation: layout.total_reservation,
            backend: BackendHandle::Unix(UnixBacking {
                fd,
                name: name.to_owned(),
                unlink_on_close: true,
            }),
        })
    }

    fn close(&self, mapping: Mapping, name: &str) -> MapResult<()> {
        log::debug!("posix_shm: close {name:?}");
        let backing = match mapping.backend {
            BackendHandle::Unix(backing) => backing,
            #[allow(unreachable_patterns)]
            _ => unreachable!("posix_shm mappings always carry a UnixBacking"),
        };

        unsafe { unmap_all(mapping.base, mapping.total_reservation) };
        drop(backing.fd);

        if backing.unlink_on_close {
            let cname = to_cname(name)?;
            let ret = unsafe { libc::shm_unlink(cname.as_ptr()) };
            if ret != 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ENOENT) {
                    log::warn!("posix_shm: shm_unlink({name:?}) failed: {err}");
                    return Err(MapError::from_os_error(name, err));
                }
            }
        }
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        let cname = match to_cname(name) {
            Ok(c) => c,
            Err(_) => return false,
        };
        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDONLY, 0) };
        if fd >= 0 {
            unsafe { libc::close(fd) };
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/magicring-test-{tag}-{}", std::process::id())
    }

    #[test]
    fn create_open_close_roundtrip() {
        let mapper = PosixShmMapper;
        let name = unique_name("shm-roundtrip");
        let layout = crate::layout::compute(8, 64, 24);

        assert!(!mapper.exists(&name));
        let mapping = mapper.create(&name, &layout).expect("create should succeed");
        assert!(mapper.exists(&name));

        mapper.close(mapping, &name).expect("close should succeed");
        assert!(!mapper.exists(&name));
    }

    #[test]
    fn create_twice_fails_with_already_exists() {
        let mapper = PosixShmMapper;
        let name = unique_name("shm-dup");
        let layout = crate::layout::compute(8, 64, 24);

        let mapping = mapper.create(&name, &layout).expect("first create succeeds");
        let err = mapper.create(&name, &layout).expect_err("second create must fail");
        assert!(matches!(err, MapError::AlreadyExists { .. }));

        mapper.close(mapping, &name).unwrap();
    }

    #[test]
    fn open_missing_fails_with_does_not_exist() {
        let mapper = PosixShmMapper;
        let name = unique_name("shm-missing");
        let layout = crate::layout::compute(8, 64, 24);

        let err = mapper
            .open(&name, &layout, Access::ReadWrite)
            .expect_err("open of missing object must fail");
        assert!(matches!(err, MapError::DoesNotExist { .. }));
    }

    #[test]
    fn mirror_aliases_primary() {
        let mapper = PosixShmMapper;
        let name = unique_name("shm-mirror");
        let layout = crate::layout::compute(8, 64, 24);

        let mapping = mapper.create(&name, &layout).expect("create should succeed");
        unsafe {
            let primary = mapping.base.as_ptr().add(layout.buffer_offset);
            let mirror = mapping.base.as_ptr().add(layout.mirror_offset);
            *primary = 0xAB;
            assert_eq!(*mirror, 0xAB);
            *mirror.add(1) = 0xCD;
            assert_eq!(*primary.add(1), 0xCD);
        }
        mapper.close(mapping, &name).unwrap();
    }
}
