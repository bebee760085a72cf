//! C2: the platform mapper.
//!
//! `PlatformMapper` is this crate's analogue of
//! `backtrace-labs-slitter::mapper::Mapper`: a trait that parameterises the
//! rest of the library on how address space and backing storage are
//! acquired from the OS, plus a `lazy_static`-backed named registry so a
//! caller can ask for a specific back-end (`"memfd"`, `"shm"`, `"windows"`)
//! instead of the platform default — mirroring
//! `mapper::{register_mapper, get_mapper}` exactly, with real back-ends in
//! place of the teacher's single file-backed one.
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Mutex;

use crate::error::MapResult;
use crate::layout::Layout;

/// Whether an `open()` should attach the backing object for reading only,
/// or for reading and writing. See `spec.md` §4.2.1 ("access mode
/// selectable read-only or read-write") and §4.2.2 (memfd's read-only
/// asymmetry for secondary openers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// A live mapping of a ring's backing object: `total_reservation` bytes of
/// virtual address space beginning at `base`, laid out per `spec.md` §6's
/// "in-memory layout of a ring": header, then primary buffer, then a mirror
/// view that aliases the primary.
#[derive(Debug)]
pub struct Mapping {
    pub(crate) base: NonNull<u8>,
    pub(crate) total_reservation: usize,
    pub(crate) backend: BackendHandle,
}

/// Per-platform resource the `Mapping` must release on close. Kept as an
/// enum (rather than a trait object) since exactly one variant is ever
/// constructible on a given target.
#[derive(Debug)]
pub(crate) enum BackendHandle {
    #[cfg(unix)]
    Unix(crate::platform::unix_common::UnixBacking),
    #[cfg(windows)]
    Windows(crate::platform::windows::WindowsBacking),
}

impl Mapping {
    /// Base address of the full reservation (header + primary + mirror).
    pub fn base_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    pub fn total_reservation(&self) -> usize {
        self.total_reservation
    }
}

unsafe impl Send for Mapping {}

/// The four-operation shared-memory collaborator described in `spec.md`
/// §6, generalized across the three back-ends of §4.2.
pub trait PlatformMapper: std::fmt::Debug + Sync {
    /// A short, stable label used by the named-mapper registry (`"memfd"`,
    /// `"shm"`, `"windows"`).
    fn backend_name(&self) -> &'static str;

    /// Creates a new named backing object sized per `layout` and maps it
    /// per `spec.md` §4.2. Fails with `MapError::AlreadyExists` if `name`
    /// is already present.
    fn create(&self, name: &str, layout: &Layout) -> MapResult<Mapping>;

    /// Opens an existing named backing object. Fails with
    /// `MapError::DoesNotExist` if `name` is absent.
    fn open(&self, name: &str, layout: &Layout, access: Access) -> MapResult<Mapping>;

    /// Tears down a mapping previously returned by `create`/`open`, and
    /// removes the backing object's name if this mapper owns it (POSIX shm
    /// and Windows unlink on close; memfd has nothing to unlink).
    fn close(&self, mapping: Mapping, name: &str) -> MapResult<()>;

    /// Returns whether a backing object named `name` currently exists.
    fn exists(&self, name: &str) -> bool;
}

#[cfg(all(unix, any(target_os = "linux", target_os = "freebsd")))]
fn default_backend() -> &'static dyn PlatformMapper {
    &crate::platform::memfd::MemfdMapper
}

#[cfg(all(unix, not(any(target_os = "linux", target_os = "freebsd"))))]
fn default_backend() -> &'static dyn PlatformMapper {
    &crate::platform::posix_shm::PosixShmMapper
}

#[cfg(windows)]
fn default_backend() -> &'static dyn PlatformMapper {
    &crate::platform::windows::WindowsMapper
}

lazy_static::lazy_static! {
    static ref NAMED_MAPPERS: Mutex<HashMap<&'static str, &'static dyn PlatformMapper>> = {
        let mut map: HashMap<&'static str, &'static dyn PlatformMapper> = HashMap::new();

        #[cfg(unix)]
        {
            map.insert("memfd-or-shm", default_backend());
            #[cfg(any(target_os = "linux", target_os = "freebsd"))]
            map.insert("memfd", &crate::platform::memfd::MemfdMapper);
            map.insert("shm", &crate::platform::posix_shm::PosixShmMapper);
        }
        #[cfg(windows)]
        {
            map.insert("windows", default_backend());
        }

        Mutex::new(map)
    };
}

/// Registers an additional named mapper, the way
/// `slitter::mapper::register_mapper` lets callers extend the registry.
pub fn register_mapper(name: &'static str, mapper: &'static dyn PlatformMapper) {
    let mut mappers = NAMED_MAPPERS.lock().unwrap();
    mappers.insert(name, mapper);
}

/// Returns the mapper for `name`, or the platform default if `name` is
/// `None`.
pub fn get_mapper(name: Option<&str>) -> Result<&'static dyn PlatformMapper, &'static str> {
    match name {
        Some(key) => {
            let mappers = NAMED_MAPPERS.lock().unwrap();
            Ok(*mappers.get(key).ok_or("mapper not found")?)
        }
        None => Ok(default_backend()),
    }
}
