//! The three C2 back-ends of `spec.md` §4.2, selected by `cfg(target_os)`
//! at compile time per §9's "Dynamic-dispatched platform selection" design
//! note ("Retain this: expose a single typed interface for C2 and pick the
//! implementation by conditional compilation; there is no need for a
//! runtime vtable" — the vtable that does exist, `dyn PlatformMapper`, only
//! serves the named-registry override in `crate::mapper`).

#[cfg(unix)]
pub(crate) mod unix_common;

#[cfg(any(target_os = "linux", target_os = "freebsd"))]
pub(crate) mod memfd;

#[cfg(unix)]
pub(crate) mod posix_shm;

#[cfg(windows)]
pub(crate) mod windows;
