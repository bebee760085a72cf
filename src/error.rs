//! Error types for the platform mapper (C2) and the typed ring (C3/C4).
//!
//! Grounded on `N10h0ggr-Gladix/shared/src/errors/*.rs`: one `thiserror`
//! enum per concern, re-exported from this module instead of scattering
//! `Result<_, i32>` the way the teacher's C-ABI-facing `map`/`mapper`
//! modules do — this crate has no C ABI forcing integer error codes.

use std::io;

/// Errors raised by the platform mapper (C2) on create/open/close/exists.
///
/// See `spec.md` §7 for the authoritative table this enum mirrors.
#[derive(thiserror::Error, Debug)]
pub enum MapError {
    #[error("backing object {name:?} already exists")]
    AlreadyExists { name: String },

    #[error("backing object {name:?} does not exist")]
    DoesNotExist { name: String },

    #[error("access denied for backing object {name:?}: {source}")]
    AccessDenied { name: String, source: io::Error },

    #[error("name {name:?} exceeds the platform's maximum backing-object name length")]
    NameTooLong { name: String },

    #[error("file descriptor quota exceeded while mapping {name:?}: {source}")]
    FdQuotaExceeded { name: String, source: io::Error },

    #[error(
        "mirror view of {name:?} did not land immediately after the primary view (platform bug)"
    )]
    MapsNotAdjacent { name: String },

    #[error("requested size for {name:?} is not a multiple of the allocation granularity")]
    AllocationGranularity { name: String },

    #[error("unexpected platform error while mapping {name:?}: {source}")]
    PlatformUnexpected { name: String, source: io::Error },
}

impl MapError {
    /// Maps an `errno`/`GetLastError` value observed while operating on
    /// `name` to the appropriate `MapError` variant, the way
    /// `spec.md` §4.2.1 enumerates the POSIX `errno` values a backend must
    /// recognise.
    pub(crate) fn from_os_error(name: &str, err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EEXIST) => MapError::AlreadyExists {
                name: name.to_owned(),
            },
            Some(libc::ENOENT) => MapError::DoesNotExist {
                name: name.to_owned(),
            },
            Some(libc::EACCES) | Some(libc::EPERM) => MapError::AccessDenied {
                name: name.to_owned(),
                source: err,
            },
            Some(libc::ENAMETOOLONG) => MapError::NameTooLong {
                name: name.to_owned(),
            },
            Some(libc::EMFILE) | Some(libc::ENFILE) => MapError::FdQuotaExceeded {
                name: name.to_owned(),
                source: err,
            },
            _ => MapError::PlatformUnexpected {
                name: name.to_owned(),
                source: err,
            },
        }
    }
}

/// Errors raised by typed-ring (C3) and struct-of-arrays (C4) operations.
#[derive(thiserror::Error, Debug)]
pub enum RingError {
    #[error("index {index} out of range (count={count})")]
    IndexOutOfRange { index: u64, count: u64 },

    #[error("slice [{start}, {stop}) crosses the tail (tail={tail})")]
    WindowCrossesTail { start: u64, stop: u64, tail: u64 },

    #[error("requested {requested} elements but the ring can hold at most {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    #[error(transparent)]
    Map(#[from] MapError),
}

pub type MapResult<T> = Result<T, MapError>;
pub type RingResult<T> = Result<T, RingError>;
