//! C1: the layout calculator.
//!
//! A pure function from `(element_size, element_count_requested,
//! header_size)` to a fully page-aligned description of the virtual memory
//! a ring will need. Grounded on `backtrace-labs-slitter::map::page_size`
//! (the page-size query, generalized here to also carry the platform's
//! allocation granularity) and the constant-derivation style of
//! `backtrace-labs-slitter::mill` (`MAPPED_REGION_SIZE`, `PREFIX_SIZE`,
//! `SUFFIX_SIZE` computed once from a few platform numbers).
#[cfg(any(
    all(test, feature = "check_contracts_in_tests"),
    feature = "check_contracts"
))]
use contracts::*;
#[cfg(not(any(
    all(test, feature = "check_contracts_in_tests"),
    feature = "check_contracts")))]
use disabled_contracts::*;

/// The platform's page size and file-mapping allocation granularity.
///
/// On POSIX these are equal. On Windows the allocation granularity
/// (typically 64 KiB) is coarser than the page size (typically 4 KiB); see
/// `spec.md` §4.1 step 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformLimits {
    pub page_size: usize,
    pub allocation_granularity: usize,
}

impl PlatformLimits {
    /// The stricter (larger) of the two alignments; layout math always
    /// aligns to this value so both page size and allocation granularity
    /// are respected in one pass.
    pub fn alignment(&self) -> usize {
        self.page_size.max(self.allocation_granularity)
    }
}

#[cfg(unix)]
fn query_platform_limits() -> PlatformLimits {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let page_size = if page_size > 0 {
        page_size as usize
    } else {
        4096
    };
    // POSIX has no separate allocation-granularity concept; mmap can be
    // placed at any page boundary.
    PlatformLimits {
        page_size,
        allocation_granularity: page_size,
    }
}

#[cfg(windows)]
fn query_platform_limits() -> PlatformLimits {
    use std::mem::MaybeUninit;
    use windows_sys::Win32::System::SystemInformation::GetSystemInfo;

    unsafe {
        let mut info = MaybeUninit::uninit();
        GetSystemInfo(info.as_mut_ptr());
        let info = info.assume_init();
        PlatformLimits {
            page_size: info.dwPageSize as usize,
            allocation_granularity: info.dwAllocationGranularity as usize,
        }
    }
}

lazy_static::lazy_static! {
    static ref PLATFORM_LIMITS: PlatformLimits = query_platform_limits();
}

/// Returns the system page size.
#[inline]
pub fn page_size() -> usize {
    PLATFORM_LIMITS.page_size
}

/// Returns the system file-mapping allocation granularity.
#[inline]
pub fn allocation_granularity() -> usize {
    PLATFORM_LIMITS.allocation_granularity
}

/// Returns both platform numbers together.
#[inline]
pub fn platform_limits() -> PlatformLimits {
    *PLATFORM_LIMITS
}

/// Rounds `value` up to the nearest multiple of `align` (`align` must be a
/// power of two).
#[inline]
pub(crate) fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align > 0 && (align & (align - 1)) == 0, "align must be a power of two");
    (value + align - 1) & !(align - 1)
}

/// C1 output: an immutable, fully page-aligned description of a ring's
/// virtual memory. See `spec.md` §3 "Layout descriptor" for the invariants
/// this struct upholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub page_size: usize,
    pub allocation_granularity: usize,

    pub raw_header_size: usize,
    pub raw_buffer_size: usize,

    pub element_size: usize,
    pub element_count_requested: usize,

    pub aligned_header_size: usize,
    pub aligned_buffer_size: usize,

    /// Always >= `element_count_requested`.
    pub actual_element_count: usize,

    pub header_page_count: usize,
    pub buffer_page_count: usize,

    /// `aligned_header_size + 2 * aligned_buffer_size`.
    pub total_reservation: usize,

    /// Always 0.
    pub header_offset: usize,
    /// `aligned_header_size`.
    pub buffer_offset: usize,
    /// `aligned_header_size + aligned_buffer_size`.
    pub mirror_offset: usize,
}

#[ensures(ret.aligned_header_size % ret.alignment() == 0, "aligned header is alignment-aligned")]
#[ensures(ret.aligned_buffer_size % ret.alignment() == 0, "aligned buffer is alignment-aligned")]
#[ensures(ret.actual_element_count * ret.element_size == ret.aligned_buffer_size,
          "actual element count exactly fills the aligned buffer")]
#[ensures(ret.actual_element_count >= ret.element_count_requested,
          "actual element count never undershoots the request")]
#[ensures(ret.header_offset + ret.raw_header_size <= ret.buffer_offset,
          "the header never overlaps the buffer")]
#[ensures(ret.mirror_offset - ret.buffer_offset == ret.aligned_buffer_size,
          "the mirror starts exactly one aligned buffer after the primary")]
pub fn compute(element_size: usize, element_count_requested: usize, header_size: usize) -> Layout {
    assert!(element_size > 0, "element_size must be non-zero");
    assert!(element_count_requested > 0, "element_count_requested must be non-zero");

    let limits = platform_limits();
    let align = limits.alignment();

    let raw_header_size = header_size;
    let raw_buffer_size = element_size * element_count_requested;

    let aligned_header_size = align_up(raw_header_size.max(1), align);
    let aligned_buffer_size = align_up(raw_buffer_size, align);

    let actual_element_count = aligned_buffer_size / element_size;

    let header_page_count = aligned_header_size / limits.page_size;
    let buffer_page_count = aligned_buffer_size / limits.page_size;

    let total_reservation = aligned_header_size + 2 * aligned_buffer_size;

    Layout {
        page_size: limits.page_size,
        allocation_granularity: limits.allocation_granularity,
        raw_header_size,
        raw_buffer_size,
        element_size,
        element_count_requested,
        aligned_header_size,
        aligned_buffer_size,
        actual_element_count,
        header_page_count,
        buffer_page_count,
        total_reservation,
        header_offset: 0,
        buffer_offset: aligned_header_size,
        mirror_offset: aligned_header_size + aligned_buffer_size,
    }
}

impl Layout {
    pub fn alignment(&self) -> usize {
        self.page_size.max(self.allocation_granularity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_up_to_page_size() {
        let layout = compute(4, 1024, 24);
        assert!(layout.actual_element_count >= 1024);
        assert_eq!(layout.aligned_buffer_size % layout.alignment(), 0);
        assert_eq!(layout.aligned_header_size % layout.alignment(), 0);
        assert_eq!(layout.mirror_offset - layout.buffer_offset, layout.aligned_buffer_size);
        assert_eq!(layout.total_reservation, layout.aligned_header_size + 2 * layout.aligned_buffer_size);
    }

    #[test]
    fn small_header_still_gets_a_full_page() {
        let layout = compute(8, 10, 24);
        assert!(layout.aligned_header_size >= layout.page_size);
    }

    #[test]
    fn large_header_rounds_up_to_next_page() {
        let layout = compute(8, 10, 1000);
        assert!(layout.aligned_header_size >= 1000);
        assert_eq!(layout.aligned_header_size % layout.page_size, 0);
    }
}
