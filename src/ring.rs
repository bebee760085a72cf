//! C3: the typed ring with header.
//!
//! Binds C1 (layout) and C2 (platform mapper) to a concrete element type
//! `T` and user header type `H`, and exposes the push/slice/valueAt
//! operations of `spec.md` §4.3. Grounded on `erenon-cueue`'s
//! `Writer`/`Reader` (the double-mapped buffer plus a cursor pair) widened
//! to a single read/write handle with an arbitrary `H` extension header, in
//! the style `TrapedCircuit-satrin-feed-rs::shm::ShmMdStore` lays user
//! metadata before a typed buffer.
#[cfg(any(
    all(test, feature = "check_contracts_in_tests"),
    feature = "check_contracts"
))]
use contracts::*;
#[cfg(not(any(
    all(test, feature = "check_contracts_in_tests"),
    feature = "check_contracts")))]
use disabled_contracts::*;

use std::marker::PhantomData;
use std::sync::atomic::Ordering::Relaxed;

use crate::error::{MapError, RingError, RingResult};
use crate::layout::{self, Layout};
use crate::mapper::{self, Access, Mapping, PlatformMapper};
use crate::state::{RingStats, State};

/// A named, shared-memory, single-producer magic ring buffer of `T`, with
/// an in-band `{count, head, tail}` ⊕ `H` header. See `spec.md` §3 "Ring
/// handle".
///
/// `T: Copy` is required because elements are written into shared memory
/// with `ptr::copy_nonoverlapping`/raw writes that bypass `Drop` — the same
/// bound `TrapedCircuit-satrin-feed-rs::shm::ShmMdStore<T: Copy>` places on
/// its mmap'd element type.
pub struct Ring<T: Copy, H> {
    mapping: Option<Mapping>,
    layout: Layout,
    name: String,
    mapper: &'static dyn PlatformMapper,
    _marker: PhantomData<fn() -> (T, H)>,
}

impl<T: Copy, H> Ring<T, H> {
    fn header_size() -> usize {
        std::mem::size_of::<State<H>>()
    }

    fn element_size() -> usize {
        std::mem::size_of::<T>()
    }

    /// Creates a new named ring able to hold at least `length` elements of
    /// `T`. Fails with `MapError::AlreadyExists` (wrapped as
    /// `RingError::Map`) if `name` is already taken.
    pub fn create(name: &str, length: usize, mapper_name: Option<&str>) -> RingResult<Self> {
        let mapper = mapper::get_mapper(mapper_name).map_err(|_| {
            RingError::Map(MapError::PlatformUnexpected {
                name: name.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "unknown mapper name"),
            })
        })?;

        if mapper.exists(name) {
            // Fast-path courtesy check (spec.md §4.3); the platform
            // mapper's create() below is the atomic, authoritative check.
            return Err(RingError::Map(MapError::AlreadyExists {
                name: name.to_owned(),
            }));
        }

        let layout = layout::compute(Self::element_size(), length, Self::header_size());
        let mapping = mapper.create(name, &layout)?;
        log::debug!(
            "ring {name:?}: created with actual_element_count={}",
            layout.actual_element_count
        );

        let ring = Self {
            mapping: Some(mapping),
            layout,
            name: name.to_owned(),
            mapper,
            _marker: PhantomData,
        };
        // The backing pages are already zero-filled by the OS on a fresh
        // object, but resetting explicitly keeps the invariant independent
        // of that platform guarantee (spec.md §4.3 "Zero-initialise the
        // header area").
        ring.state().reset();
        Ok(ring)
    }

    /// Opens an existing named ring. The caller must pass the same
    /// `length` used at `create` time — the region carries no metadata
    /// describing its own capacity, only the raw `{count, head, tail}` ⊕
    /// `H` prefix (spec.md §6).
    pub fn open(
        name: &str,
        length: usize,
        access: Access,
        mapper_name: Option<&str>,
    ) -> RingResult<Self> {
        let mapper = mapper::get_mapper(mapper_name).map_err(|_| {
            RingError::Map(MapError::PlatformUnexpected {
                name: name.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "unknown mapper name"),
            })
        })?;

        let layout = layout::compute(Self::element_size(), length, Self::header_size());
        let mapping = mapper.open(name, &layout, access)?;
        log::debug!("ring {name:?}: opened");

        Ok(Self {
            mapping: Some(mapping),
            layout,
            name: name.to_owned(),
            mapper,
            _marker: PhantomData,
        })
    }

    /// Tears down the mapping. Consumes the handle so no view can outlive
    /// it (spec.md §5 "Lifetime").
    pub fn close(mut self) -> RingResult<()> {
        let mapping = self.mapping.take().expect("close called exactly once");
        self.mapper.close(mapping, &self.name)?;
        Ok(())
    }

    /// Returns whether a ring named `name` currently exists, without
    /// opening it (spec.md Scenario F).
    pub fn exists(name: &str, mapper_name: Option<&str>) -> RingResult<bool> {
        let mapper = mapper::get_mapper(mapper_name).map_err(|_| {
            RingError::Map(MapError::PlatformUnexpected {
                name: name.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "unknown mapper name"),
            })
        })?;
        Ok(mapper.exists(name))
    }

    /// Actual element count `L` (always >= the requested count).
    pub fn len(&self) -> usize {
        self.layout.actual_element_count
    }

    pub fn is_empty(&self) -> bool {
        self.current_state().count == 0
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn mapping(&self) -> &Mapping {
        self.mapping.as_ref().expect("ring used after close")
    }

    fn state(&self) -> &State<H> {
        unsafe { &*(self.mapping().base_ptr() as *const State<H>) }
    }

    /// Mutable access to the caller's extension header `H`.
    pub fn header_mut(&mut self) -> &mut H {
        unsafe { &mut (*(self.mapping().base_ptr() as *mut State<H>)).header }
    }

    pub fn header(&self) -> &H {
        &self.state().header
    }

    /// A point-in-time `{count, head, tail}` snapshot (spec.md §4.3
    /// `currentState()`).
    pub fn current_state(&self) -> RingStats {
        self.state().snapshot()
    }

    /// Resets `count`/`head`/`tail` to zero. Does not touch `H`.
    pub fn reset(&mut self) {
        self.state().reset();
    }

    fn combined_ptr(&self) -> *const T {
        unsafe { self.mapping().base_ptr().add(self.layout.buffer_offset) as *const T }
    }

    fn combined_mut_ptr(&mut self) -> *mut T {
        unsafe { self.mapping().base_ptr().add(self.layout.buffer_offset) as *mut T }
    }

    /// The combined view: primary buffer ∪ mirror, length `2L`. Wrap-free
    /// windows of length <= L are always contiguous within it.
    fn combined(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.combined_ptr(), 2 * self.len()) }
    }

    fn combined_mut(&mut self) -> &mut [T] {
        let len = 2 * self.len();
        unsafe { std::slice::from_raw_parts_mut(self.combined_mut_ptr(), len) }
    }

    /// The primary buffer, length `L`.
    pub fn buffer(&self) -> &[T] {
        let l = self.len();
        &self.combined()[..l]
    }

    pub fn buffer_mut(&mut self) -> &mut [T] {
        let l = self.len();
        &mut self.combined_mut()[..l]
    }

    /// Writes `v` into the next slot and advances `count`/`head`/`tail`.
    /// Returns the new `count`.
    pub fn push(&mut self, v: T) -> u64 {
        // push_values never fails for a single element: 1 <= L always
        // holds since L >= 1 (layout::compute rejects a zero count).
        self.push_values(std::slice::from_ref(&v)).expect("len 1 <= L")
    }

    /// Copies `vs` contiguously starting at the current head, and advances
    /// `count`/`head`/`tail` by `vs.len()`. The combined view makes the
    /// destination contiguous even when it straddles the primary/mirror
    /// seam.
    #[ensures(match &ret {
                  Ok(c) => *c == old(self.current_state().count) + vs.len() as u64,
                  Err(_) => true,
              },
              "count advances by exactly vs.len() on success (§8 invariant 3, monotonic count)")]
    pub fn push_values(&mut self, vs: &[T]) -> RingResult<u64> {
        let l = self.len() as u64;
        if vs.len() as u64 > l {
            return Err(RingError::CapacityExceeded {
                requested: vs.len(),
                capacity: l as usize,
            });
        }

        let stats = self.current_state();
        let idx = (stats.count % l) as usize;
        unsafe {
            let dst = self.combined_mut_ptr().add(idx);
            std::ptr::copy_nonoverlapping(vs.as_ptr(), dst, vs.len());
        }

        let new_count = stats.count + vs.len() as u64;
        let (head, tail) = Self::advance(new_count, l);

        let state = self.state();
        state.count.store(new_count, Relaxed);
        state.head.store(head, Relaxed);
        state.tail.store(tail, Relaxed);
        Ok(new_count)
    }

    /// Computes `(head, tail)` for a ring of capacity `l` that has taken
    /// exactly `count` pushes in total. `head = count mod 2L`; `tail`
    /// trails `head` by the ring's current occupancy (`min(count, L)`),
    /// itself taken mod `2L` so it wraps consistently with `head`.
    fn advance(count: u64, l: u64) -> (u64, u64) {
        let two_l = 2 * l;
        let head = count % two_l;
        let occupancy = count.min(l);
        let tail = (head + two_l - occupancy) % two_l;
        (head, tail)
    }

    /// Returns `ring[i mod L]`. Requires `i < count`.
    pub fn value_at(&self, i: u64) -> RingResult<T> {
        let stats = self.current_state();
        if i >= stats.count {
            return Err(RingError::IndexOutOfRange {
                index: i,
                count: stats.count,
            });
        }
        let l = self.len() as u64;
        Ok(self.combined()[(i % l) as usize])
    }

    /// Returns the sub-range `ring[(start mod L) .. (start mod L) +
    /// (stop - start)]`, using the mirror to stay contiguous even if the
    /// window crosses `L`.
    ///
    /// Tightened per `spec.md` §9 Open Question 4: compares the logical
    /// `start` directly against the logical `tail`, rather than the
    /// source's `start mod L >= tail mod L` (which only caught a subset of
    /// window-behind-tail violations).
    #[ensures(match &ret {
                  Ok(s) => s.len() as u64 == stop - start,
                  Err(_) => true,
              },
              "returned window has exactly stop - start elements (§8 invariant 5)")]
    pub fn slice(&self, start: u64, stop: u64) -> RingResult<&[T]> {
        if start > stop {
            return Err(RingError::IndexOutOfRange {
                index: start,
                count: stop,
            });
        }
        let l = self.len() as u64;
        let len = stop - start;
        if len > l {
            return Err(RingError::CapacityExceeded {
                requested: len as usize,
                capacity: l as usize,
            });
        }
        let tail = self.current_state().tail;
        if start < tail {
            return Err(RingError::WindowCrossesTail { start, stop, tail });
        }
        let idx = (start % l) as usize;
        Ok(&self.combined()[idx..idx + len as usize])
    }

    /// Returns the `k` oldest live elements: `ring[(tail mod L) .. (tail
    /// mod L) + k]`. Requires `k <= L`.
    pub fn slice_from_tail(&self, k: u64) -> RingResult<&[T]> {
        let l = self.len() as u64;
        if k > l {
            return Err(RingError::CapacityExceeded {
                requested: k as usize,
                capacity: l as usize,
            });
        }
        let tail = self.current_state().tail;
        let idx = (tail % l) as usize;
        Ok(&self.combined()[idx..idx + k as usize])
    }

    /// Returns the `k` most recently pushed elements: `ring[(head - k) ..
    /// head]`. Requires `k <= count` and `k <= L`.
    pub fn slice_to_head(&self, k: u64) -> RingResult<&[T]> {
        let stats = self.current_state();
        if k > stats.count {
            return Err(RingError::IndexOutOfRange {
                index: k,
                count: stats.count,
            });
        }
        let l = self.len() as u64;
        if k > l {
            return Err(RingError::CapacityExceeded {
                requested: k as usize,
                capacity: l as usize,
            });
        }
        let two_l = 2 * l;
        let logical_start = (stats.head + two_l - k) % two_l;
        let idx = (logical_start % l) as usize;
        Ok(&self.combined()[idx..idx + k as usize])
    }

    /// Overwrites the element at logical index `i` in place, without
    /// advancing `count`/`head`/`tail`.
    ///
    /// Tightened per `spec.md` §9 Open Question 3: rejects `i < tail`
    /// (writing behind the already-overrun tail) instead of silently
    /// allowing it, since the source left this undetermined.
    pub fn insert(&mut self, v: T, i: u64) -> RingResult<()> {
        self.insert_values(std::slice::from_ref(&v), i)
    }

    /// Overwrites `vs.len()` elements starting at logical index `i`, in
    /// place, without advancing `count`/`head`/`tail`.
    pub fn insert_values(&mut self, vs: &[T], i: u64) -> RingResult<()> {
        let l = self.len() as u64;
        if vs.len() as u64 > l {
            return Err(RingError::CapacityExceeded {
                requested: vs.len(),
                capacity: l as usize,
            });
        }
        let stats = self.current_state();
        let last = i + vs.len() as u64;
        if last > stats.count {
            return Err(RingError::IndexOutOfRange {
                index: last,
                count: stats.count,
            });
        }
        if i < stats.tail {
            return Err(RingError::WindowCrossesTail {
                start: i,
                stop: last,
                tail: stats.tail,
            });
        }
        let idx = (i % l) as usize;
        unsafe {
            let dst = self.combined_mut_ptr().add(idx);
            std::ptr::copy_nonoverlapping(vs.as_ptr(), dst, vs.len());
        }
        Ok(())
    }
}

impl<T: Copy, H> Drop for Ring<T, H> {
    fn drop(&mut self) {
        if let Some(mapping) = self.mapping.take() {
            if let Err(e) = self.mapper.close(mapping, &self.name) {
                log::warn!("ring {:?}: close on drop failed: {e}", self.name);
            }
        }
    }
}
