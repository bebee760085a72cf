//! The in-band state header shared by every ring: `spec.md` §3's "State
//! header" and the bit-exact layout table in §6.
//!
//! Grounded on `erenon-cueue::ControlBlock`, which is exactly this idea at
//! smaller scope (two atomic cursors at the front of a mapped region); we
//! generalize it to three cursors (`count`/`head`/`tail`, per `spec.md`)
//! plus an arbitrary caller-supplied extension `H` laid out immediately
//! after, the way `TrapedCircuit-satrin-feed-rs::shm::InstrumentHeader`
//! follows a fixed prefix with caller fields.
use std::sync::atomic::AtomicU64;

/// The fixed 24-byte prefix present at offset 0 of every ring's header
/// region, followed directly by the caller's extension type `H`.
///
/// Fields are `AtomicU64` (not plain `u64`) so that same-process readers
/// racing a writer (§5 "Readers may race with a writer") observe whole,
/// non-torn values instead of undefined behaviour; this crate makes no
/// stronger ordering promise than `Ordering::Relaxed`, matching §5's "no
/// memory-ordering guarantees are given."
#[repr(C)]
pub struct State<H> {
    pub(crate) count: AtomicU64,
    pub(crate) head: AtomicU64,
    pub(crate) tail: AtomicU64,
    pub header: H,
}

static_assertions::assert_eq_size!(State<()>, [u8; 24]);

/// A point-in-time snapshot of `{count, head, tail}`, returned by value so
/// callers can log or assert against it without holding the header
/// borrowed open (`spec.md` §4.3 `currentState()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingStats {
    pub count: u64,
    pub head: u64,
    pub tail: u64,
}

impl<H> State<H> {
    pub(crate) fn snapshot(&self) -> RingStats {
        use std::sync::atomic::Ordering::Relaxed;
        RingStats {
            count: self.count.load(Relaxed),
            head: self.head.load(Relaxed),
            tail: self.tail.load(Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        use std::sync::atomic::Ordering::Relaxed;
        self.count.store(0, Relaxed);
        self.head.store(0, Relaxed);
        self.tail.store(0, Relaxed);
    }
}
