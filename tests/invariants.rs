//! Property tests over the universal invariants of `spec.md` §8, run
//! against arbitrary sequences of pushes on a single ring.
use magicring::Ring;
use proptest::prelude::*;

fn unique(tag: &str) -> String {
    format!("/magicring-prop-{tag}-{}", std::process::id())
}

proptest! {
    /// Invariants 3 and 4: count never decreases, and once count exceeds
    /// L the head-tail gap is exactly L (in 2L-modular arithmetic).
    #[test]
    fn count_monotonic_and_head_tail_relation(pushes in proptest::collection::vec(any::<u32>(), 0..1500)) {
        let name = unique("monotonic");
        let mut ring: Ring<u32, ()> = Ring::create(&name, 128, None).unwrap();
        let l = ring.len() as u64;

        let mut prev_count = 0u64;
        for v in &pushes {
            ring.push(*v);
            let st = ring.current_state();
            prop_assert!(st.count >= prev_count);
            prev_count = st.count;

            if st.count <= l {
                prop_assert_eq!(st.tail, 0);
            } else {
                let two_l = 2 * l;
                prop_assert_eq!((st.head + two_l - st.tail) % two_l, l);
            }
        }
        ring.close().unwrap();
    }

    /// Invariant 5: a wrap-free slice over the live window agrees with
    /// `valueAt` at every offset.
    #[test]
    fn wrap_free_slice_matches_value_at(pushes in proptest::collection::vec(any::<u32>(), 1..1500)) {
        let name = unique("wrapfree");
        let mut ring: Ring<u32, ()> = Ring::create(&name, 64, None).unwrap();
        for v in &pushes {
            ring.push(*v);
        }

        let st = ring.current_state();
        let l = ring.len() as u64;
        let start = st.tail;
        let stop = (start + l).min(st.count);

        if stop > start {
            let s = ring.slice(start, stop).unwrap();
            for (i, &x) in s.iter().enumerate() {
                prop_assert_eq!(x, ring.value_at(start + i as u64).unwrap());
            }
        }
        ring.close().unwrap();
    }

    /// Invariant 6 (round trip), first half: `valueAt(count - 1) == v`
    /// immediately after `push(v)`.
    #[test]
    fn push_round_trips_through_value_at(pushes in proptest::collection::vec(any::<u32>(), 1..1500)) {
        let name = unique("roundtrip");
        let mut ring: Ring<u32, ()> = Ring::create(&name, 96, None).unwrap();
        for v in &pushes {
            ring.push(*v);
            let count = ring.current_state().count;
            prop_assert_eq!(ring.value_at(count - 1).unwrap(), *v);
        }
        ring.close().unwrap();
    }

    /// Invariant 6, second half: `pushValues(vs)` of length k into an
    /// empty ring, then `sliceFromTail(k)`, equals `vs`.
    #[test]
    fn push_values_round_trips_through_slice_from_tail(
        vs in proptest::collection::vec(any::<u32>(), 1..64)
    ) {
        let name = unique("bulk-roundtrip");
        let mut ring: Ring<u32, ()> = Ring::create(&name, 128, None).unwrap();
        ring.push_values(&vs).unwrap();
        prop_assert_eq!(ring.slice_from_tail(vs.len() as u64).unwrap(), vs.as_slice());
        ring.close().unwrap();
    }
}
