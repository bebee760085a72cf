//! End-to-end scenarios A–F from `spec.md` §8, run directly as seed tests.
use magicring::{define_multi_ring, Access, Ring};

fn unique(tag: &str) -> String {
    format!("/magicring-it-{tag}-{}", std::process::id())
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn scenario_a_single_wrap() {
    init_logging();
    let name = unique("a");
    let mut ring: Ring<u32, ()> = Ring::create(&name, 1024, None).unwrap();
    assert_eq!(ring.len(), 1024);

    for i in 0..1024u32 {
        ring.buffer_mut()[i as usize] = i;
    }
    assert_eq!(
        ring.slice(1020, 1028).unwrap(),
        &[1020, 1021, 1022, 1023, 0, 1, 2, 3]
    );

    for i in 1024..1028u32 {
        let l = ring.len() as u32;
        ring.buffer_mut()[(i % l) as usize] = i;
    }
    assert_eq!(
        ring.slice(1020, 1028).unwrap(),
        &[1020, 1021, 1022, 1023, 1024, 1025, 1026, 1027]
    );
    assert_eq!(
        ring.slice(1022, 1030).unwrap(),
        &[1022, 1023, 1024, 1025, 1026, 1027, 4, 5]
    );

    ring.close().unwrap();
}

#[test]
fn scenario_b_overwrite_semantics() {
    let name = unique("b");
    let mut ring: Ring<u32, ()> = Ring::create(&name, 512, None).unwrap();

    for i in 0..512u32 {
        ring.push(i);
    }
    let st = ring.current_state();
    assert_eq!((st.count, st.head, st.tail), (512, 512, 0));

    ring.push(1000);
    let st = ring.current_state();
    assert_eq!((st.count, st.head, st.tail), (513, 513, 1));
    assert_eq!(ring.value_at(512).unwrap(), 1000);

    for v in [5000u32, 5001, 5002, 5003, 5004] {
        ring.push(v);
    }
    let st = ring.current_state();
    assert_eq!((st.count, st.head, st.tail), (518, 518, 6));
    assert_eq!(ring.slice_from_tail(3).unwrap(), &[6, 7, 8]);
    assert_eq!(ring.slice_to_head(3).unwrap(), &[5002, 5003, 5004]);

    ring.close().unwrap();
}

#[derive(Clone, Copy, Default)]
#[repr(C)]
struct SensorHeader {
    sample_rate: f64,
}

#[cfg(unix)]
#[test]
fn scenario_c_cross_handle_visibility() {
    let name = unique("c");
    let mut creator: Ring<u32, SensorHeader> = Ring::create(&name, 64, Some("shm")).unwrap();
    creator.header_mut().sample_rate = 44100.0;
    creator.buffer_mut()[0] = 42;

    let mut opener: Ring<u32, SensorHeader> =
        Ring::open(&name, 64, Access::ReadWrite, Some("shm")).unwrap();
    assert_eq!(opener.header().sample_rate, 44100.0);
    assert_eq!(opener.buffer()[0], 42);

    opener.buffer_mut()[0] = 12345;
    assert_eq!(creator.buffer()[0], 12345);

    opener.close().unwrap();
    creator.close().unwrap();
}

#[cfg(windows)]
#[test]
fn scenario_c_cross_handle_visibility() {
    let name = unique("c");
    let mut creator: Ring<u32, SensorHeader> = Ring::create(&name, 64, None).unwrap();
    creator.header_mut().sample_rate = 44100.0;
    creator.buffer_mut()[0] = 42;

    let mut opener: Ring<u32, SensorHeader> =
        Ring::open(&name, 64, Access::ReadWrite, None).unwrap();
    assert_eq!(opener.header().sample_rate, 44100.0);
    assert_eq!(opener.buffer()[0], 42);

    opener.buffer_mut()[0] = 12345;
    assert_eq!(creator.buffer()[0], 12345);

    opener.close().unwrap();
    creator.close().unwrap();
}

#[cfg(windows)]
#[test]
fn scenario_d_windows_large_header() {
    #[derive(Clone, Copy, Default)]
    #[repr(C)]
    struct BigHeader {
        _padding: [u8; 976], // 24 (count/head/tail) + 976 == 1000
    }

    let name = unique("d");
    let mut ring: Ring<u64, BigHeader> = Ring::create(&name, 10, None).unwrap();
    let layout = ring.layout().clone();
    assert!(layout.aligned_header_size >= 1000);
    assert_eq!(layout.aligned_header_size % layout.page_size, 0);
    assert!(ring.len() >= 10);

    for i in 0..10u64 {
        ring.push(i);
    }
    for i in 0..10u64 {
        assert_eq!(ring.value_at(i).unwrap(), i);
    }
    ring.close().unwrap();
}

#[derive(Clone, Copy, Default)]
#[repr(C)]
struct TradeHeader;

#[derive(Clone, Copy)]
struct Trade {
    x: f64,
    y: f64,
    timestamp: u64,
}

define_multi_ring! {
    struct TradeRings / TradeSlice<'a> / TradePushed
    header = TradeHeader;
    record = Trade;
    fields = { x: f64, y: f64, timestamp: u64 }
}

#[test]
fn scenario_e_multi_ring_columnar() {
    let name = unique("e");
    let mut rings = TradeRings::create(&name, 1000, None).unwrap();

    rings
        .push_slice(TradeSlice {
            x: &[1.0, 2.0, 3.0],
            y: &[4.0, 5.0, 6.0],
            timestamp: &[100, 101, 102],
        })
        .unwrap();

    let tail = rings.slice_from_tail(3).unwrap();
    assert_eq!(tail.x, &[1.0, 2.0, 3.0]);
    assert_eq!(tail.y, &[4.0, 5.0, 6.0]);
    assert_eq!(tail.timestamp, &[100, 101, 102]);

    assert_eq!(rings.x.current_state().count, 3);
    assert_eq!(rings.y.current_state().count, 3);
    assert_eq!(rings.timestamp.current_state().count, 3);

    rings.close().unwrap();
}

#[test]
fn scenario_f_existence_predicate() {
    let name = unique("f");
    assert!(!Ring::<u32, ()>::exists(&name, None).unwrap());

    let ring: Ring<u32, ()> = Ring::create(&name, 16, None).unwrap();
    assert!(Ring::<u32, ()>::exists(&name, None).unwrap());

    ring.close().unwrap();
    assert!(!Ring::<u32, ()>::exists(&name, None).unwrap());
}
