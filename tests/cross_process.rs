//! Literal cross-process exercise of `spec.md` §8 invariant 7: a second OS
//! process, not just a second in-process handle, observes a mutation made
//! by the creator and vice versa. Only meaningful for the POSIX shm
//! back-end, which is the only one of the three with a real OS-visible
//! name a second process can attach to without inheriting a descriptor.
//!
//! The test re-invokes its own binary as the "second process", the way
//! systems crates commonly fork a helper for IPC tests, since there is no
//! separate helper binary in this crate to spawn instead.
#![cfg(unix)]

use magicring::{Access, Ring};

const CHILD_ENV: &str = "MAGICRING_CROSS_PROCESS_CHILD";
const NAME_ENV: &str = "MAGICRING_CROSS_PROCESS_NAME";

fn run_as_child() {
    let name = std::env::var(NAME_ENV).expect("child missing ring name");
    let mut ring: Ring<u32, ()> = Ring::open(&name, 64, Access::ReadWrite, Some("shm"))
        .expect("child: open should see the parent's ring");
    let seen = ring.value_at(0).expect("child: value_at(0)");
    assert_eq!(seen, 21, "child should observe the parent's pre-fork write");
    ring.insert(seen * 2, 0).expect("child: insert");
    ring.close().expect("child: close");
}

#[test]
fn cross_process_shm_visibility() {
    if std::env::var(CHILD_ENV).is_ok() {
        run_as_child();
        return;
    }

    let name = format!("/magicring-cross-process-{}", std::process::id());
    let mut creator: Ring<u32, ()> = Ring::create(&name, 64, Some("shm")).expect("create");
    creator.push(21);

    let exe = std::env::current_exe().expect("current_exe");
    let status = std::process::Command::new(exe)
        .arg("--exact")
        .arg("cross_process_shm_visibility")
        .env(CHILD_ENV, "1")
        .env(NAME_ENV, &name)
        .status()
        .expect("failed to spawn child process");
    assert!(status.success(), "child process must exit successfully");

    assert_eq!(
        creator.value_at(0).unwrap(),
        42,
        "parent should observe the child's post-fork write"
    );
    creator.close().unwrap();
}
