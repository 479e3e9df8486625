//! Smoke tests to verify basic functionality

#![cfg(feature = "std")]

extern crate std;

use octane_alloc::{alloc, free};

/// Single-thread small alloc/free loop.
#[test]
fn single_thread_small_loop() {
    for _ in 0..10_000 {
        let p = alloc(24, 1).expect("alloc should succeed");
        unsafe { free(p) };
    }
}

/// An oversize request bypasses the pool table entirely.
#[test]
fn oversize_allocation_round_trips() {
    let p = alloc(200_000, 1).expect("oversize alloc should succeed");
    unsafe { free(p) };
}

#[test]
fn aligned_allocation_honors_requested_alignment() {
    let p = alloc(17, 64).expect("aligned alloc should succeed");
    assert_eq!(p.as_ptr() as usize % 64, 0);
    unsafe { free(p) };
}

#[test]
fn zero_sized_request_still_returns_a_usable_pointer() {
    let p = alloc(0, 1).expect("zero-size alloc should still succeed");
    unsafe { free(p) };
}

#[test]
fn realloc_grows_and_shrinks() {
    let p = alloc(8, 1).expect("alloc");
    unsafe { p.as_ptr().write_bytes(0x5A, 8) };

    let grown = unsafe { octane_alloc::realloc(p, 256, 1).expect("grow") };
    let bytes = unsafe { std::slice::from_raw_parts(grown.as_ptr(), 8) };
    assert_eq!(bytes, &[0x5Au8; 8]);

    let shrunk = unsafe { octane_alloc::realloc(grown, 4, 1).expect("shrink") };
    let bytes = unsafe { std::slice::from_raw_parts(shrunk.as_ptr(), 4) };
    assert_eq!(bytes, &[0x5Au8; 4]);

    unsafe { free(shrunk) };
}
