#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use octane_alloc::{alloc as oct_alloc, free as oct_free, realloc as oct_realloc};
use std::ptr::NonNull;

#[derive(Debug, Arbitrary)]
enum Op {
    Alloc { size: u16, align_shift: u8 },
    Free(usize),
    Realloc { index: usize, new_size: u16 },
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let ops: Result<Vec<Op>, _> = (0..200).map(|_| Op::arbitrary(&mut u)).collect();
    let Ok(ops) = ops else { return };

    let mut live: Vec<NonNull<u8>> = Vec::new();
    for op in ops {
        match op {
            Op::Alloc { size, align_shift } => {
                let size = (size as usize % (1 << 18)).max(1);
                let align = 1usize << (align_shift % 8); // up to 128
                if let Ok(p) = oct_alloc(size, align) {
                    assert_eq!(p.as_ptr() as usize % align.max(16), 0);
                    live.push(p);
                }
            }
            Op::Free(idx) => {
                if !live.is_empty() {
                    let p = live.remove(idx % live.len());
                    unsafe { oct_free(p) };
                }
            }
            Op::Realloc { index, new_size } => {
                if !live.is_empty() {
                    let idx = index % live.len();
                    let p = live[idx];
                    let new_size = (new_size as usize % (1 << 18)).max(1);
                    if let Ok(p2) = unsafe { oct_realloc(p, new_size, 1) } {
                        live[idx] = p2;
                    }
                    // On failure the old pointer is left untouched and
                    // still valid — `realloc` only frees it after a
                    // successful copy.
                }
            }
        }
    }

    for p in live {
        unsafe { oct_free(p) };
    }
});
