//! `std`-only installation of one [`ThreadLocalAllocator`] per OS thread,
//! torn down deterministically by the thread's own exit hook.

extern crate std;

use core::cell::RefCell;
use core::ptr::NonNull;

use std::thread_local;

use crate::allocator::ThreadLocalAllocator;
use crate::config::PoolLayoutConfig;
use crate::error::SysAllocResult;

thread_local! {
    static ALLOCATOR: RefCell<Option<ThreadLocalAllocator>> = const { RefCell::new(None) };
}

fn with_allocator<R>(f: impl FnOnce(&mut ThreadLocalAllocator) -> R) -> SysAllocResult<R> {
    ALLOCATOR.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Some(ThreadLocalAllocator::new(PoolLayoutConfig::default())?);
        }
        Ok(f(slot.as_mut().expect("just initialized")))
    })
}

/// Allocate `n` bytes aligned to at least `a` from the calling thread's
/// allocator, creating it on first use.
pub fn alloc(n: usize, a: usize) -> SysAllocResult<NonNull<u8>> {
    with_allocator(|allocator| allocator.alloc(n, a))?
}

/// Free a pointer previously returned by [`alloc`]/[`realloc`] on any
/// thread.
///
/// # Safety
/// `p` must not already be freed.
pub unsafe fn free(p: NonNull<u8>) {
    unsafe { ThreadLocalAllocator::free(p) };
}

/// Reallocate `p` (previously returned by [`alloc`]/[`realloc`] on any
/// thread) to at least `new_size` bytes, from the calling thread's
/// allocator.
///
/// # Safety
/// `p` must not already be freed.
pub unsafe fn realloc(p: NonNull<u8>, new_size: usize, a: usize) -> SysAllocResult<NonNull<u8>> {
    with_allocator(|allocator| unsafe { allocator.realloc(p, new_size, a) })?
}
