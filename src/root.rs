//! The per-thread context registry: the pool table and its refcount.

use core::ptr::NonNull;

use portable_atomic::{fence, AtomicIsize, Ordering};

use crate::config::{PoolLayoutConfig, TRACKED_POOL_COUNT};
use crate::counters;
use crate::error::SysAllocResult;
use crate::pool::Pool;
use crate::sys_alloc::{sys_alloc, sys_free};

/// Per-thread registry of tracked pools.
///
/// `pools[]` and `free_pools` are written only by the owning thread — every
/// method that touches them below takes `&mut Root` and is only ever
/// reached from that thread's own allocation path. `refcount` is atomic and
/// (per the original this crate is grounded on) is, in practice, also only
/// ever mutated by the owning thread — `detach`, the only caller of
/// [`Root::release`], is itself owning-thread-only — but it stays atomic to
/// match the accounting discipline the rest of the allocator uses.
#[repr(C)]
pub struct Root {
    refcount: AtomicIsize,
    pub(crate) layout: PoolLayoutConfig,
    free_pools: usize,
    pools: [Option<NonNull<Pool>>; TRACKED_POOL_COUNT],
}

// SAFETY: `pools[]`/`free_pools` are only ever touched through a `&mut Root`
// obtained by the owning thread; cross-thread access is limited to
// `refcount`, which is atomic.
unsafe impl Send for Root {}
unsafe impl Sync for Root {}

impl Root {
    pub(crate) fn header_size() -> usize {
        core::mem::size_of::<Root>()
    }

    /// Create a fresh, self-referenced root (`refcount = 1`) for the
    /// calling thread.
    pub(crate) fn create(layout: PoolLayoutConfig) -> SysAllocResult<NonNull<Root>> {
        let raw = sys_alloc(Self::header_size(), crate::config::ALIGNMENT)?;
        let root_ptr = raw.cast::<Root>();
        // SAFETY: `raw` is freshly allocated and large enough for `Root`.
        unsafe {
            root_ptr.as_ptr().write(Root {
                refcount: AtomicIsize::new(1),
                layout,
                free_pools: TRACKED_POOL_COUNT,
                pools: [None; TRACKED_POOL_COUNT],
            });
        }
        counters::root_created();
        Ok(root_ptr)
    }

    /// Borrow the root mutably for the duration of an allocation-dispatch
    /// pass. The only way the owning thread touches `pools[]`.
    ///
    /// # Safety
    /// `root` must point to a live `Root` and the caller must not be
    /// holding another live borrow derived from it.
    pub(crate) unsafe fn borrow_mut<'a>(root: NonNull<Root>) -> &'a mut Root {
        unsafe { &mut *root.as_ptr() }
    }

    pub(crate) fn refcount(root: NonNull<Root>) -> isize {
        unsafe { root.as_ref() }.refcount.load(Ordering::Acquire)
    }

    pub(crate) fn free_pools(&self) -> usize {
        self.free_pools
    }

    /// Register `pool` into the first empty slot and give it a tracked
    /// reference.
    pub(crate) fn register(&mut self, pool: NonNull<Pool>, root_ptr: NonNull<Root>) {
        let slot = self
            .pools
            .iter_mut()
            .find(|s| s.is_none())
            .expect("register called with no empty slot");
        *slot = Some(pool);
        self.free_pools -= 1;
        self.refcount.fetch_add(1, Ordering::Relaxed);
        Pool::track(pool, root_ptr);
    }

    /// Walk occupied slots in fixed order, handing each to `f`.
    pub(crate) fn for_each_slot<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Self, usize),
    {
        for i in 0..TRACKED_POOL_COUNT {
            if self.pools[i].is_some() {
                f(self, i);
            }
        }
    }

    pub(crate) fn slot_pool(&self, i: usize) -> Option<NonNull<Pool>> {
        self.pools[i]
    }

    /// Evict slot `i`, detaching the pool it held.
    pub(crate) fn evict(&mut self, i: usize) {
        if let Some(pool) = self.pools[i].take() {
            self.free_pools += 1;
            unsafe { Pool::detach(pool) };
        }
    }

    /// The fullness-sensitive trim threshold for the current dispatch pass:
    /// the configured default while an empty slot exists, escalated to half
    /// the pool size once the table is completely full. Recomputed fresh on
    /// every call rather than cached, so a slot freed or refilled between
    /// calls is always reflected immediately.
    pub(crate) fn trim_threshold(&self) -> usize {
        if self.free_pools > 0 {
            self.layout.recycle_threshold
        } else {
            self.layout.pool_size / 2
        }
    }

    /// Context teardown: detach every occupied slot, then drop the root's
    /// self-reference.
    pub(crate) fn teardown(root: NonNull<Root>) {
        let r = unsafe { Self::borrow_mut(root) };
        r.for_each_slot(|r, i| r.evict(i));
        unsafe { Self::release(root) };
    }

    /// Release protocol: decrement `refcount`; free the root on the
    /// transition to zero.
    ///
    /// # Safety
    /// Must only be called once per outstanding reference (the root's own
    /// self-reference, or once per tracked pool being detached).
    pub(crate) unsafe fn release(root: NonNull<Root>) {
        let r = unsafe { root.as_ref() };
        let prev = r.refcount.fetch_sub(1, Ordering::Release);
        debug_assert!(prev >= 1, "root refcount underflow");
        if prev == 1 {
            fence(Ordering::Acquire);
            unsafe { Self::destroy(root) };
        }
    }

    unsafe fn destroy(root: NonNull<Root>) {
        unsafe { sys_free(root.cast::<u8>(), Self::header_size(), crate::config::ALIGNMENT) };
        counters::root_destroyed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_teardown_frees_with_no_outstanding_blocks() {
        let layout = PoolLayoutConfig {
            pool_size: 4096,
            recycle_threshold: 128,
        }
        .normalized();
        let root = Root::create(layout).expect("root alloc");
        let pool = Pool::create(layout.pool_size).expect("pool alloc");
        unsafe { Root::borrow_mut(root) }.register(pool, root);

        assert_eq!(Root::refcount(root), 2);
        assert_eq!(unsafe { Root::borrow_mut(root) }.free_pools(), TRACKED_POOL_COUNT - 1);

        let before = crate::counters::snapshot();
        Root::teardown(root);
        // Detaching an empty (no live blocks) pool drops it straight to
        // destroyed, and the root's own self-release follows immediately.
        let after = crate::counters::snapshot();
        assert_eq!(after.live_pools, before.live_pools - 1);
        assert_eq!(after.live_roots, before.live_roots - 1);
    }
}
