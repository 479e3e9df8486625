//! The pool: a large contiguous region bump-carved into blocks, recycled
//! when fully drained, and destroyed once unreferenced and detached.

use core::ptr::NonNull;

use portable_atomic::{fence, AtomicIsize, AtomicPtr, AtomicUsize, Ordering};

use crate::block::Block;
use crate::config::ALIGNMENT;
use crate::counters;
use crate::error::SysAllocResult;
use crate::root::Root;
use crate::sys_alloc::{sys_alloc, sys_free};

/// A carvable region, preceded by this header.
///
/// Invariants at rest: `pool_free + pool_returned <= pool_size`; when the
/// sum equals `pool_size` exactly, no live blocks exist; `refcount >= 0`,
/// and the pool is reachable iff `refcount > 0`.
#[repr(C)]
pub struct Pool {
    /// Back-link to the owning context, null when detached.
    root: AtomicPtr<Root>,
    /// Total carvable region size in bytes (immutable after creation).
    pool_size: usize,
    /// Bytes remaining at the bump frontier for the current epoch.
    pool_free: AtomicUsize,
    /// Bytes of live blocks that have been released back this epoch.
    pool_returned: AtomicUsize,
    /// `(1 per live block)` + transient increments used by the recycle and
    /// detach protocols. See module docs for why tracking-by-root does not
    /// contribute its own unit (matched to the detach protocol's net-zero
    /// hold/release pair — see `DESIGN.md`).
    refcount: AtomicIsize,
    /// `offset` field of the most recently carved block, or `0`. Debug/test
    /// aid only.
    last_block: AtomicIsize,
}

impl Pool {
    pub(crate) fn header_size() -> usize {
        core::mem::size_of::<Pool>()
    }

    /// Allocate a fresh, untracked pool with `carvable` bytes of bump
    /// region. Callers immediately carve the triggering request out of it
    /// (tracked pools are then registered with a root; oversize pools
    /// never are).
    pub(crate) fn create(carvable: usize) -> SysAllocResult<NonNull<Pool>> {
        let total = Self::header_size() + carvable;
        let raw = sys_alloc(total, ALIGNMENT)?;
        let pool_ptr = raw.cast::<Pool>();
        // SAFETY: `raw` is freshly allocated, large enough, and suitably
        // aligned for `Pool`.
        unsafe {
            pool_ptr.as_ptr().write(Pool {
                root: AtomicPtr::new(core::ptr::null_mut()),
                pool_size: carvable,
                pool_free: AtomicUsize::new(carvable),
                pool_returned: AtomicUsize::new(0),
                refcount: AtomicIsize::new(0),
                last_block: AtomicIsize::new(0),
            });
        }
        counters::pool_created();
        Ok(pool_ptr)
    }

    fn base(pool: NonNull<Pool>) -> *mut u8 {
        unsafe { pool.as_ptr().cast::<u8>().add(Self::header_size()) }
    }

    pub(crate) fn pool_size(pool: NonNull<Pool>) -> usize {
        unsafe { pool.as_ref() }.pool_size
    }

    pub(crate) fn pool_free(pool: NonNull<Pool>) -> usize {
        unsafe { pool.as_ref() }.pool_free.load(Ordering::Acquire)
    }

    pub(crate) fn pool_returned(pool: NonNull<Pool>) -> usize {
        unsafe { pool.as_ref() }.pool_returned.load(Ordering::Acquire)
    }

    pub(crate) fn refcount(pool: NonNull<Pool>) -> isize {
        unsafe { pool.as_ref() }.refcount.load(Ordering::Acquire)
    }

    pub(crate) fn is_tracked(pool: NonNull<Pool>) -> bool {
        !unsafe { pool.as_ref() }
            .root
            .load(Ordering::Acquire)
            .is_null()
    }

    /// Link this (just-created) pool to `root`. Only ever called by the
    /// owning thread, which is the sole writer of `root.pools[]`, so no
    /// concurrent `track` on the same pool can race.
    pub(crate) fn track(pool: NonNull<Pool>, root: NonNull<Root>) {
        unsafe { pool.as_ref() }
            .root
            .store(root.as_ptr(), Ordering::Release);
    }

    /// Atomically carve a block of `reserved` bytes (already inflated for
    /// worst-case alignment slack by the caller — see
    /// `allocator::normalize`) out of the pool's bump frontier, honoring
    /// `align` (`0` for "no extra alignment beyond `ALIGNMENT`", else a
    /// multiple of `ALIGNMENT`).
    ///
    /// Returns `None` on a failed reservation (not enough `pool_free`); the
    /// caller falls through to the next slot or a new pool. Never loses the
    /// CAS race silently into overlap: the full `reserved` span is removed
    /// from the bump frontier up front, so a losing concurrent carve always
    /// observes a `pool_free` that already excludes this carve's region.
    /// Bytes skipped to satisfy `align` are credited straight to
    /// `pool_returned` as immediately-reclaimed slack, so
    /// `pool_free + pool_returned` still accounts for every byte of the
    /// pool even when over-aligned carves waste some of it.
    pub(crate) fn carve(pool: NonNull<Pool>, reserved: usize, align: usize) -> Option<NonNull<Block>> {
        let p = unsafe { pool.as_ref() };
        let mut old_free = p.pool_free.load(Ordering::Acquire);
        loop {
            if old_free < reserved {
                return None;
            }
            match p.pool_free.compare_exchange_weak(
                old_free,
                old_free - reserved,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => old_free = actual,
            }
        }

        let mut start = unsafe { Self::base(pool).add(p.pool_size - old_free) };
        let mut wasted = 0usize;
        if align > 0 {
            while (start as usize + Block::header_size()) % align != 0 {
                start = unsafe { start.add(ALIGNMENT) };
                wasted += ALIGNMENT;
            }
        }
        if wasted > 0 {
            p.pool_returned.fetch_add(wasted, Ordering::Release);
        }
        let length = reserved - wasted;

        let block_ptr = start.cast::<Block>();
        let pool_addr = pool.as_ptr() as isize;
        let block_addr = block_ptr as isize;
        let offset = pool_addr - block_addr;
        let prev = p.last_block.swap(offset, Ordering::AcqRel);

        // SAFETY: `start` lies within the region just reserved via the CAS
        // above and is big enough for a `Block` plus `length - header_size`
        // payload bytes.
        unsafe {
            block_ptr.write(Block {
                offset,
                length,
                prev_block_offset: prev,
                _reserved: 0,
            });
        }
        p.refcount.fetch_add(1, Ordering::Relaxed);

        Some(unsafe { NonNull::new_unchecked(block_ptr) })
    }

    /// Deallocation entry point: credit `length` bytes back to
    /// `pool_returned` then run the release protocol.
    ///
    /// # Safety
    /// `pool` must be the pool that actually owns the block being freed.
    pub(crate) unsafe fn on_block_returned(pool: NonNull<Pool>, length: usize) {
        unsafe { pool.as_ref() }
            .pool_returned
            .fetch_add(length, Ordering::Release);
        unsafe { Self::release(pool) };
    }

    /// Pool release protocol: decrement `refcount`; on the transition to
    /// zero, either attempt an epoch reset (tracked pool) or free the
    /// region (detached pool).
    ///
    /// # Safety
    /// Must only be called once per outstanding reference (one call per
    /// carved block returning it, one call from `detach`).
    pub(crate) unsafe fn release(pool: NonNull<Pool>) {
        loop {
            let p = unsafe { pool.as_ref() };
            let prev = p.refcount.fetch_sub(1, Ordering::Release);
            debug_assert!(prev >= 1, "pool refcount underflow");
            if prev != 1 {
                return;
            }
            fence(Ordering::Acquire);

            let root_ptr = p.root.load(Ordering::Acquire);
            if root_ptr.is_null() {
                unsafe { Self::destroy(pool) };
                return;
            }

            // Only a fully-drained pool attempts the epoch reset; anything
            // else (still holding unreturned capacity, or a racing carve
            // already moved `pool_free`/`pool_returned` out from under us)
            // rests at refcount 0 until the table reclaims or re-fills it.
            let free = p.pool_free.load(Ordering::Acquire);
            let returned = p.pool_returned.load(Ordering::Acquire);
            if returned == 0 || free + returned != p.pool_size {
                return;
            }

            // Hold a reference across the reset attempt, then loop back —
            // equivalent to the original's trailing recursive `release()`,
            // which only ever recurses from this branch.
            p.refcount.fetch_add(1, Ordering::Relaxed);
            if p.pool_free
                .compare_exchange(free, 0, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
                && p.refcount.load(Ordering::Acquire) == 1
            {
                p.pool_returned.store(0, Ordering::Release);
                p.pool_free.store(p.pool_size, Ordering::Release);
            }
        }
    }

    /// Sever the root↔pool link. Called when a slot is evicted or when the
    /// owning context tears down. The pool then lives on purely via its
    /// block refcount.
    ///
    /// # Safety
    /// Must only be called once per tracked pool (the caller is
    /// responsible for nulling its own table slot first).
    pub(crate) unsafe fn detach(pool: NonNull<Pool>) {
        let p = unsafe { pool.as_ref() };
        p.refcount.fetch_add(1, Ordering::Relaxed);
        let root_ptr = p.root.swap(core::ptr::null_mut(), Ordering::AcqRel);
        if let Some(root) = NonNull::new(root_ptr) {
            unsafe { Root::release(root) };
        }
        unsafe { Self::release(pool) };
    }

    unsafe fn destroy(pool: NonNull<Pool>) {
        let total = Self::header_size() + unsafe { pool.as_ref() }.pool_size;
        unsafe { sys_free(pool.cast::<u8>(), total, ALIGNMENT) };
        counters::pool_destroyed();
    }

    /// Debug-only walk of every block this pool has ever carved (live or
    /// already freed), oldest last. Used by tests to cross-check
    /// conservation without scanning raw memory blindly.
    #[cfg(test)]
    pub(crate) fn debug_carve_chain(pool: NonNull<Pool>) -> alloc::vec::Vec<NonNull<Block>> {
        let mut out = alloc::vec::Vec::new();
        let pool_addr = pool.as_ptr() as isize;
        let mut offset = unsafe { pool.as_ref() }.last_block.load(Ordering::Acquire);
        while offset != 0 {
            let block_addr = pool_addr - offset;
            let block = unsafe { NonNull::new_unchecked(block_addr as *mut Block) };
            offset = unsafe { block.as_ref() }.prev_block_offset;
            out.push(block);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked_test_pool(carvable: usize) -> NonNull<Pool> {
        // A root-less pool is destroyed the instant its last block returns;
        // these tests want the tracked-reaching-zero epoch-reset branch
        // instead, so they need a real (leaked, for test simplicity) root
        // behind the pool.
        let layout = crate::config::PoolLayoutConfig {
            pool_size: carvable,
            recycle_threshold: 128,
        };
        let root = Root::create(layout).expect("root alloc");
        let pool = Pool::create(carvable).expect("pool alloc");
        unsafe { Root::borrow_mut(root) }.register(pool, root);
        pool
    }

    #[test]
    fn carve_then_release_restores_pool() {
        let pool = tracked_test_pool(4096);
        assert!(Pool::is_tracked(pool));

        let reserved = 64;
        let block = Pool::carve(pool, reserved, 0).expect("carve");
        assert_eq!(unsafe { block.as_ref() }.length, reserved);
        assert_eq!(Pool::pool_free(pool), 4096 - reserved);
        assert_eq!(Pool::refcount(pool), 1);

        unsafe { Block::release_payload(block.payload()) };

        assert_eq!(Pool::pool_free(pool), 4096);
        assert_eq!(Pool::pool_returned(pool), 0);
        assert_eq!(Pool::refcount(pool), 0);
    }

    #[test]
    fn releasing_one_of_several_live_blocks_does_not_reset_the_pool() {
        let pool = tracked_test_pool(4096);
        let a = Pool::carve(pool, 64, 0).expect("carve a");
        let _b = Pool::carve(pool, 64, 0).expect("carve b");
        assert_eq!(Pool::refcount(pool), 2);

        unsafe { Block::release_payload(a.payload()) };

        // One live block remains; the pool must not have been reset and
        // must not have looped forever deciding so.
        assert_eq!(Pool::refcount(pool), 1);
        assert_eq!(Pool::pool_free(pool), 4096 - 128);
        assert_eq!(Pool::pool_returned(pool), 64);
    }

    #[test]
    fn conservation_holds_across_many_carves() {
        let pool = tracked_test_pool(4096);
        let mut blocks = alloc::vec::Vec::new();
        for _ in 0..10 {
            blocks.push(Pool::carve(pool, 64, 0).expect("carve"));
        }
        let live_sum: usize = blocks.iter().map(|b| unsafe { b.as_ref() }.length).sum();
        assert_eq!(Pool::pool_free(pool) + Pool::pool_returned(pool) + live_sum, 4096);

        for block in blocks {
            unsafe { Block::release_payload(block.payload()) };
        }
        assert_eq!(Pool::pool_free(pool), 4096);
        assert_eq!(Pool::pool_returned(pool), 0);
    }

    #[test]
    fn over_aligned_carve_credits_wasted_bytes_to_pool_returned() {
        let pool = tracked_test_pool(4096);
        let block = Pool::carve(pool, 96, 64).expect("carve");
        let wasted = 96 - unsafe { block.as_ref() }.length;

        assert_eq!(Pool::pool_returned(pool), wasted, "slack must be credited immediately, not lost");
        assert_eq!(Pool::pool_free(pool) + Pool::pool_returned(pool) + unsafe { block.as_ref() }.length, 4096);

        unsafe { Block::release_payload(block.payload()) };

        // A pool that has only ever served one (over-aligned) carve must
        // still be able to reset to fully-fresh once that carve is freed.
        assert_eq!(Pool::pool_free(pool), 4096);
        assert_eq!(Pool::pool_returned(pool), 0);
    }

    #[test]
    fn over_aligned_carve_does_not_overlap_next() {
        let pool = Pool::create(65536).expect("pool alloc");
        let a = Pool::carve(pool, 96, 64).expect("carve a");
        let b = Pool::carve(pool, 96, 64).expect("carve b");

        let a_start = a.as_ptr() as usize;
        let a_end = a_start + unsafe { a.as_ref() }.length;
        let b_start = b.as_ptr() as usize;
        assert!(b_start >= a_end, "carve b must not start inside carve a's footprint");

        let payload = a.payload();
        assert_eq!(payload.as_ptr() as usize % 64, 0);
    }

    #[test]
    fn debug_carve_chain_walks_in_reverse_order() {
        let pool = Pool::create(4096).expect("pool alloc");
        let first = Pool::carve(pool, 64, 0).expect("carve");
        let second = Pool::carve(pool, 64, 0).expect("carve");
        let chain = Pool::debug_carve_chain(pool);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].as_ptr(), second.as_ptr());
        assert_eq!(chain[1].as_ptr(), first.as_ptr());
    }
}
