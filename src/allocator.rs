//! The thread-local allocator: size normalization, pool selection, and the
//! top-level `alloc`/`free`/`realloc` entry points.

use core::ptr::NonNull;

use crate::block::Block;
use crate::config::{PoolLayoutConfig, ALIGNMENT};
use crate::error::SysAllocResult;
use crate::pool::Pool;
use crate::root::Root;

fn round_up(n: usize, multiple: usize) -> usize {
    (n + multiple - 1) & !(multiple - 1)
}

/// Size and alignment normalization. Returns `(n_eff, a)` where
/// `a` is `0` for "default alignment only" or a multiple of [`ALIGNMENT`]
/// greater than [`ALIGNMENT`].
fn normalize(n: usize, a: usize) -> (usize, usize) {
    let mut n_eff = round_up(n, ALIGNMENT) + Block::header_size();
    let a = if a <= ALIGNMENT {
        0
    } else {
        let a = round_up(a, ALIGNMENT);
        n_eff += a;
        a
    };
    (n_eff, a)
}

/// One thread's allocation context: the pool table plus the dispatch logic
/// that carves, evicts and refills its slots. Not `Clone`; one instance
/// lives per OS thread behind
/// [`crate::tls`] (when the `std` feature is enabled) or is driven directly
/// by an embedder in `no_std` configurations.
pub struct ThreadLocalAllocator {
    root: NonNull<Root>,
    layout: PoolLayoutConfig,
}

impl ThreadLocalAllocator {
    pub fn new(layout: PoolLayoutConfig) -> SysAllocResult<Self> {
        let layout = layout.normalized();
        let root = Root::create(layout)?;
        crate::counters::context_created();
        Ok(Self { root, layout })
    }

    fn pool_effective_capacity(&self) -> usize {
        self.layout.pool_size
    }

    /// Allocate `n` bytes aligned to at least `a` (`a <= 16` means "default
    /// alignment"). Returns the payload pointer.
    pub fn alloc(&mut self, n: usize, a: usize) -> SysAllocResult<NonNull<u8>> {
        let (n_eff, align) = normalize(n, a);

        if n_eff > self.pool_effective_capacity() {
            let pool = Pool::create(n_eff)?;
            let block = Pool::carve(pool, n_eff, align).expect("fresh oversize pool must fit its own request");
            return Ok(block.payload());
        }

        // SAFETY: this is the only live borrow of the root for the whole
        // dispatch pass below; `self` holds no other reference into it.
        let root_ref = unsafe { Root::borrow_mut(self.root) };

        let mut carved: Option<NonNull<Block>> = None;
        let trim_threshold = root_ref.trim_threshold();
        root_ref.for_each_slot(|r, i| {
            if carved.is_some() {
                return;
            }
            let pool = r.slot_pool(i).expect("occupied slot");
            let free = Pool::pool_free(pool);
            if free >= n_eff {
                if let Some(block) = Pool::carve(pool, n_eff, align) {
                    carved = Some(block);
                }
            } else if free < trim_threshold {
                r.evict(i);
            }
        });
        if let Some(block) = carved {
            return Ok(block.payload());
        }

        if root_ref.free_pools() > 0 {
            let pool = Pool::create(self.pool_effective_capacity())?;
            let block = Pool::carve(pool, n_eff, align).expect("fresh tracked pool must fit its own request");
            root_ref.register(pool, self.root);
            return Ok(block.payload());
        }

        let pool = Pool::create(n_eff)?;
        let block = Pool::carve(pool, n_eff, align).expect("fresh oversize pool must fit its own request");
        Ok(block.payload())
    }

    /// Deallocation entry point. May be called from any thread.
    ///
    /// # Safety
    /// `p` must be a pointer previously returned by `alloc`/`realloc` on any
    /// thread, and not already freed.
    pub unsafe fn free(p: NonNull<u8>) {
        unsafe { Block::release_payload(p) };
    }

    /// Reallocate the block backing `p` to at least `new_size` bytes,
    /// preserving `min(new_size, old_length)` bytes of content. Implemented
    /// as alloc-copy-free; the allocator never grows a block in place.
    ///
    /// # Safety
    /// `p` must be a pointer previously returned by `alloc`/`realloc` on any
    /// thread, and not already freed.
    pub unsafe fn realloc(&mut self, p: NonNull<u8>, new_size: usize, a: usize) -> SysAllocResult<NonNull<u8>> {
        let block = unsafe { Block::from_payload(p) };
        let old_length = unsafe { block.as_ref() }.length;
        let old_capacity = old_length.saturating_sub(Block::header_size());
        let new_ptr = self.alloc(new_size, a)?;
        let copy_len = core::cmp::min(new_size, old_capacity);
        unsafe {
            core::ptr::copy_nonoverlapping(p.as_ptr(), new_ptr.as_ptr(), copy_len);
            Self::free(p);
        }
        Ok(new_ptr)
    }
}

impl Drop for ThreadLocalAllocator {
    /// Context teardown: detach every tracked pool, then drop the root's
    /// self-reference.
    fn drop(&mut self) {
        Root::teardown(self.root);
        crate::counters::context_destroyed();
    }
}
