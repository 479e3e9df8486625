//! Compile-time defaults and a constructor-time override for the pool
//! table layout.

/// Coarse alignment unit; all carved blocks are a multiple of this size.
pub const ALIGNMENT: usize = 16;

/// Default carvable region size for a tracked pool, in bytes.
pub const POOL_SIZE: usize = 65536;
const _: () = assert!(POOL_SIZE >= 4096);

/// Number of pool slots tracked per [`crate::Root`].
pub const TRACKED_POOL_COUNT: usize = 256;
const _: () = assert!(TRACKED_POOL_COUNT >= 64);

/// `pool_free` floor below which a tracked slot is evicted on the next
/// allocation pass.
pub const RECYCLE_THRESHOLD: usize = 128;
const _: () = assert!(RECYCLE_THRESHOLD >= 128);

/// Per-[`crate::Root`] layout, overridable at construction time so tests can
/// exercise trimming/oversize paths without allocating full-size pools.
#[derive(Debug, Clone, Copy)]
pub struct PoolLayoutConfig {
    /// Carvable bytes in a freshly created tracked pool.
    pub pool_size: usize,
    /// `pool_free` floor that triggers eviction of a slot.
    pub recycle_threshold: usize,
}

impl Default for PoolLayoutConfig {
    fn default() -> Self {
        Self {
            pool_size: POOL_SIZE,
            recycle_threshold: RECYCLE_THRESHOLD,
        }
    }
}

impl PoolLayoutConfig {
    /// Round `pool_size` down to a multiple of [`ALIGNMENT`] and assert the
    /// configured minimums.
    pub fn normalized(self) -> Self {
        assert!(self.pool_size >= 4096, "pool_size below the 4096 byte floor");
        assert!(
            self.recycle_threshold >= 128,
            "recycle_threshold below the 128 byte floor"
        );
        Self {
            pool_size: self.pool_size & !(ALIGNMENT - 1),
            recycle_threshold: self.recycle_threshold,
        }
    }
}
