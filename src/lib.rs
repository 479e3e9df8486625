#![no_std]

pub mod allocator;
pub mod block;
pub mod config;
pub mod counters;
pub mod error;
pub mod pool;
pub mod root;
pub mod sys_alloc;

#[cfg(feature = "std")]
pub mod tls;

#[cfg(test)]
extern crate std;

extern crate alloc;

#[cfg(all(not(test), not(feature = "std")))]
use core::panic::PanicInfo;

#[cfg(all(not(test), not(feature = "std")))]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    loop {}
}

pub use allocator::ThreadLocalAllocator;
pub use config::{PoolLayoutConfig, ALIGNMENT, POOL_SIZE, RECYCLE_THRESHOLD, TRACKED_POOL_COUNT};
pub use counters::{snapshot, CounterSnapshot};
pub use error::{SysAllocError, SysAllocResult};

#[cfg(feature = "std")]
pub use tls::{alloc, free, realloc};
