//! The page-granularity backing allocator spec treats as an external
//! collaborator (`sys_alloc`/`sys_free`). Concrete rather than assumed, so
//! the crate builds and tests stand on their own.

use core::ptr::NonNull;

use crate::config::ALIGNMENT;
use crate::error::{SysAllocError, SysAllocResult};

/// Request `size` bytes aligned to at least `align` (and at least
/// [`ALIGNMENT`]) from the system allocator.
pub fn sys_alloc(size: usize, align: usize) -> SysAllocResult<NonNull<u8>> {
    let align = align.max(ALIGNMENT);
    #[cfg(target_os = "linux")]
    {
        linux::alloc(size, align)
    }
    #[cfg(not(target_os = "linux"))]
    {
        generic::alloc(size, align)
    }
}

/// Return memory obtained from [`sys_alloc`] with the same `size`/`align`
/// used to request it.
///
/// # Safety
/// `ptr` must be a value previously returned by [`sys_alloc`] with the same
/// `size` and `align`, and must not be used again afterwards.
pub unsafe fn sys_free(ptr: NonNull<u8>, size: usize, align: usize) {
    let align = align.max(ALIGNMENT);
    #[cfg(target_os = "linux")]
    unsafe {
        linux::free(ptr, size, align)
    }
    #[cfg(not(target_os = "linux"))]
    unsafe {
        generic::free(ptr, size, align)
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::*;

    pub fn alloc(size: usize, align: usize) -> SysAllocResult<NonNull<u8>> {
        if align == 0 || !align.is_power_of_two() {
            return Err(SysAllocError::InvalidLayout);
        }
        // `aligned_alloc` requires `size` to be a multiple of `align`; every
        // caller in this crate already rounds carvable sizes up to a
        // multiple of `ALIGNMENT`, and `align` is always `ALIGNMENT` here.
        let rounded = (size + align - 1) & !(align - 1);
        let raw = unsafe { libc::aligned_alloc(align, rounded) } as *mut u8;
        NonNull::new(raw).ok_or(SysAllocError::OutOfMemory)
    }

    /// # Safety
    /// See [`super::sys_free`].
    pub unsafe fn free(ptr: NonNull<u8>, _size: usize, _align: usize) {
        unsafe { libc::free(ptr.as_ptr() as *mut libc::c_void) }
    }
}

#[cfg(not(target_os = "linux"))]
mod generic {
    use super::*;
    extern crate alloc;
    use alloc::alloc::{alloc as raw_alloc, dealloc};
    use core::alloc::Layout;

    pub fn alloc(size: usize, align: usize) -> SysAllocResult<NonNull<u8>> {
        let layout = Layout::from_size_align(size, align).map_err(|_| SysAllocError::InvalidLayout)?;
        let raw = unsafe { raw_alloc(layout) };
        NonNull::new(raw).ok_or(SysAllocError::OutOfMemory)
    }

    /// # Safety
    /// See [`super::sys_free`].
    pub unsafe fn free(ptr: NonNull<u8>, size: usize, align: usize) {
        let layout = Layout::from_size_align(size, align).expect("layout was valid at alloc time");
        unsafe { dealloc(ptr.as_ptr(), layout) }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_free_round_trips() {
        let size = 4096;
        let ptr = sys_alloc(size, ALIGNMENT).expect("alloc should succeed");
        assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
        unsafe { sys_free(ptr, size, ALIGNMENT) };
    }

    #[test]
    fn rejects_non_power_of_two_alignment() {
        // 24 > ALIGNMENT so it survives the `align.max(ALIGNMENT)` clamp but
        // is not itself a power of two.
        let result = sys_alloc(64, 24);
        assert_eq!(result, Err(SysAllocError::InvalidLayout));
    }
}
