//! Error type for the one fallible boundary in the allocator: the backing
//! page allocator running out of memory.

/// Failure modes of the [`crate::sys_alloc`] boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysAllocError {
    /// The backing allocator returned null.
    OutOfMemory,
    /// The requested size/alignment combination cannot be satisfied by the
    /// backing allocator (e.g. alignment not a power of two).
    InvalidLayout,
}

impl SysAllocError {
    pub fn as_str(self) -> &'static str {
        match self {
            SysAllocError::OutOfMemory => "backing allocator exhausted",
            SysAllocError::InvalidLayout => "invalid size/alignment for backing allocator",
        }
    }
}

pub type SysAllocResult<T> = Result<T, SysAllocError>;
