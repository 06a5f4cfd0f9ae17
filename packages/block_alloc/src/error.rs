use std::alloc::Layout;

use thiserror::Error;

/// Errors that can occur when an [`Allocator`][crate::Allocator] is asked for a block of memory.
///
/// Contract violations (such as asking a [`PoolAllocator`][crate::PoolAllocator] for blocks of
/// different sizes) are not represented here - those are bugs in the caller and result in a panic.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum AllocError {
    /// The underlying memory source could not provide a block of the requested size.
    #[error("out of memory: failed to allocate {size} bytes aligned to {align}")]
    OutOfMemory {
        /// Size of the block that could not be allocated, in bytes.
        size: usize,

        /// Alignment of the block that could not be allocated, in bytes.
        align: usize,
    },

    /// The caller requested a zero-sized block, which the allocator does not support.
    #[error("zero-sized memory blocks cannot be allocated")]
    ZeroSized,

    /// The memory layout derived from the request could not be represented, typically because
    /// a size calculation overflowed.
    #[error("requested memory layout exceeds the addressable range")]
    CapacityOverflow,
}

impl AllocError {
    /// Creates an out-of-memory error describing the layout that could not be satisfied.
    #[must_use]
    pub fn out_of_memory(layout: Layout) -> Self {
        Self::OutOfMemory {
            size: layout.size(),
            align: layout.align(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(AllocError: Send, Sync, Debug, Copy);

    #[test]
    fn out_of_memory_carries_layout() {
        let layout = Layout::from_size_align(48, 16).unwrap();

        let error = AllocError::out_of_memory(layout);

        assert_eq!(
            error,
            AllocError::OutOfMemory {
                size: 48,
                align: 16
            }
        );
        assert_eq!(
            error.to_string(),
            "out of memory: failed to allocate 48 bytes aligned to 16"
        );
    }
}
