use std::alloc::Layout;
use std::ptr::NonNull;

use crate::AllocError;

/// A source of raw memory blocks, independent of the type of value that will be placed in them.
///
/// Containers receive an allocator by reference and request one block per element they store,
/// returning each block when the element is removed. The allocator never owns the values placed
/// in its blocks - the caller owns the lifetime of whatever it writes there.
///
/// # Thread safety
///
/// Methods take `&self`, so allocators that keep state use single-threaded interior mutability.
/// Such allocators are not [`Sync`] and may only be shared between containers on the same thread.
/// Sharing one across threads requires external synchronization by the caller.
///
/// # Safety
///
/// Containers write their elements straight into the blocks they receive, trusting the
/// allocator. An implementation must guarantee that every block returned by
/// [`allocate()`][Self::allocate]:
///
/// * is valid for reads and writes of `layout.size()` bytes,
/// * is aligned to at least `layout.align()`,
/// * does not overlap any other block handed out by the same allocator (or anything else in
///   use) until it is passed to [`free()`][Self::free].
///
/// Implementing the trait without `unsafe` is rejected:
///
/// ```compile_fail
/// use std::alloc::Layout;
/// use std::ptr::NonNull;
///
/// use block_alloc::{AllocError, Allocator};
///
/// struct Dangling;
///
/// impl Allocator for Dangling {
///     fn allocate(&self, _layout: Layout) -> Result<NonNull<u8>, AllocError> {
///         Ok(NonNull::dangling())
///     }
///
///     unsafe fn free(&self, _block: NonNull<u8>, _layout: Layout) {}
/// }
/// ```
///
/// # Examples
///
/// ```
/// use std::alloc::Layout;
///
/// use block_alloc::{Allocator, HeapAllocator};
///
/// let allocator = HeapAllocator::instance();
/// let layout = Layout::new::<u64>();
///
/// let block = allocator.allocate(layout).unwrap();
///
/// // SAFETY: The block was allocated above with the same layout and is not used afterwards.
/// unsafe {
///     allocator.free(block, layout);
/// }
/// ```
pub unsafe trait Allocator {
    /// Allocates a block of memory that satisfies `layout`.
    ///
    /// The returned block is uninitialized. It remains valid until passed to [`free()`][1]
    /// on the same allocator instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the block cannot be provided. An allocator never hands out an
    /// invalid block silently.
    ///
    /// [1]: Self::free
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Releases a block of memory that was previously allocated.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `block` was returned by [`allocate()`][1] on this same
    /// allocator instance with the same `layout`, that it has not been freed yet and that it
    /// will not be accessed after this call.
    ///
    /// [1]: Self::allocate
    unsafe fn free(&self, block: NonNull<u8>, layout: Layout);
}

// SAFETY: Every block comes unchanged from the referenced allocator, which upholds the
// trait guarantees itself.
unsafe impl<A> Allocator for &A
where
    A: Allocator + ?Sized,
{
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn free(&self, block: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding the caller's guarantees unchanged to the referenced allocator.
        unsafe {
            (**self).free(block, layout);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::CountingAllocator;

    fn allocate_and_free(allocator: impl Allocator) {
        let layout = Layout::new::<u32>();

        let block = allocator.allocate(layout).unwrap();

        // SAFETY: Allocated above with the same layout, never touched again.
        unsafe {
            allocator.free(block, layout);
        }
    }

    #[test]
    fn reference_forwards_to_referent() {
        let counting = CountingAllocator::new();

        allocate_and_free(&counting);

        assert_eq!(counting.total_allocations(), 1);
        assert_eq!(counting.count(), 0);
    }

    #[test]
    fn trait_object_reference_is_allocator() {
        let counting = CountingAllocator::new();
        let dynamic: &dyn Allocator = &counting;

        allocate_and_free(dynamic);

        assert_eq!(counting.total_allocations(), 1);
    }
}
