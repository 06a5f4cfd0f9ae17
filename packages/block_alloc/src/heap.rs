use std::alloc::{Layout, alloc, dealloc};
use std::cell::Cell;
use std::ptr::NonNull;

use crate::{AllocError, Allocator};

/// Allocates blocks directly from the global Rust allocator.
///
/// This is the default allocator used by containers when no allocator is injected. It is
/// stateless, so a single `'static` instance can be shared by any number of containers.
///
/// # Examples
///
/// ```
/// use std::alloc::Layout;
///
/// use block_alloc::{Allocator, HeapAllocator};
///
/// let layout = Layout::new::<[u8; 32]>();
/// let block = HeapAllocator::instance().allocate(layout).unwrap();
///
/// // SAFETY: Allocated above with the same layout and never used again.
/// unsafe { HeapAllocator::instance().free(block, layout) };
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapAllocator;

static INSTANCE: HeapAllocator = HeapAllocator;

impl HeapAllocator {
    /// Returns the shared instance of the heap allocator.
    #[must_use]
    #[inline]
    pub fn instance() -> &'static Self {
        &INSTANCE
    }
}

// SAFETY: Blocks come from the global allocator with the requested layout, which makes them
// valid, aligned and exclusive until deallocated.
unsafe impl Allocator for HeapAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Err(AllocError::ZeroSized);
        }

        // SAFETY: The layout is not zero-sized (checked above), which is the only requirement.
        let ptr = unsafe { alloc(layout) };

        NonNull::new(ptr).ok_or_else(|| AllocError::out_of_memory(layout))
    }

    unsafe fn free(&self, block: NonNull<u8>, layout: Layout) {
        // SAFETY: The caller guarantees the block came from `allocate()` with this layout,
        // which obtained it from the global allocator with the same layout.
        unsafe {
            dealloc(block.as_ptr(), layout);
        }
    }
}

/// A heap allocator that keeps count of the blocks it has handed out.
///
/// Useful for verifying that containers return every block they allocate: after a container
/// has been cleared or dropped, [`count()`][1] must be back where it started.
///
/// Not [`Sync`] - the counters use single-threaded interior mutability.
///
/// # Examples
///
/// ```
/// use std::alloc::Layout;
///
/// use block_alloc::{Allocator, CountingAllocator};
///
/// let allocator = CountingAllocator::new();
/// let layout = Layout::new::<u64>();
///
/// let block = allocator.allocate(layout).unwrap();
/// assert_eq!(allocator.count(), 1);
///
/// // SAFETY: Allocated above with the same layout and never used again.
/// unsafe { allocator.free(block, layout) };
/// assert_eq!(allocator.count(), 0);
/// assert_eq!(allocator.total_allocations(), 1);
/// ```
///
/// [1]: Self::count
#[derive(Debug, Default)]
pub struct CountingAllocator {
    outstanding: Cell<usize>,
    total: Cell<usize>,
}

impl CountingAllocator {
    /// Creates a counting allocator with no blocks outstanding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of blocks currently allocated and not yet freed.
    #[must_use]
    pub fn count(&self) -> usize {
        self.outstanding.get()
    }

    /// The number of successful allocations over the lifetime of the allocator.
    #[must_use]
    pub fn total_allocations(&self) -> usize {
        self.total.get()
    }
}

// SAFETY: Every block comes unchanged from `HeapAllocator`.
unsafe impl Allocator for CountingAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let block = HeapAllocator.allocate(layout)?;

        self.outstanding.set(
            self.outstanding
                .get()
                .checked_add(1)
                .expect("cannot have more outstanding blocks than fit in virtual memory"),
        );
        self.total.set(self.total.get().wrapping_add(1));

        Ok(block)
    }

    unsafe fn free(&self, block: NonNull<u8>, layout: Layout) {
        self.outstanding.set(
            self.outstanding
                .get()
                .checked_sub(1)
                .expect("freed more blocks than were allocated from this allocator"),
        );

        // SAFETY: Forwarding the caller's guarantees - the block came from our `allocate()`,
        // which obtained it from the heap allocator with the same layout.
        unsafe {
            HeapAllocator.free(block, layout);
        }
    }
}
