use std::num::NonZero;

use crate::{Allocator, DEFAULT_CHUNKS_PER_SLAB, DropPolicy, HeapAllocator, PoolAllocator};

/// Builder for creating an instance of [`PoolAllocator`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// The default configuration used by [`PoolAllocator::default()`] is sufficient for most
/// use cases.
///
/// # Examples
///
/// ```
/// use block_alloc::{CountingAllocator, DropPolicy, PoolAllocator};
/// use new_zealand::nz;
///
/// let backing = CountingAllocator::new();
///
/// let pool = PoolAllocator::builder()
///     .chunks_per_slab(nz!(64))
///     .drop_policy(DropPolicy::MustNotDropOutstanding)
///     .backing(&backing)
///     .build();
///
/// assert_eq!(pool.chunks_per_slab().get(), 64);
/// ```
#[derive(Debug)]
#[must_use]
pub struct PoolAllocatorBuilder<B = HeapAllocator> {
    chunks_per_slab: NonZero<usize>,
    drop_policy: DropPolicy,
    backing: B,
}

impl PoolAllocatorBuilder<HeapAllocator> {
    pub(crate) fn new() -> Self {
        Self {
            chunks_per_slab: DEFAULT_CHUNKS_PER_SLAB,
            drop_policy: DropPolicy::default(),
            backing: HeapAllocator,
        }
    }
}

impl<B> PoolAllocatorBuilder<B>
where
    B: Allocator,
{
    /// Sets the number of chunks provisioned each time the pool runs out of free chunks.
    ///
    /// Larger slabs mean fewer calls to the backing allocator at the cost of memory that may
    /// sit unused.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_alloc::PoolAllocator;
    /// use new_zealand::nz;
    ///
    /// let pool = PoolAllocator::builder().chunks_per_slab(nz!(16)).build();
    /// ```
    pub fn chunks_per_slab(mut self, chunks: NonZero<usize>) -> Self {
        self.chunks_per_slab = chunks;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how to treat blocks that
    /// are still outstanding when the pool is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_alloc::{DropPolicy, PoolAllocator};
    ///
    /// let pool = PoolAllocator::builder()
    ///     .drop_policy(DropPolicy::MustNotDropOutstanding)
    ///     .build();
    /// ```
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Sets the allocator the pool obtains its slabs from.
    ///
    /// The backing allocator is only called when the free list is exhausted (to provision a new
    /// slab) and when the pool is dropped (to release all slabs).
    ///
    /// # Examples
    ///
    /// ```
    /// use block_alloc::{CountingAllocator, PoolAllocator};
    ///
    /// let backing = CountingAllocator::new();
    /// let pool = PoolAllocator::builder().backing(&backing).build();
    /// ```
    pub fn backing<C>(self, backing: C) -> PoolAllocatorBuilder<C>
    where
        C: Allocator,
    {
        PoolAllocatorBuilder {
            chunks_per_slab: self.chunks_per_slab,
            drop_policy: self.drop_policy,
            backing,
        }
    }

    /// Builds the pool allocator with the specified configuration.
    ///
    /// The pool starts without any slabs. The first slab is provisioned by the first
    /// allocation request, which also fixes the block layout the pool serves.
    #[must_use]
    pub fn build(self) -> PoolAllocator<B> {
        PoolAllocator::new_inner(self.chunks_per_slab, self.drop_policy, self.backing)
    }
}
