use std::alloc::Layout;
use std::cell::RefCell;
use std::num::NonZero;
use std::ptr::NonNull;
use std::thread;

use new_zealand::nz;

use crate::{
    AllocError, Allocator, ChunkLayout, DropPolicy, FreeLink, HeapAllocator, PoolAllocatorBuilder,
    Slab,
};

/// Today, the default slab holds a fixed number of chunks. Callers with different needs can pick
/// their own count via [`PoolAllocatorBuilder::chunks_per_slab()`].
#[cfg(not(miri))]
pub(crate) const DEFAULT_CHUNKS_PER_SLAB: NonZero<usize> = nz!(128);

// Under Miri, we use a smaller slab because Miri test runtime scales by memory usage.
#[cfg(miri)]
pub(crate) const DEFAULT_CHUNKS_PER_SLAB: NonZero<usize> = nz!(4);

/// An allocator that serves fixed-size blocks with O(1) allocation and release.
///
/// Memory is obtained from a backing allocator in bulk, one slab of
/// [`chunks_per_slab()`][1] chunks at a time. Every chunk starts with a small header that links
/// it into an intrusive free list while the chunk is unused, so tracking free chunks costs no
/// memory beyond the chunks themselves.
///
/// # Homogeneity
///
/// The pool serves blocks of exactly one layout. The first allocation request fixes that layout
/// and every subsequent request (and every release) must use the same one. Requesting a
/// different layout is a bug in the caller and results in a panic. This makes the pool a good
/// fit for containers whose elements all have the same node type, such as tree nodes.
///
/// # Resource usage
///
/// Slabs are never returned to the backing allocator individually - released chunks are only
/// reused by the same pool. All slabs are released when the pool is dropped.
///
/// # Thread safety
///
/// The pool is thread-mobile ([`Send`] if the backing allocator is) but not [`Sync`]. It may be
/// shared by any number of containers on the same thread.
///
/// # Examples
///
/// ```
/// use std::alloc::Layout;
///
/// use block_alloc::{Allocator, PoolAllocator};
/// use new_zealand::nz;
///
/// let pool = PoolAllocator::new(nz!(4));
/// let layout = Layout::new::<[u64; 4]>();
///
/// let block = pool.allocate(layout).unwrap();
/// assert_eq!(pool.outstanding(), 1);
/// assert_eq!(pool.capacity(), 4);
///
/// // SAFETY: Allocated above with the same layout and never used again.
/// unsafe { pool.free(block, layout) };
/// assert!(pool.is_empty());
/// ```
///
/// [1]: Self::chunks_per_slab
#[derive(Debug)]
pub struct PoolAllocator<B = HeapAllocator>
where
    B: Allocator,
{
    chunks_per_slab: NonZero<usize>,
    drop_policy: DropPolicy,
    backing: B,

    state: RefCell<PoolState>,
}

#[derive(Debug, Default)]
struct PoolState {
    /// Fixed by the first allocation request. `None` until then.
    geometry: Option<ChunkLayout>,

    /// Every slab obtained from the backing allocator, in the order they were provisioned.
    slabs: Vec<Slab>,

    /// Head of the intrusive free list. Think of this as a stack of unused chunks, with the
    /// stack links stored in the chunk headers themselves. `None` if every chunk is in use.
    free_head: Option<NonNull<FreeLink>>,

    /// Number of blocks handed out and not yet released.
    outstanding: usize,
}

impl PoolAllocator<HeapAllocator> {
    /// Creates a pool that provisions `chunks_per_slab` chunks at a time from the heap.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_alloc::PoolAllocator;
    /// use new_zealand::nz;
    ///
    /// let pool = PoolAllocator::new(nz!(32));
    ///
    /// assert_eq!(pool.chunks_per_slab().get(), 32);
    /// assert_eq!(pool.capacity(), 0);
    /// ```
    #[must_use]
    pub fn new(chunks_per_slab: NonZero<usize>) -> Self {
        Self::builder().chunks_per_slab(chunks_per_slab).build()
    }

    /// Starts building a new [`PoolAllocator`].
    ///
    /// Use this when you want to customize the pool configuration beyond the defaults.
    pub fn builder() -> PoolAllocatorBuilder<HeapAllocator> {
        PoolAllocatorBuilder::new()
    }
}

impl Default for PoolAllocator<HeapAllocator> {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl<B> PoolAllocator<B>
where
    B: Allocator,
{
    #[must_use]
    pub(crate) fn new_inner(
        chunks_per_slab: NonZero<usize>,
        drop_policy: DropPolicy,
        backing: B,
    ) -> Self {
        Self {
            chunks_per_slab,
            drop_policy,
            backing,
            state: RefCell::new(PoolState::default()),
        }
    }

    /// Creates a new, empty pool with the same configuration and backing allocator as this one.
    ///
    /// No slabs are shared - the new pool provisions its own memory on first use and may serve
    /// a different block layout.
    #[must_use]
    pub fn fresh_like(&self) -> Self
    where
        B: Clone,
    {
        Self::new_inner(self.chunks_per_slab, self.drop_policy, self.backing.clone())
    }

    /// The number of chunks provisioned each time the pool grows.
    #[must_use]
    pub fn chunks_per_slab(&self) -> NonZero<usize> {
        self.chunks_per_slab
    }

    /// The policy applied to outstanding blocks when the pool is dropped.
    #[must_use]
    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }

    /// The allocator slabs are obtained from.
    #[must_use]
    pub fn backing(&self) -> &B {
        &self.backing
    }

    /// Size of a single chunk in bytes, including the free list header.
    ///
    /// Returns `None` if the pool has not yet received an allocation request, as the first
    /// request determines the chunk size.
    #[must_use]
    pub fn chunk_size(&self) -> Option<usize> {
        self.state.borrow().geometry.map(|geometry| geometry.size())
    }

    /// The number of slabs obtained from the backing allocator so far.
    #[must_use]
    pub fn slab_count(&self) -> usize {
        self.state.borrow().slabs.len()
    }

    /// The total number of chunks provisioned across all slabs, whether in use or not.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slab_count()
            .checked_mul(self.chunks_per_slab.get())
            .expect("every provisioned chunk exists in memory, so the count cannot overflow")
    }

    /// The number of blocks currently handed out and not yet released.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.state.borrow().outstanding
    }

    /// Whether no blocks are currently handed out.
    ///
    /// An empty pool may still be holding slabs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outstanding() == 0
    }

    /// Obtains one more slab from the backing allocator and threads its chunks onto the free
    /// list. Returns the new head of the free list.
    fn grow(
        &self,
        state: &mut PoolState,
        geometry: &ChunkLayout,
    ) -> Result<NonNull<FreeLink>, AllocError> {
        let slab_layout = geometry.slab(self.chunks_per_slab)?;
        let slab = Slab::new(self.backing.allocate(slab_layout)?, slab_layout);

        // SAFETY: The slab was just allocated with the layout calculated for this geometry and
        // chunk count, so none of its chunks are in use.
        let head = unsafe { slab.thread_free_list(geometry, self.chunks_per_slab, state.free_head) };

        state.slabs.push(slab);

        tracing::debug!(
            slabs = state.slabs.len(),
            chunks_per_slab = self.chunks_per_slab.get(),
            chunk_size = geometry.size(),
            "pool allocator provisioned a new slab"
        );

        Ok(head)
    }
}

// SAFETY: Each chunk is sized and aligned for the payload layout, which is asserted to equal
// every requested layout. Slabs come from a backing allocator that upholds the same guarantees,
// and a chunk is on the free list only while nobody holds it, so no two live blocks overlap.
unsafe impl<B> Allocator for PoolAllocator<B>
where
    B: Allocator,
{
    /// Hands out one chunk from the free list, provisioning a new slab first if the free list
    /// is empty.
    ///
    /// # Panics
    ///
    /// Panics if `layout` differs from the layout of the first request made to this pool.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let mut state = self.state.borrow_mut();

        let geometry = if let Some(geometry) = state.geometry {
            assert!(
                geometry.payload() == layout,
                "PoolAllocator serves a single block layout: first request was {:?} but now {:?} was requested",
                geometry.payload(),
                layout
            );

            geometry
        } else {
            ChunkLayout::for_payload(layout)?
        };

        let chunk = match state.free_head {
            Some(chunk) => chunk,
            None => self.grow(&mut state, &geometry)?,
        };

        // Only a request that obtained a chunk fixes the geometry.
        if state.geometry.replace(geometry).is_none() {
            tracing::debug!(
                payload_size = layout.size(),
                payload_align = layout.align(),
                chunk_size = geometry.size(),
                "pool allocator chunk layout fixed by first request"
            );
        }

        // SAFETY: Every chunk on the free list has an initialized header and is not in use by
        // anyone, so we may read the link to the next free chunk.
        state.free_head = unsafe { chunk.read() }.next;

        state.outstanding = state
            .outstanding
            .checked_add(1)
            .expect("cannot hand out more blocks than fit in virtual memory");

        Ok(geometry.payload_of(chunk))
    }

    /// Pushes the chunk holding `block` back onto the free list.
    ///
    /// # Panics
    ///
    /// Panics if `layout` differs from the layout the pool serves or if the pool has no blocks
    /// outstanding.
    unsafe fn free(&self, block: NonNull<u8>, layout: Layout) {
        let mut state = self.state.borrow_mut();

        let geometry = state
            .geometry
            .expect("a block was returned to a pool that never handed one out");

        assert!(
            geometry.payload() == layout,
            "PoolAllocator serves a single block layout: blocks are {:?} but {:?} was released",
            geometry.payload(),
            layout
        );

        state.outstanding = state
            .outstanding
            .checked_sub(1)
            .expect("more blocks were returned to the pool than were handed out");

        // SAFETY: The caller guarantees the block came from our `allocate()`, which produced it
        // via `payload_of()` with this same geometry.
        let chunk = unsafe { geometry.chunk_of(block) };

        // SAFETY: The chunk belongs to one of our slabs and the caller guarantees it is no longer
        // in use, so we may overwrite its header.
        unsafe {
            chunk.write(FreeLink {
                next: state.free_head,
            });
        }

        state.free_head = Some(chunk);
    }
}

impl<B> Drop for PoolAllocator<B>
where
    B: Allocator,
{
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let outstanding = state.outstanding;

        state.free_head = None;

        for slab in state.slabs.drain(..) {
            // SAFETY: The slab was obtained from the backing allocator with this exact layout and
            // the pool is going away, so nothing will hand out its chunks again.
            unsafe {
                self.backing.free(slab.start(), slab.layout());
            }
        }

        if outstanding == 0 {
            return;
        }

        // We do this check at the end so we release the memory first. If we are already
        // panicking, we do not want to panic again and obscure the original panic.
        if self.drop_policy == DropPolicy::MustNotDropOutstanding && !thread::panicking() {
            panic!(
                "dropped a pool allocator with {outstanding} blocks outstanding under a policy that requires all blocks to be returned first"
            );
        }

        tracing::warn!(
            outstanding,
            "pool allocator dropped while blocks were still outstanding"
        );
    }
}

// SAFETY: The raw pointers refer to slabs owned exclusively by the pool, with nothing inherently
// tied to the creating thread. The pool is not Sync (RefCell) so it is never used from two
// threads at once.
unsafe impl<B> Send for PoolAllocator<B> where B: Allocator + Send {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashSet;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::CountingAllocator;

    assert_impl_all!(PoolAllocator: Send);
    assert_not_impl_any!(PoolAllocator: Sync);

    #[repr(C)]
    struct Payload {
        a: u64,
        b: u64,
        c: u32,
    }

    fn payload_layout() -> Layout {
        Layout::new::<Payload>()
    }

    #[test]
    fn smoke_test() {
        let pool = PoolAllocator::new(nz!(3));

        let a = pool.allocate(payload_layout()).unwrap();
        let b = pool.allocate(payload_layout()).unwrap();

        assert_ne!(a, b);
        assert_eq!(pool.outstanding(), 2);
        assert_eq!(pool.slab_count(), 1);
        assert_eq!(pool.capacity(), 3);

        // SAFETY: Both blocks came from this pool with this layout and are not used again.
        unsafe {
            pool.free(a, payload_layout());
            pool.free(b, payload_layout());
        }

        assert!(pool.is_empty());
    }

    #[test]
    fn blocks_are_usable_and_aligned() {
        let pool = PoolAllocator::new(nz!(4));
        let mut blocks = Vec::new();

        for value in 0..10_u64 {
            let block = pool.allocate(payload_layout()).unwrap().cast::<Payload>();
            assert_eq!(block.as_ptr() as usize % align_of::<Payload>(), 0);

            // SAFETY: The block is sized and aligned for a Payload and exclusively ours.
            unsafe {
                block.write(Payload {
                    a: value,
                    b: value * 2,
                    c: 7,
                });
            }

            blocks.push(block);
        }

        for (value, block) in (0..10_u64).zip(&blocks) {
            // SAFETY: Written above and not freed yet.
            let payload = unsafe { block.as_ref() };
            assert_eq!(payload.a, value);
            assert_eq!(payload.b, value * 2);
            assert_eq!(payload.c, 7);
        }

        for block in blocks {
            // SAFETY: Came from this pool with this layout and is not used again.
            unsafe {
                pool.free(block.cast(), payload_layout());
            }
        }
    }

    #[test]
    fn five_allocations_provision_two_slabs_then_reuse() {
        let backing = CountingAllocator::new();
        let pool = PoolAllocator::builder()
            .chunks_per_slab(nz!(4))
            .backing(&backing)
            .build();

        let blocks = (0..5)
            .map(|_| pool.allocate(payload_layout()).unwrap())
            .collect::<Vec<_>>();

        assert_eq!(backing.total_allocations(), 2);
        assert_eq!(pool.slab_count(), 2);
        assert_eq!(pool.capacity(), 8);

        for block in &blocks {
            // SAFETY: Came from this pool with this layout and is not used again.
            unsafe {
                pool.free(*block, payload_layout());
            }
        }

        let reused = pool.allocate(payload_layout()).unwrap();

        assert!(blocks.contains(&reused));
        assert_eq!(backing.total_allocations(), 2);
        assert_eq!(pool.slab_count(), 2);

        // SAFETY: Came from this pool with this layout and is not used again.
        unsafe {
            pool.free(reused, payload_layout());
        }
    }

    #[test]
    fn most_recently_freed_is_reused_first() {
        let pool = PoolAllocator::new(nz!(8));

        let a = pool.allocate(payload_layout()).unwrap();
        let b = pool.allocate(payload_layout()).unwrap();

        // SAFETY: Came from this pool with this layout and is not used again.
        unsafe {
            pool.free(a, payload_layout());
        }

        let c = pool.allocate(payload_layout()).unwrap();
        assert_eq!(a, c);

        // SAFETY: Came from this pool with this layout and are not used again.
        unsafe {
            pool.free(b, payload_layout());
            pool.free(c, payload_layout());
        }
    }

    #[test]
    fn outstanding_blocks_are_unique_and_within_capacity() {
        let pool = PoolAllocator::new(nz!(5));
        let mut live = Vec::new();

        for round in 0..200_usize {
            if round % 3 == 2 {
                let block = live.swap_remove(round % live.len());

                // SAFETY: Came from this pool with this layout and is not used again.
                unsafe {
                    pool.free(block, payload_layout());
                }
            } else {
                live.push(pool.allocate(payload_layout()).unwrap());
            }

            let unique = live.iter().collect::<HashSet<_>>();
            assert_eq!(unique.len(), live.len());
            assert_eq!(pool.outstanding(), live.len());
            assert!(pool.outstanding() <= pool.capacity());
        }

        for block in live {
            // SAFETY: Came from this pool with this layout and is not used again.
            unsafe {
                pool.free(block, payload_layout());
            }
        }
    }

    #[test]
    fn chunk_size_fixed_by_first_request() {
        let pool = PoolAllocator::new(nz!(2));
        assert_eq!(pool.chunk_size(), None);

        let block = pool.allocate(payload_layout()).unwrap();

        assert_eq!(
            pool.chunk_size(),
            Some(size_of::<FreeLink>() + size_of::<Payload>().next_multiple_of(8))
        );

        // SAFETY: Came from this pool with this layout and is not used again.
        unsafe {
            pool.free(block, payload_layout());
        }
    }

    #[test]
    #[should_panic]
    fn different_layout_is_panic() {
        let pool = PoolAllocator::new(nz!(2));

        let _block = pool.allocate(payload_layout()).unwrap();
        _ = pool.allocate(Layout::new::<u8>());
    }

    #[test]
    #[should_panic]
    fn free_without_allocation_is_panic() {
        let pool = PoolAllocator::new(nz!(2));
        let mut storage = 0_u64;

        // SAFETY: Not actually safe - this is the contract violation under test, which the pool
        // detects before touching the block.
        unsafe {
            pool.free(NonNull::from(&mut storage).cast(), Layout::new::<u64>());
        }
    }

    #[test]
    fn slabs_returned_to_backing_on_drop() {
        let backing = CountingAllocator::new();

        {
            let pool = PoolAllocator::builder()
                .chunks_per_slab(nz!(2))
                .backing(&backing)
                .build();

            let blocks = (0..5)
                .map(|_| pool.allocate(payload_layout()).unwrap())
                .collect::<Vec<_>>();

            assert_eq!(backing.count(), 3);

            for block in blocks {
                // SAFETY: Came from this pool with this layout and is not used again.
                unsafe {
                    pool.free(block, payload_layout());
                }
            }

            // Released chunks stay with the pool.
            assert_eq!(backing.count(), 3);
        }

        assert_eq!(backing.count(), 0);
    }

    #[test]
    fn drop_with_outstanding_under_permissive_policy_releases_memory() {
        let backing = CountingAllocator::new();

        {
            let pool = PoolAllocator::builder().backing(&backing).build();
            _ = pool.allocate(payload_layout()).unwrap();
        }

        assert_eq!(backing.count(), 0);
    }

    #[test]
    #[should_panic]
    fn drop_with_outstanding_under_strict_policy_is_panic() {
        let pool = PoolAllocator::builder()
            .drop_policy(DropPolicy::MustNotDropOutstanding)
            .build();

        _ = pool.allocate(payload_layout()).unwrap();
    }

    #[test]
    fn drop_empty_under_strict_policy_ok() {
        let pool = PoolAllocator::builder()
            .drop_policy(DropPolicy::MustNotDropOutstanding)
            .build();

        let block = pool.allocate(payload_layout()).unwrap();

        // SAFETY: Came from this pool with this layout and is not used again.
        unsafe {
            pool.free(block, payload_layout());
        }

        drop(pool);
    }

    #[test]
    fn fresh_like_copies_configuration_only() {
        let backing = CountingAllocator::new();
        let original = PoolAllocator::builder()
            .chunks_per_slab(nz!(3))
            .backing(&backing)
            .build();

        let block = original.allocate(payload_layout()).unwrap();

        let fresh = original.fresh_like();

        assert_eq!(fresh.chunks_per_slab().get(), 3);
        assert_eq!(fresh.slab_count(), 0);
        assert_eq!(fresh.chunk_size(), None);

        // A fresh pool may serve a different layout.
        let other = fresh.allocate(Layout::new::<u8>()).unwrap();
        assert_eq!(backing.count(), 2);

        // SAFETY: Each block goes back to the pool it came from with its own layout.
        unsafe {
            fresh.free(other, Layout::new::<u8>());
            original.free(block, payload_layout());
        }
    }

    #[test]
    fn backing_failure_leaves_pool_unchanged() {
        let pool = PoolAllocator::new(NonZero::new(usize::MAX).expect("usize::MAX is not zero"));

        let result = pool.allocate(payload_layout());

        assert_eq!(result, Err(AllocError::CapacityOverflow));
        assert_eq!(pool.slab_count(), 0);
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.chunk_size(), None);

        // The failed request did not fix the layout, so another layout is not a mismatch.
        assert_eq!(
            pool.allocate(Layout::new::<u8>()),
            Err(AllocError::CapacityOverflow)
        );
    }
}
