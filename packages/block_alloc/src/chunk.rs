use std::alloc::Layout;
use std::num::NonZero;
use std::ptr::NonNull;

use crate::AllocError;

/// The header at the start of every chunk. While the chunk is free it links to the next free
/// chunk, forming the intrusive free list. While the chunk is handed out it is left untouched.
#[derive(Debug)]
pub(crate) struct FreeLink {
    pub(crate) next: Option<NonNull<FreeLink>>,
}

/// Geometry of the chunks served by one pool, fixed by the first allocation request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ChunkLayout {
    /// The layout every request to the pool must use.
    payload: Layout,

    /// Byte offset from the start of the chunk (the free list header) to the payload.
    payload_offset: usize,

    /// Header plus payload, padded so that consecutive chunks in a slab stay aligned.
    /// The size of this layout is the stride between chunks.
    chunk: Layout,
}

impl ChunkLayout {
    /// Calculates the chunk geometry for payloads of the given layout.
    pub(crate) fn for_payload(payload: Layout) -> Result<Self, AllocError> {
        let (chunk, payload_offset) = Layout::new::<FreeLink>()
            .extend(payload)
            .map_err(|_layout_error| AllocError::CapacityOverflow)?;

        Ok(Self {
            payload,
            payload_offset,
            chunk: chunk.pad_to_align(),
        })
    }

    #[must_use]
    pub(crate) fn payload(&self) -> Layout {
        self.payload
    }

    /// Size of a single chunk including its header, in bytes.
    #[must_use]
    pub(crate) fn size(&self) -> usize {
        self.chunk.size()
    }

    /// Layout of a slab holding `chunks` chunks back to back.
    pub(crate) fn slab(&self, chunks: NonZero<usize>) -> Result<Layout, AllocError> {
        let size = self
            .chunk
            .size()
            .checked_mul(chunks.get())
            .ok_or(AllocError::CapacityOverflow)?;

        Layout::from_size_align(size, self.chunk.align())
            .map_err(|_layout_error| AllocError::CapacityOverflow)
    }

    /// Recovers the payload address from the address of a chunk.
    #[must_use]
    pub(crate) fn payload_of(&self, chunk: NonNull<FreeLink>) -> NonNull<u8> {
        // SAFETY: Every chunk is `self.chunk.size()` bytes long and the payload starts
        // `payload_offset` bytes in, so the result stays inside the same chunk.
        unsafe { chunk.cast::<u8>().add(self.payload_offset) }
    }

    /// Recovers the chunk address from the address of the payload handed out to the caller.
    ///
    /// # Safety
    ///
    /// `payload` must have been produced by [`payload_of()`][Self::payload_of] on a chunk with
    /// this same geometry.
    #[must_use]
    pub(crate) unsafe fn chunk_of(&self, payload: NonNull<u8>) -> NonNull<FreeLink> {
        // SAFETY: The caller guarantees the payload lives `payload_offset` bytes into a chunk,
        // so stepping back lands on the start of that chunk.
        let chunk = unsafe { payload.sub(self.payload_offset) };

        #[allow(
            clippy::cast_ptr_alignment,
            reason = "chunks start at multiples of a stride aligned for FreeLink"
        )]
        let chunk = chunk.cast::<FreeLink>();

        chunk
    }
}

/// One contiguous buffer obtained from the backing allocator, carved into chunks.
///
/// The slab does not release its own memory - it does not know which allocator it came from.
/// The owning pool returns it to the backing allocator when the pool is dropped.
#[derive(Debug)]
pub(crate) struct Slab {
    start: NonNull<u8>,
    layout: Layout,
}

impl Slab {
    pub(crate) fn new(start: NonNull<u8>, layout: Layout) -> Self {
        Self { start, layout }
    }

    #[must_use]
    pub(crate) fn start(&self) -> NonNull<u8> {
        self.start
    }

    #[must_use]
    pub(crate) fn layout(&self) -> Layout {
        self.layout
    }

    /// Threads every chunk of the slab onto a free list, in address order, ending at `tail`.
    /// Returns the new head of the free list.
    ///
    /// # Safety
    ///
    /// The slab must be freshly allocated (no chunk handed out) with a layout produced by
    /// [`ChunkLayout::slab()`] for `geometry` and `chunks`.
    pub(crate) unsafe fn thread_free_list(
        &self,
        geometry: &ChunkLayout,
        chunks: NonZero<usize>,
        tail: Option<NonNull<FreeLink>>,
    ) -> NonNull<FreeLink> {
        let mut next = tail;

        // Walk backwards so the lowest chunk ends up at the head of the list.
        for index in (0..chunks.get()).rev() {
            // Cannot overflow - the whole slab was successfully allocated with this size.
            let offset = index.wrapping_mul(geometry.size());

            // SAFETY: `index < chunks` so the offset stays within the slab allocation.
            let chunk = unsafe { self.start.add(offset) };

            #[allow(
                clippy::cast_ptr_alignment,
                reason = "the slab and the chunk stride are both aligned for FreeLink"
            )]
            let chunk = chunk.cast::<FreeLink>();

            // SAFETY: The chunk is inside our allocation, aligned for `FreeLink` and not in use
            // by anyone, so writing the header is valid.
            unsafe {
                chunk.write(FreeLink { next });
            }

            next = Some(chunk);
        }

        next.expect("a slab always has at least one chunk")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;

    use super::*;

    #[test]
    fn payload_follows_header_with_alignment() {
        let geometry = ChunkLayout::for_payload(Layout::from_size_align(8, 32).unwrap()).unwrap();

        assert_eq!(geometry.payload_offset, 32);
        assert_eq!(geometry.size(), 64);
    }

    #[test]
    fn chunk_size_is_header_plus_payload() {
        let payload = Layout::new::<[usize; 3]>();
        let geometry = ChunkLayout::for_payload(payload).unwrap();

        assert_eq!(
            geometry.size(),
            size_of::<FreeLink>() + size_of::<[usize; 3]>()
        );
        assert_eq!(geometry.payload(), payload);
    }

    #[test]
    fn slab_layout_covers_all_chunks() {
        let geometry = ChunkLayout::for_payload(Layout::new::<u64>()).unwrap();

        let slab = geometry.slab(nz!(4)).unwrap();

        assert_eq!(slab.size(), geometry.size() * 4);
    }

    #[test]
    fn slab_layout_overflow_is_error() {
        let geometry = ChunkLayout::for_payload(Layout::new::<u64>()).unwrap();

        assert_eq!(
            geometry.slab(NonZero::new(usize::MAX).expect("usize::MAX is not zero")),
            Err(AllocError::CapacityOverflow)
        );
    }

    #[test]
    fn payload_and_chunk_addresses_round_trip() {
        let geometry = ChunkLayout::for_payload(Layout::new::<u32>()).unwrap();
        let mut storage = [0_usize; 8];
        let chunk = NonNull::from(&mut storage).cast::<FreeLink>();

        let payload = geometry.payload_of(chunk);

        // SAFETY: The payload was produced by `payload_of()` with the same geometry.
        let recovered = unsafe { geometry.chunk_of(payload) };
        assert_eq!(recovered, chunk);
    }
}
