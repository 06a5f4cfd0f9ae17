#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Raw memory block allocators for containers that manage their own nodes.
//!
//! This crate defines the [`Allocator`] protocol - allocate a block for a [`std::alloc::Layout`],
//! free it again later - and three implementations of it:
//!
//! - [`HeapAllocator`] - a stateless allocator over the global Rust allocator. This is what
//!   containers use when no allocator is injected.
//! - [`CountingAllocator`] - a heap allocator that counts outstanding blocks, for verifying that
//!   containers return all the memory they take.
//! - [`PoolAllocator`] - serves fixed-size blocks with O(1) allocate and free from growable slabs,
//!   tracking unused chunks in an intrusive free list. Best suited for high-churn workloads where
//!   every block has the same layout, such as the nodes of a tree.
//!
//! # Examples
//!
//! ```
//! use std::alloc::Layout;
//!
//! use block_alloc::{Allocator, CountingAllocator, PoolAllocator};
//! use new_zealand::nz;
//!
//! let backing = CountingAllocator::new();
//! let pool = PoolAllocator::builder()
//!     .chunks_per_slab(nz!(4))
//!     .backing(&backing)
//!     .build();
//!
//! let layout = Layout::new::<[u64; 3]>();
//! let blocks = (0..5)
//!     .map(|_| pool.allocate(layout))
//!     .collect::<Result<Vec<_>, _>>()
//!     .unwrap();
//!
//! // Five blocks from slabs of four chunks means two slabs.
//! assert_eq!(backing.count(), 2);
//! assert_eq!(pool.capacity(), 8);
//!
//! for block in blocks {
//!     // SAFETY: Every block came from this pool with this layout and is not used again.
//!     unsafe { pool.free(block, layout) };
//! }
//!
//! assert!(pool.is_empty());
//! ```
//!
//! # Thread safety
//!
//! Stateful allocators in this crate are not [`Sync`]. An allocator may be shared by many
//! containers on one thread, but sharing it across threads requires external synchronization.

mod allocator;
mod builder;
mod chunk;
mod drop_policy;
mod error;
mod heap;
mod pool;

pub use allocator::*;
pub use builder::*;
pub(crate) use chunk::*;
pub use drop_policy::*;
pub use error::*;
pub use heap::*;
pub use pool::PoolAllocator;
pub(crate) use pool::DEFAULT_CHUNKS_PER_SLAB;
