#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Ordered associative containers backed by a red-black tree whose nodes are obtained from a
//! pluggable [`Allocator`][block_alloc::Allocator].
//!
//! * [`OrderedMap`] (also available under its engine name [`RbTree`]) maps unique keys to values.
//! * [`OrderedSet`] holds unique keys.
//!
//! Both keep their contents in increasing key order and support O(log n) lookup, insertion and
//! removal. Positions in a container are expressed as [`Cursor`]s, which can step forwards and
//! backwards and compare equal when they refer to the same position of the same container.
//!
//! # Allocators
//!
//! Containers created with `new()` use the process heap. Containers created with `new_in()`
//! borrow the allocator they are given and return every node to it, so the allocator must
//! outlive them. A [`PoolAllocator`][block_alloc::PoolAllocator] is a good fit when the same
//! thread creates and destroys many nodes of one type.
//!
//! ```
//! use block_alloc::PoolAllocator;
//! use new_zealand::nz;
//! use ordered_tree::OrderedSet;
//!
//! let pool = PoolAllocator::new(nz!(256));
//!
//! let mut set = OrderedSet::new_in(&pool)?;
//!
//! for value in [3, 1, 2, 1] {
//!     set.insert(value)?;
//! }
//!
//! assert_eq!(set.iter().copied().collect::<Vec<_>>(), [1, 2, 3]);
//!
//! set.clear();
//!
//! // Only the two sentinel nodes remain allocated.
//! assert_eq!(pool.outstanding(), 2);
//! # Ok::<(), ordered_tree::Error>(())
//! ```
//!
//! # Errors
//!
//! Operations that allocate return [`Result`][std::result::Result] with [`Error::Alloc`] if the
//! allocator fails, leaving the container unmodified. `new()` and [`Clone`] treat allocation
//! failure as fatal and panic, like the standard collections do.
//!
//! # Thread safety
//!
//! The containers are single-threaded types. They are neither [`Send`] nor [`Sync`].

mod cursor;
mod error;
mod iter;
mod node;
mod set;
mod tree;

pub use cursor::*;
pub use error::Error;
pub(crate) use error::Result;
pub use iter::*;
pub use set::*;
pub use tree::*;
