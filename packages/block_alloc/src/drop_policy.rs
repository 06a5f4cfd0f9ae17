/// Determines what happens when a [`PoolAllocator`][crate::PoolAllocator] is dropped while some
/// of its blocks are still handed out.
///
/// The pool always releases its slabs when dropped. Any block still in use at that point becomes
/// dangling, so callers typically want to know about it.
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
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool releases its memory even if blocks are outstanding, logging a warning.
    /// This is the default.
    #[default]
    MayDropOutstanding,

    /// The pool will panic if any block is still outstanding when it is dropped.
    ///
    /// This is valuable in tests and in code where every container built on the pool is
    /// expected to have returned its memory before the pool goes away.
    MustNotDropOutstanding,
}
