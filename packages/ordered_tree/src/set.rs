use std::borrow::Borrow;
use std::fmt;

use block_alloc::Allocator;

use crate::{Cursor, CursorMut, Keys, RbTree, Result};

/// An iterator over the keys of an [`OrderedSet`] in increasing order.
pub type SetIter<'t, K> = Keys<'t, K, ()>;

/// An ordered set of unique keys, stored in a red-black tree whose nodes come from an injected
/// [`Allocator`].
///
/// This is a thin layer over [`RbTree`] with no value attached to each key. See [`RbTree`] for
/// the details of allocator use and key ordering.
///
/// # Examples
///
/// ```
/// use ordered_tree::OrderedSet;
///
/// let mut set = OrderedSet::new();
///
/// set.insert(3)?;
/// set.insert(1)?;
/// assert!(!set.insert(3)?.1);
///
/// assert!(set.contains(&1));
/// assert_eq!(set.iter().copied().collect::<Vec<_>>(), [1, 3]);
/// # Ok::<(), ordered_tree::Error>(())
/// ```
pub struct OrderedSet<'a, K> {
    tree: RbTree<'a, K, ()>,
}

impl<K> OrderedSet<'static, K> {
    /// Creates an empty set that allocates its nodes from the shared
    /// [`HeapAllocator`][block_alloc::HeapAllocator].
    ///
    /// # Panics
    ///
    /// Panics if the heap cannot provide memory for the sentinel nodes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: RbTree::new(),
        }
    }
}

impl<K> Default for OrderedSet<'static, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, K> OrderedSet<'a, K> {
    /// Creates an empty set that allocates its nodes from `allocator`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel nodes cannot be allocated.
    pub fn new_in(allocator: &'a dyn Allocator) -> Result<Self> {
        Ok(Self {
            tree: RbTree::new_in(allocator)?,
        })
    }

    /// The allocator this set obtains its nodes from.
    #[must_use]
    pub fn allocator(&self) -> &'a dyn Allocator {
        self.tree.allocator()
    }

    /// The number of keys in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the set has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// A cursor at the smallest key, or at the end if the set is empty.
    #[must_use]
    pub fn begin(&self) -> Cursor<'_, K, ()> {
        self.tree.begin()
    }

    /// A cursor at the end position, just past the largest key.
    #[must_use]
    pub fn end(&self) -> Cursor<'_, K, ()> {
        self.tree.end()
    }

    /// An exclusive cursor at the smallest key, able to erase keys while walking the set.
    #[must_use]
    pub fn begin_mut(&mut self) -> CursorMut<'_, 'a, K, ()> {
        self.tree.begin_mut()
    }

    /// The smallest key.
    #[must_use]
    pub fn first(&self) -> Option<&K> {
        self.tree.first().map(|(key, ())| key)
    }

    /// The largest key.
    #[must_use]
    pub fn last(&self) -> Option<&K> {
        self.tree.last().map(|(key, ())| key)
    }

    /// Iterates over the keys in increasing order.
    pub fn iter(&self) -> SetIter<'_, K> {
        self.tree.keys()
    }

    /// Removes all keys.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Exchanges the contents of two sets, including the allocators they use.
    pub fn swap(&mut self, other: &mut Self) {
        self.tree.swap(&mut other.tree);
    }
}

impl<'a, K> OrderedSet<'a, K>
where
    K: Ord,
{
    /// A cursor at the given key, or at the end if the key is absent.
    #[must_use]
    pub fn find<Q>(&self, key: &Q) -> Cursor<'_, K, ()>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.find(key)
    }

    /// An exclusive cursor at the given key, or at the end if the key is absent.
    #[must_use]
    pub fn find_mut<Q>(&mut self, key: &Q) -> CursorMut<'_, 'a, K, ()>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.find_mut(key)
    }

    /// Whether the set contains the key.
    #[must_use]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(key)
    }

    /// Adds a key unless it is already present.
    ///
    /// Returns a cursor at the key in the set and whether the insertion took place.
    ///
    /// # Errors
    ///
    /// Returns an error if a node cannot be allocated. The set is left unmodified.
    pub fn insert(&mut self, key: K) -> Result<(Cursor<'_, K, ()>, bool)> {
        self.tree.insert(key, ())
    }

    /// Adds a key the caller has established to be absent, without searching for it first.
    ///
    /// Inserting a key that is already present leaves the set holding it twice.
    ///
    /// # Errors
    ///
    /// Returns an error if a node cannot be allocated. The set is left unmodified.
    pub fn trusted_insert(&mut self, key: K) -> Result<Cursor<'_, K, ()>> {
        self.tree.trusted_insert(key, ())
    }

    /// Removes the key, returning it if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<K>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.remove(key).map(|(key, ())| key)
    }

    /// Removes every occurrence of the key, returning the number removed.
    pub fn erase<Q>(&mut self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.erase(key)
    }

    /// Creates a deep copy of the set that allocates its nodes from the same allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if a node cannot be allocated.
    pub fn try_clone(&self) -> Result<Self>
    where
        K: Clone,
    {
        Ok(Self {
            tree: self.tree.try_clone()?,
        })
    }

    #[cfg(test)]
    pub(crate) fn integrity_check(&self) {
        self.tree.integrity_check();
    }
}

impl<K> Clone for OrderedSet<'_, K>
where
    K: Clone + Ord,
{
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
        }
    }
}

impl<K> fmt::Debug for OrderedSet<'_, K>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K> PartialEq for OrderedSet<'_, K>
where
    K: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.tree == other.tree
    }
}

impl<K> Eq for OrderedSet<'_, K> where K: Eq {}

impl<'t, K> IntoIterator for &'t OrderedSet<'_, K> {
    type Item = &'t K;
    type IntoIter = SetIter<'t, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::BTreeSet;

    use block_alloc::CountingAllocator;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn insert_reports_duplicates() {
        let mut set = OrderedSet::new();

        for value in [1, 2, 3] {
            let (cursor, inserted) = set.insert(value).unwrap();
            assert!(inserted);
            assert_eq!(cursor.key(), Some(&value));
        }

        let (cursor, inserted) = set.insert(1).unwrap();
        assert!(!inserted);
        assert_eq!(cursor.key(), Some(&1));

        assert_eq!(set.len(), 3);
    }

    #[test]
    fn remove_returns_key() {
        let mut set = OrderedSet::new();
        set.insert(String::from("x")).unwrap();

        assert_eq!(set.remove("y"), None);
        assert_eq!(set.remove("x"), Some(String::from("x")));
        assert!(set.is_empty());
    }

    #[test]
    fn first_and_last() {
        let mut set = OrderedSet::new();
        assert_eq!(set.first(), None);

        for value in [5, -2, 9, 0] {
            set.insert(value).unwrap();
        }

        assert_eq!(set.first(), Some(&-2));
        assert_eq!(set.last(), Some(&9));
    }

    #[test]
    fn randomized_against_btree_set() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut set = OrderedSet::new();
        let mut reference = BTreeSet::new();

        for _ in 0..4000 {
            let value = rng.random_range(0..300_u16);

            if rng.random_bool(0.5) {
                assert_eq!(set.insert(value).unwrap().1, reference.insert(value));
            } else {
                assert_eq!(set.erase(&value), usize::from(reference.remove(&value)));
            }
        }

        set.integrity_check();
        assert!(set.iter().eq(reference.iter()));
    }

    #[test]
    fn clone_shares_allocator() {
        let allocator = CountingAllocator::new();
        let mut set = OrderedSet::new_in(&allocator).unwrap();

        set.insert(1).unwrap();
        set.insert(2).unwrap();

        let clone = set.clone();
        assert_eq!(clone, set);
        assert_eq!(allocator.count(), 8);

        drop(clone);
        drop(set);
        assert_eq!(allocator.count(), 0);
    }

    #[test]
    fn swap_sets() {
        let mut first = OrderedSet::new();
        let mut second = OrderedSet::new();

        first.insert('a').unwrap();
        second.insert('b').unwrap();
        second.insert('c').unwrap();

        first.swap(&mut second);

        assert_eq!(first.len(), 2);
        assert_eq!(second.iter().copied().collect::<Vec<_>>(), ['a']);
    }

    #[test]
    fn debug_output_is_a_set() {
        let mut set = OrderedSet::new();
        set.insert(2).unwrap();
        set.insert(1).unwrap();

        assert_eq!(format!("{set:?}"), "{1, 2}");
    }
}
