use std::fmt;
use std::marker::PhantomData;

use crate::node::{NodePtr, Sentinels};
use crate::{Error, RbTree, Result};

/// A position in a tree: either at an entry or at the end, just past the last entry.
///
/// Cursors are cheap to copy and borrow the tree, so the tree cannot be modified while any
/// cursor into it exists. Two cursors are equal if they refer to the same position in the same
/// tree.
///
/// Moving past either end of the tree lands on the end position. Moving backwards from the end
/// position goes to the last entry, so the positions of a tree form a ring.
///
/// # Examples
///
/// ```
/// use ordered_tree::OrderedMap;
///
/// let mut map = OrderedMap::new();
/// map.insert(1, 'a')?;
/// map.insert(2, 'b')?;
///
/// let mut cursor = map.begin();
/// assert_eq!(cursor.get(), Some((&1, &'a')));
///
/// cursor.move_next();
/// assert_eq!(cursor.key(), Some(&2));
///
/// cursor.move_next();
/// assert!(cursor.is_end());
/// assert_eq!(cursor, map.end());
///
/// cursor.move_prev();
/// assert_eq!(cursor.value(), Some(&'b'));
/// # Ok::<(), ordered_tree::Error>(())
/// ```
pub struct Cursor<'t, K, V> {
    sentinels: Sentinels<K, V>,
    node: NodePtr<K, V>,

    _tree: PhantomData<&'t (K, V)>,
}

impl<'t, K, V> Cursor<'t, K, V> {
    pub(crate) fn new(sentinels: Sentinels<K, V>, node: NodePtr<K, V>) -> Self {
        Self {
            sentinels,
            node,
            _tree: PhantomData,
        }
    }

    /// Whether the cursor is at the end position.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.sentinels.is_nil(self.node)
    }

    /// The entry at the cursor, or `None` at the end position.
    #[must_use]
    pub fn get(&self) -> Option<(&'t K, &'t V)> {
        if self.is_end() {
            return None;
        }

        // SAFETY: A data node of a tree that is borrowed for 't, which prevents any modification
        // that could remove the node.
        Some(unsafe { self.node.entry() })
    }

    /// The key at the cursor, or `None` at the end position.
    #[must_use]
    pub fn key(&self) -> Option<&'t K> {
        self.get().map(|(key, _)| key)
    }

    /// The value at the cursor, or `None` at the end position.
    #[must_use]
    pub fn value(&self) -> Option<&'t V> {
        self.get().map(|(_, value)| value)
    }

    /// Moves to the entry with the next larger key, or to the end position if there is none.
    ///
    /// Does nothing at the end position.
    pub fn move_next(&mut self) {
        if !self.is_end() {
            self.node = self.sentinels.successor(self.node);
        }
    }

    /// Moves to the entry with the next smaller key, or to the end position if there is none.
    ///
    /// At the end position, moves to the last entry (staying at the end if the tree is empty).
    pub fn move_prev(&mut self) {
        self.node = if self.is_end() {
            self.sentinels.last()
        } else {
            self.sentinels.predecessor(self.node)
        };
    }
}

impl<K, V> Clone for Cursor<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for Cursor<'_, K, V> {}

impl<K, V> PartialEq for Cursor<'_, K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.sentinels == other.sentinels && self.node == other.node
    }
}

impl<K, V> Eq for Cursor<'_, K, V> {}

impl<K, V> fmt::Debug for Cursor<'_, K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("entry", &self.get())
            .finish_non_exhaustive()
    }
}

/// A position in a tree with exclusive access to the tree, allowing the entry at the position
/// to be modified or erased.
///
/// Obtained from [`RbTree::find_mut()`] or [`RbTree::begin_mut()`].
///
/// # Examples
///
/// Erasing every entry with an odd value in one pass:
///
/// ```
/// use ordered_tree::OrderedMap;
///
/// let mut map = OrderedMap::new();
/// for key in 0..6 {
///     map.insert(key, key * 10 + key % 2)?;
/// }
///
/// let mut cursor = map.begin_mut();
/// while let Some((_, value)) = cursor.get() {
///     if value % 2 == 1 {
///         cursor.erase()?;
///     } else {
///         cursor.move_next();
///     }
/// }
///
/// assert_eq!(map.keys().copied().collect::<Vec<_>>(), [0, 2, 4]);
/// # Ok::<(), ordered_tree::Error>(())
/// ```
pub struct CursorMut<'t, 'a, K, V> {
    tree: &'t mut RbTree<'a, K, V>,
    node: NodePtr<K, V>,
}

impl<'t, 'a, K, V> CursorMut<'t, 'a, K, V> {
    pub(crate) fn new(tree: &'t mut RbTree<'a, K, V>, node: NodePtr<K, V>) -> Self {
        Self { tree, node }
    }

    fn sentinels(&self) -> Sentinels<K, V> {
        self.tree.sentinels()
    }

    /// Whether the cursor is at the end position.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.sentinels().is_nil(self.node)
    }

    /// The entry at the cursor, or `None` at the end position.
    #[must_use]
    pub fn get(&self) -> Option<(&K, &V)> {
        if self.is_end() {
            return None;
        }

        // SAFETY: A data node of the tree we hold exclusively. The returned references borrow
        // the cursor, so the node cannot be erased while they exist.
        Some(unsafe { self.node.entry() })
    }

    /// The entry at the cursor with exclusive access to the value, or `None` at the end
    /// position.
    #[must_use]
    pub fn get_mut(&mut self) -> Option<(&K, &mut V)> {
        if self.is_end() {
            return None;
        }

        // SAFETY: A data node of the tree we hold exclusively. The returned references borrow
        // the cursor exclusively, so no other reference to the value can be created meanwhile.
        Some(unsafe { self.node.entry_mut() })
    }

    /// Moves to the entry with the next larger key, or to the end position if there is none.
    ///
    /// Does nothing at the end position.
    pub fn move_next(&mut self) {
        if !self.is_end() {
            self.node = self.sentinels().successor(self.node);
        }
    }

    /// Moves to the entry with the next smaller key, or to the end position if there is none.
    ///
    /// At the end position, moves to the last entry (staying at the end if the tree is empty).
    pub fn move_prev(&mut self) {
        let sentinels = self.sentinels();

        self.node = if self.is_end() {
            sentinels.last()
        } else {
            sentinels.predecessor(self.node)
        };
    }

    /// Removes the entry at the cursor and returns it, moving the cursor to the entry that
    /// followed it (or to the end position).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] if the cursor is at the end position. The tree is
    /// left unmodified.
    pub fn erase(&mut self) -> Result<(K, V)> {
        if self.is_end() {
            return Err(Error::InvalidOperation { operation: "erase" });
        }

        // Removal relinks nodes without moving entries, so the successor stays valid.
        let next = self.sentinels().successor(self.node);
        let entry = self.tree.unlink(self.node);
        self.node = next;

        Ok(entry)
    }

    /// A shared cursor at the same position.
    #[must_use]
    pub fn as_cursor(&self) -> Cursor<'_, K, V> {
        self.tree.cursor_at(self.node)
    }
}

impl<K, V> fmt::Debug for CursorMut<'_, '_, K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorMut")
            .field("entry", &self.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(Cursor<'static, u32, u32>: Copy, Eq);
    assert_not_impl_any!(Cursor<'static, u32, u32>: Send, Sync);
    assert_not_impl_any!(CursorMut<'static, 'static, u32, u32>: Send, Sync, Clone);

    fn tree_of(keys: &[i32]) -> RbTree<'static, i32, i32> {
        let mut tree = RbTree::new();

        for &key in keys {
            tree.insert(key, key).unwrap();
        }

        tree
    }

    #[test]
    fn walks_forward_and_back() {
        let tree = tree_of(&[20, 10, 30]);

        let mut cursor = tree.begin();
        let mut forward = Vec::new();
        while let Some(key) = cursor.key() {
            forward.push(*key);
            cursor.move_next();
        }
        assert_eq!(forward, [10, 20, 30]);

        let mut backward = Vec::new();
        cursor.move_prev();
        while let Some(key) = cursor.key() {
            backward.push(*key);
            cursor.move_prev();
        }
        assert_eq!(backward, [30, 20, 10]);
        assert!(cursor.is_end());
    }

    #[test]
    fn move_next_at_end_is_noop() {
        let tree = tree_of(&[1]);

        let mut cursor = tree.end();
        cursor.move_next();

        assert!(cursor.is_end());
    }

    #[test]
    fn move_prev_on_empty_tree_stays_at_end() {
        let tree = tree_of(&[]);

        let mut cursor = tree.end();
        cursor.move_prev();

        assert!(cursor.is_end());
        assert_eq!(cursor.get(), None);
    }

    #[test]
    fn equality_is_per_tree() {
        let first = tree_of(&[1]);
        let second = tree_of(&[1]);

        assert_eq!(first.begin(), first.find(&1));
        assert_ne!(first.begin(), first.end());
        assert_ne!(first.end(), second.end());
        assert_ne!(first.begin(), second.begin());
    }

    #[test]
    fn cursor_mut_modifies_value() {
        let mut tree = tree_of(&[1, 2]);

        {
            let mut cursor = tree.find_mut(&2);
            let (key, value) = cursor.get_mut().unwrap();
            assert_eq!(*key, 2);
            *value = 200;
        }

        assert_eq!(tree.get(&2), Some(&200));
    }

    #[test]
    fn erase_advances_to_successor() {
        let mut tree = tree_of(&[1, 2, 3, 4]);

        {
            let mut cursor = tree.find_mut(&2);
            assert_eq!(cursor.erase().unwrap(), (2, 2));
            assert_eq!(cursor.get(), Some((&3, &3)));

            cursor.move_next();
            assert_eq!(cursor.erase().unwrap(), (4, 4));
            assert!(cursor.is_end());
        }

        tree.integrity_check();
        assert_eq!(tree.keys().copied().collect::<Vec<_>>(), [1, 3]);
    }

    #[test]
    fn erase_at_end_is_invalid() {
        let mut tree = tree_of(&[1]);

        {
            let mut cursor = tree.find_mut(&5);
            assert!(cursor.is_end());
            assert_eq!(
                cursor.erase(),
                Err(Error::InvalidOperation { operation: "erase" })
            );
        }

        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn erase_everything_through_cursor() {
        let mut tree = tree_of(&(0..50).collect::<Vec<_>>());

        {
            let mut cursor = tree.begin_mut();
            let mut expected = 0;
            while !cursor.is_end() {
                assert_eq!(cursor.erase().unwrap().0, expected);
                expected += 1;
            }
        }

        tree.integrity_check();
        assert!(tree.is_empty());
    }

    #[test]
    fn cursor_mut_moves_backwards_from_end() {
        let mut tree = tree_of(&[1, 2]);

        let mut cursor = tree.find_mut(&9);
        cursor.move_prev();
        assert_eq!(cursor.as_cursor().key(), Some(&2));

        cursor.move_prev();
        cursor.move_prev();
        assert!(cursor.is_end());
    }
}
