use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;

use crate::node::{NodePtr, Sentinels};

/// An iterator over the entries of a tree in increasing key order.
///
/// Created by [`RbTree::iter()`][crate::RbTree::iter]. Can also be consumed from the back,
/// yielding entries in decreasing key order.
pub struct Iter<'t, K, V> {
    sentinels: Sentinels<K, V>,
    front: NodePtr<K, V>,
    back: NodePtr<K, V>,

    // The two ends meet once this reaches zero, so we never compare `front` and `back`.
    remaining: usize,

    _tree: PhantomData<&'t (K, V)>,
}

impl<K, V> Iter<'_, K, V> {
    pub(crate) fn new(sentinels: Sentinels<K, V>, len: usize) -> Self {
        Self {
            sentinels,
            front: sentinels.first(),
            back: sentinels.last(),
            remaining: len,
            _tree: PhantomData,
        }
    }
}

impl<'t, K, V> Iterator for Iter<'t, K, V> {
    type Item = (&'t K, &'t V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let node = self.front;
        self.front = self.sentinels.successor(node);
        self.remaining = self.remaining.saturating_sub(1);

        // SAFETY: `remaining` guarantees `node` is a data node not yet yielded from either end,
        // and the tree is borrowed for 't.
        Some(unsafe { node.entry() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let node = self.back;
        self.back = self.sentinels.predecessor(node);
        self.remaining = self.remaining.saturating_sub(1);

        // SAFETY: `remaining` guarantees `node` is a data node not yet yielded from either end,
        // and the tree is borrowed for 't.
        Some(unsafe { node.entry() })
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            sentinels: self.sentinels,
            front: self.front,
            back: self.back,
            remaining: self.remaining,
            _tree: PhantomData,
        }
    }
}

impl<K, V> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

/// An iterator over the keys of a tree in increasing order.
///
/// Created by [`RbTree::keys()`][crate::RbTree::keys].
#[derive(Debug)]
pub struct Keys<'t, K, V> {
    inner: Iter<'t, K, V>,
}

impl<'t, K, V> Keys<'t, K, V> {
    pub(crate) fn new(inner: Iter<'t, K, V>) -> Self {
        Self { inner }
    }
}

impl<K, V> Clone for Keys<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<'t, K, V> Iterator for Keys<'t, K, V> {
    type Item = &'t K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Keys<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(key, _)| key)
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// An iterator over the values of a tree in increasing key order.
///
/// Created by [`RbTree::values()`][crate::RbTree::values].
#[derive(Debug)]
pub struct Values<'t, K, V> {
    inner: Iter<'t, K, V>,
}

impl<'t, K, V> Values<'t, K, V> {
    pub(crate) fn new(inner: Iter<'t, K, V>) -> Self {
        Self { inner }
    }
}

impl<K, V> Clone for Values<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<'t, K, V> Iterator for Values<'t, K, V> {
    type Item = &'t V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Values<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(_, value)| value)
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

impl<K, V> FusedIterator for Values<'_, K, V> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use crate::RbTree;

    fn tree_of(keys: &[i32]) -> RbTree<'static, i32, char> {
        let mut tree = RbTree::new();

        for &key in keys {
            let value = char::from_digit(key.unsigned_abs() % 10, 10).unwrap();
            tree.insert(key, value).unwrap();
        }

        tree
    }

    #[test]
    fn yields_in_key_order() {
        let tree = tree_of(&[5, 1, 4, 2, 3]);

        let entries = tree.iter().collect::<Vec<_>>();

        assert_eq!(
            entries,
            [(&1, &'1'), (&2, &'2'), (&3, &'3'), (&4, &'4'), (&5, &'5')]
        );
    }

    #[test]
    fn reports_exact_length() {
        let tree = tree_of(&[3, 1, 2]);

        let mut iter = tree.iter();
        assert_eq!(iter.len(), 3);

        iter.next();
        iter.next_back();
        assert_eq!(iter.len(), 1);
        assert_eq!(iter.next(), Some((&2, &'2')));
        assert_eq!(iter.len(), 0);
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next_back(), None);
    }

    #[test]
    fn ends_meet_in_the_middle() {
        let tree = tree_of(&[1, 2, 3, 4]);

        let mut iter = tree.keys();

        assert_eq!(iter.next(), Some(&1));
        assert_eq!(iter.next_back(), Some(&4));
        assert_eq!(iter.next_back(), Some(&3));
        assert_eq!(iter.next(), Some(&2));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next_back(), None);
    }

    #[test]
    fn empty_tree_yields_nothing() {
        let tree = tree_of(&[]);

        assert_eq!(tree.iter().len(), 0);
        assert_eq!(tree.keys().next(), None);
        assert_eq!(tree.values().next_back(), None);
    }

    #[test]
    fn keys_and_values_follow_key_order() {
        let tree = tree_of(&[19, 7, 13]);

        assert_eq!(tree.keys().copied().collect::<Vec<_>>(), [7, 13, 19]);
        assert_eq!(tree.values().copied().collect::<Vec<_>>(), ['7', '3', '9']);
        assert_eq!(tree.values().rev().copied().collect::<Vec<_>>(), ['9', '3', '7']);
    }

    #[test]
    fn into_iterator_for_reference() {
        let tree = tree_of(&[2, 1]);

        let mut keys = Vec::new();
        for (key, _) in &tree {
            keys.push(*key);
        }

        assert_eq!(keys, [1, 2]);
    }

    #[test]
    fn clone_resumes_from_same_position() {
        let tree = tree_of(&[1, 2, 3]);

        let mut iter = tree.iter();
        iter.next();

        let cloned = iter.clone();

        assert!(iter.eq(cloned));
    }
}
