use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::mem;

use block_alloc::{Allocator, HeapAllocator};

use crate::node::{Color, NodePtr, Sentinels};
use crate::{Cursor, CursorMut, Iter, Keys, Result, Values};

/// An ordered map implemented as a red-black tree whose nodes come from an injected
/// [`Allocator`].
///
/// All lookups, insertions and removals take O(log n) time. Entries are kept in strictly
/// increasing key order, which is the order of iteration.
///
/// # Allocators
///
/// Every node, including the two sentinel nodes the tree keeps for its whole life, is allocated
/// from the allocator given to [`new_in()`][1]. The tree only borrows the allocator, so the
/// allocator must outlive the tree - this is enforced by the `'a` lifetime. Trees created by
/// [`new()`][2] use the shared [`HeapAllocator`].
///
/// For workloads with many insertions and removals, a [`PoolAllocator`][3] shared by the trees
/// of one thread is usually the best choice. A pool serves a single block layout, so all trees
/// sharing one pool must have the same key and value types.
///
/// # Key order
///
/// Keys are compared via [`Ord`]. The ordering must be a strict total order that does not change
/// while the key is in the tree - an inconsistent ordering results in unspecified (but memory
/// safe) behavior, such as entries that can no longer be found.
///
/// # Examples
///
/// ```
/// use ordered_tree::OrderedMap;
///
/// let mut map = OrderedMap::new();
///
/// map.insert(3, "three")?;
/// map.insert(1, "one")?;
/// map.insert(2, "two")?;
///
/// assert_eq!(map.get(&2), Some(&"two"));
/// assert_eq!(map.keys().copied().collect::<Vec<_>>(), [1, 2, 3]);
///
/// assert_eq!(map.erase(&2), 1);
/// assert_eq!(map.len(), 2);
/// # Ok::<(), ordered_tree::Error>(())
/// ```
///
/// Using a pool allocator shared by two maps:
///
/// ```
/// use block_alloc::PoolAllocator;
/// use new_zealand::nz;
/// use ordered_tree::OrderedMap;
///
/// let pool = PoolAllocator::new(nz!(64));
///
/// let mut first = OrderedMap::new_in(&pool)?;
/// let mut second = OrderedMap::new_in(&pool)?;
///
/// first.insert(1_u32, 10_u64)?;
/// second.insert(2_u32, 20_u64)?;
///
/// // Two sentinels per map plus one node each.
/// assert_eq!(pool.outstanding(), 6);
/// # Ok::<(), ordered_tree::Error>(())
/// ```
///
/// [1]: Self::new_in
/// [2]: Self::new
/// [3]: block_alloc::PoolAllocator
pub struct RbTree<'a, K, V> {
    sentinels: Sentinels<K, V>,
    len: usize,
    allocator: &'a dyn Allocator,

    // The tree owns the entries stored in its nodes.
    _entries: PhantomData<(K, V)>,
}

/// The red-black tree under the name of the container it implements.
pub type OrderedMap<'a, K, V> = RbTree<'a, K, V>;

impl<K, V> RbTree<'static, K, V> {
    /// Creates an empty tree that allocates its nodes from the shared [`HeapAllocator`].
    ///
    /// # Panics
    ///
    /// Panics if the heap cannot provide memory for the sentinel nodes.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(HeapAllocator::instance()).expect(
            "we do not intend to handle heap allocation failure as a real possibility - OOM is panic",
        )
    }
}

impl<K, V> Default for RbTree<'static, K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, K, V> RbTree<'a, K, V> {
    /// Creates an empty tree that allocates its nodes from `allocator`.
    ///
    /// The two sentinel nodes are allocated immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel nodes cannot be allocated. Nothing remains allocated
    /// in that case.
    pub fn new_in(allocator: &'a dyn Allocator) -> Result<Self> {
        let sentinels = Sentinels::allocate(allocator).inspect_err(|error| {
            tracing::debug!(%error, "failed to allocate tree sentinels");
        })?;

        Ok(Self {
            sentinels,
            len: 0,
            allocator,
            _entries: PhantomData,
        })
    }

    /// The allocator this tree obtains its nodes from.
    #[must_use]
    pub fn allocator(&self) -> &'a dyn Allocator {
        self.allocator
    }

    /// The number of entries in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A cursor at the entry with the smallest key, or at the end if the tree is empty.
    #[must_use]
    pub fn begin(&self) -> Cursor<'_, K, V> {
        Cursor::new(self.sentinels, self.sentinels.first())
    }

    /// A cursor at the end position, just past the entry with the largest key.
    #[must_use]
    pub fn end(&self) -> Cursor<'_, K, V> {
        Cursor::new(self.sentinels, self.sentinels.nil)
    }

    /// An exclusive cursor at the entry with the smallest key, or at the end if the tree is
    /// empty.
    #[must_use]
    pub fn begin_mut(&mut self) -> CursorMut<'_, 'a, K, V> {
        let first = self.sentinels.first();
        CursorMut::new(self, first)
    }

    /// The entry with the smallest key.
    #[must_use]
    pub fn first(&self) -> Option<(&K, &V)> {
        self.begin().get()
    }

    /// The entry with the largest key.
    #[must_use]
    pub fn last(&self) -> Option<(&K, &V)> {
        Cursor::new(self.sentinels, self.sentinels.last()).get()
    }

    /// Iterates over the entries in increasing key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self.sentinels, self.len)
    }

    /// Iterates over the keys in increasing order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys::new(self.iter())
    }

    /// Iterates over the values in increasing key order.
    pub fn values(&self) -> Values<'_, K, V> {
        Values::new(self.iter())
    }

    /// Removes all entries, dropping them and returning their nodes to the allocator.
    ///
    /// The sentinel nodes are kept, so the tree remains usable.
    pub fn clear(&mut self) {
        let root = self.sentinels.tree_root();

        // Detach first, so a panicking destructor at worst leaks the remaining nodes.
        self.sentinels.root.set_left(self.sentinels.nil);
        self.len = 0;

        self.destroy_subtree(root);
    }

    /// Exchanges the contents of two trees, including the allocators they use.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    pub(crate) fn sentinels(&self) -> Sentinels<K, V> {
        self.sentinels
    }

    pub(crate) fn cursor_at(&self, node: NodePtr<K, V>) -> Cursor<'_, K, V> {
        Cursor::new(self.sentinels, node)
    }

    /// Post-order walk dropping every entry and freeing every node below `node`.
    #[allow(
        clippy::needless_pass_by_ref_mut,
        reason = "nodes are mutated through links, the exclusive borrow guards them"
    )]
    fn destroy_subtree(&mut self, node: NodePtr<K, V>) {
        if self.sentinels.is_nil(node) {
            return;
        }

        self.destroy_subtree(node.left());
        self.destroy_subtree(node.right());

        // SAFETY: The node is a data node that is no longer reachable from the tree (its
        // ancestors are being destroyed and the root was detached), so its entry is dropped
        // exactly once and its block is freed back to the allocator it came from.
        unsafe {
            node.drop_entry();
            node.free(self.allocator);
        }
    }

    #[allow(
        clippy::needless_pass_by_ref_mut,
        reason = "nodes are mutated through links, the exclusive borrow guards them"
    )]
    fn rotate_left(&mut self, x: NodePtr<K, V>) {
        let nil = self.sentinels.nil;
        let y = x.right();

        x.set_right(y.left());

        if y.left() != nil {
            y.left().set_parent(x);
        }

        // The super-root sentinel takes care of the case where `x` is the logical root.
        y.set_parent(x.parent());

        if x == x.parent().left() {
            x.parent().set_left(y);
        } else {
            x.parent().set_right(y);
        }

        y.set_left(x);
        x.set_parent(y);
    }

    #[allow(
        clippy::needless_pass_by_ref_mut,
        reason = "nodes are mutated through links, the exclusive borrow guards them"
    )]
    fn rotate_right(&mut self, y: NodePtr<K, V>) {
        let nil = self.sentinels.nil;
        let x = y.left();

        y.set_left(x.right());

        if x.right() != nil {
            x.right().set_parent(y);
        }

        x.set_parent(y.parent());

        if y == y.parent().left() {
            y.parent().set_left(x);
        } else {
            y.parent().set_right(x);
        }

        x.set_right(y);
        y.set_parent(x);
    }

    /// Restores the red-black properties after `x` was colored red and linked into the tree.
    fn insert_fixup(&mut self, mut x: NodePtr<K, V>) {
        // The super-root is black, so this stops at the logical root without a special case.
        while x.parent().is_red() {
            let parent = x.parent();
            let grandparent = parent.parent();

            if parent == grandparent.left() {
                let uncle = grandparent.right();

                if uncle.is_red() {
                    parent.set_color(Color::Black);
                    uncle.set_color(Color::Black);
                    grandparent.set_color(Color::Red);
                    x = grandparent;
                } else {
                    if x == parent.right() {
                        x = parent;
                        self.rotate_left(x);
                    }

                    x.parent().set_color(Color::Black);
                    x.parent().parent().set_color(Color::Red);
                    self.rotate_right(x.parent().parent());
                }
            } else {
                let uncle = grandparent.left();

                if uncle.is_red() {
                    parent.set_color(Color::Black);
                    uncle.set_color(Color::Black);
                    grandparent.set_color(Color::Red);
                    x = grandparent;
                } else {
                    if x == parent.left() {
                        x = parent;
                        self.rotate_right(x);
                    }

                    x.parent().set_color(Color::Black);
                    x.parent().parent().set_color(Color::Red);
                    self.rotate_left(x.parent().parent());
                }
            }
        }

        self.sentinels.tree_root().set_color(Color::Black);
    }

    /// Restores the red-black properties after a black node was spliced out and `x` took its
    /// place. `x` may be `nil`, in which case its parent link was set by the caller.
    fn delete_fixup(&mut self, mut x: NodePtr<K, V>) {
        while x != self.sentinels.tree_root() && !x.is_red() {
            if x == x.parent().left() {
                let mut sibling = x.parent().right();

                if sibling.is_red() {
                    sibling.set_color(Color::Black);
                    x.parent().set_color(Color::Red);
                    self.rotate_left(x.parent());
                    sibling = x.parent().right();
                }

                if !sibling.left().is_red() && !sibling.right().is_red() {
                    sibling.set_color(Color::Red);
                    x = x.parent();
                } else {
                    if !sibling.right().is_red() {
                        sibling.left().set_color(Color::Black);
                        sibling.set_color(Color::Red);
                        self.rotate_right(sibling);
                        sibling = x.parent().right();
                    }

                    sibling.set_color(x.parent().color());
                    x.parent().set_color(Color::Black);
                    sibling.right().set_color(Color::Black);
                    self.rotate_left(x.parent());
                    x = self.sentinels.tree_root();
                }
            } else {
                let mut sibling = x.parent().left();

                if sibling.is_red() {
                    sibling.set_color(Color::Black);
                    x.parent().set_color(Color::Red);
                    self.rotate_right(x.parent());
                    sibling = x.parent().left();
                }

                if !sibling.right().is_red() && !sibling.left().is_red() {
                    sibling.set_color(Color::Red);
                    x = x.parent();
                } else {
                    if !sibling.left().is_red() {
                        sibling.right().set_color(Color::Black);
                        sibling.set_color(Color::Red);
                        self.rotate_left(sibling);
                        sibling = x.parent().left();
                    }

                    sibling.set_color(x.parent().color());
                    x.parent().set_color(Color::Black);
                    sibling.left().set_color(Color::Black);
                    self.rotate_right(x.parent());
                    x = self.sentinels.tree_root();
                }
            }
        }

        x.set_color(Color::Black);
    }

    /// Removes the data node `z` from the tree, returning its entry and freeing its node.
    ///
    /// Nodes are relinked rather than having their entries moved, so every other node (and any
    /// position referring to it) stays where it is.
    pub(crate) fn unlink(&mut self, z: NodePtr<K, V>) -> (K, V) {
        let Sentinels { nil, root } = self.sentinels;

        debug_assert!(z != nil && z != root, "only data nodes can be unlinked");

        // `y` is the node physically spliced out: `z` itself if it has at most one child,
        // otherwise its successor, which has no left child.
        let y = if z.left() == nil || z.right() == nil {
            z
        } else {
            self.sentinels.minimum(z.right())
        };

        let x = if y.left() == nil { y.right() } else { y.left() };

        // Unconditional, even if `x` is `nil` - the fixup climbs from `x` via this link.
        let y_parent = y.parent();
        x.set_parent(y_parent);

        if y_parent == root {
            root.set_left(x);
        } else if y == y_parent.left() {
            y_parent.set_left(x);
        } else {
            y_parent.set_right(x);
        }

        let spliced_black = !y.is_red();

        if y == z {
            if spliced_black {
                self.delete_fixup(x);
            }
        } else {
            if spliced_black {
                self.delete_fixup(x);
            }

            // `y` takes over the position and color of `z`.
            y.set_left(z.left());
            y.set_right(z.right());
            y.set_parent(z.parent());
            y.set_color(z.color());

            z.left().set_parent(y);
            z.right().set_parent(y);

            if z == z.parent().left() {
                z.parent().set_left(y);
            } else {
                z.parent().set_right(y);
            }
        }

        self.len = self
            .len
            .checked_sub(1)
            .expect("a data node was present so the tree cannot have been empty");

        // SAFETY: `z` is a data node that is now detached from the tree. Its entry is moved out
        // exactly once and its block goes back to the allocator it came from.
        unsafe {
            let entry = z.take_entry();
            z.free(self.allocator);
            entry
        }
    }
}

impl<'a, K, V> RbTree<'a, K, V>
where
    K: Ord,
{
    /// Finds the node holding `key`, or `nil` if there is none.
    fn search<Q>(&self, key: &Q) -> NodePtr<K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let nil = self.sentinels.nil;
        let mut node = self.sentinels.tree_root();

        while node != nil {
            // SAFETY: Every node below the super-root other than `nil` is a live data node.
            let node_key: &Q = unsafe { node.key() }.borrow();

            node = match key.cmp(node_key) {
                Ordering::Less => node.left(),
                Ordering::Greater => node.right(),
                Ordering::Equal => return node,
            };
        }

        nil
    }

    /// Links a freshly allocated red node into the tree and rebalances.
    ///
    /// Equal keys are placed to the right, so the caller decides whether duplicates are allowed.
    fn attach(&mut self, z: NodePtr<K, V>) {
        let Sentinels { nil, root } = self.sentinels;

        // SAFETY: `z` is a data node allocated by the caller and owned by this tree.
        let z_key = unsafe { z.key() };

        let mut parent = root;
        let mut node = root.left();
        let mut goes_left = true;

        while node != nil {
            parent = node;

            // SAFETY: Every node below the super-root other than `nil` is a live data node.
            goes_left = z_key < unsafe { node.key() };

            node = if goes_left { node.left() } else { node.right() };
        }

        z.set_parent(parent);
        z.set_left(nil);
        z.set_right(nil);
        z.set_color(Color::Red);

        // An empty tree hangs its first node off the super-root's left link.
        if goes_left {
            parent.set_left(z);
        } else {
            parent.set_right(z);
        }

        self.insert_fixup(z);

        self.len = self
            .len
            .checked_add(1)
            .expect("cannot hold more nodes than fit in virtual memory");
    }

    /// Allocates a node for the entry and links it into the tree without checking for an
    /// existing entry with the same key.
    fn link_new(&mut self, key: K, value: V) -> Result<NodePtr<K, V>> {
        let node = NodePtr::allocate_entry(self.allocator, self.sentinels.nil, key, value)
            .inspect_err(|error| {
                tracing::debug!(%error, len = self.len, "failed to allocate tree node");
            })?;

        self.attach(node);

        Ok(node)
    }

    /// A cursor at the entry with the given key, or at the end if there is no such entry.
    ///
    /// # Examples
    ///
    /// ```
    /// use ordered_tree::OrderedMap;
    ///
    /// let mut map = OrderedMap::new();
    /// map.insert("a", 1)?;
    ///
    /// assert_eq!(map.find("a").get(), Some((&"a", &1)));
    /// assert_eq!(map.find("b"), map.end());
    /// # Ok::<(), ordered_tree::Error>(())
    /// ```
    #[must_use]
    pub fn find<Q>(&self, key: &Q) -> Cursor<'_, K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.cursor_at(self.search(key))
    }

    /// An exclusive cursor at the entry with the given key, or at the end if there is no such
    /// entry. The cursor can modify the value or erase the entry.
    #[must_use]
    pub fn find_mut<Q>(&mut self, key: &Q) -> CursorMut<'_, 'a, K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.search(key);
        CursorMut::new(self, node)
    }

    /// The value stored for `key`.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find(key).value()
    }

    /// Exclusive access to the value stored for `key`.
    #[must_use]
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.search(key);

        if self.sentinels.is_nil(node) {
            return None;
        }

        // SAFETY: A data node found by search. We hold the tree exclusively for the lifetime
        // of the returned reference.
        Some(unsafe { node.entry_mut() }.1)
    }

    /// Whether the tree has an entry with the given key.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        !self.sentinels.is_nil(self.search(key))
    }

    /// Inserts an entry unless an entry with the same key already exists.
    ///
    /// Returns a cursor at the entry with the key - the new one, or the existing one that
    /// prevented the insertion - and whether the insertion took place. If an entry already
    /// existed, it is left untouched and `value` is dropped.
    ///
    /// If you have already established that the key is absent (e.g. via [`find()`][1]),
    /// [`trusted_insert()`][2] avoids searching the tree a second time.
    ///
    /// # Errors
    ///
    /// Returns an error if a node cannot be allocated. The tree is left unmodified.
    ///
    /// # Examples
    ///
    /// ```
    /// use ordered_tree::OrderedMap;
    ///
    /// let mut map = OrderedMap::new();
    ///
    /// let (cursor, inserted) = map.insert(1, "one")?;
    /// assert!(inserted);
    /// assert_eq!(cursor.value(), Some(&"one"));
    ///
    /// let (cursor, inserted) = map.insert(1, "uno")?;
    /// assert!(!inserted);
    /// assert_eq!(cursor.value(), Some(&"one"));
    /// # Ok::<(), ordered_tree::Error>(())
    /// ```
    ///
    /// [1]: Self::find
    /// [2]: Self::trusted_insert
    pub fn insert(&mut self, key: K, value: V) -> Result<(Cursor<'_, K, V>, bool)> {
        let existing = self.search(&key);

        if !self.sentinels.is_nil(existing) {
            return Ok((self.cursor_at(existing), false));
        }

        let node = self.link_new(key, value)?;
        Ok((self.cursor_at(node), true))
    }

    /// Inserts an entry without checking whether the key is already present.
    ///
    /// The caller must have established that no entry with this key exists. Violating this
    /// does not cause undefined behavior but leaves the tree holding two entries with equal keys,
    /// after which lookups for that key may return either of them.
    ///
    /// # Errors
    ///
    /// Returns an error if a node cannot be allocated. The tree is left unmodified.
    ///
    /// # Examples
    ///
    /// ```
    /// use ordered_tree::OrderedMap;
    ///
    /// let mut map = OrderedMap::new();
    ///
    /// if map.find(&7).is_end() {
    ///     map.trusted_insert(7, "seven")?;
    /// }
    ///
    /// assert_eq!(map.get(&7), Some(&"seven"));
    /// # Ok::<(), ordered_tree::Error>(())
    /// ```
    pub fn trusted_insert(&mut self, key: K, value: V) -> Result<Cursor<'_, K, V>> {
        let node = self.link_new(key, value)?;
        Ok(self.cursor_at(node))
    }

    /// Exclusive access to the value for `key`, inserting the value returned by `default`
    /// first if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if a node cannot be allocated. The tree is left unmodified.
    pub fn get_or_insert_with<F>(&mut self, key: K, default: F) -> Result<&mut V>
    where
        F: FnOnce() -> V,
    {
        let mut node = self.search(&key);

        if self.sentinels.is_nil(node) {
            node = self.link_new(key, default())?;
        }

        // SAFETY: A data node of this tree. We hold the tree exclusively for the lifetime of
        // the returned reference.
        Ok(unsafe { node.entry_mut() }.1)
    }

    /// Exclusive access to the value for `key`, inserting `V::default()` first if the key
    /// is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if a node cannot be allocated. The tree is left unmodified.
    ///
    /// # Examples
    ///
    /// ```
    /// use ordered_tree::OrderedMap;
    ///
    /// let mut counts = OrderedMap::new();
    ///
    /// for word in ["b", "a", "b"] {
    ///     *counts.get_or_insert_default(word)? += 1;
    /// }
    ///
    /// assert_eq!(counts.iter().collect::<Vec<_>>(), [(&"a", &1), (&"b", &2)]);
    /// # Ok::<(), ordered_tree::Error>(())
    /// ```
    pub fn get_or_insert_default(&mut self, key: K) -> Result<&mut V>
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    /// Removes the entry with the given key, returning it.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.search(key);

        if self.sentinels.is_nil(node) {
            return None;
        }

        Some(self.unlink(node))
    }

    /// Removes every entry with the given key, returning the number of entries removed.
    ///
    /// As keys are unique unless [`trusted_insert()`][1] was misused, this is either 0 or 1.
    ///
    /// [1]: Self::trusted_insert
    pub fn erase<Q>(&mut self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut removed: usize = 0;

        loop {
            let node = self.search(key);

            if self.sentinels.is_nil(node) {
                return removed;
            }

            drop(self.unlink(node));
            removed = removed.wrapping_add(1);
        }
    }

    /// Creates a deep copy of the tree that allocates its nodes from the same allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if a node cannot be allocated. Nodes allocated for the partial copy are
    /// returned to the allocator.
    pub fn try_clone(&self) -> Result<Self>
    where
        K: Clone,
        V: Clone,
    {
        let mut clone = Self::new_in(self.allocator)?;

        for (key, value) in self {
            clone.link_new(key.clone(), value.clone())?;
        }

        Ok(clone)
    }

    /// Verifies parent links, key order and the red-black properties of the whole tree.
    #[cfg(test)]
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    pub(crate) fn integrity_check(&self) {
        let Sentinels { nil, root } = self.sentinels;

        assert!(!nil.is_red(), "the nil sentinel must be black");
        assert!(!root.is_red(), "the super-root sentinel must be black");

        let tree_root = root.left();
        assert!(!tree_root.is_red(), "the logical root must be black");

        if tree_root != nil {
            assert!(
                tree_root.parent() == root,
                "the logical root must hang off the super-root"
            );
        }

        let (count, _) = self.check_subtree(tree_root, None, None);

        assert_eq!(count, self.len, "len does not match the number of nodes");
    }

    /// Returns the number of nodes and the black-height of the subtree.
    #[cfg(test)]
    #[allow(
        clippy::arithmetic_side_effects,
        reason = "counts are bounded by the number of allocated nodes"
    )]
    fn check_subtree(
        &self,
        node: NodePtr<K, V>,
        lower: Option<&K>,
        upper: Option<&K>,
    ) -> (usize, usize) {
        let nil = self.sentinels.nil;

        if node == nil {
            return (0, 1);
        }

        // SAFETY: A data node reachable from the root.
        let key = unsafe { node.key() };

        if let Some(lower) = lower {
            assert!(lower < key, "keys must be strictly increasing in order");
        }

        if let Some(upper) = upper {
            assert!(key < upper, "keys must be strictly increasing in order");
        }

        if node.is_red() {
            assert!(
                !node.left().is_red() && !node.right().is_red(),
                "a red node must not have a red child"
            );
        }

        for child in [node.left(), node.right()] {
            if child != nil {
                assert!(child.parent() == node, "child must link back to its parent");
            }
        }

        let (left_count, left_height) = self.check_subtree(node.left(), lower, Some(key));
        let (right_count, right_height) = self.check_subtree(node.right(), Some(key), upper);

        assert_eq!(
            left_height, right_height,
            "every path must cross the same number of black nodes"
        );

        let own_height = usize::from(!node.is_red());

        (left_count + right_count + 1, left_height + own_height)
    }
}

impl<K, V> Clone for RbTree<'_, K, V>
where
    K: Clone + Ord,
    V: Clone,
{
    /// Creates a deep copy of the tree sharing the same allocator.
    ///
    /// # Panics
    ///
    /// Panics if the allocator cannot provide the nodes. Use [`RbTree::try_clone()`] to handle
    /// allocation failure.
    fn clone(&self) -> Self {
        self.try_clone()
            .expect("allocation failure during clone is treated like OOM - use try_clone() to handle it")
    }
}

impl<K, V> Drop for RbTree<'_, K, V> {
    fn drop(&mut self) {
        self.clear();

        // SAFETY: The tree is empty after `clear()`, the sentinels came from our allocator and
        // nothing can follow a link to them after the tree is gone.
        unsafe {
            self.sentinels.free(self.allocator);
        }
    }
}

impl<K, V> fmt::Debug for RbTree<'_, K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> PartialEq for RbTree<'_, K, V>
where
    K: PartialEq,
    V: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<K, V> Eq for RbTree<'_, K, V>
where
    K: Eq,
    V: Eq,
{
}

impl<'t, K, V> IntoIterator for &'t RbTree<'_, K, V> {
    type Item = (&'t K, &'t V);
    type IntoIter = Iter<'t, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
