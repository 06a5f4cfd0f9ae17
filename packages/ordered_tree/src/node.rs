use std::alloc::Layout;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use block_alloc::{AllocError, Allocator};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Color {
    Red,
    Black,
}

/// A node of the tree, living in a block obtained from the tree's allocator.
///
/// Sentinel nodes never hold an entry - their `entry` stays uninitialized for their whole life.
pub(crate) struct Node<K, V> {
    parent: NodePtr<K, V>,
    left: NodePtr<K, V>,
    right: NodePtr<K, V>,
    color: Color,
    entry: MaybeUninit<(K, V)>,
}

/// A link to a node owned by a tree.
///
/// The tree only ever creates links to nodes it has allocated, and every link handed out
/// (including the ones inside cursors and iterators) is bound to a borrow of the tree. A link is
/// therefore always valid to follow for as long as anyone can hold it, which is what allows the
/// navigation methods below to be safe.
pub(crate) struct NodePtr<K, V>(NonNull<Node<K, V>>);

impl<K, V> Clone for NodePtr<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for NodePtr<K, V> {}

impl<K, V> PartialEq for NodePtr<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<K, V> Eq for NodePtr<K, V> {}

impl<K, V> fmt::Debug for NodePtr<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodePtr").field(&self.0).finish()
    }
}

impl<K, V> NodePtr<K, V> {
    fn layout() -> Layout {
        Layout::new::<Node<K, V>>()
    }

    /// Allocates a node with every link pointing at `link` and no entry.
    ///
    /// Passing `None` makes the node link to itself, which is how the `nil` sentinel is made.
    pub(crate) fn allocate_sentinel(
        allocator: &dyn Allocator,
        link: Option<Self>,
    ) -> Result<Self, AllocError> {
        let ptr = allocator.allocate(Self::layout())?.cast::<Node<K, V>>();
        let link = link.unwrap_or(Self(ptr));

        // SAFETY: The block was just allocated for a `Node<K, V>` and nobody else refers to it.
        unsafe {
            ptr.write(Node {
                parent: link,
                left: link,
                right: link,
                color: Color::Black,
                entry: MaybeUninit::uninit(),
            });
        }

        Ok(Self(ptr))
    }

    /// Allocates a red node holding the entry, with all links pointing at `nil`.
    ///
    /// On failure the entry is dropped and nothing is allocated.
    pub(crate) fn allocate_entry(
        allocator: &dyn Allocator,
        nil: Self,
        key: K,
        value: V,
    ) -> Result<Self, AllocError> {
        let ptr = allocator.allocate(Self::layout())?.cast::<Node<K, V>>();

        // SAFETY: The block was just allocated for a `Node<K, V>` and nobody else refers to it.
        unsafe {
            ptr.write(Node {
                parent: nil,
                left: nil,
                right: nil,
                color: Color::Red,
                entry: MaybeUninit::new((key, value)),
            });
        }

        Ok(Self(ptr))
    }

    /// Returns the node's block to the allocator without touching the entry.
    ///
    /// # Safety
    ///
    /// The node must have been allocated from `allocator`, its entry (if any) must already have
    /// been moved out or dropped, and no link to it may be followed afterwards.
    pub(crate) unsafe fn free(self, allocator: &dyn Allocator) {
        // SAFETY: Forwarding the caller's guarantee that the block came from this allocator
        // with the node layout and is dead.
        unsafe {
            allocator.free(self.0.cast(), Self::layout());
        }
    }

    /// Moves the entry out of the node, leaving it uninitialized.
    ///
    /// # Safety
    ///
    /// The node must be a data node whose entry has not been taken or dropped yet.
    pub(crate) unsafe fn take_entry(self) -> (K, V) {
        // SAFETY: The caller guarantees the entry is initialized and is taken only once.
        unsafe { (*self.0.as_ptr()).entry.assume_init_read() }
    }

    /// Drops the entry in place, leaving it uninitialized.
    ///
    /// # Safety
    ///
    /// The node must be a data node whose entry has not been taken or dropped yet.
    pub(crate) unsafe fn drop_entry(self) {
        // SAFETY: The caller guarantees the entry is initialized and is dropped only once.
        unsafe { (*self.0.as_ptr()).entry.assume_init_drop() }
    }

    /// # Safety
    ///
    /// The node must be a data node (not a sentinel) and must stay alive for `'n`.
    pub(crate) unsafe fn key<'n>(self) -> &'n K
    where
        K: 'n,
        V: 'n,
    {
        // SAFETY: The caller guarantees the entry is initialized and outlives `'n`.
        unsafe { &(*self.0.as_ptr()).entry.assume_init_ref().0 }
    }

    /// # Safety
    ///
    /// The node must be a data node (not a sentinel) and must stay alive for `'n`.
    pub(crate) unsafe fn entry<'n>(self) -> (&'n K, &'n V) {
        // SAFETY: The caller guarantees the entry is initialized and outlives `'n`.
        let (key, value) = unsafe { (*self.0.as_ptr()).entry.assume_init_ref() };
        (key, value)
    }

    /// # Safety
    ///
    /// The node must be a data node (not a sentinel), must stay alive for `'n` and no other
    /// reference to its value may exist during `'n`.
    pub(crate) unsafe fn entry_mut<'n>(self) -> (&'n K, &'n mut V) {
        // SAFETY: The caller guarantees the entry is initialized, outlives `'n` and that the
        // value is not aliased.
        let (key, value) = unsafe { (*self.0.as_ptr()).entry.assume_init_mut() };
        (key, value)
    }

    pub(crate) fn parent(self) -> Self {
        // SAFETY: Links are only followed while the owning tree is borrowed (see type docs).
        unsafe { (*self.0.as_ptr()).parent }
    }

    pub(crate) fn left(self) -> Self {
        // SAFETY: Links are only followed while the owning tree is borrowed (see type docs).
        unsafe { (*self.0.as_ptr()).left }
    }

    pub(crate) fn right(self) -> Self {
        // SAFETY: Links are only followed while the owning tree is borrowed (see type docs).
        unsafe { (*self.0.as_ptr()).right }
    }

    pub(crate) fn color(self) -> Color {
        // SAFETY: Links are only followed while the owning tree is borrowed (see type docs).
        unsafe { (*self.0.as_ptr()).color }
    }

    pub(crate) fn is_red(self) -> bool {
        self.color() == Color::Red
    }

    pub(crate) fn set_parent(self, parent: Self) {
        // SAFETY: Links are only modified by the tree through an exclusive borrow of itself.
        unsafe {
            (*self.0.as_ptr()).parent = parent;
        }
    }

    pub(crate) fn set_left(self, left: Self) {
        // SAFETY: Links are only modified by the tree through an exclusive borrow of itself.
        unsafe {
            (*self.0.as_ptr()).left = left;
        }
    }

    pub(crate) fn set_right(self, right: Self) {
        // SAFETY: Links are only modified by the tree through an exclusive borrow of itself.
        unsafe {
            (*self.0.as_ptr()).right = right;
        }
    }

    pub(crate) fn set_color(self, color: Color) {
        // SAFETY: Links are only modified by the tree through an exclusive borrow of itself.
        unsafe {
            (*self.0.as_ptr()).color = color;
        }
    }
}

/// The two auxiliary nodes every tree owns for its whole life.
///
/// * `nil` is a black, self-linked node standing in for every absent child.
/// * `root` is the super-root: its left child is the logical root of the tree. Rotations at the
///   top of the tree update it like any other parent, so they never special-case the root.
///
/// The pair also serves as the identity of the tree - no two live trees share a super-root.
pub(crate) struct Sentinels<K, V> {
    pub(crate) nil: NodePtr<K, V>,
    pub(crate) root: NodePtr<K, V>,
}

impl<K, V> Clone for Sentinels<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for Sentinels<K, V> {}

impl<K, V> PartialEq for Sentinels<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl<K, V> Eq for Sentinels<K, V> {}

impl<K, V> fmt::Debug for Sentinels<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sentinels")
            .field("nil", &self.nil)
            .field("root", &self.root)
            .finish()
    }
}

impl<K, V> Sentinels<K, V> {
    /// Allocates both sentinels. If the second allocation fails, the first is released again.
    pub(crate) fn allocate(allocator: &dyn Allocator) -> Result<Self, AllocError> {
        let nil = NodePtr::allocate_sentinel(allocator, None)?;

        match NodePtr::allocate_sentinel(allocator, Some(nil)) {
            Ok(root) => Ok(Self { nil, root }),
            Err(error) => {
                // SAFETY: Just allocated from this allocator, sentinels have no entry and no
                // link to it escaped.
                unsafe { nil.free(allocator) };
                Err(error)
            }
        }
    }

    /// # Safety
    ///
    /// The tree must contain no data nodes and no link to the sentinels may be followed
    /// afterwards.
    pub(crate) unsafe fn free(self, allocator: &dyn Allocator) {
        // SAFETY: Forwarding the caller's guarantees. Sentinels never hold an entry.
        unsafe {
            self.root.free(allocator);
            self.nil.free(allocator);
        }
    }

    /// The logical root of the tree, or `nil` if the tree is empty.
    pub(crate) fn tree_root(self) -> NodePtr<K, V> {
        self.root.left()
    }

    pub(crate) fn is_nil(self, node: NodePtr<K, V>) -> bool {
        node == self.nil
    }

    /// The leftmost node of the subtree rooted at `node`.
    pub(crate) fn minimum(self, mut node: NodePtr<K, V>) -> NodePtr<K, V> {
        if node == self.nil {
            return node;
        }

        while node.left() != self.nil {
            node = node.left();
        }

        node
    }

    /// The rightmost node of the subtree rooted at `node`.
    pub(crate) fn maximum(self, mut node: NodePtr<K, V>) -> NodePtr<K, V> {
        if node == self.nil {
            return node;
        }

        while node.right() != self.nil {
            node = node.right();
        }

        node
    }

    /// The first node in key order, or `nil` if the tree is empty.
    pub(crate) fn first(self) -> NodePtr<K, V> {
        self.minimum(self.tree_root())
    }

    /// The last node in key order, or `nil` if the tree is empty.
    pub(crate) fn last(self) -> NodePtr<K, V> {
        self.maximum(self.tree_root())
    }

    /// The in-order successor of a data node, or `nil` if `node` is the last one.
    pub(crate) fn successor(self, node: NodePtr<K, V>) -> NodePtr<K, V> {
        if node.right() != self.nil {
            return self.minimum(node.right());
        }

        // Climb while we are a right child. Reaching the super-root means we came up from the
        // logical root's right side, so there is nothing after us.
        let mut child = node;
        let mut parent = node.parent();

        while parent != self.root && child == parent.right() {
            child = parent;
            parent = parent.parent();
        }

        if parent == self.root {
            self.nil
        } else {
            parent
        }
    }

    /// The in-order predecessor of a data node, or `nil` if `node` is the first one.
    pub(crate) fn predecessor(self, node: NodePtr<K, V>) -> NodePtr<K, V> {
        if node.left() != self.nil {
            return self.maximum(node.left());
        }

        let mut child = node;
        let mut parent = node.parent();

        while parent != self.root && child == parent.left() {
            child = parent;
            parent = parent.parent();
        }

        if parent == self.root {
            self.nil
        } else {
            parent
        }
    }
}
