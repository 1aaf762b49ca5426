use core::{fmt, marker::PhantomData};

use crate::{AvlTree, Dir, Link, Links, TreeNode};

/// A read-only view of a slot in an [`AvlTree`].
///
/// A slot holds either a real node or a sentinel. Sentinels stand in for missing children: they
/// have height -1, size 0 and no element, and their own children are sentinels again. Every real
/// node therefore has two children, which makes the view convenient for printers and invariant
/// checkers that walk the tree.
pub struct NodeRef<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    ptr: Link<T>,
    _tree: PhantomData<&'tree AvlTree<T>>,
}

impl<'tree, T> NodeRef<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) fn new(ptr: Link<T>) -> Self {
        NodeRef {
            ptr,
            _tree: PhantomData,
        }
    }

    /// Returns `true` if this is a real node rather than a sentinel.
    pub fn is_real(&self) -> bool {
        self.ptr.is_some()
    }

    /// Returns the node's element, or `None` for a sentinel.
    pub fn get(&self) -> Option<&'tree T> {
        // SAFETY: The tree is borrowed for `'tree`, so the node can be neither moved nor freed.
        self.ptr.map(|node| unsafe { node.as_ref() })
    }

    /// Returns the node's key, or `None` for a sentinel.
    pub fn key(&self) -> Option<&'tree T::Key> {
        self.get().map(|node| node.key())
    }

    /// Returns the height of the node's subtree, or -1 for a sentinel.
    pub fn height(&self) -> i32 {
        unsafe { AvlTree::<T>::rank(self.ptr).into() }
    }

    /// Returns the number of real nodes in the node's subtree, or 0 for a sentinel.
    pub fn size(&self) -> usize {
        unsafe { AvlTree::<T>::size(self.ptr) }
    }

    pub fn left(&self) -> NodeRef<'tree, T> {
        self.child(Dir::Left)
    }

    pub fn right(&self) -> NodeRef<'tree, T> {
        self.child(Dir::Right)
    }

    /// Returns the node's parent, or `None` for the root.
    ///
    /// A sentinel has no recorded parent.
    pub fn parent(&self) -> Option<NodeRef<'tree, T>> {
        let node = self.ptr?;
        let parent = unsafe { AvlTree::<T>::links(node).parent() };

        parent.map(|parent| NodeRef::new(Some(parent)))
    }

    fn child(&self, dir: Dir) -> NodeRef<'tree, T> {
        let child = self
            .ptr
            .and_then(|node| unsafe { AvlTree::<T>::links(node).child(dir) });

        NodeRef::new(child)
    }
}

impl<T> Clone for NodeRef<'_, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeRef<'_, T> where T: TreeNode<Links<T>> + ?Sized {}

impl<T> PartialEq for NodeRef<'_, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Eq for NodeRef<'_, T> where T: TreeNode<Links<T>> + ?Sized {}

impl<T> fmt::Debug for NodeRef<'_, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key() {
            Some(key) => f
                .debug_struct("NodeRef")
                .field("key", key)
                .field("height", &self.height())
                .field("size", &self.size())
                .finish(),
            None => f.write_str("Sentinel"),
        }
    }
}
