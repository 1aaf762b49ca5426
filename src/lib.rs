//! An intrusive AVL tree with order statistics, split and join.

// Conventions used in comments are from Hauepler, Sen and Tarjan, with the rank of a node taken to
// be its height:
// - The rank of a node `x` is denoted `r(x)`. A missing child has rank -1.
// - The parent of a node `x` is denoted `p(x)`.
// - The rank difference of a node `x` is given by `r(p(x)) - r(x)`.
// - A node `x` is an `i`-child if its rank difference is `i`.
// - A node is `i,j` if one of its children is an `i`-child and the other is a `j`-child.
//
// The AVL rank rule is that every node is 1,1 or 1,2. Equivalently:
// 1. All rank differences are either 1 or 2.
// 2. No node is 2,2.
//
// Every node also records the number of nodes in its subtree, `s(x) = s(left) + s(right) + 1`,
// with a missing child counting as 0. Subtree sizes back the order-statistic queries and let
// `to_vec` place each node without a running counter.

use core::{
    cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not, pin::Pin,
    ptr::NonNull,
};
use std::borrow::Borrow;

use cordyceps::Linked;

mod error;
mod iter;
mod join;
pub mod map;
mod node;

#[cfg(any(test, feature = "model"))]
pub mod model;

#[cfg(test)]
mod tests;

pub use error::{Error, InsertError};
pub use iter::Iter;
pub use map::{AvlMap, MapNode};
pub use node::NodeRef;

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord + fmt::Debug;

    fn key(&self) -> &Self::Key;
}

/// An intrusive AVL tree.
///
/// Nodes are allocated by the caller, embed a [`Links`] block and are handed to the tree through
/// their [`Linked::Handle`]. The tree owns every node linked into it until the node is removed,
/// split off into another tree, or the tree is dropped.
///
/// Besides the usual point operations, the tree caches its minimum and maximum elements, keeps
/// subtree sizes for order-statistic queries, and supports [`join`] and [`split`].
///
/// [`join`]: AvlTree::join
/// [`split`]: AvlTree::split
pub struct AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    first: Link<T>,
    last: Link<T>,
}

pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    height: i8,
    size: usize,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

// The outcome of a descent looking for a key.
enum Search<T: ?Sized> {
    Found(NonNull<T>),
    Vacant(InsertAs<T>),
}

// Where a node with the searched-for key would be linked.
enum InsertAs<T: ?Sized> {
    Root,
    Child { parent: NonNull<T>, dir: Dir },
}

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree {
            root: None,
            first: None,
            last: None,
        }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the number of elements in the tree.
    pub fn len(&self) -> usize {
        unsafe { Self::size(self.root) }
    }

    /// Returns the height of the tree, or -1 if the tree is empty.
    pub fn height(&self) -> i32 {
        unsafe { Self::rank(self.root).into() }
    }

    /// Returns a read-only view of the root node, or `None` if the tree is empty.
    pub fn root(&self) -> Option<NodeRef<'_, T>> {
        self.root.map(|root| NodeRef::new(Some(root)))
    }

    #[doc(hidden)]
    #[track_caller]
    pub fn assert_invariants(&self) {
        let Some(root) = self.root else {
            assert!(self.first.is_none(), "empty tree caches a minimum");
            assert!(self.last.is_none(), "empty tree caches a maximum");
            return;
        };

        unsafe {
            assert_eq!(Self::links(root).parent(), None, "root has a parent");

            self.assert_invariants_at(root, None, None);

            assert_eq!(
                self.first,
                Some(Self::min_in_subtree(root).0),
                "cached minimum is stale"
            );
            assert_eq!(
                self.last,
                Some(Self::max_in_subtree(root)),
                "cached maximum is stale"
            );
        }
    }

    // Checks the subtree rooted at `node`, all of whose keys must lie strictly between `lower` and
    // `upper`. Returns the rank and size of the subtree.
    #[allow(clippy::only_used_in_recursion)]
    #[track_caller]
    unsafe fn assert_invariants_at(
        &self,
        node: NonNull<T>,
        lower: Option<&T::Key>,
        upper: Option<&T::Key>,
    ) -> (i8, usize) {
        unsafe {
            let key = node.as_ref().key();

            if let Some(lower) = lower {
                assert!(lower < key, "{key:?} is in the right subtree of {lower:?}");
            }

            if let Some(upper) = upper {
                assert!(key < upper, "{key:?} is in the left subtree of {upper:?}");
            }

            let mut child_ranks = [-1; 2];
            let mut child_sizes = [0; 2];

            for dir in [Dir::Left, Dir::Right] {
                if let Some(child) = Self::links(node).child(dir) {
                    // Ensure child's parent link points to this node.
                    let parent = Self::links(child)
                        .parent()
                        .expect("child parent pointer not set");
                    assert_eq!(node, parent, "a child of {key:?} has the wrong parent");

                    let (lower, upper) = match dir {
                        Dir::Left => (lower, Some(key)),
                        Dir::Right => (Some(key), upper),
                    };

                    let (rank, size) = self.assert_invariants_at(child, lower, upper);
                    child_ranks[dir as usize] = rank;
                    child_sizes[dir as usize] = size;
                }
            }

            let rank = Self::links(node).height();
            assert_eq!(
                rank,
                1 + child_ranks[0].max(child_ranks[1]),
                "{key:?} has the wrong height"
            );

            // Ensure the node is 1,1 or 1,2.
            let rank_diffs = (rank - child_ranks[0], rank - child_ranks[1]);
            assert!(
                matches!(rank_diffs, (1, 1) | (1, 2) | (2, 1)),
                "{key:?} is {},{}",
                rank_diffs.0,
                rank_diffs.1
            );

            let size = Self::links(node).size();
            assert_eq!(
                size,
                child_sizes[0] + child_sizes[1] + 1,
                "{key:?} has the wrong subtree size"
            );

            (rank, size)
        }
    }

    /// Returns `true` if the tree contains an element with the given key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        matches!(self.search_raw(key), Search::Found(_))
    }

    /// Returns a reference to the node corresponding to `key`.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self.search_raw(key) {
            Search::Found(ptr) => unsafe { Some(Pin::new_unchecked(ptr.as_ref())) },
            Search::Vacant(_) => None,
        }
    }

    /// Returns a pinned mutable reference to the node corresponding to `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<Pin<&mut T>>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self.search_raw(key) {
            Search::Found(mut ptr) => unsafe { Some(Pin::new_unchecked(ptr.as_mut())) },
            Search::Vacant(_) => None,
        }
    }

    fn search_raw<Q>(&self, key: &Q) -> Search<T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let Some(mut cur) = self.root else {
            return Search::Vacant(InsertAs::Root);
        };

        loop {
            unsafe {
                let dir = match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => Dir::Left,
                    Ordering::Equal => return Search::Found(cur),
                    Ordering::Greater => Dir::Right,
                };

                match Self::links(cur).child(dir) {
                    Some(child) => cur = child,
                    None => return Search::Vacant(InsertAs::Child { parent: cur, dir }),
                }
            }
        }
    }

    /// Returns the minimum element of the tree.
    ///
    /// This operation completes in _O(1)_ time.
    pub fn first(&self) -> Option<Pin<&T>> {
        self.first
            .map(|first| unsafe { Pin::new_unchecked(first.as_ref()) })
    }

    /// Returns the maximum element of the tree.
    ///
    /// This operation completes in _O(1)_ time.
    pub fn last(&self) -> Option<Pin<&T>> {
        self.last
            .map(|last| unsafe { Pin::new_unchecked(last.as_ref()) })
    }

    /// Returns the element at position `index` in key order, counting from zero.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn get_by_index(&self, mut index: usize) -> Option<Pin<&T>> {
        let mut opt_cur = self.root;

        unsafe {
            while let Some(cur) = opt_cur {
                let left = Self::links(cur).left();
                let left_size = Self::size(left);

                match index.cmp(&left_size) {
                    Ordering::Less => opt_cur = left,
                    Ordering::Equal => return Some(Pin::new_unchecked(cur.as_ref())),
                    Ordering::Greater => {
                        index -= left_size + 1;
                        opt_cur = Self::links(cur).right();
                    }
                }
            }
        }

        None
    }

    /// Returns the position of the element with the given key in key order, counting from zero.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn index_of<Q>(&self, key: &Q) -> Option<usize>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut opt_cur = self.root;
        let mut preceding = 0;

        unsafe {
            while let Some(cur) = opt_cur {
                let left = Self::links(cur).left();

                match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => opt_cur = left,
                    Ordering::Equal => return Some(preceding + Self::size(left)),
                    Ordering::Greater => {
                        preceding += Self::size(left) + 1;
                        opt_cur = Self::links(cur).right();
                    }
                }
            }
        }

        None
    }

    /// Returns an iterator over the elements of the tree in key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Returns every element of the tree in key order.
    ///
    /// This operation completes in _O(n)_ time.
    pub fn to_vec(&self) -> Vec<&T> {
        let mut slots = vec![None; self.len()];
        unsafe { Self::fill_in_order(self.root, 0, &mut slots) };

        slots.into_iter().flatten().collect()
    }

    // Writes the subtree rooted at `link` into `slots`, starting at `offset`. A node's slot is its
    // subtree's offset plus the size of its left subtree.
    unsafe fn fill_in_order<'a>(link: Link<T>, offset: usize, slots: &mut [Option<&'a T>]) {
        let Some(node) = link else {
            return;
        };

        unsafe {
            let left = Self::links(node).left();
            let index = offset + Self::size(left);
            slots[index] = Some(node.as_ref());

            Self::fill_in_order(left, offset, slots);
            Self::fill_in_order(Self::links(node).right(), index + 1, slots);
        }
    }

    /// Inserts an item into the tree.
    ///
    /// Returns the number of rotations performed to rebalance the tree, counting a double rotation
    /// as two. If the tree already contains an item with an equal key, the tree is left unchanged
    /// and `item` is returned in the error.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Result<usize, InsertError<T::Handle>> {
        let ptr = T::into_ptr(item);

        unsafe {
            Self::links_mut(ptr).clear();

            let key = ptr.as_ref().key();

            let (parent, dir) = match self.search_raw(key) {
                Search::Found(_) => return Err(InsertError::new(T::from_ptr(ptr))),

                // Tree is empty. Set `item` as the root and return.
                Search::Vacant(InsertAs::Root) => {
                    self.root = Some(ptr);
                    self.first = Some(ptr);
                    self.last = Some(ptr);
                    tracing::trace!(?key, rebalances = 0, "inserted");
                    return Ok(0);
                }

                Search::Vacant(InsertAs::Child { parent, dir }) => (parent, dir),
            };

            Self::links_mut(parent).set_child(dir, Some(ptr));
            Self::links_mut(ptr).set_parent(Some(parent));
            Self::adjust_sizes_to_root(Some(parent), 1, 0);

            if self.first.map_or(true, |first| key < first.as_ref().key()) {
                self.first = Some(ptr);
            }

            if self.last.map_or(true, |last| key > last.as_ref().key()) {
                self.last = Some(ptr);
            }

            let rebalances = self.rebalance_inserted(ptr);
            tracing::trace!(?key, rebalances, "inserted");

            Ok(rebalances)
        }
    }

    // Performs a bottom-up rebalance of the tree after `node` was linked in, either as a new leaf
    // or as the separator of a join. Returns the number of rotations performed.
    //
    // Invariants:
    // - `node` is 1,1 or 1,2.
    // - Every node other than `p(node)` obeys the rank rule.
    // - `node` is a 0-child or a 1-child.
    fn rebalance_inserted(&mut self, node: NonNull<T>) -> usize {
        let mut rotations = 0;
        let mut x = node;

        unsafe {
            while let Some(parent) = Self::links(x).parent() {
                let x_rank = Self::links(x).height();
                let parent_rank = Self::links(parent).height();

                match parent_rank - x_rank {
                    1 => break,
                    0 => (),
                    diff => unreachable!(
                        "{:?} is a {diff}-child during insertion",
                        x.as_ref().key()
                    ),
                }

                let dir = Self::which_child(parent, x);
                let sibling_rank = Self::rank(Self::links(parent).child(!dir));

                match parent_rank - sibling_rank {
                    // The parent is 0,1. Promote it and ascend.
                    1 => {
                        Self::promote(parent);
                        x = parent;
                    }

                    // The parent is 0,2. Rotate.
                    2 => {
                        let outer = Self::links(x).child(dir);
                        let inner = Self::links(x).child(!dir);

                        match (x_rank - Self::rank(outer), x_rank - Self::rank(inner)) {
                            (1, 2) => {
                                rotations += self.rotate_at(parent, x);
                                Self::demote(parent);
                                break;
                            }

                            // Only reachable through a join, where the separator can be 1,1 and a
                            // 0-child at once. The rotation leaves `x` a 0-child of the rotated
                            // parent's old parent, so keep climbing.
                            (1, 1) => {
                                rotations += self.rotate_at(parent, x);
                                Self::promote(x);
                            }

                            (2, 1) => {
                                let y = inner.expect("1-child of a node is present");
                                rotations += self.rotate_twice_at(parent, x, y);
                                Self::promote(y);
                                Self::demote(x);
                                Self::demote(parent);
                                break;
                            }

                            (outer_diff, inner_diff) => unreachable!(
                                "0-child {:?} is {outer_diff},{inner_diff}",
                                x.as_ref().key()
                            ),
                        }
                    }

                    diff => unreachable!(
                        "sibling of {:?} is a {diff}-child during insertion",
                        x.as_ref().key()
                    ),
                }
            }
        }

        rotations
    }

    // Returns the minimum node in the subtree.
    //
    // If the subtree root is not the minimum, also returns the minimum node's parent.
    #[inline]
    unsafe fn min_in_subtree(root: NonNull<T>) -> (NonNull<T>, Option<NonNull<T>>) {
        let mut parent = None;
        let mut cur = root;

        while let Some(left) = unsafe { Self::links(cur).left() } {
            parent = Some(cur);
            cur = left;
        }

        (cur, parent)
    }

    // Returns the maximum node in the subtree.
    #[inline]
    unsafe fn max_in_subtree(root: NonNull<T>) -> NonNull<T> {
        let mut cur = root;

        while let Some(right) = unsafe { Self::links(cur).right() } {
            cur = right;
        }

        cur
    }

    /// Removes the element with the given key from the tree.
    ///
    /// Returns the removed element and the number of rotations performed to rebalance the tree,
    /// counting a double rotation as two.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn remove<Q>(&mut self, key: &Q) -> Result<(T::Handle, usize), Error>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self.search_raw(key) {
            Search::Found(node) => Ok(unsafe { self.remove_at(node) }),
            Search::Vacant(_) => Err(Error::KeyNotFound),
        }
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = self.first?;
        Some(unsafe { self.remove_at(first) }.0)
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = self.last?;
        Some(unsafe { self.remove_at(last) }.0)
    }

    // Unlinks `node` from the tree and rebalances.
    //
    // # Safety
    //
    // It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    // other tree.
    unsafe fn remove_at(&mut self, node: NonNull<T>) -> (T::Handle, usize) {
        // There are two structural cases:
        //
        // 1. `node` has two children.
        //
        //    In this case `node`'s successor[^1] is unlinked from its position and assumes `node`'s
        //    place, rank and size. The successor's right child (which may be missing) is elevated
        //    to replace it. Rebalancing starts at the successor's old parent, or at the successor
        //    itself if it was `node`'s right child.
        //
        // 2. `node` has at most one child.
        //
        //    In this case the child (which may be missing) is elevated to replace `node`, and
        //    rebalancing starts at `node`'s parent.
        //
        // Either way, exactly one subtree lost one rank below the node where rebalancing starts,
        // and every node from there to the root lost one element.
        //
        // [^1]: The successor of a node `a` is the least node in `a`'s right subtree.

        unsafe {
            let parent = Self::links(node).parent();
            let left = Self::links(node).left();
            let right = Self::links(node).right();

            let rebalance_from = match (left, right) {
                (Some(left), Some(right)) => {
                    let (successor, successor_parent) = Self::min_in_subtree(right);

                    if let Some(successor_parent) = successor_parent {
                        // Elevate the successor's right child to replace it.
                        let successor_right = Self::links(successor).right();
                        Self::replace_child(successor_parent, successor, successor_right);
                        Self::maybe_set_parent(successor_right, Some(successor_parent));

                        Self::links_mut(successor).set_right(Some(right));
                        Self::links_mut(right).set_parent(Some(successor));
                    }

                    self.replace_child_or_set_root(parent, node, Some(successor));

                    // Transfer rank and size of `node` to `successor`.
                    let node_rank = Self::links(node).height();
                    let node_size = Self::links(node).size();

                    let links = Self::links_mut(successor);
                    links.set_parent(parent);
                    links.set_height(node_rank);
                    links.set_size(node_size);
                    links.set_left(Some(left));
                    // Right link is updated above iff succ != right.

                    Self::links_mut(left).set_parent(Some(successor));

                    Some(successor_parent.unwrap_or(successor))
                }

                (Some(child), None) | (None, Some(child)) => {
                    self.replace_child_or_set_root(parent, node, Some(child));
                    Self::links_mut(child).set_parent(parent);
                    parent
                }

                (None, None) => {
                    self.replace_child_or_set_root(parent, node, None);
                    parent
                }
            };

            Self::adjust_sizes_to_root(rebalance_from, 0, 1);

            let rebalances = self.rebalance_removed(rebalance_from);

            if self.first == Some(node) {
                self.first = self.root.map(|root| Self::min_in_subtree(root).0);
            }

            if self.last == Some(node) {
                self.last = self.root.map(|root| Self::max_in_subtree(root));
            }

            tracing::trace!(key = ?node.as_ref().key(), rebalances, "removed");

            Self::links_mut(node).clear();
            (T::from_ptr(node), rebalances)
        }
    }

    // Performs a bottom-up rebalance starting at `opt_node`, whose subtree on one side just lost
    // one rank. Returns the number of rotations performed.
    //
    // Invariants:
    // - Every node other than `node` obeys the rank rule.
    // - `node` is 1,1, 1,2, 2,2 or 1,3.
    fn rebalance_removed(&mut self, mut opt_node: Link<T>) -> usize {
        let mut rotations = 0;

        unsafe {
            while let Some(node) = opt_node {
                let rank = Self::links(node).height();
                let left_diff = rank - Self::rank(Self::links(node).left());
                let right_diff = rank - Self::rank(Self::links(node).right());

                match (left_diff, right_diff) {
                    (1, 1) | (1, 2) | (2, 1) => break,

                    // Demote and ascend; the parent now has a child which lost one rank.
                    (2, 2) => {
                        Self::demote(node);
                        opt_node = Self::links(node).parent();
                    }

                    (3, 1) | (1, 3) => {
                        // `y` is the 1-child, opposite the 3-child.
                        let dir = if left_diff == 3 { Dir::Left } else { Dir::Right };
                        let y = Self::links(node)
                            .child(!dir)
                            .expect("1-child of a node is present");
                        let y_rank = Self::links(y).height();

                        let outer = Self::links(y).child(!dir);
                        let inner = Self::links(y).child(dir);

                        match (y_rank - Self::rank(outer), y_rank - Self::rank(inner)) {
                            // `y` takes the place of `node` at the same rank.
                            (1, 1) => {
                                rotations += self.rotate_at(node, y);
                                Self::demote(node);
                                Self::promote(y);
                                break;
                            }

                            // `y` takes the place of `node` one rank lower.
                            (1, 2) => {
                                rotations += self.rotate_at(node, y);
                                Self::demote_twice(node);
                                opt_node = Self::links(y).parent();
                            }

                            // The inner grandchild takes the place of `node` one rank lower.
                            (2, 1) => {
                                let z = inner.expect("1-child of a node is present");
                                rotations += self.rotate_twice_at(node, y, z);
                                Self::demote_twice(node);
                                Self::demote(y);
                                Self::promote(z);
                                opt_node = Self::links(z).parent();
                            }

                            (outer_diff, inner_diff) => unreachable!(
                                "1-child {:?} is {outer_diff},{inner_diff}",
                                y.as_ref().key()
                            ),
                        }
                    }

                    (left_diff, right_diff) => unreachable!(
                        "{:?} is {left_diff},{right_diff} during removal",
                        node.as_ref().key()
                    ),
                }
            }
        }

        rotations
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let (cur, parent) = Self::min_in_subtree(cur);
                let parent = parent.or_else(|| Self::links(cur).parent());

                let right = Self::links(cur).right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                Self::maybe_set_parent(right, parent);

                // Drop the node.
                Self::links_mut(cur).clear();
                drop(T::from_ptr(cur));

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        self.first = None;
        self.last = None;

        debug_assert!(self.root.is_none());
    }

    // Rotations ==============================================================

    // Performs a rotation, moving `up` up and its parent `down` down. Returns the number of
    // rotations performed.
    //
    // Subtree sizes are updated. The ranks of affected nodes are not updated.
    fn rotate_at(&mut self, down: NonNull<T>, up: NonNull<T>) -> usize {
        unsafe {
            debug_assert_eq!(Self::links(up).parent(), Some(down));

            // - `down` becomes the `dir` child of `up`.
            // - `across` goes from the `dir` child of `up` to the `!dir` child of `down`.
            let dir = if Self::links(down).right() == Some(up) {
                Dir::Left
            } else {
                Dir::Right
            };

            let across = Self::links(up).child(dir);
            Self::links_mut(down).set_child(!dir, across);
            Self::maybe_set_parent(across, Some(down));

            Self::links_mut(up).set_child(dir, Some(down));
            let parent = Self::links_mut(down).set_parent(Some(up));
            Self::links_mut(up).set_parent(parent);

            match parent {
                Some(parent) => Self::replace_child(parent, down, Some(up)),
                None => self.root = Some(up),
            }

            // `up` now spans exactly the elements `down` used to span.
            let size = Self::links(down).size();
            Self::links_mut(up).set_size(size);
            Self::update_size(down);
        }

        1
    }

    // Performs a double rotation, moving `up` above both its parent `down_first` and its
    // grandparent `down_second`. Returns the number of rotations performed.
    //
    // Subtree sizes are updated. The ranks of affected nodes are not updated.
    fn rotate_twice_at(
        &mut self,
        down_second: NonNull<T>,
        down_first: NonNull<T>,
        up: NonNull<T>,
    ) -> usize {
        self.rotate_at(down_first, up) + self.rotate_at(down_second, up)
    }

    // Support methods ========================================================

    #[inline]
    unsafe fn links<'a>(node: NonNull<T>) -> &'a Links<T> {
        unsafe { T::links(node).as_ref() }
    }

    #[inline]
    unsafe fn links_mut<'a>(node: NonNull<T>) -> &'a mut Links<T> {
        unsafe { T::links(node).as_mut() }
    }

    unsafe fn maybe_set_parent(opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { Self::links_mut(node).set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { Self::replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[inline]
    unsafe fn replace_child(parent: NonNull<T>, old_child: NonNull<T>, new_child: Link<T>) {
        unsafe {
            let dir = Self::which_child(parent, old_child);

            debug_assert_eq!(Self::links(parent).child(dir), Some(old_child));
            debug_assert!(
                new_child.is_none() || Self::links(parent).child(!dir) != new_child,
                "`new_child` must not be a child of `parent`"
            );

            Self::links_mut(parent).set_child(dir, new_child);
        }
    }

    // Adds `added` to and subtracts `removed` from the size of every node from `opt_node` up to
    // the root.
    unsafe fn adjust_sizes_to_root(mut opt_node: Link<T>, added: usize, removed: usize) {
        while let Some(node) = opt_node {
            unsafe {
                let links = Self::links_mut(node);
                let size = links.size() + added - removed;
                links.set_size(size);
                opt_node = links.parent();
            }
        }
    }

    // Recomputes the size of `node` from its children.
    #[inline]
    unsafe fn update_size(node: NonNull<T>) {
        unsafe {
            let size = Self::size(Self::links(node).left()) + Self::size(Self::links(node).right());
            Self::links_mut(node).set_size(size + 1);
        }
    }

    #[inline]
    unsafe fn promote(node: NonNull<T>) {
        unsafe {
            let inner = Self::links_mut(node).inner.get_mut();
            inner.height += 1;
        }
    }

    #[inline]
    unsafe fn demote(node: NonNull<T>) {
        unsafe {
            let inner = Self::links_mut(node).inner.get_mut();
            inner.height -= 1;
        }
    }

    #[inline]
    unsafe fn demote_twice(node: NonNull<T>) {
        unsafe {
            let inner = Self::links_mut(node).inner.get_mut();
            inner.height -= 2;
        }
    }

    /// Returns the rank of the pointed-to node.
    #[inline]
    unsafe fn rank(node: Link<T>) -> i8 {
        node.map(|n| unsafe { Self::links(n).height() })
            .unwrap_or(-1)
    }

    /// Returns the size of the subtree rooted at the pointed-to node.
    #[inline]
    unsafe fn size(node: Link<T>) -> usize {
        node.map(|n| unsafe { Self::links(n).size() })
            .unwrap_or(0)
    }

    unsafe fn which_child(parent: NonNull<T>, child: NonNull<T>) -> Dir {
        if unsafe { Self::links(parent).left() } == Some(child) {
            Dir::Left
        } else {
            Dir::Right
        }
    }
}

impl<T> Default for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> fmt::Debug for AvlTree<T>
where
    T: TreeNode<Links<T>> + fmt::Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                height: 0,
                size: 1,
                _unpin: PhantomPinned,
            }),
        }
    }

    /// Resets the links to those of a detached leaf.
    #[inline]
    fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.height = 0;
        inner.size = 1;
    }

    #[inline]
    fn height(&self) -> i8 {
        unsafe { (*self.inner.get()).height }
    }

    #[inline]
    fn size(&self) -> usize {
        unsafe { (*self.inner.get()).size }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_height(&mut self, height: i8) {
        self.inner.get_mut().height = height;
    }

    #[inline]
    fn set_size(&mut self, size: usize) {
        self.inner.get_mut().size = size;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("height", &self.height())
            .field("size", &self.size())
            .finish()
    }
}
