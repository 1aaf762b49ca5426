use core::{mem, ptr::NonNull};
use std::borrow::Borrow;

use crate::{AvlTree, Dir, InsertAs, Link, Links, Search, TreeNode};

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Joins `separator` and every element of `other` into this tree.
    ///
    /// The keys of one tree must all be less than the separator's key, and the keys of the other
    /// tree must all be greater. Either tree may hold the smaller keys. This is only checked in
    /// debug builds; violating it leaves the tree out of order.
    ///
    /// Returns the cost of the join, `|self.height() - other.height()| + 1`.
    ///
    /// This operation completes in _O(|self.height() - other.height()| + 1)_ time.
    pub fn join(&mut self, separator: T::Handle, other: AvlTree<T>) -> usize {
        let sep = T::into_ptr(separator);

        unsafe {
            Self::links_mut(sep).clear();

            let sep_key = sep.as_ref().key();
            let self_is_left = match (self.root, other.root) {
                (Some(root), _) => root.as_ref().key() < sep_key,
                (None, Some(root)) => sep_key < root.as_ref().key(),
                (None, None) => true,
            };

            let this = mem::take(self);
            let (mut left, right) = if self_is_left {
                (this, other)
            } else {
                (other, this)
            };

            debug_assert!(
                left.last.map_or(true, |last| last.as_ref().key() < sep_key),
                "left keys must be less than the separator {sep_key:?}"
            );
            debug_assert!(
                right.first.map_or(true, |first| sep_key < first.as_ref().key()),
                "right keys must be greater than the separator {sep_key:?}"
            );

            let first = left.first.or(Some(sep));
            let last = right.last.or(Some(sep));

            let cost = left.join_raw(sep, right.into_root(), Dir::Right);
            left.first = first;
            left.last = last;

            *self = left;
            cost
        }
    }

    // Detaches and returns the root, leaving the tree empty without dropping any node.
    fn into_root(mut self) -> Link<T> {
        self.first = None;
        self.last = None;
        self.root.take()
    }

    // Links the detached node `sep` and the detached subtree `other` into this tree, with `other`
    // as the `side` subtree of `sep` and this tree on the opposite side. Cached extremes are not
    // updated.
    //
    // Returns the cost of the join.
    //
    // # Safety
    //
    // `sep` must have cleared links, and `other` must be the parentless root of a valid subtree
    // that no tree owns.
    unsafe fn join_raw(&mut self, sep: NonNull<T>, other: Link<T>, side: Dir) -> usize {
        unsafe {
            let this = self.root.take();
            let this_rank = Self::rank(this);
            let other_rank = Self::rank(other);
            let cost = usize::from(this_rank.abs_diff(other_rank)) + 1;

            // Descend the taller tree along the spine facing the shorter tree, stopping at the
            // first node (possibly missing) no taller than the shorter tree.
            let (tall, short, short_side) = if this_rank >= other_rank {
                (this, other, side)
            } else {
                (other, this, !side)
            };

            let short_rank = Self::rank(short);

            let mut parent = None;
            let mut cur = tall;
            while let Some(node) = cur.filter(|&n| Self::links(n).height() > short_rank) {
                parent = Some(node);
                cur = Self::links(node).child(short_side);
            }

            // `sep` takes the place of `cur`, with `cur` and the shorter tree as its children.
            let links = Self::links_mut(sep);
            links.set_child(short_side, short);
            links.set_child(!short_side, cur);
            links.set_parent(parent);
            links.set_height(short_rank + 1);
            links.set_size(Self::size(short) + Self::size(cur) + 1);

            Self::maybe_set_parent(short, Some(sep));
            Self::maybe_set_parent(cur, Some(sep));

            match parent {
                Some(parent) => {
                    Self::links_mut(parent).set_child(short_side, Some(sep));
                    Self::adjust_sizes_to_root(Some(parent), Self::size(short) + 1, 0);
                    self.root = tall;
                }

                None => self.root = Some(sep),
            }

            let rotations = self.rebalance_inserted(sep);

            tracing::trace!(
                key = ?sep.as_ref().key(),
                this_rank,
                other_rank,
                cost,
                rotations,
                "joined"
            );

            cost
        }
    }

    /// Splits the tree around `key`.
    ///
    /// Returns a tree holding every element with a key less than `key`, the element with key
    /// `key` if there is one, and a tree holding every element with a key greater than `key`.
    ///
    /// This operation completes in _O(log(n))_ time.
    #[allow(clippy::type_complexity)]
    pub fn split<Q>(mut self, key: &Q) -> (AvlTree<T>, Option<T::Handle>, AvlTree<T>)
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut less = AvlTree::new();
        let mut greater = AvlTree::new();

        let first = self.first.take();
        let last = self.last.take();

        // The node to process next, and which of its children the descent passed through.
        let (found, mut opt_up) = match self.search_raw(key) {
            Search::Found(node) => unsafe {
                // The found node's subtrees seed the results.
                less.root = Self::links(node).left();
                greater.root = Self::links(node).right();
                Self::maybe_set_parent(less.root, None);
                Self::maybe_set_parent(greater.root, None);

                let up = Self::links(node)
                    .parent()
                    .map(|parent| (parent, Self::which_child(parent, node)));

                (Some(node), up)
            },

            Search::Vacant(InsertAs::Child { parent, dir }) => (None, Some((parent, dir))),
            Search::Vacant(InsertAs::Root) => (None, None),
        };

        // Every node is either in one of the results or about to be joined into one.
        self.root = None;

        let mut joins = 0_usize;
        let mut total_cost = 0;
        let mut max_cost = 0;

        while let Some((cur, from)) = opt_up {
            unsafe {
                opt_up = Self::links(cur)
                    .parent()
                    .map(|parent| (parent, Self::which_child(parent, cur)));

                let across = Self::links(cur).child(!from);
                Self::maybe_set_parent(across, None);
                Self::links_mut(cur).clear();

                let cost = match from {
                    // Arrived from the right: `cur` and its left subtree precede `key`.
                    Dir::Right => less.join_raw(cur, across, Dir::Left),

                    // Arrived from the left: `cur` and its right subtree follow `key`.
                    Dir::Left => greater.join_raw(cur, across, Dir::Right),
                };

                joins += 1;
                total_cost += cost;
                max_cost = max_cost.max(cost);
            }
        }

        unsafe {
            // If anything precedes `key`, so does the overall minimum; likewise for the maximum.
            less.first = less.root.and(first);
            less.last = less.root.map(|root| Self::max_in_subtree(root));
            greater.first = greater.root.map(|root| Self::min_in_subtree(root).0);
            greater.last = greater.root.and(last);
        }

        tracing::trace!(
            found = found.is_some(),
            less = less.len(),
            greater = greater.len(),
            joins,
            total_cost,
            max_cost,
            "split"
        );

        let found = found.map(|node| unsafe {
            Self::links_mut(node).clear();
            T::from_ptr(node)
        });

        (less, found, greater)
    }
}
