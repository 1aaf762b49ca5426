use core::iter::FusedIterator;

use crate::{AvlTree, Dir, Link, Links, TreeNode};

enum CameFrom {
    Parent,
    LeftChild,
    Here,
    RightChild,
}

/// An iterator over the elements of an [`AvlTree`] in key order.
///
/// Created by [`AvlTree::iter`].
pub struct Iter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    _tree: &'tree AvlTree<T>,

    front_cur: Link<T>,
    front_from: CameFrom,

    len: usize,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree AvlTree<T>) -> Self {
        Iter {
            _tree: tree,

            front_cur: tree.root,
            front_from: CameFrom::Parent,
            len: tree.len(),
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let mut cur = self.front_cur?;

        loop {
            match self.front_from {
                CameFrom::Parent => {
                    // Upon entering a new subtree, find the minimum element.
                    cur = unsafe { AvlTree::min_in_subtree(cur).0 };

                    // Once the minimum is found, its (empty) left subtree has been exhausted.
                    self.front_from = CameFrom::LeftChild;
                }

                CameFrom::LeftChild => {
                    // The left subtree has been exhausted, so this node is up next. Save off the
                    // iterator state and return it.
                    self.front_cur = Some(cur);
                    self.front_from = CameFrom::Here;
                    self.len -= 1;

                    return Some(unsafe { cur.as_ref() });
                }

                CameFrom::Here => {
                    // The current node was just yielded. If its right subtree is not empty, go
                    // there; otherwise the whole subtree rooted here is exhausted.
                    match unsafe { AvlTree::links(cur).right() } {
                        Some(right) => {
                            self.front_from = CameFrom::Parent;
                            cur = right;
                        }

                        None => self.front_from = CameFrom::RightChild,
                    }
                }

                CameFrom::RightChild => {
                    // The subtree rooted at `cur` is exhausted. Ascend one level; the parent is
                    // next if `cur` is its left child.
                    let parent = unsafe { AvlTree::links(cur).parent() }?;

                    self.front_from = match unsafe { AvlTree::which_child(parent, cur) } {
                        Dir::Left => CameFrom::LeftChild,
                        Dir::Right => CameFrom::RightChild,
                    };

                    cur = parent;
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for Iter<'_, T> {}

impl<T: TreeNode<Links<T>> + ?Sized> FusedIterator for Iter<'_, T> {}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> IntoIterator for &'tree AvlTree<T> {
    type Item = &'tree T;
    type IntoIter = Iter<'tree, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
