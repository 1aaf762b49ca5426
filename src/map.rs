use core::{borrow::Borrow, fmt, marker::PhantomPinned, ptr::NonNull};

use cordyceps::Linked;

use crate::{AvlTree, Error, Links, NodeRef, TreeNode};

/// An ordered map based on an [AVL tree], with split and join.
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
pub struct AvlMap<K: Ord + fmt::Debug, V> {
    tree: AvlTree<MapNode<K, V>>,
}

/// A key-value pair stored in an [`AvlMap`].
///
/// Reachable through [`AvlMap::root`] and the [`NodeRef`] views derived from it.
pub struct MapNode<K, V> {
    links: Links<MapNode<K, V>>,
    key: K,
    value: V,
    _unpin: PhantomPinned,
}

impl<K, V> MapNode<K, V> {
    fn new(key: K, value: V) -> Box<Self> {
        Box::new(MapNode {
            links: Links::new(),
            key,
            value,
            _unpin: PhantomPinned,
        })
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }
}

unsafe impl<K, V> Linked<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MapNode<K, V>>> {
        let ptr = ptr.as_ptr();
        // SAFETY: a field of a non-null pointer is non-null.
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<K: Ord + fmt::Debug, V> TreeNode<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Key = K;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

impl<K: Ord + fmt::Debug, V> AvlMap<K, V> {
    /// Creates a new, empty `AvlMap`.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Returns `true` if the map contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the map.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns the height of the underlying tree, or -1 if the map is empty.
    pub fn height(&self) -> i32 {
        self.tree.height()
    }

    /// Returns a read-only view of the root node, or `None` if the map is empty.
    pub fn root(&self) -> Option<NodeRef<'_, MapNode<K, V>>> {
        self.tree.root()
    }

    /// Returns `true` if the map contains a value associated with `key`.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(key)
    }

    /// Returns a reference to the value associated with `key`.
    ///
    /// This operation completes in _O(log(n))_ time.
    #[inline]
    pub fn search<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.get(key).map(|node| &node.get_ref().value)
    }

    /// Returns a mutable reference to the value associated with `key`.
    #[inline]
    pub fn search_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree
            .get_mut(key)
            // SAFETY: Pinning is not structural for `node.value`.
            .map(|node| unsafe { &mut node.get_unchecked_mut().value })
    }

    /// Inserts `value` under `key`.
    ///
    /// Returns the number of rotations performed to rebalance the tree. If `key` is already
    /// present, the map is left unchanged and [`Error::KeyAlreadyExists`] is returned.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, key: K, value: V) -> Result<usize, Error> {
        self.tree
            .insert(MapNode::new(key, value))
            .map_err(Error::from)
    }

    /// Deletes the entry for `key`.
    ///
    /// Returns the number of rotations performed to rebalance the tree. If `key` is absent, the
    /// map is left unchanged and [`Error::KeyNotFound`] is returned.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn delete<Q>(&mut self, key: &Q) -> Result<usize, Error>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.remove(key).map(|(_, rebalances)| rebalances)
    }

    /// Removes the entry for `key`, returning its value.
    #[inline]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.remove(key).ok().map(|(node, _)| node.value)
    }

    /// Returns the value associated with the minimum key in the map.
    ///
    /// This operation completes in _O(1)_ time.
    #[inline]
    pub fn min(&self) -> Option<&V> {
        self.tree.first().map(|node| &node.get_ref().value)
    }

    /// Returns the value associated with the maximum key in the map.
    ///
    /// This operation completes in _O(1)_ time.
    #[inline]
    pub fn max(&self) -> Option<&V> {
        self.tree.last().map(|node| &node.get_ref().value)
    }

    /// Returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.tree.first().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.tree.pop_first().map(|node| {
            let MapNode { key, value, .. } = *node;
            (key, value)
        })
    }

    /// Returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.tree.last().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.tree.pop_last().map(|node| {
            let MapNode { key, value, .. } = *node;
            (key, value)
        })
    }

    /// Returns the key-value pair at position `index` in key order, counting from zero.
    pub fn get_by_index(&self, index: usize) -> Option<(&K, &V)> {
        self.tree.get_by_index(index).map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Returns the position of `key` in key order, counting from zero.
    pub fn index_of<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.index_of(key)
    }

    /// Returns every key in the map, in order.
    ///
    /// This operation completes in _O(n)_ time.
    pub fn keys_to_vec(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.tree.to_vec().into_iter().map(|node| node.key.clone()).collect()
    }

    /// Returns every value in the map, ordered by key.
    ///
    /// This operation completes in _O(n)_ time.
    pub fn values_to_vec(&self) -> Vec<&V> {
        self.tree.to_vec().into_iter().map(|node| &node.value).collect()
    }

    /// Returns an iterator over the entries of the map, in key order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&K, &V)> + '_ {
        self.tree.iter().map(|node| (&node.key, &node.value))
    }

    /// Joins the entry `(key, value)` and every entry of `other` into this map.
    ///
    /// The keys of one map must all be less than `key`, and the keys of the other map must all be
    /// greater; either map may hold the smaller keys. Violating this leaves the map out of order.
    ///
    /// Returns the cost of the join, `|self.height() - other.height()| + 1`.
    pub fn join(&mut self, key: K, value: V, other: AvlMap<K, V>) -> usize {
        self.tree.join(MapNode::new(key, value), other.tree)
    }

    /// Splits the map around `key`, returning the entries with keys less than `key` and the
    /// entries with keys greater than `key`.
    ///
    /// The entry for `key` itself, if any, is dropped.
    pub fn split<Q>(self, key: &Q) -> (AvlMap<K, V>, AvlMap<K, V>)
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let (less, _, greater) = self.tree.split(key);
        (AvlMap { tree: less }, AvlMap { tree: greater })
    }

    /// Clears the map, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    #[doc(hidden)]
    #[track_caller]
    pub fn assert_invariants(&self) {
        self.tree.assert_invariants();
    }
}

impl<K: Ord + fmt::Debug, V> Default for AvlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for AvlMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
