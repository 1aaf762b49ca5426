use std::ops::Range;

use cordyceps::Linked;
use proptest::prelude::*;

use crate::model::{self, TestNode};

use super::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tree_of(keys: &[u32]) -> AvlTree<TestNode> {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        tree.insert(TestNode::new(key)).expect("keys are distinct");
    }

    tree
}

fn keys_of(tree: &AvlTree<TestNode>) -> Vec<u32> {
    tree.iter().map(|node| node.key).collect()
}

fn preorder_at(node: NodeRef<'_, TestNode>) -> Vec<u32> {
    fn walk(node: NodeRef<'_, TestNode>, out: &mut Vec<u32>) {
        if let Some(&key) = node.key() {
            out.push(key);
            walk(node.left(), out);
            walk(node.right(), out);
        }
    }

    let mut out = Vec::new();
    walk(node, &mut out);
    out
}

fn preorder(tree: &AvlTree<TestNode>) -> Vec<u32> {
    tree.root().map_or_else(Vec::new, preorder_at)
}

// Returns the key and preorder of the root's left-left grandchild subtree. Inserting and then
// removing a new maximum only restructures the right spine and the nodes next to it, so this
// subtree comes back unchanged.
fn far_left_subtree(tree: &AvlTree<TestNode>) -> Option<(u32, Vec<u32>)> {
    let node = tree.root()?.left().left();
    Some((*node.key()?, preorder_at(node)))
}

fn subtree_preorder(tree: &AvlTree<TestNode>, key: u32) -> Vec<u32> {
    preorder_at(NodeRef::new(Some(find(tree, key))))
}

// Builds a tree with exactly the shape described by `keys` in preorder. Heights and sizes are
// computed from the shape; the rank rule is not enforced.
fn from_preorder(keys: &[u32]) -> AvlTree<TestNode> {
    fn build(keys: &[u32]) -> Link<TestNode> {
        let (&key, rest) = keys.split_first()?;
        let split = rest.iter().position(|&k| k > key).unwrap_or(rest.len());
        let left = build(&rest[..split]);
        let right = build(&rest[split..]);

        let node = TestNode::into_ptr(TestNode::new(key));

        unsafe {
            let links = AvlTree::<TestNode>::links_mut(node);
            links.set_left(left);
            links.set_right(right);

            let rank = AvlTree::<TestNode>::rank(left).max(AvlTree::<TestNode>::rank(right));
            links.set_height(rank + 1);
            links.set_size(AvlTree::<TestNode>::size(left) + AvlTree::<TestNode>::size(right) + 1);

            AvlTree::<TestNode>::maybe_set_parent(left, Some(node));
            AvlTree::<TestNode>::maybe_set_parent(right, Some(node));
        }

        Some(node)
    }

    let mut tree: AvlTree<TestNode> = AvlTree::new();
    tree.root = build(keys);

    unsafe {
        tree.first = tree.root.map(|root| AvlTree::min_in_subtree(root).0);
        tree.last = tree.root.map(|root| AvlTree::max_in_subtree(root));
    }

    tree
}

fn find(tree: &AvlTree<TestNode>, key: u32) -> NonNull<TestNode> {
    match tree.search_raw(&key) {
        Search::Found(node) => node,
        Search::Vacant(_) => panic!("{key} not found"),
    }
}

// Checks sizes and parent links only, for trees that need not be balanced.
fn assert_sizes(tree: &AvlTree<TestNode>) {
    fn walk(node: NodeRef<'_, TestNode>) -> usize {
        if !node.is_real() {
            return 0;
        }

        for child in [node.left(), node.right()] {
            if child.is_real() {
                assert_eq!(child.parent(), Some(node), "{child:?} has the wrong parent");
            }
        }

        let size = walk(node.left()) + walk(node.right()) + 1;
        assert_eq!(node.size(), size, "{node:?} has the wrong size");
        size
    }

    if let Some(root) = tree.root() {
        assert_eq!(root.parent(), None);
        walk(root);
    }
}

fn insert_find_all(keys: &[u32]) {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_ok());
        tree.assert_invariants();
    }

    for key in keys {
        let node = tree.get(key).expect("item not found");
        assert_eq!(node.key(), key);
    }
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn two_elems_find() {
    insert_find_all(&[0, 1]);
    insert_find_all(&[1, 0]);
}

#[test]
fn three_elems_find() {
    insert_find_all(&[0, 1, 2]);
    insert_find_all(&[0, 2, 1]);
    insert_find_all(&[1, 0, 2]);
    insert_find_all(&[1, 2, 0]);
    insert_find_all(&[2, 0, 1]);
    insert_find_all(&[2, 1, 0]);
}

#[test]
fn four_elems_find() {
    insert_find_all(&[0, 1, 2, 3]);
    insert_find_all(&[0, 1, 3, 2]);
    insert_find_all(&[0, 2, 1, 3]);
    insert_find_all(&[0, 2, 3, 1]);
    insert_find_all(&[0, 3, 1, 2]);
    insert_find_all(&[0, 3, 2, 1]);

    insert_find_all(&[1, 0, 2, 3]);
    insert_find_all(&[1, 0, 3, 2]);
    insert_find_all(&[1, 2, 0, 3]);
    insert_find_all(&[1, 2, 3, 0]);
    insert_find_all(&[1, 3, 0, 2]);
    insert_find_all(&[1, 3, 2, 0]);

    insert_find_all(&[2, 0, 1, 3]);
    insert_find_all(&[2, 0, 3, 1]);
    insert_find_all(&[2, 1, 0, 3]);
    insert_find_all(&[2, 1, 3, 0]);
    insert_find_all(&[2, 3, 0, 1]);
    insert_find_all(&[2, 3, 1, 0]);

    insert_find_all(&[3, 0, 1, 2]);
    insert_find_all(&[3, 0, 2, 1]);
    insert_find_all(&[3, 1, 0, 2]);
    insert_find_all(&[3, 1, 2, 0]);
    insert_find_all(&[3, 2, 0, 1]);
    insert_find_all(&[3, 2, 1, 0]);
}

fn insert_remove_all(keys: &[u32]) {
    let mut tree = tree_of(keys);
    tree.assert_invariants();

    for key in keys {
        let (node, _) = tree.remove(key).expect("item not found");
        assert_eq!(node.key, *key);
        tree.assert_invariants();
    }

    assert!(tree.is_empty());

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_ok());
        tree.assert_invariants();
    }

    for key in keys.iter().rev() {
        assert!(tree.remove(key).is_ok());
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
}

#[test]
fn remove_one() {
    insert_remove_all(&[0]);
}

#[test]
fn remove_two() {
    insert_remove_all(&[0, 1]);
    insert_remove_all(&[1, 0]);
}

#[test]
fn remove_three() {
    insert_remove_all(&[0, 1, 2]);
    insert_remove_all(&[0, 2, 1]);
    insert_remove_all(&[1, 0, 2]);
    insert_remove_all(&[1, 2, 0]);
    insert_remove_all(&[2, 0, 1]);
    insert_remove_all(&[2, 1, 0]);
}

#[test]
fn remove_four() {
    insert_remove_all(&[0, 1, 2, 3]);
    insert_remove_all(&[0, 1, 3, 2]);
    insert_remove_all(&[0, 2, 1, 3]);
    insert_remove_all(&[0, 2, 3, 1]);
    insert_remove_all(&[0, 3, 1, 2]);
    insert_remove_all(&[0, 3, 2, 1]);

    insert_remove_all(&[1, 0, 2, 3]);
    insert_remove_all(&[1, 0, 3, 2]);
    insert_remove_all(&[1, 2, 0, 3]);
    insert_remove_all(&[1, 2, 3, 0]);
    insert_remove_all(&[1, 3, 0, 2]);
    insert_remove_all(&[1, 3, 2, 0]);

    insert_remove_all(&[2, 0, 1, 3]);
    insert_remove_all(&[2, 0, 3, 1]);
    insert_remove_all(&[2, 1, 0, 3]);
    insert_remove_all(&[2, 1, 3, 0]);
    insert_remove_all(&[2, 3, 0, 1]);
    insert_remove_all(&[2, 3, 1, 0]);

    insert_remove_all(&[3, 0, 1, 2]);
    insert_remove_all(&[3, 0, 2, 1]);
    insert_remove_all(&[3, 1, 0, 2]);
    insert_remove_all(&[3, 1, 2, 0]);
    insert_remove_all(&[3, 2, 0, 1]);
    insert_remove_all(&[3, 2, 1, 0]);
}

#[test]
fn duplicate_insert_returns_the_item() {
    let mut tree = tree_of(&[2, 1, 3]);
    let before = preorder(&tree);

    let err = tree.insert(TestNode::new(1)).unwrap_err();
    assert_eq!(err.kind(), Error::KeyAlreadyExists);
    assert_eq!(err.item().key, 1);
    assert_eq!(Error::from(err), Error::KeyAlreadyExists);

    assert_eq!(preorder(&tree), before);
    assert_eq!(tree.len(), 3);
    tree.assert_invariants();
}

#[test]
fn remove_missing_key() {
    let mut tree = tree_of(&[2, 1, 3]);

    assert_eq!(tree.remove(&4).err(), Some(Error::KeyNotFound));
    assert_eq!(tree.remove(&4).err(), Some(Error::KeyNotFound));
    assert_eq!(preorder(&tree), [2, 1, 3]);

    let mut empty: AvlTree<TestNode> = AvlTree::new();
    assert_eq!(empty.remove(&0).err(), Some(Error::KeyNotFound));
    assert_eq!(empty.pop_first().map(|node| node.key), None);
    assert_eq!(empty.pop_last().map(|node| node.key), None);
}

#[test]
fn insert_sequence_stays_balanced() {
    init_tracing();

    let keys = [15, 11, 17, 18, 12, 13];
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for (n, &key) in keys.iter().enumerate() {
        assert!(tree.insert(TestNode::new(key)).is_ok());
        tree.assert_invariants();
        assert_eq!(tree.len(), n + 1);
    }

    assert_eq!(keys_of(&tree), [11, 12, 13, 15, 17, 18]);
    assert_eq!(tree.first().map(|node| node.key), Some(11));
    assert_eq!(tree.last().map(|node| node.key), Some(18));
}

#[test]
fn remove_with_two_children() {
    init_tracing();

    let mut tree = from_preorder(&[10, 7, 5, 8, 20, 16, 25, 22]);
    tree.assert_invariants();

    let (node, rotations) = tree.remove(&20).expect("20 is present");
    assert_eq!(node.key, 20);
    assert_eq!(rotations, 0);

    tree.assert_invariants();
    assert_eq!(preorder(&tree), [10, 7, 5, 8, 22, 16, 25]);
}

#[test]
fn join_equal_sizes() {
    init_tracing();

    let mut less = tree_of(&[1, 2, 3, 4, 5, 8]);
    let greater = tree_of(&[10, 12, 13, 19, 20, 35]);

    let cost = less.join(TestNode::new(9), greater);
    assert_eq!(cost, 1);
    assert_eq!(less.len(), 13);
    assert_eq!(
        keys_of(&less),
        [1, 2, 3, 4, 5, 8, 9, 10, 12, 13, 19, 20, 35]
    );
    less.assert_invariants();
}

#[test]
fn split_at_present_key() {
    init_tracing();

    let tree = from_preorder(&[101, 79, 52, 137, 276]);
    tree.assert_invariants();

    let (less, found, greater) = tree.split(&137);

    assert_eq!(found.map(|node| node.key), Some(137));
    assert_eq!(keys_of(&less), [52, 79, 101]);
    assert_eq!(keys_of(&greater), [276]);

    less.assert_invariants();
    greater.assert_invariants();
}

#[test]
fn split_at_absent_key() {
    let tree = tree_of(&[10, 20, 30, 40, 50, 60, 70]);

    let (less, found, greater) = tree.split(&35);

    assert!(found.is_none());
    assert_eq!(keys_of(&less), [10, 20, 30]);
    assert_eq!(keys_of(&greater), [40, 50, 60, 70]);
    assert_eq!(less.first().map(|node| node.key), Some(10));
    assert_eq!(less.last().map(|node| node.key), Some(30));
    assert_eq!(greater.first().map(|node| node.key), Some(40));
    assert_eq!(greater.last().map(|node| node.key), Some(70));

    less.assert_invariants();
    greater.assert_invariants();
}

#[test]
fn split_empty() {
    let tree: AvlTree<TestNode> = AvlTree::new();
    let (less, found, greater) = tree.split(&1);

    assert!(less.is_empty());
    assert!(found.is_none());
    assert!(greater.is_empty());
}

#[test]
fn insert_then_remove_maximum_keeps_shape() {
    // No rotation on the way in or out: the whole tree comes back.
    let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);
    let before = preorder(&tree);

    assert_eq!(tree.insert(TestNode::new(8)).ok(), Some(0));
    assert_eq!(tree.remove(&8).map(|(_, rotations)| rotations), Ok(0));
    assert_eq!(preorder(&tree), before);
    tree.assert_invariants();

    // Inserting 12 rotates at the root. The subtree left of the spine survives the round trip.
    let mut tree = tree_of(&[4, 2, 8, 1, 3, 6, 10, 5, 7, 9, 11]);
    let untouched = far_left_subtree(&tree).expect("tree has a left-left grandchild");
    assert_eq!(untouched, (1, vec![1]));
    assert_eq!(subtree_preorder(&tree, 2), [2, 1, 3]);

    assert_eq!(tree.insert(TestNode::new(12)).ok(), Some(1));
    assert_eq!(tree.root().and_then(|root| root.key().copied()), Some(8));
    assert_eq!(tree.remove(&12).map(|(_, rotations)| rotations), Ok(0));

    assert_eq!(subtree_preorder(&tree, untouched.0), untouched.1);
    assert_eq!(subtree_preorder(&tree, 2), [2, 1, 3]);
    assert_eq!(keys_of(&tree), [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
    tree.assert_invariants();
}

#[test]
fn insert_rotation_counts() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    let counts: Vec<usize> = [1, 2, 3]
        .into_iter()
        .map(|key| tree.insert(TestNode::new(key)).expect("keys are distinct"))
        .collect();
    assert_eq!(counts, [0, 0, 1]);
    assert_eq!(preorder(&tree), [2, 1, 3]);

    let mut tree: AvlTree<TestNode> = AvlTree::new();
    let counts: Vec<usize> = [3, 1, 2]
        .into_iter()
        .map(|key| tree.insert(TestNode::new(key)).expect("keys are distinct"))
        .collect();
    assert_eq!(counts, [0, 0, 2]);
    assert_eq!(preorder(&tree), [2, 1, 3]);

    // Promotions alone are not counted.
    let mut tree = tree_of(&[2, 1, 3]);
    assert_eq!(tree.insert(TestNode::new(4)).ok(), Some(0));
    assert_eq!(tree.height(), 2);
}

#[test]
fn remove_rotation_counts() {
    let mut tree = tree_of(&[2, 1, 3, 4]);
    let (_, rotations) = tree.remove(&1).expect("1 is present");
    assert_eq!(rotations, 1);
    assert_eq!(preorder(&tree), [3, 2, 4]);
    tree.assert_invariants();

    // The inner grandchild is taller, so removal needs a double rotation.
    let mut tree = tree_of(&[2, 1, 4, 3]);
    let (_, rotations) = tree.remove(&1).expect("1 is present");
    assert_eq!(rotations, 2);
    assert_eq!(preorder(&tree), [3, 2, 4]);
    tree.assert_invariants();

    // Both grandchildren are equally tall: one rotation and the height is unchanged.
    let mut tree = tree_of(&[2, 1, 4, 3, 5]);
    let (_, rotations) = tree.remove(&1).expect("1 is present");
    assert_eq!(rotations, 1);
    assert_eq!(preorder(&tree), [4, 2, 3, 5]);
    assert_eq!(tree.height(), 2);
    tree.assert_invariants();
}

#[test]
fn rotate_left_child_up() {
    let mut tree = from_preorder(&[38, 25, 10, 8, 7, 9, 13, 15, 14, 29, 27, 31, 33]);
    let down = find(&tree, 25);
    let up = find(&tree, 10);

    assert_eq!(tree.rotate_at(down, up), 1);

    assert_eq!(
        preorder(&tree),
        [38, 10, 8, 7, 9, 25, 13, 15, 14, 29, 27, 31, 33]
    );
    assert_sizes(&tree);
}

#[test]
fn rotate_right_child_up() {
    let mut tree = from_preorder(&[38, 25, 10, 8, 7, 9, 13, 15, 14, 29, 27, 31, 33]);
    let down = find(&tree, 29);
    let up = find(&tree, 31);

    assert_eq!(tree.rotate_at(down, up), 1);

    assert_eq!(
        preorder(&tree),
        [38, 25, 10, 8, 7, 9, 13, 15, 14, 31, 29, 27, 33]
    );
    assert_sizes(&tree);
}

#[test]
fn rotate_root() {
    let mut tree = from_preorder(&[2, 1, 4, 3, 5]);
    let down = find(&tree, 2);
    let up = find(&tree, 4);

    assert_eq!(tree.rotate_at(down, up), 1);

    assert_eq!(preorder(&tree), [4, 2, 1, 3, 5]);
    assert_eq!(tree.root().and_then(|root| root.key().copied()), Some(4));
    assert_sizes(&tree);
}

#[test]
fn rotate_twice() {
    let mut tree = from_preorder(&[5, 1, 3, 2, 4]);
    let down_second = find(&tree, 5);
    let down_first = find(&tree, 1);
    let up = find(&tree, 3);

    assert_eq!(tree.rotate_twice_at(down_second, down_first, up), 2);

    assert_eq!(preorder(&tree), [3, 1, 2, 5, 4]);
    assert_sizes(&tree);
}

// A separator that is 1,1 and a 0-child at once cannot be produced by a single insertion. Joining
// a tall-enough shorter tree onto a two-node spine produces it from either side.
#[test]
fn join_rotates_balanced_separator_from_the_left() {
    init_tracing();

    let mut less = tree_of(&[1, 2]);
    let greater = tree_of(&[10]);

    let cost = less.join(TestNode::new(5), greater);

    assert_eq!(cost, 2);
    assert_eq!(preorder(&less), [5, 1, 2, 10]);
    assert_eq!(less.height(), 2);
    less.assert_invariants();
}

#[test]
fn join_rotates_balanced_separator_from_the_right() {
    init_tracing();

    let mut less = tree_of(&[1]);
    let greater = tree_of(&[20, 10]);

    let cost = less.join(TestNode::new(5), greater);

    assert_eq!(cost, 2);
    assert_eq!(preorder(&less), [5, 1, 20, 10]);
    assert_eq!(less.height(), 2);
    less.assert_invariants();
}

#[test]
fn join_from_either_side() {
    let mut greater = tree_of(&[10, 11, 12]);
    let less = tree_of(&[1, 2, 3, 4, 5, 6, 7]);

    let cost = greater.join(TestNode::new(8), less);

    assert_eq!(cost, 2);
    assert_eq!(keys_of(&greater), [1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12]);
    assert_eq!(greater.first().map(|node| node.key), Some(1));
    assert_eq!(greater.last().map(|node| node.key), Some(12));
    greater.assert_invariants();
}

#[test]
fn join_empty_trees() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    assert_eq!(tree.join(TestNode::new(7), AvlTree::new()), 1);
    assert_eq!(keys_of(&tree), [7]);
    tree.assert_invariants();

    let mut tree: AvlTree<TestNode> = AvlTree::new();
    assert_eq!(tree.join(TestNode::new(0), tree_of(&[1, 2, 3])), 3);
    assert_eq!(keys_of(&tree), [0, 1, 2, 3]);
    tree.assert_invariants();
}

#[test]
fn extremes_follow_removals() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);

    for expected in 1..=3 {
        assert_eq!(tree.first().map(|node| node.key), Some(expected));
        assert!(tree.remove(&expected).is_ok());
    }

    assert_eq!(tree.first().map(|node| node.key), Some(4));
    assert_eq!(tree.pop_last().map(|node| node.key), Some(7));
    assert_eq!(tree.last().map(|node| node.key), Some(6));
    tree.assert_invariants();
}

#[test]
fn order_statistics() {
    let tree = tree_of(&[50, 20, 80, 10, 30, 70, 90, 60]);
    let keys = keys_of(&tree);

    for (index, key) in keys.iter().enumerate() {
        assert_eq!(tree.get_by_index(index).map(|node| node.key), Some(*key));
        assert_eq!(tree.index_of(key), Some(index));
    }

    assert!(tree.get_by_index(keys.len()).is_none());
    assert_eq!(tree.index_of(&55), None);
}

#[test]
fn to_vec_matches_iter() {
    let tree = tree_of(&[8, 3, 10, 1, 6, 14, 4, 7, 13]);

    let from_vec: Vec<u32> = tree.to_vec().into_iter().map(|node| node.key).collect();
    assert_eq!(from_vec, keys_of(&tree));
    assert_eq!(tree.iter().len(), 9);

    let empty: AvlTree<TestNode> = AvlTree::new();
    assert!(empty.to_vec().is_empty());
    assert_eq!(empty.iter().next().map(|node| node.key), None);
}

#[test]
fn node_refs_expose_sentinels() {
    let tree = tree_of(&[2, 1]);
    let root = tree.root().expect("tree is not empty");

    assert!(root.is_real());
    assert_eq!(root.key(), Some(&2));
    assert_eq!(root.height(), 1);
    assert_eq!(root.size(), 2);
    assert_eq!(root.parent(), None);

    let left = root.left();
    assert_eq!(left.key(), Some(&1));
    assert_eq!(left.parent(), Some(root));

    let sentinel = root.right();
    assert!(!sentinel.is_real());
    assert!(sentinel.get().is_none());
    assert_eq!(sentinel.height(), -1);
    assert_eq!(sentinel.size(), 0);
    assert_eq!(sentinel.parent(), None);
    assert!(!sentinel.left().is_real());
    assert!(!sentinel.right().is_real());
    assert_eq!(format!("{sentinel:?}"), "Sentinel");

    let empty: AvlTree<TestNode> = AvlTree::new();
    assert!(empty.root().is_none());
    assert_eq!(empty.height(), -1);
}

#[test]
fn clear_empties_the_tree() {
    let mut tree = tree_of(&[5, 3, 8, 1, 4, 7, 9]);
    tree.clear();

    assert!(tree.is_empty());
    assert_eq!(tree.len(), 0);
    assert!(tree.first().is_none());
    assert!(tree.last().is_none());
    tree.assert_invariants();

    assert!(tree.insert(TestNode::new(1)).is_ok());
    tree.assert_invariants();
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }

    #[test]
    fn split_join_equivalence(input in model::split_join_strategy()) {
        model::run_split_join_equivalence(input.values, input.pivot);
    }

    #[test]
    fn inserts_keep_invariants(keys in proptest::collection::btree_set(0u32..10_000, FUZZ_RANGE)) {
        let mut tree: AvlTree<TestNode> = AvlTree::new();

        for (n, &key) in keys.iter().enumerate() {
            prop_assert!(tree.insert(TestNode::new(key)).is_ok());
            tree.assert_invariants();
            prop_assert_eq!(tree.len(), n + 1);
        }
    }

    #[test]
    fn insert_then_remove_restores_keys(
        keys in proptest::collection::btree_set(0u32..10_000, FUZZ_RANGE),
        extra in 10_000u32..20_000,
    ) {
        let keys: Vec<u32> = keys.into_iter().collect();
        let mut tree = tree_of(&keys);
        let untouched = far_left_subtree(&tree);

        prop_assert!(tree.insert(TestNode::new(extra)).is_ok());
        tree.assert_invariants();

        let removed = tree.remove(&extra).map(|(node, _)| node.key);
        prop_assert_eq!(removed, Ok(extra));
        tree.assert_invariants();
        prop_assert_eq!(keys_of(&tree), keys);

        if let Some((key, shape)) = untouched {
            prop_assert_eq!(subtree_preorder(&tree, key), shape);
        }
    }

    #[test]
    fn join_law(
        less in proptest::collection::btree_set(0u32..500, 0..200),
        greater in proptest::collection::btree_set(501u32..1000, 0..200),
        from_less in any::<bool>(),
    ) {
        let less: Vec<u32> = less.into_iter().collect();
        let greater: Vec<u32> = greater.into_iter().collect();

        let less_tree = tree_of(&less);
        let greater_tree = tree_of(&greater);
        let expected_cost = (less_tree.height() - greater_tree.height()).unsigned_abs() as usize + 1;

        let (mut joined, other) = if from_less {
            (less_tree, greater_tree)
        } else {
            (greater_tree, less_tree)
        };

        prop_assert_eq!(joined.join(TestNode::new(500), other), expected_cost);
        joined.assert_invariants();

        let mut expected = less;
        expected.push(500);
        expected.extend(greater);

        prop_assert_eq!(joined.len(), expected.len());
        prop_assert_eq!(keys_of(&joined), expected);
    }
}
