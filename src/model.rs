use std::{collections::BTreeSet, ptr::NonNull};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{AvlTree, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
}

impl TestNode {
    pub fn new(key: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(r))
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

impl ItemValue {
    // Resolves to an element of `sorted` for `Index`, so that lookups and removals hit present
    // keys most of the time.
    fn resolve(self, sorted: &[u32]) -> u32 {
        match self {
            ItemValue::Index(idx) => {
                if sorted.is_empty() {
                    idx as u32
                } else {
                    sorted[idx % sorted.len()]
                }
            }
            ItemValue::Random(v) => v,
        }
    }
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

pub fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    Get(ItemValue),
    Remove(ItemValue),
    IndexOf(ItemValue),
    GetByIndex(usize),
    First,
    PopFirst,
    Last,
    PopLast,
}

impl Op {
    fn finalize(self, sorted: &[u32]) -> FinalOp {
        match self {
            Op::Insert(item) => FinalOp::Insert(item.resolve(sorted)),
            Op::Get(item) => FinalOp::Get(item.resolve(sorted)),
            Op::Remove(item) => FinalOp::Remove(item.resolve(sorted)),
            Op::IndexOf(item) => FinalOp::IndexOf(item.resolve(sorted)),
            Op::GetByIndex(index) => FinalOp::GetByIndex(index % (sorted.len() + 1)),
            Op::First => FinalOp::First,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Last => FinalOp::Last,
            Op::PopLast => FinalOp::PopLast,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32),
    Get(u32),
    Remove(u32),
    IndexOf(u32),
    GetByIndex(usize),
    First,
    PopFirst,
    Last,
    PopLast,
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        value_strategy().prop_map(Op::Insert),
        value_strategy().prop_map(Op::Get),
        value_strategy().prop_map(Op::Remove),
        value_strategy().prop_map(Op::IndexOf),
        (0usize..1000).prop_map(Op::GetByIndex),
        Just(Op::First),
        Just(Op::PopFirst),
        Just(Op::Last),
        Just(Op::PopLast),
    ]
}

pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut sorted_values = Vec::with_capacity(ops.len());
    let mut btree = BTreeSet::new();
    let mut avl: AvlTree<TestNode> = AvlTree::new();

    fn insert_sorted(v: &mut Vec<u32>, value: u32) {
        if let Err(idx) = v.binary_search(&value) {
            v.insert(idx, value);
        }
    }

    fn remove_sorted(v: &mut Vec<u32>, value: u32) {
        if let Ok(idx) = v.binary_search(&value) {
            v.remove(idx);
        }
    }

    #[inline]
    #[allow(clippy::boxed_local)]
    fn node_key(node: Box<TestNode>) -> u32 {
        node.key
    }

    #[inline]
    fn ref_key(node: &TestNode) -> &u32 {
        &node.key
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let final_op = op.finalize(&sorted_values);

        match final_op {
            FinalOp::Insert(value) => {
                let from_btree = if btree.insert(value) {
                    None
                } else {
                    Some(value)
                };
                let from_avl = avl
                    .insert(TestNode::new(value))
                    .err()
                    .map(|err| node_key(err.into_inner()));

                insert_sorted(&mut sorted_values, value);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Get(value) => {
                let from_btree = btree.get(&value);
                let from_avl = avl.get(&value).map(|node| ref_key(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Remove(value) => {
                remove_sorted(&mut sorted_values, value);

                let from_btree = btree.remove(&value).then_some(value);
                let from_avl = avl.remove(&value).ok().map(|(node, _)| node_key(node));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::IndexOf(value) => {
                let from_sorted = sorted_values.binary_search(&value).ok();
                let from_avl = avl.index_of(&value);

                assert_eq!(from_sorted, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::GetByIndex(index) => {
                let from_sorted = sorted_values.get(index);
                let from_avl = avl
                    .get_by_index(index)
                    .map(|node| ref_key(node.get_ref()));

                assert_eq!(from_sorted, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                let from_btree = btree.first();
                let from_avl = avl.first().map(|node| ref_key(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                let from_btree = btree.pop_first();
                let from_avl = avl.pop_first().map(node_key);

                if let Some(value) = from_btree {
                    remove_sorted(&mut sorted_values, value);
                }

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                let from_btree = btree.last();
                let from_avl = avl.last().map(|node| ref_key(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                let from_btree = btree.pop_last();
                let from_avl = avl.pop_last().map(node_key);

                if let Some(value) = from_btree {
                    remove_sorted(&mut sorted_values, value);
                }

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }
        }

        avl.assert_invariants();
        assert_eq!(btree.len(), avl.len());
        assert!(btree.iter().zip(avl.iter()).all(|(&a, b)| a == b.key));
        assert!(btree
            .iter()
            .zip(avl.to_vec())
            .all(|(&a, b)| a == b.key));
    }
}

#[derive(Clone, Debug, Arbitrary)]
pub struct SplitJoinInput {
    pub values: Vec<u32>,
    pub pivot: ItemValue,
}

pub fn split_join_strategy() -> impl Strategy<Value = SplitJoinInput> {
    (
        proptest::collection::vec(0u32..1000, 0..200),
        value_strategy(),
    )
        .prop_map(|(values, pivot)| SplitJoinInput { values, pivot })
}

fn keys(tree: &AvlTree<TestNode>) -> Vec<u32> {
    tree.iter().map(|node| node.key).collect()
}

/// Splits a tree built from `values` at `pivot`, checks both halves, then joins them back
/// together around the pivot.
pub fn run_split_join_equivalence(mut values: Vec<u32>, pivot: ItemValue) {
    values.sort_unstable();
    values.dedup();

    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for &value in &values {
        assert!(tree.insert(TestNode::new(value)).is_ok());
    }

    let pivot = pivot.resolve(&values);
    let (less, found, greater) = tree.split(&pivot);

    less.assert_invariants();
    greater.assert_invariants();

    let expected_less: Vec<u32> = values.iter().copied().filter(|&v| v < pivot).collect();
    let expected_greater: Vec<u32> = values.iter().copied().filter(|&v| v > pivot).collect();
    let present = values.binary_search(&pivot).is_ok();

    assert_eq!(keys(&less), expected_less, "split at {pivot}");
    assert_eq!(keys(&greater), expected_greater, "split at {pivot}");
    assert_eq!(found.as_ref().map(|node| node.key), present.then_some(pivot));
    assert_eq!(
        less.len() + greater.len() + usize::from(present),
        values.len()
    );

    let expected_cost = (less.height() - greater.height()).unsigned_abs() as usize + 1;
    let separator = found.unwrap_or_else(|| TestNode::new(pivot));

    // Join from either side depending on the pivot's parity, to cover both directions.
    let joined = if pivot % 2 == 0 {
        let mut joined = less;
        assert_eq!(joined.join(separator, greater), expected_cost);
        joined
    } else {
        let mut joined = greater;
        assert_eq!(joined.join(separator, less), expected_cost);
        joined
    };

    joined.assert_invariants();

    let mut expected = values;
    if let Err(idx) = expected.binary_search(&pivot) {
        expected.insert(idx, pivot);
    }

    assert_eq!(keys(&joined), expected);
}
