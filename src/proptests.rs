use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::{BTreeMap, BTreeSet};

fn height_bound(nodes: usize) -> usize {
    (2.0 * ((nodes + 1) as f64).log2()).floor() as usize
}

fn validate_tree(t: &MerkleTree) {
    let index = t.index();
    if let Err(violation) = index.check_invariants() {
        panic!("red-black invariant violated: {violation}\n{index:?}");
    }
    assert!(
        index.depth() <= height_bound(index.len()),
        "height {} exceeds bound for {} nodes",
        index.depth(),
        index.len()
    );

    let keys: Vec<NodeKey> = index.iter().copied().collect();
    assert!(
        keys.windows(2).all(|w| w[0] < w[1]),
        "in-order keys must be strictly increasing"
    );

    let items = keys.iter().filter(|k| !k.is_anchor()).count();
    assert_eq!(items, t.len(), "item nodes must match MerkleTree::len");
    assert_eq!(t.store().len(), index.len(), "one node digest per index node");

    for key in &keys {
        assert_eq!(
            t.derive_digest(key).ok().as_ref(),
            t.node_digest(key),
            "stored digest of {key} must match its derivation"
        );
    }
}

fn item_digest(key: u64) -> Digest {
    Digest::hash(format!("item-{key}").as_bytes())
}

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    #[proptest(weight = 6)]
    Insert(u16),
    #[proptest(weight = 2)]
    Verify(u16),
    #[proptest(weight = 1)]
    VerifyFlipped(u16, u8),
    #[proptest(weight = 1)]
    Rebuild,
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_rbtree_equivalence(keys in prop::collection::vec(any::<i32>(), 0..=2000)) {
        let mut t: RbTree<i32> = RbTree::new();
        let mut m: BTreeSet<i32> = BTreeSet::new();

        for k in keys {
            prop_assert_eq!(t.insert(k).is_ok(), m.insert(k));
        }

        prop_assert_eq!(t.len(), m.len());
        prop_assert!(t.check_invariants().is_ok());
        prop_assert!(t.depth() <= height_bound(t.len()));
        let got: Vec<i32> = t.iter().copied().collect();
        let expected: Vec<i32> = m.iter().copied().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_merkle_equivalence(ops in prop::collection::vec(any::<Op>(), 0..=600)) {
        let mut t = MerkleTree::new();
        let mut m: BTreeMap<u64, Digest> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(key) => {
                    let key = u64::from(key);
                    let digest = item_digest(key);
                    let fresh = !m.contains_key(&key);
                    let res = t.insert_leaf(digest, key);
                    if fresh {
                        prop_assert_eq!(res, Ok(()));
                        m.insert(key, digest);
                    } else {
                        prop_assert_eq!(res, Err(TreeError::DuplicateKey(key)));
                    }
                }
                Op::Verify(key) => {
                    let key = u64::from(key);
                    let expected = if m.contains_key(&key) {
                        Verification::Verified
                    } else {
                        Verification::NotFound
                    };
                    prop_assert_eq!(t.verify(&item_digest(key), key), expected);
                }
                Op::VerifyFlipped(key, bit) => {
                    let key = u64::from(key);
                    let claim = item_digest(key).with_bit_flipped(usize::from(bit));
                    let expected = if m.contains_key(&key) {
                        Verification::DigestMismatch
                    } else {
                        Verification::NotFound
                    };
                    prop_assert_eq!(t.verify(&claim, key), expected);
                }
                Op::Rebuild => {
                    let root = t.root_digest();
                    prop_assert_eq!(t.rebuild_digests(), Ok(()));
                    prop_assert_eq!(t.root_digest(), root);
                }
            }

            prop_assert_eq!(t.len(), m.len());
        }

        validate_tree(&t);
        let expected_nodes = if m.is_empty() { 0 } else { 2 * m.len() - 1 };
        prop_assert_eq!(t.node_count(), expected_nodes);
        for (&key, digest) in &m {
            prop_assert_eq!(t.digest(key), Some(digest));
            prop_assert!(t.verify(digest, key).is_verified());
        }
    }

    #[test]
    fn prop_tampering_breaks_chain(
        keys in prop::collection::btree_set(any::<u32>(), 2..=300),
        pick in any::<prop::sample::Index>(),
        bit in 0usize..256,
    ) {
        let mut t = MerkleTree::new();
        for &k in &keys {
            t.insert_leaf(item_digest(u64::from(k)), u64::from(k)).unwrap();
        }

        // Tamper with any node whose parent aggregates two children.
        let index = t.index().clone();
        let ids = index.post_order();
        let victim = ids[pick.index(ids.len())];
        let Some(parent) = index.parent(victim) else {
            return Ok(());
        };
        if index.children(parent).is_none() {
            return Ok(());
        }

        let victim_key = *index.key(victim);
        let forged = t.node_digest(&victim_key).copied().unwrap().with_bit_flipped(bit);
        t.tamper_node_digest(victim_key, forged);

        // Every item strictly below the parent walks through the parent (or the victim).
        let mut stack = vec![index.left(parent), index.right(parent)];
        while let Some(next) = stack.pop() {
            let Some(id) = next else { continue };
            stack.push(index.left(id));
            stack.push(index.right(id));
            let key = *index.key(id);
            if key.is_anchor() {
                continue;
            }
            let outcome = t.verify(&item_digest(key.key), key.key);
            prop_assert!(
                matches!(outcome, Verification::ChainBroken { .. }),
                "tampering {} went unnoticed for item {}: {:?}", victim_key, key, outcome
            );
        }
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

#[test]
fn exhaustive_insert_order_small_set() {
    let keys: Vec<u64> = vec![10, 20, 30, 40, 50, 60, 70];

    for_each_permutation(&keys, |perm| {
        let mut t = MerkleTree::new();
        for &k in &perm {
            t.insert_leaf(item_digest(k), k).unwrap();
        }

        validate_tree(&t);
        for &k in &keys {
            assert_eq!(
                t.verify(&item_digest(k), k),
                Verification::Verified,
                "order {perm:?}, key {k}"
            );
        }
    });
}

#[test]
fn exhaustive_rbtree_insert_order() {
    let keys: Vec<i64> = (1..=8).collect();

    for_each_permutation(&keys, |perm| {
        let mut t = RbTree::new();
        for &k in &perm {
            assert!(t.insert(k).is_ok());
        }
        assert!(t.check_invariants().is_ok(), "order {perm:?}\n{t:?}");
        assert!(t.iter().copied().eq(keys.iter().copied()));
    });
}
