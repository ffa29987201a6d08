//! Randomized workloads checked against an in-memory model.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sable::{BPlusTree, CompositeKey, TreeOptions};
use std::collections::BTreeMap;

fn key(field_no: u8, seq: i64) -> CompositeKey {
    CompositeKey::new(format!("field-{field_no:02}").as_bytes(), seq).unwrap()
}

#[test]
fn random_workload_matches_btreemap() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = BPlusTree::open(&dir.path().join("idx"), TreeOptions::default()).unwrap();
    let mut model: BTreeMap<CompositeKey, u64> = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(0x5AB1E);
    let mut next_value = 0u64;

    for step in 0..4000 {
        let k = key(rng.gen_range(0..12), rng.gen_range(0..64));
        match rng.gen_range(0..10) {
            0..=5 => {
                let inserted = tree.insert(&k, &next_value.to_le_bytes()).unwrap();
                assert_eq!(inserted, !model.contains_key(&k), "insert disagreed at step {step}");
                if inserted {
                    model.insert(k, next_value);
                    next_value += 1;
                }
            }
            6..=8 => {
                let removed = tree.delete(&k).unwrap();
                assert_eq!(removed, model.remove(&k).is_some(), "delete disagreed at step {step}");
            }
            _ => {
                let got = tree.find_exact(&k).unwrap();
                let want = model.get(&k).map(|v| v.to_le_bytes().to_vec());
                assert_eq!(got, want, "lookup disagreed at step {step}");
            }
        }
        if step % 500 == 499 {
            tree.verify().unwrap();
        }
    }

    tree.verify().unwrap();
    let entries = tree.scan().unwrap();
    assert_eq!(entries.len(), model.len());
    for ((got_key, got_val), (want_key, want_val)) in entries.iter().zip(model.iter()) {
        assert_eq!(got_key, want_key);
        assert_eq!(got_val.as_slice(), &want_val.to_le_bytes());
    }
}

#[test]
fn random_workload_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idx");
    let mut model: BTreeMap<CompositeKey, u64> = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(0xD15C);
    let mut next_value = 0u64;

    for round in 0..4 {
        let mut tree = BPlusTree::open(&path, TreeOptions::default()).unwrap();
        for _ in 0..600 {
            let k = key(rng.gen_range(0..8), rng.gen_range(0..48));
            if rng.gen_bool(0.7) {
                if tree.insert(&k, &next_value.to_le_bytes()).unwrap() {
                    model.insert(k, next_value);
                    next_value += 1;
                }
            } else {
                assert_eq!(tree.delete(&k).unwrap(), model.remove(&k).is_some());
            }
        }
        tree.verify().unwrap();
        tree.close().unwrap();

        let mut tree = BPlusTree::open(&path, TreeOptions::default()).unwrap();
        tree.verify().unwrap();
        let entries = tree.scan().unwrap();
        assert_eq!(entries.len(), model.len(), "entry count drifted in round {round}");
        tree.close().unwrap();
    }
}

#[derive(Debug, Clone)]
enum Op {
    Insert(u8, i64),
    Delete(u8, i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..6u8, 0..24i64).prop_map(|(f, s)| Op::Insert(f, s)),
        (0..6u8, 0..24i64).prop_map(|(f, s)| Op::Delete(f, s)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn arbitrary_op_sequences_stay_consistent(ops in prop::collection::vec(op_strategy(), 1..200)) {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = BPlusTree::open(&dir.path().join("idx"), TreeOptions::default()).unwrap();
        let mut model: BTreeMap<CompositeKey, u64> = BTreeMap::new();
        let mut next_value = 0u64;

        for op in ops {
            match op {
                Op::Insert(f, s) => {
                    let k = key(f, s);
                    let inserted = tree.insert(&k, &next_value.to_le_bytes()).unwrap();
                    prop_assert_eq!(inserted, !model.contains_key(&k));
                    if inserted {
                        model.insert(k, next_value);
                        next_value += 1;
                    }
                }
                Op::Delete(f, s) => {
                    let k = key(f, s);
                    prop_assert_eq!(tree.delete(&k).unwrap(), model.remove(&k).is_some());
                }
            }
        }

        tree.verify().unwrap();
        let entries = tree.scan().unwrap();
        prop_assert_eq!(entries.len(), model.len());
        for ((got_key, got_val), (want_key, want_val)) in entries.iter().zip(model.iter()) {
            prop_assert_eq!(got_key, want_key);
            prop_assert_eq!(got_val.as_slice(), &want_val.to_le_bytes()[..]);
        }
    }
}
