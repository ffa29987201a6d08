use sable::{BPlusTree, CompositeKey, IndexError, TreeOptions, ValueMode};
use std::path::Path;

fn key(field: &[u8], seq: i64) -> CompositeKey {
    CompositeKey::new(field, seq).unwrap()
}

fn val(n: u64) -> [u8; 8] {
    n.to_le_bytes()
}

fn open(path: &Path) -> BPlusTree {
    BPlusTree::open(path, TreeOptions::default()).unwrap()
}

#[test]
fn insert_find_delete() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = open(&dir.path().join("idx"));

    tree.insert(&key(b"alice", 1), &val(10)).unwrap();
    tree.insert(&key(b"bob", 1), &val(20)).unwrap();

    assert_eq!(tree.find_exact(&key(b"alice", 1)).unwrap(), Some(val(10).to_vec()));
    assert_eq!(tree.find_exact(&key(b"bob", 1)).unwrap(), Some(val(20).to_vec()));
    assert_eq!(tree.find_exact(&key(b"carol", 1)).unwrap(), None);
    // Same field, different sequence: a different key.
    assert_eq!(tree.find_exact(&key(b"alice", 2)).unwrap(), None);

    assert!(!tree.delete(&key(b"carol", 1)).unwrap());
    assert!(tree.delete(&key(b"alice", 1)).unwrap());
    assert_eq!(tree.find_exact(&key(b"alice", 1)).unwrap(), None);
    assert!(!tree.delete(&key(b"alice", 1)).unwrap());

    tree.verify().unwrap();
    tree.close().unwrap();
}

#[test]
fn duplicate_insert_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = open(&dir.path().join("idx"));

    assert!(tree.insert(&key(b"alice", 1), &val(1)).unwrap());
    assert!(!tree.insert(&key(b"alice", 1), &val(2)).unwrap());

    // The original value survives the refused insert.
    assert_eq!(tree.find_exact(&key(b"alice", 1)).unwrap(), Some(val(1).to_vec()));
    // Same field with a fresh sequence is a new key.
    assert!(tree.insert(&key(b"alice", 2), &val(2)).unwrap());
}

#[test]
fn contents_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idx");

    {
        let mut tree = open(&path);
        for i in 0..200i64 {
            tree.insert(&key(format!("user-{i:04}").as_bytes(), i), &val(i as u64))
                .unwrap();
        }
        tree.close().unwrap();
    }

    let mut tree = open(&path);
    tree.verify().unwrap();
    for i in 0..200i64 {
        assert_eq!(
            tree.find_exact(&key(format!("user-{i:04}").as_bytes(), i)).unwrap(),
            Some(val(i as u64).to_vec()),
            "key {i} lost across reopen"
        );
    }
    let entries = tree.scan().unwrap();
    assert_eq!(entries.len(), 200);
    assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
}

#[test]
fn drop_without_close_still_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idx");

    {
        let mut tree = open(&path);
        tree.insert(&key(b"alice", 1), &val(7)).unwrap();
        // Dropped here without an explicit close.
    }

    let mut tree = open(&path);
    assert_eq!(tree.find_exact(&key(b"alice", 1)).unwrap(), Some(val(7).to_vec()));
}

#[test]
fn indirect_values_behave_like_inline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idx");
    let options = TreeOptions {
        value_len: 24,
        value_mode: ValueMode::Indirect,
        ..TreeOptions::default()
    };

    {
        let mut tree = BPlusTree::open(&path, options).unwrap();
        tree.insert(&key(b"alice", 1), b"first payload").unwrap();
        tree.insert(&key(b"bob", 2), b"second payload").unwrap();
        tree.close().unwrap();
    }

    let mut tree = BPlusTree::open(&path, options).unwrap();
    let got = tree.find_exact(&key(b"alice", 1)).unwrap().unwrap();
    assert_eq!(got.len(), 24);
    assert_eq!(&got[..13], b"first payload");
    assert!(got[13..].iter().all(|&b| b == 0));
    assert!(tree.delete(&key(b"bob", 2)).unwrap());
    assert_eq!(tree.find_exact(&key(b"bob", 2)).unwrap(), None);
}

#[test]
fn oversized_value_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = open(&dir.path().join("idx"));
    let err = tree
        .insert(&key(b"alice", 1), b"nine bytes")
        .expect_err("payload longer than the declared length should fail");
    assert!(matches!(err, IndexError::InvalidArgument(_)));
    assert_eq!(tree.find_exact(&key(b"alice", 1)).unwrap(), None);
}

#[test]
fn mismatched_value_policy_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("idx");
    {
        let tree = open(&path);
        tree.close().unwrap();
    }
    let err = BPlusTree::open(
        &path,
        TreeOptions {
            value_len: 24,
            value_mode: ValueMode::Indirect,
            ..TreeOptions::default()
        },
    )
    .err()
    .expect("reopening with a different value policy should fail");
    assert!(matches!(err, IndexError::InvalidArgument(_)));
}

#[test]
fn inline_mode_rejects_wide_values() {
    let dir = tempfile::tempdir().unwrap();
    let err = BPlusTree::open(
        &dir.path().join("idx"),
        TreeOptions {
            value_len: 16,
            value_mode: ValueMode::Inline,
            ..TreeOptions::default()
        },
    )
    .err()
    .expect("inline values wider than a word should fail");
    assert!(matches!(err, IndexError::InvalidArgument(_)));
}
