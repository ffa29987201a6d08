//! Key comparison policies.
//!
//! Lookups take a comparator deciding which keys count as "the same"
//! and, optionally, a bound filter narrowing the matching run. The
//! primary order ([`PrimaryOrder`]) is total and governs placement;
//! weaker orders ([`FieldOrder`]) group keys whose field matches while
//! ignoring the sequence, so one query can sweep every entry under a
//! field.

use crate::key::CompositeKey;

/// A strict-weak ordering over composite keys.
pub trait KeyOrder {
    /// `true` when `a` sorts strictly before `b` under this order.
    fn less(&self, a: &CompositeKey, b: &CompositeKey) -> bool;

    /// `true` when neither key sorts before the other.
    fn equivalent(&self, a: &CompositeKey, b: &CompositeKey) -> bool {
        !self.less(a, b) && !self.less(b, a)
    }
}

/// The total order of the index: field bytes, then sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimaryOrder;

impl KeyOrder for PrimaryOrder {
    fn less(&self, a: &CompositeKey, b: &CompositeKey) -> bool {
        a < b
    }
}

/// Weak order comparing the field only; all sequences under one field
/// are equivalent.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldOrder;

impl KeyOrder for FieldOrder {
    fn less(&self, a: &CompositeKey, b: &CompositeKey) -> bool {
        a.field < b.field
    }
}

/// A predicate applied to each entry in a matching run.
pub trait BoundFilter {
    /// `true` when `entry` should be included given the `query` key.
    fn admits(&self, entry: &CompositeKey, query: &CompositeKey) -> bool;
}

/// Admits entries whose sequence does not exceed the query's.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeqAtMost;

impl BoundFilter for SeqAtMost {
    fn admits(&self, entry: &CompositeKey, query: &CompositeKey) -> bool {
        entry.seq <= query.seq
    }
}

/// Index of the first key in `keys` (sorted by the primary order) that
/// does not sort before `target` under `order`, or `None` when every
/// key does.
pub fn lower_bound(
    keys: &[CompositeKey],
    target: &CompositeKey,
    order: &dyn KeyOrder,
) -> Option<usize> {
    let idx = keys.partition_point(|k| order.less(k, target));
    (idx < keys.len()).then_some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(field: &[u8], seq: i64) -> CompositeKey {
        CompositeKey::new(field, seq).unwrap()
    }

    #[test]
    fn primary_order_matches_ord() {
        let a = key(b"a", 1);
        let b = key(b"a", 2);
        assert!(PrimaryOrder.less(&a, &b));
        assert!(!PrimaryOrder.less(&b, &a));
        assert!(PrimaryOrder.equivalent(&a, &a));
    }

    #[test]
    fn field_order_ignores_seq() {
        let a = key(b"same", 1);
        let b = key(b"same", 900);
        let c = key(b"zzz", 0);
        assert!(FieldOrder.equivalent(&a, &b));
        assert!(FieldOrder.less(&a, &c));
    }

    #[test]
    fn lower_bound_finds_first_not_less() {
        let keys = vec![key(b"a", 1), key(b"a", 3), key(b"b", 0), key(b"c", 9)];
        assert_eq!(lower_bound(&keys, &key(b"a", 2), &PrimaryOrder), Some(1));
        assert_eq!(lower_bound(&keys, &key(b"b", 0), &PrimaryOrder), Some(2));
        assert_eq!(lower_bound(&keys, &key(b"zz", 0), &PrimaryOrder), None);
        // Weak order lands on the first entry of the field group.
        assert_eq!(lower_bound(&keys, &key(b"a", 999), &FieldOrder), Some(0));
    }

    #[test]
    fn seq_at_most_bounds_the_run() {
        let query = key(b"q", 5);
        assert!(SeqAtMost.admits(&key(b"q", 5), &query));
        assert!(SeqAtMost.admits(&key(b"q", -1), &query));
        assert!(!SeqAtMost.admits(&key(b"q", 6), &query));
    }
}
