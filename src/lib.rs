//! Persistent B+ tree index over composite keys.
//!
//! `sable` stores an ordered map from a fixed-width composite key (a
//! 64-byte field plus an `i64` sequence) to a fixed-length value in a
//! single disk file. Interior nodes route by the largest key under
//! each child; leaves form a linked chain, so range-shaped lookups are
//! one descent plus a short chain walk.
//!
//! Placement always follows the total primary order, but lookups can
//! supply weaker comparators: [`FieldOrder`] treats every sequence
//! under one field as equivalent, and a [`BoundFilter`] such as
//! [`SeqAtMost`] trims the matching run.
//!
//! ```no_run
//! use sable::{BPlusTree, CompositeKey, FieldOrder, TreeOptions};
//!
//! # fn main() -> sable::Result<()> {
//! let mut index = BPlusTree::open("tickets.idx".as_ref(), TreeOptions::default())?;
//! index.insert(&CompositeKey::new(b"alice", 1)?, &1u64.to_le_bytes())?;
//! index.insert(&CompositeKey::new(b"alice", 2)?, &2u64.to_le_bytes())?;
//!
//! // Every entry under "alice", regardless of sequence.
//! let all = index.find_matching(&CompositeKey::new(b"alice", 0)?, &FieldOrder)?;
//! assert_eq!(all.len(), 2);
//! index.close()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod key;
pub mod logging;
pub mod order;
pub mod storage;
pub mod tree;

pub use config::{TreeOptions, ValueMode};
pub use error::{IndexError, Result};
pub use key::{CompositeKey, KEY_FIELD_LEN};
pub use logging::init_logging;
pub use order::{BoundFilter, FieldOrder, KeyOrder, PrimaryOrder, SeqAtMost};
pub use storage::block::LEAF_CAP;
pub use storage::node::NODE_CAP;
pub use tree::BPlusTree;
