//! Index configuration options.
//!
//! [`TreeOptions`] controls the value storage policy and durability
//! behavior of a [`BPlusTree`](crate::BPlusTree). The on-disk geometry
//! (node and leaf fan-out) is fixed at compile time and recorded in the
//! file header; options only select behaviors that are safe to vary
//! between openings of the same file.

/// How leaf entries store their values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMode {
    /// The value payload is stored directly in the leaf entry's value word.
    /// Requires `value_len <= 8`.
    Inline,

    /// The leaf entry stores a byte offset into an append-only value heap
    /// kept in a sibling file (`<index>.vals`). Any fixed `value_len` works.
    Indirect,
}

/// Configuration options for opening a [`BPlusTree`](crate::BPlusTree).
///
/// # Example
///
/// ```rust
/// use sable::{TreeOptions, ValueMode};
///
/// let mut opts = TreeOptions::default();
/// opts.value_mode = ValueMode::Indirect;
/// opts.value_len = 16;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TreeOptions {
    /// Exact byte length of every value passed to insert and returned by
    /// the find operations. Part of the file format; must match the file
    /// being reopened.
    pub value_len: usize,

    /// Value storage policy. Must match the file being reopened.
    pub value_mode: ValueMode,

    /// Whether to verify record checksums when reading pages.
    pub checksum_verify_on_read: bool,

    /// Whether to fsync the backing files at the end of every mutating
    /// operation. Off by default; the OS decides when buffered writes
    /// reach the disk.
    pub fsync_writes: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            value_len: 8,
            value_mode: ValueMode::Inline,
            checksum_verify_on_read: true,
            fsync_writes: false,
        }
    }
}

impl TreeOptions {
    /// Maximum durability: checksums on, fsync after every mutation.
    ///
    /// Root-level state is still only persisted at clean shutdown and at
    /// root identity changes; see the crate documentation.
    pub fn durable() -> Self {
        Self {
            fsync_writes: true,
            ..Self::default()
        }
    }
}
