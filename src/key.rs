//! Composite keys.
//!
//! A [`CompositeKey`] pairs a fixed-width, NUL-padded byte field with a
//! signed sequence number. The field carries the caller's identifier (a
//! user name, a ticket id); the sequence number disambiguates duplicates
//! of the same field under the primary order.

use crate::error::{IndexError, Result};
use std::cmp::Ordering;
use std::fmt;

/// Width of the key's byte field.
pub const KEY_FIELD_LEN: usize = 64;

/// Encoded size of a key on disk: the field plus a little-endian `i64`.
pub const KEY_ENCODED_LEN: usize = KEY_FIELD_LEN + 8;

/// A fixed-width composite key: a 64-byte field plus an `i64` sequence.
///
/// `Ord` is the primary order of the index: field bytes first, sequence
/// second. Because the field is NUL-padded, shorter fields sort before
/// longer ones sharing a prefix, matching C-string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeKey {
    /// NUL-padded field bytes.
    pub field: [u8; KEY_FIELD_LEN],
    /// Secondary discriminant.
    pub seq: i64,
}

impl CompositeKey {
    /// Builds a key from a field and sequence number.
    ///
    /// Returns `InvalidArgument` if `field` is longer than
    /// [`KEY_FIELD_LEN`] bytes.
    pub fn new(field: &[u8], seq: i64) -> Result<Self> {
        if field.len() > KEY_FIELD_LEN {
            return Err(IndexError::InvalidArgument(format!(
                "key field of {} bytes exceeds maximum {KEY_FIELD_LEN}",
                field.len()
            )));
        }
        let mut buf = [0u8; KEY_FIELD_LEN];
        buf[..field.len()].copy_from_slice(field);
        Ok(Self { field: buf, seq })
    }

    /// The field bytes with trailing NUL padding stripped.
    pub fn field_bytes(&self) -> &[u8] {
        let end = self
            .field
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        &self.field[..end]
    }

    /// Serializes the key into exactly [`KEY_ENCODED_LEN`] bytes.
    pub fn write_to(&self, out: &mut [u8]) {
        out[..KEY_FIELD_LEN].copy_from_slice(&self.field);
        out[KEY_FIELD_LEN..KEY_ENCODED_LEN].copy_from_slice(&self.seq.to_le_bytes());
    }

    /// Deserializes a key from exactly [`KEY_ENCODED_LEN`] bytes.
    pub fn read_from(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < KEY_ENCODED_LEN {
            return Err(IndexError::Corruption("key record truncated".into()));
        }
        let mut field = [0u8; KEY_FIELD_LEN];
        field.copy_from_slice(&bytes[..KEY_FIELD_LEN]);
        let seq_bytes: [u8; 8] = bytes[KEY_FIELD_LEN..KEY_ENCODED_LEN]
            .try_into()
            .map_err(|_| IndexError::Corruption("failed to read key sequence".into()))?;
        Ok(Self {
            field,
            seq: i64::from_le_bytes(seq_bytes),
        })
    }
}

impl Default for CompositeKey {
    fn default() -> Self {
        Self {
            field: [0u8; KEY_FIELD_LEN],
            seq: 0,
        }
    }
}

impl Ord for CompositeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.field
            .cmp(&other.field)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for CompositeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            String::from_utf8_lossy(self.field_bytes()),
            self.seq
        )
    }
}
