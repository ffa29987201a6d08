//! Leaf pages.
//!
//! A leaf block holds up to [`LEAF_CAP`] key/value entries and the file
//! offset of the next leaf, forming a singly linked chain in ascending
//! key order. The value word is either the payload itself (inline mode)
//! or an offset into the value heap.
//!
//! Record layout (little-endian, [`BLOCK_RECORD_LEN`] bytes):
//!
//! ```text
//! [0..2)   entry count
//! [2..4)   reserved
//! [4..12)  next-leaf offset (0 = end of chain)
//! then LEAF_CAP entries of (key 72 bytes, value word u64),
//! zero-padded past the count, and a trailing CRC32.
//! ```

use crate::error::{IndexError, Result};
use crate::key::{CompositeKey, KEY_ENCODED_LEN};

/// Maximum entries per leaf block.
pub const LEAF_CAP: usize = 32;

const ENTRY_LEN: usize = KEY_ENCODED_LEN + 8;

/// On-disk size of one leaf block record.
pub const BLOCK_RECORD_LEN: usize = 12 + LEAF_CAP * ENTRY_LEN + 4;

#[derive(Debug, Clone)]
pub struct Block {
    pub count: usize,
    /// Offset of the next leaf in the chain, 0 at the tail.
    pub next: u64,
    pub keys: [CompositeKey; LEAF_CAP],
    pub values: [u64; LEAF_CAP],
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl Block {
    pub fn new() -> Self {
        Self {
            count: 0,
            next: 0,
            keys: [CompositeKey::default(); LEAF_CAP],
            values: [0; LEAF_CAP],
        }
    }

    pub fn keys(&self) -> &[CompositeKey] {
        &self.keys[..self.count]
    }

    /// Largest key in the block. Callers only ask on non-empty blocks.
    pub fn last_key(&self) -> CompositeKey {
        self.keys[self.count - 1]
    }

    pub fn insert_at(&mut self, idx: usize, key: CompositeKey, value: u64) {
        let count = self.count;
        self.keys.copy_within(idx..count, idx + 1);
        self.values.copy_within(idx..count, idx + 1);
        self.keys[idx] = key;
        self.values[idx] = value;
        self.count = count + 1;
    }

    pub fn remove_at(&mut self, idx: usize) {
        let count = self.count;
        self.keys.copy_within(idx + 1..count, idx);
        self.values.copy_within(idx + 1..count, idx);
        self.count = count - 1;
        self.keys[self.count] = CompositeKey::default();
        self.values[self.count] = 0;
    }

    pub fn encode_into(&self, out: &mut [u8; BLOCK_RECORD_LEN]) {
        out.fill(0);
        out[0..2].copy_from_slice(&(self.count as u16).to_le_bytes());
        out[4..12].copy_from_slice(&self.next.to_le_bytes());
        for i in 0..self.count {
            let at = 12 + i * ENTRY_LEN;
            self.keys[i].write_to(&mut out[at..at + KEY_ENCODED_LEN]);
            out[at + KEY_ENCODED_LEN..at + ENTRY_LEN]
                .copy_from_slice(&self.values[i].to_le_bytes());
        }
        let body = BLOCK_RECORD_LEN - 4;
        let crc = crc32fast::hash(&out[..body]);
        out[body..].copy_from_slice(&crc.to_le_bytes());
    }

    pub fn decode(bytes: &[u8; BLOCK_RECORD_LEN], verify_crc: bool) -> Result<Self> {
        let body = BLOCK_RECORD_LEN - 4;
        if verify_crc {
            let stored = u32::from_le_bytes([
                bytes[body],
                bytes[body + 1],
                bytes[body + 2],
                bytes[body + 3],
            ]);
            let computed = crc32fast::hash(&bytes[..body]);
            if stored != computed {
                return Err(IndexError::Corruption(format!(
                    "leaf checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
                )));
            }
        }
        let count = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        if count > LEAF_CAP {
            return Err(IndexError::Corruption(format!(
                "leaf entry count {count} exceeds fanout {LEAF_CAP}"
            )));
        }
        let mut block = Block::new();
        block.count = count;
        block.next = u64::from_le_bytes(
            bytes[4..12]
                .try_into()
                .map_err(|_| IndexError::Corruption("failed to read next-leaf offset".into()))?,
        );
        for i in 0..count {
            let at = 12 + i * ENTRY_LEN;
            block.keys[i] = CompositeKey::read_from(&bytes[at..at + KEY_ENCODED_LEN])?;
            block.values[i] = u64::from_le_bytes(
                bytes[at + KEY_ENCODED_LEN..at + ENTRY_LEN]
                    .try_into()
                    .map_err(|_| IndexError::Corruption("failed to read value word".into()))?,
            );
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(field: &[u8], seq: i64) -> CompositeKey {
        CompositeKey::new(field, seq).unwrap()
    }

    #[test]
    fn insert_and_remove_keep_order() {
        let mut block = Block::new();
        block.insert_at(0, key(b"b", 0), 2);
        block.insert_at(0, key(b"a", 0), 1);
        block.insert_at(2, key(b"c", 0), 3);
        assert_eq!(block.keys(), &[key(b"a", 0), key(b"b", 0), key(b"c", 0)]);
        assert_eq!(block.values[..3], [1, 2, 3]);

        block.remove_at(0);
        assert_eq!(block.keys(), &[key(b"b", 0), key(b"c", 0)]);
        assert_eq!(block.last_key(), key(b"c", 0));
    }

    #[test]
    fn round_trips_with_checksum() {
        let mut block = Block::new();
        block.next = 12345;
        block.insert_at(0, key(b"one", 1), 0xDEAD);
        block.insert_at(1, key(b"two", 2), 0xBEEF);
        let mut buf = [0u8; BLOCK_RECORD_LEN];
        block.encode_into(&mut buf);

        let back = Block::decode(&buf, true).unwrap();
        assert_eq!(back.count, 2);
        assert_eq!(back.next, 12345);
        assert_eq!(back.keys(), block.keys());
        assert_eq!(back.values[..2], block.values[..2]);
    }

    #[test]
    fn flipped_bit_fails_checksum() {
        let mut block = Block::new();
        block.insert_at(0, key(b"k", 1), 7);
        let mut buf = [0u8; BLOCK_RECORD_LEN];
        block.encode_into(&mut buf);
        buf[20] ^= 0x01;
        assert!(matches!(
            Block::decode(&buf, true),
            Err(IndexError::Corruption(_))
        ));
    }
}
