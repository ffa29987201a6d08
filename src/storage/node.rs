//! Interior pages.
//!
//! An interior node holds up to [`NODE_CAP`] routing entries. Entry `i`
//! carries the largest key reachable through child `i` together with
//! that child's file offset, so descent picks the first entry whose key
//! is not below the target.
//!
//! Record layout (little-endian, [`NODE_RECORD_LEN`] bytes):
//!
//! ```text
//! [0..2)  entry count
//! [2]     children-are-leaves flag
//! [3]     role byte
//! then NODE_CAP entries of (key 72 bytes, child offset u64),
//! zero-padded past the count, and a trailing CRC32 of everything
//! before it.
//! ```

use crate::error::{IndexError, Result};
use crate::key::{CompositeKey, KEY_ENCODED_LEN};

/// Maximum routing entries per interior node.
pub const NODE_CAP: usize = 16;

const ENTRY_LEN: usize = KEY_ENCODED_LEN + 8;

/// On-disk size of one interior node record.
pub const NODE_RECORD_LEN: usize = 4 + NODE_CAP * ENTRY_LEN + 4;

/// Where a node sits relative to the cached top of the tree.
///
/// The root and its direct children stay resident in memory; everything
/// below is read from disk per operation. The role byte lets reopen
/// rebuild that cache and lets writers know which copies are
/// authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Root,
    RootChild,
    Interior,
}

impl NodeRole {
    pub fn to_byte(self) -> u8 {
        match self {
            NodeRole::Root => 0,
            NodeRole::RootChild => 1,
            NodeRole::Interior => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(NodeRole::Root),
            1 => Ok(NodeRole::RootChild),
            2 => Ok(NodeRole::Interior),
            other => Err(IndexError::Corruption(format!(
                "unknown node role byte {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub count: usize,
    /// `true` when this node's children are leaf blocks rather than
    /// further interior nodes.
    pub children_are_leaves: bool,
    pub role: NodeRole,
    pub keys: [CompositeKey; NODE_CAP],
    pub children: [u64; NODE_CAP],
}

impl Default for Node {
    fn default() -> Self {
        Self::new(NodeRole::Interior, false)
    }
}

impl Node {
    pub fn new(role: NodeRole, children_are_leaves: bool) -> Self {
        Self {
            count: 0,
            children_are_leaves,
            role,
            keys: [CompositeKey::default(); NODE_CAP],
            children: [0; NODE_CAP],
        }
    }

    /// Keys currently in use, sorted ascending.
    pub fn keys(&self) -> &[CompositeKey] {
        &self.keys[..self.count]
    }

    /// Largest key routed through this node. Callers only ask on
    /// non-empty nodes.
    pub fn last_key(&self) -> CompositeKey {
        self.keys[self.count - 1]
    }

    /// Inserts a routing entry at `idx`, shifting later entries right.
    pub fn insert_at(&mut self, idx: usize, key: CompositeKey, child: u64) {
        let count = self.count;
        self.keys.copy_within(idx..count, idx + 1);
        self.children.copy_within(idx..count, idx + 1);
        self.keys[idx] = key;
        self.children[idx] = child;
        self.count = count + 1;
    }

    /// Removes the entry at `idx`, shifting later entries left.
    pub fn remove_at(&mut self, idx: usize) {
        let count = self.count;
        self.keys.copy_within(idx + 1..count, idx);
        self.children.copy_within(idx + 1..count, idx);
        self.count = count - 1;
        self.keys[self.count] = CompositeKey::default();
        self.children[self.count] = 0;
    }

    pub fn encode_into(&self, out: &mut [u8; NODE_RECORD_LEN]) {
        out.fill(0);
        out[0..2].copy_from_slice(&(self.count as u16).to_le_bytes());
        out[2] = self.children_are_leaves as u8;
        out[3] = self.role.to_byte();
        for i in 0..self.count {
            let at = 4 + i * ENTRY_LEN;
            self.keys[i].write_to(&mut out[at..at + KEY_ENCODED_LEN]);
            out[at + KEY_ENCODED_LEN..at + ENTRY_LEN]
                .copy_from_slice(&self.children[i].to_le_bytes());
        }
        let body = NODE_RECORD_LEN - 4;
        let crc = crc32fast::hash(&out[..body]);
        out[body..].copy_from_slice(&crc.to_le_bytes());
    }

    pub fn decode(bytes: &[u8; NODE_RECORD_LEN], verify_crc: bool) -> Result<Self> {
        let body = NODE_RECORD_LEN - 4;
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
                    "node checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
                )));
            }
        }
        let count = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        if count > NODE_CAP {
            return Err(IndexError::Corruption(format!(
                "node entry count {count} exceeds fanout {NODE_CAP}"
            )));
        }
        let mut node = Node::new(NodeRole::from_byte(bytes[3])?, bytes[2] != 0);
        node.count = count;
        for i in 0..count {
            let at = 4 + i * ENTRY_LEN;
            node.keys[i] = CompositeKey::read_from(&bytes[at..at + KEY_ENCODED_LEN])?;
            node.children[i] = u64::from_le_bytes(
                bytes[at + KEY_ENCODED_LEN..at + ENTRY_LEN]
                    .try_into()
                    .map_err(|_| IndexError::Corruption("failed to read child offset".into()))?,
            );
        }
        Ok(node)
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
        let mut node = Node::new(NodeRole::Root, true);
        node.insert_at(0, key(b"m", 0), 100);
        node.insert_at(0, key(b"a", 0), 50);
        node.insert_at(2, key(b"z", 0), 200);
        assert_eq!(node.count, 3);
        assert_eq!(node.keys()[1], key(b"m", 0));
        assert_eq!(node.children[..3], [50, 100, 200]);

        node.remove_at(1);
        assert_eq!(node.count, 2);
        assert_eq!(node.keys(), &[key(b"a", 0), key(b"z", 0)]);
        assert_eq!(node.last_key(), key(b"z", 0));
    }

    #[test]
    fn round_trips_with_checksum() {
        let mut node = Node::new(NodeRole::RootChild, false);
        node.insert_at(0, key(b"left", 3), 4096);
        node.insert_at(1, key(b"right", -2), 8192);
        let mut buf = [0u8; NODE_RECORD_LEN];
        node.encode_into(&mut buf);

        let back = Node::decode(&buf, true).unwrap();
        assert_eq!(back.count, 2);
        assert_eq!(back.role, NodeRole::RootChild);
        assert!(!back.children_are_leaves);
        assert_eq!(back.keys(), node.keys());
        assert_eq!(back.children[..2], node.children[..2]);
    }

    #[test]
    fn flipped_bit_fails_checksum() {
        let mut node = Node::new(NodeRole::Interior, true);
        node.insert_at(0, key(b"k", 1), 64);
        let mut buf = [0u8; NODE_RECORD_LEN];
        node.encode_into(&mut buf);
        buf[10] ^= 0x40;
        assert!(matches!(
            Node::decode(&buf, true),
            Err(IndexError::Corruption(_))
        ));
        // With verification off the damage goes unnoticed.
        assert!(Node::decode(&buf, false).is_ok());
    }
}
