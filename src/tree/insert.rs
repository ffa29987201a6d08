//! Insertion and splitting.

use super::BPlusTree;
use crate::error::Result;
use crate::key::CompositeKey;
use crate::order::{lower_bound, PrimaryOrder};
use crate::storage::block::{Block, LEAF_CAP};
use crate::storage::node::{Node, NodeRole, NODE_CAP};
use std::mem;

const TARGET: &str = "sable::tree::insert";

impl BPlusTree {
    /// Inserts `key` with `value`. Keys are unique under the primary
    /// order; inserting an existing key returns `Ok(false)` and leaves
    /// the index untouched.
    pub fn insert(&mut self, key: &CompositeKey, value: &[u8]) -> Result<bool> {
        if self.lookup_word(key)?.is_some() {
            tracing::trace!(target: TARGET, %key, "duplicate insert refused");
            return Ok(false);
        }
        let word = self.store_value(value)?;

        if self.root.count == 0 {
            let mut block = Block::new();
            block.insert_at(0, *key, word);
            let offset = self.append_block(&block)?;
            self.root.children_are_leaves = true;
            self.root.insert_at(0, *key, offset);
            tracing::debug!(target: TARGET, offset, "seeded first leaf");
        } else {
            let mut root = mem::take(&mut self.root);
            let res = self.insert_into(&mut root, None, *key, word);
            self.root = root;
            res?;
            if self.root.count == NODE_CAP {
                self.split_root()?;
            }
        }

        if self.options.fsync_writes {
            self.sync_files()?;
        }
        Ok(true)
    }

    /// Inserts under `node`, which the caller holds. `home` is the
    /// node's disk offset, `None` for the cached tier.
    fn insert_into(
        &mut self,
        node: &mut Node,
        home: Option<u64>,
        key: CompositeKey,
        word: u64,
    ) -> Result<()> {
        let idx = match lower_bound(node.keys(), &key, &PrimaryOrder) {
            Some(i) => i,
            None => {
                // Key exceeds everything routed here: grow the
                // rightmost bound and descend through it.
                let i = node.count - 1;
                node.keys[i] = key;
                i
            }
        };
        let child_off = node.children[idx];

        if node.children_are_leaves {
            let mut block = self.read_block(child_off)?;
            let at = lower_bound(block.keys(), &key, &PrimaryOrder).unwrap_or(block.count);
            block.insert_at(at, key, word);
            if block.count == LEAF_CAP {
                self.split_leaf(node, idx, &mut block, child_off)?;
            } else {
                node.keys[idx] = block.last_key();
                self.write_block(child_off, &block)?;
            }
        } else if node.role == NodeRole::Root {
            let mut child = mem::take(&mut self.root_children[idx]);
            let res = self.insert_into(&mut child, None, key, word);
            self.root_children[idx] = child;
            res?;
            if self.root_children[idx].count == NODE_CAP {
                let mut left = mem::take(&mut self.root_children[idx]);
                let right = split_upper(&mut left, NodeRole::RootChild);
                let right_off = self.append_node(&right)?;
                node.keys[idx] = left.last_key();
                node.insert_at(idx + 1, right.last_key(), right_off);
                self.root_children[idx] = left;
                self.root_children.insert(idx + 1, right);
                tracing::debug!(target: TARGET, right = right_off, "split cached child");
            } else {
                node.keys[idx] = self.root_children[idx].last_key();
            }
        } else {
            let mut child = self.read_node(child_off)?;
            self.insert_into(&mut child, Some(child_off), key, word)?;
            if child.count == NODE_CAP {
                let right = split_upper(&mut child, NodeRole::Interior);
                let right_off = self.append_node(&right)?;
                self.write_node(child_off, &child)?;
                node.keys[idx] = child.last_key();
                node.insert_at(idx + 1, right.last_key(), right_off);
                tracing::debug!(target: TARGET, left = child_off, right = right_off, "split node");
            } else {
                node.keys[idx] = child.last_key();
            }
        }

        if let Some(offset) = home {
            self.write_node(offset, node)?;
        }
        Ok(())
    }

    /// Halves a full leaf. The left half stays at `offset`; the right
    /// half is appended and spliced into the chain, and `father` gains
    /// its routing entry at `idx + 1`.
    fn split_leaf(
        &mut self,
        father: &mut Node,
        idx: usize,
        block: &mut Block,
        offset: u64,
    ) -> Result<()> {
        let half = LEAF_CAP / 2;
        let mut right = Block::new();
        right.count = block.count - half;
        right.keys[..right.count].copy_from_slice(&block.keys[half..block.count]);
        right.values[..right.count].copy_from_slice(&block.values[half..block.count]);
        right.next = block.next;

        for i in half..block.count {
            block.keys[i] = CompositeKey::default();
            block.values[i] = 0;
        }
        block.count = half;

        let right_off = self.append_block(&right)?;
        block.next = right_off;
        self.write_block(offset, block)?;

        father.keys[idx] = block.last_key();
        father.insert_at(idx + 1, right.last_key(), right_off);
        tracing::debug!(target: TARGET, left = offset, right = right_off, "split leaf");
        Ok(())
    }

    /// Splits a full root into two cached children under a fresh root.
    /// The old root record keeps its offset as the left child; the new
    /// root is appended and the header repointed, so the root's
    /// identity survives reopen.
    fn split_root(&mut self) -> Result<()> {
        // The current cached children leave the resident tier; persist
        // them as plain interior nodes first.
        if !self.root.children_are_leaves {
            let mut children = mem::take(&mut self.root_children);
            for (i, child) in children.iter_mut().enumerate() {
                child.role = NodeRole::Interior;
                let offset = self.root.children[i];
                self.write_node(offset, child)?;
            }
        }

        let mut left = mem::take(&mut self.root);
        left.role = NodeRole::RootChild;
        let right = split_upper(&mut left, NodeRole::RootChild);

        let left_off = self.header.root_offset;
        let right_off = self.append_node(&right)?;
        self.write_node(left_off, &left)?;

        let mut root = Node::new(NodeRole::Root, false);
        root.insert_at(0, left.last_key(), left_off);
        root.insert_at(1, right.last_key(), right_off);
        let root_off = self.append_node(&root)?;

        self.header.root_offset = root_off;
        self.write_header()?;
        self.root = root;
        self.root_children = vec![left, right];
        tracing::debug!(target: TARGET, old = left_off, new = root_off, "split root");
        Ok(())
    }
}

/// Moves the upper half of `left`'s entries into a fresh node with
/// `right_role` and returns it.
fn split_upper(left: &mut Node, right_role: NodeRole) -> Node {
    let half = NODE_CAP / 2;
    let mut right = Node::new(right_role, left.children_are_leaves);
    right.count = left.count - half;
    right.keys[..right.count].copy_from_slice(&left.keys[half..left.count]);
    right.children[..right.count].copy_from_slice(&left.children[half..left.count]);

    for i in half..left.count {
        left.keys[i] = CompositeKey::default();
        left.children[i] = 0;
    }
    left.count = half;
    right
}
