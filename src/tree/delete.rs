//! Deletion and rebalancing.
//!
//! Removal drills to the leaf, drops the entry, and repairs occupancy
//! on the way back up: an underfull page first tries to borrow from
//! the previous sibling, then from the next, and merges only when
//! neither has surplus. Merges can propagate the underflow, and a root
//! left with a single interior child collapses onto it.

use super::BPlusTree;
use crate::error::{IndexError, Result};
use crate::key::CompositeKey;
use crate::order::{lower_bound, KeyOrder, PrimaryOrder};
use crate::storage::block::{Block, LEAF_CAP};
use crate::storage::node::{Node, NodeRole, NODE_CAP};
use std::mem;

const TARGET: &str = "sable::tree::delete";

impl BPlusTree {
    /// Removes the entry equal to `key` under the primary order.
    /// Returns whether an entry was removed; the value record, if any,
    /// is not reclaimed.
    pub fn delete(&mut self, key: &CompositeKey) -> Result<bool> {
        if self.root.count == 0 {
            return Ok(false);
        }
        let mut root = mem::take(&mut self.root);
        let mut adjust = false;
        let res = self.remove_from(&mut root, None, *key, &mut adjust);
        self.root = root;
        let removed = res?;

        if removed && self.root.count == 1 && !self.root.children_are_leaves {
            self.collapse_root()?;
        }
        if removed && self.options.fsync_writes {
            self.sync_files()?;
        }
        Ok(removed)
    }

    /// Removes under `node`, which the caller holds. `home` is the
    /// node's disk offset, `None` for the cached tier. On removal,
    /// `adjust` reports whether this node underflowed and needs the
    /// caller to rebalance it.
    fn remove_from(
        &mut self,
        node: &mut Node,
        home: Option<u64>,
        key: CompositeKey,
        adjust: &mut bool,
    ) -> Result<bool> {
        if PrimaryOrder.less(&node.last_key(), &key) {
            return Ok(false);
        }
        let idx = lower_bound(node.keys(), &key, &PrimaryOrder).unwrap_or(node.count - 1);
        let child_off = node.children[idx];

        let removed;
        if node.children_are_leaves {
            let mut block = self.read_block(child_off)?;
            let at = match lower_bound(block.keys(), &key, &PrimaryOrder) {
                Some(i) if block.keys[i] == key => i,
                _ => return Ok(false),
            };
            block.remove_at(at);
            removed = true;
            if block.count * 2 >= LEAF_CAP || node.count == 1 {
                if block.count > 0 {
                    node.keys[idx] = block.last_key();
                }
                self.write_block(child_off, &block)?;
            } else {
                self.rebalance_leaf(node, idx, block, child_off)?;
            }
        } else if node.role == NodeRole::Root {
            let mut child = mem::take(&mut self.root_children[idx]);
            let mut child_adjust = false;
            let res = self.remove_from(&mut child, None, key, &mut child_adjust);
            self.root_children[idx] = child;
            removed = res?;
            if removed {
                if child_adjust && node.count >= 2 {
                    Self::rebalance_cached(node, &mut self.root_children, idx);
                } else {
                    node.keys[idx] = self.root_children[idx].last_key();
                }
            }
        } else {
            let mut child = self.read_node(child_off)?;
            let mut child_adjust = false;
            removed = self.remove_from(&mut child, Some(child_off), key, &mut child_adjust)?;
            if removed {
                if child_adjust && node.count >= 2 {
                    self.rebalance_interior(node, idx, child, child_off)?;
                } else {
                    node.keys[idx] = child.last_key();
                }
            }
        }

        if removed {
            if let Some(offset) = home {
                self.write_node(offset, node)?;
            }
            *adjust = node.count * 2 < NODE_CAP;
        }
        Ok(removed)
    }

    /// Repairs an underfull leaf. `node` has at least two children, so
    /// a sibling on one side always exists.
    fn rebalance_leaf(
        &mut self,
        node: &mut Node,
        idx: usize,
        mut block: Block,
        block_off: u64,
    ) -> Result<()> {
        if idx > 0 {
            let pre_off = node.children[idx - 1];
            let mut pre = self.read_block(pre_off)?;
            if pre.count * 2 > LEAF_CAP {
                // Even the pair out around their average.
                let old = pre.count;
                let keep = (old + block.count) / 2;
                let moved = old - keep;
                block.keys.copy_within(0..block.count, moved);
                block.values.copy_within(0..block.count, moved);
                block.keys[..moved].copy_from_slice(&pre.keys[keep..old]);
                block.values[..moved].copy_from_slice(&pre.values[keep..old]);
                block.count += moved;
                for i in keep..old {
                    pre.keys[i] = CompositeKey::default();
                    pre.values[i] = 0;
                }
                pre.count = keep;
                node.keys[idx - 1] = pre.last_key();
                node.keys[idx] = block.last_key();
                self.write_block(pre_off, &pre)?;
                self.write_block(block_off, &block)?;
                tracing::trace!(target: TARGET, from = pre_off, to = block_off, moved, "leaf borrowed");
                return Ok(());
            }
            if idx + 1 == node.count {
                // Rightmost child with a lean left sibling: fold into
                // it and drop out of the chain.
                pre.keys[pre.count..pre.count + block.count]
                    .copy_from_slice(&block.keys[..block.count]);
                pre.values[pre.count..pre.count + block.count]
                    .copy_from_slice(&block.values[..block.count]);
                pre.count += block.count;
                pre.next = block.next;
                node.keys[idx - 1] = pre.last_key();
                node.remove_at(idx);
                self.write_block(pre_off, &pre)?;
                tracing::trace!(target: TARGET, into = pre_off, gone = block_off, "leaf merged");
                return Ok(());
            }
        }

        let next_off = node.children[idx + 1];
        let mut next = self.read_block(next_off)?;
        if next.count * 2 > LEAF_CAP {
            let take = (block.count + next.count) / 2 - block.count;
            block.keys[block.count..block.count + take].copy_from_slice(&next.keys[..take]);
            block.values[block.count..block.count + take].copy_from_slice(&next.values[..take]);
            block.count += take;
            next.keys.copy_within(take..next.count, 0);
            next.values.copy_within(take..next.count, 0);
            for i in next.count - take..next.count {
                next.keys[i] = CompositeKey::default();
                next.values[i] = 0;
            }
            next.count -= take;
            node.keys[idx] = block.last_key();
            self.write_block(next_off, &next)?;
            self.write_block(block_off, &block)?;
            tracing::trace!(target: TARGET, from = next_off, to = block_off, moved = take, "leaf borrowed");
        } else {
            block.keys[block.count..block.count + next.count]
                .copy_from_slice(&next.keys[..next.count]);
            block.values[block.count..block.count + next.count]
                .copy_from_slice(&next.values[..next.count]);
            block.count += next.count;
            block.next = next.next;
            node.keys[idx] = block.last_key();
            node.remove_at(idx + 1);
            self.write_block(block_off, &block)?;
            tracing::trace!(target: TARGET, into = block_off, gone = next_off, "leaf merged");
        }
        Ok(())
    }

    /// Repairs an underfull disk-resident interior node, mirroring
    /// the leaf strategy. `child` is the in-memory copy already
    /// written at `child_off`.
    fn rebalance_interior(
        &mut self,
        node: &mut Node,
        idx: usize,
        mut child: Node,
        child_off: u64,
    ) -> Result<()> {
        if idx > 0 {
            let pre_off = node.children[idx - 1];
            let mut pre = self.read_node(pre_off)?;
            if pre.count * 2 > NODE_CAP {
                let old = pre.count;
                let keep = (old + child.count) / 2;
                let moved = old - keep;
                child.keys.copy_within(0..child.count, moved);
                child.children.copy_within(0..child.count, moved);
                child.keys[..moved].copy_from_slice(&pre.keys[keep..old]);
                child.children[..moved].copy_from_slice(&pre.children[keep..old]);
                child.count += moved;
                for i in keep..old {
                    pre.keys[i] = CompositeKey::default();
                    pre.children[i] = 0;
                }
                pre.count = keep;
                node.keys[idx - 1] = pre.last_key();
                node.keys[idx] = child.last_key();
                self.write_node(pre_off, &pre)?;
                self.write_node(child_off, &child)?;
                tracing::trace!(target: TARGET, from = pre_off, to = child_off, moved, "node borrowed");
                return Ok(());
            }
            if idx + 1 == node.count {
                pre.keys[pre.count..pre.count + child.count]
                    .copy_from_slice(&child.keys[..child.count]);
                pre.children[pre.count..pre.count + child.count]
                    .copy_from_slice(&child.children[..child.count]);
                pre.count += child.count;
                node.keys[idx - 1] = pre.last_key();
                node.remove_at(idx);
                self.write_node(pre_off, &pre)?;
                tracing::trace!(target: TARGET, into = pre_off, gone = child_off, "node merged");
                return Ok(());
            }
        }

        let next_off = node.children[idx + 1];
        let mut next = self.read_node(next_off)?;
        if next.count * 2 > NODE_CAP {
            let take = (child.count + next.count) / 2 - child.count;
            child.keys[child.count..child.count + take].copy_from_slice(&next.keys[..take]);
            child.children[child.count..child.count + take]
                .copy_from_slice(&next.children[..take]);
            child.count += take;
            next.keys.copy_within(take..next.count, 0);
            next.children.copy_within(take..next.count, 0);
            for i in next.count - take..next.count {
                next.keys[i] = CompositeKey::default();
                next.children[i] = 0;
            }
            next.count -= take;
            node.keys[idx] = child.last_key();
            self.write_node(next_off, &next)?;
            self.write_node(child_off, &child)?;
            tracing::trace!(target: TARGET, from = next_off, to = child_off, moved = take, "node borrowed");
        } else {
            child.keys[child.count..child.count + next.count]
                .copy_from_slice(&next.keys[..next.count]);
            child.children[child.count..child.count + next.count]
                .copy_from_slice(&next.children[..next.count]);
            child.count += next.count;
            node.keys[idx] = child.last_key();
            node.remove_at(idx + 1);
            self.write_node(child_off, &child)?;
            tracing::trace!(target: TARGET, into = child_off, gone = next_off, "node merged");
        }
        Ok(())
    }

    /// Repairs an underfull cached child. The whole tier lives in
    /// memory, so this moves entries between resident nodes and leaves
    /// persistence to the next flush.
    fn rebalance_cached(root: &mut Node, children: &mut Vec<Node>, idx: usize) {
        if idx > 0 {
            let can_borrow = children[idx - 1].count * 2 > NODE_CAP;
            if can_borrow {
                let (left, right) = children.split_at_mut(idx);
                let pre = &mut left[idx - 1];
                let cur = &mut right[0];
                let old = pre.count;
                let keep = (old + cur.count) / 2;
                let moved = old - keep;
                cur.keys.copy_within(0..cur.count, moved);
                cur.children.copy_within(0..cur.count, moved);
                cur.keys[..moved].copy_from_slice(&pre.keys[keep..old]);
                cur.children[..moved].copy_from_slice(&pre.children[keep..old]);
                cur.count += moved;
                for i in keep..old {
                    pre.keys[i] = CompositeKey::default();
                    pre.children[i] = 0;
                }
                pre.count = keep;
                root.keys[idx - 1] = pre.last_key();
                root.keys[idx] = cur.last_key();
                return;
            }
            if idx + 1 == root.count {
                let gone = children.remove(idx);
                let pre = &mut children[idx - 1];
                pre.keys[pre.count..pre.count + gone.count]
                    .copy_from_slice(&gone.keys[..gone.count]);
                pre.children[pre.count..pre.count + gone.count]
                    .copy_from_slice(&gone.children[..gone.count]);
                pre.count += gone.count;
                root.keys[idx - 1] = pre.last_key();
                root.remove_at(idx);
                return;
            }
        }

        if children[idx + 1].count * 2 > NODE_CAP {
            let (left, right) = children.split_at_mut(idx + 1);
            let cur = &mut left[idx];
            let next = &mut right[0];
            let take = (cur.count + next.count) / 2 - cur.count;
            cur.keys[cur.count..cur.count + take].copy_from_slice(&next.keys[..take]);
            cur.children[cur.count..cur.count + take].copy_from_slice(&next.children[..take]);
            cur.count += take;
            next.keys.copy_within(take..next.count, 0);
            next.children.copy_within(take..next.count, 0);
            for i in next.count - take..next.count {
                next.keys[i] = CompositeKey::default();
                next.children[i] = 0;
            }
            next.count -= take;
            root.keys[idx] = cur.last_key();
        } else {
            let gone = children.remove(idx + 1);
            let cur = &mut children[idx];
            cur.keys[cur.count..cur.count + gone.count].copy_from_slice(&gone.keys[..gone.count]);
            cur.children[cur.count..cur.count + gone.count]
                .copy_from_slice(&gone.children[..gone.count]);
            cur.count += gone.count;
            root.keys[idx] = cur.last_key();
            root.remove_at(idx + 1);
        }
    }

    /// Promotes the root's lone child to be the root. The promoted
    /// node keeps its offset; the header is repointed and its children
    /// become the new cached tier.
    fn collapse_root(&mut self) -> Result<()> {
        let promoted_off = self.root.children[0];
        let mut promoted = match self.root_children.pop() {
            Some(node) => node,
            None => {
                return Err(IndexError::Corruption(
                    "root cache out of step with the root node".into(),
                ))
            }
        };
        promoted.role = NodeRole::Root;
        self.root = promoted;
        self.header.root_offset = promoted_off;
        self.load_root_children()?;

        let root = self.root.clone();
        self.write_node(promoted_off, &root)?;
        self.write_header()?;
        tracing::debug!(target: TARGET, root = promoted_off, "collapsed root");
        Ok(())
    }
}
