//! The disk-resident B+ tree.
//!
//! All pages live in a single index file and are addressed by byte
//! offset. Interior nodes route by the largest key under each child;
//! leaf blocks form a singly linked chain in ascending key order, so a
//! lookup is one root-to-leaf descent followed by a bounded chain walk.
//!
//! Only the root and its direct children are kept resident. Everything
//! below that tier is read from disk per operation and written through
//! immediately when changed; the cached tier is flushed on [`close`]
//! (and best-effort on drop), together with the header that records the
//! root's offset.
//!
//! [`close`]: BPlusTree::close

mod delete;
mod insert;

use crate::config::{TreeOptions, ValueMode};
use crate::error::{IndexError, Result};
use crate::key::CompositeKey;
use crate::order::{lower_bound, BoundFilter, KeyOrder, PrimaryOrder};
use crate::storage::block::{Block, BLOCK_RECORD_LEN, LEAF_CAP};
use crate::storage::file::RecordFile;
use crate::storage::header::{Header, HEADER_LEN};
use crate::storage::heap::ValueHeap;
use crate::storage::node::{Node, NodeRole, NODE_CAP, NODE_RECORD_LEN};
use std::ffi::OsString;
use std::mem;
use std::path::{Path, PathBuf};

const TARGET: &str = "sable::tree";

/// A persistent ordered index over [`CompositeKey`]s.
pub struct BPlusTree {
    file: RecordFile,
    heap: Option<ValueHeap>,
    header: Header,
    options: TreeOptions,
    /// Resident root. The disk copy is only brought current by
    /// [`flush`](Self::flush).
    root: Node,
    /// Resident copies of the root's children, parallel to the root's
    /// entries. Empty when the root's children are leaf blocks.
    root_children: Vec<Node>,
    closed: bool,
}

impl BPlusTree {
    /// Opens the index at `path`, creating it when absent.
    ///
    /// An existing file must have been written with the same fanouts
    /// and value policy; a mismatch is refused with `InvalidArgument`.
    pub fn open(path: &Path, options: TreeOptions) -> Result<Self> {
        if options.value_len == 0 || options.value_len > u16::MAX as usize {
            return Err(IndexError::InvalidArgument(format!(
                "value length {} out of range",
                options.value_len
            )));
        }
        if options.value_mode == ValueMode::Inline && options.value_len > 8 {
            return Err(IndexError::InvalidArgument(format!(
                "inline values are limited to 8 bytes, got {}",
                options.value_len
            )));
        }

        let (file, created) = RecordFile::open(path)?;
        let heap = match options.value_mode {
            ValueMode::Inline => None,
            ValueMode::Indirect => Some(ValueHeap::open(&values_path(path), options.value_len)?),
        };

        let header = Header::new(
            NODE_CAP as u16,
            LEAF_CAP as u16,
            options.value_len as u16,
            options.value_mode,
        );
        let mut tree = Self {
            file,
            heap,
            header,
            options,
            root: Node::new(NodeRole::Root, true),
            root_children: Vec::new(),
            // Armed only once the handle is fully loaded, so a failed
            // open never flushes a half-built root over the file.
            closed: true,
        };

        if created {
            tree.header.root_offset = HEADER_LEN as u64;
            tree.write_header()?;
            let mut buf = [0u8; NODE_RECORD_LEN];
            tree.root.encode_into(&mut buf);
            tree.file.append(&buf)?;
            tree.file.sync()?;
            tracing::info!(target: TARGET, path = %path.display(), "created index file");
        } else {
            let mut buf = [0u8; HEADER_LEN];
            tree.file.read_at(0, &mut buf)?;
            let header = Header::read_from(&buf)?;
            if header.node_cap as usize != NODE_CAP || header.leaf_cap as usize != LEAF_CAP {
                return Err(IndexError::InvalidArgument(format!(
                    "index file uses fanouts {}/{}, this build expects {NODE_CAP}/{LEAF_CAP}",
                    header.node_cap, header.leaf_cap
                )));
            }
            if header.value_len as usize != tree.options.value_len
                || header.value_mode != tree.options.value_mode
            {
                return Err(IndexError::InvalidArgument(format!(
                    "index file declares {}-byte {:?} values, options ask for {}-byte {:?}",
                    header.value_len,
                    header.value_mode,
                    tree.options.value_len,
                    tree.options.value_mode
                )));
            }
            tree.header = header;
            tree.root = tree.read_node(tree.header.root_offset)?;
            if tree.root.role != NodeRole::Root {
                return Err(IndexError::Corruption(format!(
                    "page at root offset {} is not a root node",
                    tree.header.root_offset
                )));
            }
            tree.load_root_children()?;
            tracing::info!(
                target: TARGET,
                path = %path.display(),
                entries = tree.root.count,
                "opened index file"
            );
        }
        tree.closed = false;
        Ok(tree)
    }

    /// Flushes the cached tier and releases the file lock.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.closed = true;
        Ok(())
    }

    /// Looks up the single entry equal to `key` under the primary
    /// order.
    pub fn find_exact(&mut self, key: &CompositeKey) -> Result<Option<Vec<u8>>> {
        match self.lookup_word(key)? {
            Some(word) => Ok(Some(self.load_value(word)?)),
            None => Ok(None),
        }
    }

    /// Collects the values of every entry equivalent to `key` under
    /// `order`, in ascending primary order.
    pub fn find_matching(
        &mut self,
        key: &CompositeKey,
        order: &dyn KeyOrder,
    ) -> Result<Vec<Vec<u8>>> {
        let words = self.collect_words(key, order, None)?;
        self.resolve_words(&words)
    }

    /// Like [`find_matching`](Self::find_matching), but stops the run
    /// at the first equivalent entry `bound` rejects.
    pub fn find_bounded(
        &mut self,
        key: &CompositeKey,
        order: &dyn KeyOrder,
        bound: &dyn BoundFilter,
    ) -> Result<Vec<Vec<u8>>> {
        let words = self.collect_words(key, order, Some(bound))?;
        self.resolve_words(&words)
    }

    /// Returns every entry in ascending primary order.
    pub fn scan(&mut self) -> Result<Vec<(CompositeKey, Vec<u8>)>> {
        let mut out = Vec::new();
        let mut off = match self.leftmost_leaf()? {
            Some(off) => off,
            None => return Ok(out),
        };
        while off != 0 {
            let block = self.read_block(off)?;
            for i in 0..block.count {
                let value = self.load_value(block.values[i])?;
                out.push((block.keys[i], value));
            }
            off = block.next;
        }
        Ok(out)
    }

    /// Walks the whole tree checking its structural invariants: keys
    /// ascending within every page, routing keys equal to each child's
    /// maximum, occupancy within bounds, and the leaf chain ascending
    /// end to end.
    pub fn verify(&mut self) -> Result<()> {
        if self.root.count == 0 {
            return Ok(());
        }
        let root = self.root.clone();
        self.verify_node(&root, true, true)?;

        let mut off = match self.leftmost_leaf()? {
            Some(off) => off,
            None => return Ok(()),
        };
        let mut prev: Option<CompositeKey> = None;
        while off != 0 {
            let block = self.read_block(off)?;
            for i in 0..block.count {
                if let Some(p) = prev {
                    if p >= block.keys[i] {
                        return Err(IndexError::Corruption(format!(
                            "leaf chain out of order at offset {off}: {p} >= {}",
                            block.keys[i]
                        )));
                    }
                }
                prev = Some(block.keys[i]);
            }
            off = block.next;
        }
        Ok(())
    }

    fn verify_node(&mut self, node: &Node, is_root: bool, floor_exempt: bool) -> Result<()> {
        if node.count == 0 {
            return Err(IndexError::Corruption("empty interior node".into()));
        }
        // Underflow repair fires as soon as a page crosses below half
        // and restores it to at least half, so that is the floor.
        if !is_root && !floor_exempt && node.count * 2 < NODE_CAP {
            return Err(IndexError::Corruption(format!(
                "interior node holds {} entries, below floor {}",
                node.count,
                NODE_CAP / 2
            )));
        }
        for i in 1..node.count {
            if node.keys[i - 1] >= node.keys[i] {
                return Err(IndexError::Corruption(format!(
                    "interior keys out of order: {} >= {}",
                    node.keys[i - 1],
                    node.keys[i]
                )));
            }
        }
        let child_exempt = is_root && node.count == 1;
        for i in 0..node.count {
            if node.children_are_leaves {
                let block = self.read_block(node.children[i])?;
                if block.count == 0 {
                    if !child_exempt {
                        return Err(IndexError::Corruption(format!(
                            "empty leaf at offset {}",
                            node.children[i]
                        )));
                    }
                    continue;
                }
                if !child_exempt && block.count * 2 < LEAF_CAP {
                    return Err(IndexError::Corruption(format!(
                        "leaf at offset {} holds {} entries, below floor {}",
                        node.children[i],
                        block.count,
                        LEAF_CAP / 2
                    )));
                }
                if block.last_key() != node.keys[i] {
                    return Err(IndexError::Corruption(format!(
                        "routing key {} disagrees with leaf maximum {}",
                        node.keys[i],
                        block.last_key()
                    )));
                }
            } else {
                let child = if is_root {
                    self.root_children[i].clone()
                } else {
                    self.read_node(node.children[i])?
                };
                if child.count == 0 || child.last_key() != node.keys[i] {
                    return Err(IndexError::Corruption(format!(
                        "routing key {} disagrees with child at offset {}",
                        node.keys[i], node.children[i]
                    )));
                }
                self.verify_node(&child, false, child_exempt)?;
            }
        }
        Ok(())
    }

    // --- descent and run collection ---

    /// Offset of the first leaf that could hold an entry equivalent to
    /// `key` under `order`, or `None` on an empty tree.
    fn locate_leaf(&mut self, key: &CompositeKey, order: &dyn KeyOrder) -> Result<Option<u64>> {
        if self.root.count == 0 {
            return Ok(None);
        }
        let mut node = self.root.clone();
        let mut is_root = true;
        loop {
            // Past-the-end targets still descend through the rightmost
            // child.
            let idx = lower_bound(node.keys(), key, order).unwrap_or(node.count - 1);
            let child = node.children[idx];
            if node.children_are_leaves {
                tracing::trace!(target: TARGET, offset = child, "descent reached leaf");
                return Ok(Some(child));
            }
            node = if is_root {
                self.root_children[idx].clone()
            } else {
                self.read_node(child)?
            };
            is_root = false;
        }
    }

    fn leftmost_leaf(&mut self) -> Result<Option<u64>> {
        if self.root.count == 0 {
            return Ok(None);
        }
        let mut node = self.root.clone();
        let mut is_root = true;
        while !node.children_are_leaves {
            let child = node.children[0];
            node = if is_root {
                self.root_children[0].clone()
            } else {
                self.read_node(child)?
            };
            is_root = false;
        }
        Ok(Some(node.children[0]))
    }

    /// Value words of the run of entries equivalent to `key` under
    /// `order`, following the leaf chain as far as the run extends.
    /// The run stops early at the first entry `bound` rejects.
    fn collect_words(
        &mut self,
        key: &CompositeKey,
        order: &dyn KeyOrder,
        bound: Option<&dyn BoundFilter>,
    ) -> Result<Vec<u64>> {
        let mut words = Vec::new();
        let mut off = match self.locate_leaf(key, order)? {
            Some(off) => off,
            None => return Ok(words),
        };

        // Skip leaves that sort entirely before the target.
        let (mut block, mut at) = loop {
            let block = self.read_block(off)?;
            match lower_bound(block.keys(), key, order) {
                Some(i) => break (block, i),
                None => {
                    off = block.next;
                    if off == 0 {
                        return Ok(words);
                    }
                }
            }
        };

        'run: loop {
            while at < block.count {
                let entry = &block.keys[at];
                if !order.equivalent(entry, key) {
                    break 'run;
                }
                match bound {
                    Some(b) if !b.admits(entry, key) => break 'run,
                    _ => words.push(block.values[at]),
                }
                at += 1;
            }
            if block.next == 0 {
                break;
            }
            block = self.read_block(block.next)?;
            at = 0;
        }
        Ok(words)
    }

    /// The value word of the entry equal to `key`, if present.
    pub(crate) fn lookup_word(&mut self, key: &CompositeKey) -> Result<Option<u64>> {
        Ok(self.collect_words(key, &PrimaryOrder, None)?.into_iter().next())
    }

    fn resolve_words(&mut self, words: &[u64]) -> Result<Vec<Vec<u8>>> {
        words.iter().map(|&w| self.load_value(w)).collect()
    }

    // --- value policy ---

    pub(crate) fn store_value(&mut self, payload: &[u8]) -> Result<u64> {
        if payload.len() > self.options.value_len {
            return Err(IndexError::InvalidArgument(format!(
                "value of {} bytes exceeds declared length {}",
                payload.len(),
                self.options.value_len
            )));
        }
        match &mut self.heap {
            None => {
                let mut word = [0u8; 8];
                word[..payload.len()].copy_from_slice(payload);
                Ok(u64::from_le_bytes(word))
            }
            Some(heap) => heap.append(payload),
        }
    }

    /// Materializes a value word into the declared-length payload,
    /// zero-padded past what the writer supplied.
    fn load_value(&mut self, word: u64) -> Result<Vec<u8>> {
        match &mut self.heap {
            None => Ok(word.to_le_bytes()[..self.options.value_len].to_vec()),
            Some(heap) => heap.read(word),
        }
    }

    // --- page i/o ---

    pub(crate) fn read_node(&mut self, offset: u64) -> Result<Node> {
        let mut buf = [0u8; NODE_RECORD_LEN];
        self.file.read_at(offset, &mut buf)?;
        Node::decode(&buf, self.options.checksum_verify_on_read)
    }

    pub(crate) fn write_node(&mut self, offset: u64, node: &Node) -> Result<()> {
        let mut buf = [0u8; NODE_RECORD_LEN];
        node.encode_into(&mut buf);
        self.file.write_at(offset, &buf)
    }

    pub(crate) fn append_node(&mut self, node: &Node) -> Result<u64> {
        let mut buf = [0u8; NODE_RECORD_LEN];
        node.encode_into(&mut buf);
        self.file.append(&buf)
    }

    pub(crate) fn read_block(&mut self, offset: u64) -> Result<Block> {
        let mut buf = [0u8; BLOCK_RECORD_LEN];
        self.file.read_at(offset, &mut buf)?;
        Block::decode(&buf, self.options.checksum_verify_on_read)
    }

    pub(crate) fn write_block(&mut self, offset: u64, block: &Block) -> Result<()> {
        let mut buf = [0u8; BLOCK_RECORD_LEN];
        block.encode_into(&mut buf);
        self.file.write_at(offset, &buf)
    }

    pub(crate) fn append_block(&mut self, block: &Block) -> Result<u64> {
        let mut buf = [0u8; BLOCK_RECORD_LEN];
        block.encode_into(&mut buf);
        self.file.append(&buf)
    }

    fn write_header(&mut self) -> Result<()> {
        let mut buf = [0u8; HEADER_LEN];
        self.header.write_to(&mut buf);
        self.file.write_at(0, &buf)
    }

    // --- cached tier ---

    fn load_root_children(&mut self) -> Result<()> {
        self.root_children.clear();
        if self.root.children_are_leaves {
            return Ok(());
        }
        for i in 0..self.root.count {
            let offset = self.root.children[i];
            let mut child = self.read_node(offset)?;
            child.role = NodeRole::RootChild;
            self.root_children.push(child);
        }
        Ok(())
    }

    /// Writes the cached tier and header back to disk and syncs.
    fn flush(&mut self) -> Result<()> {
        let children = mem::take(&mut self.root_children);
        for (i, child) in children.iter().enumerate() {
            let offset = self.root.children[i];
            self.write_node(offset, child)?;
        }
        self.root_children = children;

        let mut buf = [0u8; NODE_RECORD_LEN];
        self.root.encode_into(&mut buf);
        self.file.write_at(self.header.root_offset, &buf)?;
        self.write_header()?;
        self.file.sync()?;
        if let Some(heap) = &mut self.heap {
            heap.sync()?;
        }
        Ok(())
    }

    pub(crate) fn sync_files(&mut self) -> Result<()> {
        self.file.sync()?;
        if let Some(heap) = &mut self.heap {
            heap.sync()?;
        }
        Ok(())
    }
}

impl Drop for BPlusTree {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.flush() {
                tracing::error!(target: TARGET, %err, "failed to flush index on drop");
            }
        }
    }
}

/// Sibling path of the value heap: the index path with `.vals`
/// appended.
fn values_path(path: &Path) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_os_string();
    os.push(".vals");
    PathBuf::from(os)
}
