// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The `HistoryTree`: tree-shape bookkeeping, the "latest branch" growth
//! strategy, insertion dispatch, query descent, and the tree-file header.

use crate::config::Config;
use crate::interval::Interval;
use crate::io::BlockIo;
use crate::node::HistoryTreeNode;
use crate::value::StateValue;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

const MAGIC: u32 = 0x4854_5245; // b"HTRE", arbitrary but stable
const FORMAT_VERSION: u32 = 1;

/// Size of the fixed-size file preamble preceding all node blocks. Bigger
/// than the header actually needs so the format can grow without an
/// on-disk layout break.
pub const TREE_HEADER_SIZE: u64 = 512;

struct RawHeader {
    magic: u32,
    format_version: u32,
    provider_version: u32,
    block_size: u32,
    max_children: u32,
    root_sequence: u32,
    node_count: u32,
    tree_start: i64,
    tree_end: i64,
    attribute_tree_offset: u64,
}

impl RawHeader {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.format_version)?;
        writer.write_u32::<LittleEndian>(self.provider_version)?;
        writer.write_u32::<LittleEndian>(self.block_size)?;
        writer.write_u32::<LittleEndian>(self.max_children)?;
        writer.write_u32::<LittleEndian>(self.root_sequence)?;
        writer.write_u32::<LittleEndian>(self.node_count)?;
        writer.write_i64::<LittleEndian>(self.tree_start)?;
        writer.write_i64::<LittleEndian>(self.tree_end)?;
        writer.write_u64::<LittleEndian>(self.attribute_tree_offset)?;
        Ok(())
    }

    fn decode_from<R: Read>(reader: &mut R) -> Result<Self> {
        let magic = reader.read_u32::<LittleEndian>()?;
        let format_version = reader.read_u32::<LittleEndian>()?;
        let provider_version = reader.read_u32::<LittleEndian>()?;
        let block_size = reader.read_u32::<LittleEndian>()?;
        let max_children = reader.read_u32::<LittleEndian>()?;
        let root_sequence = reader.read_u32::<LittleEndian>()?;
        let node_count = reader.read_u32::<LittleEndian>()?;
        let tree_start = reader.read_i64::<LittleEndian>()?;
        let tree_end = reader.read_i64::<LittleEndian>()?;
        let attribute_tree_offset = reader.read_u64::<LittleEndian>()?;

        if magic != MAGIC {
            return Err(Error::Corruption("tree file magic does not match"));
        }
        if format_version != FORMAT_VERSION {
            return Err(Error::Corruption("tree file format version does not match"));
        }

        Ok(Self {
            magic,
            format_version,
            provider_version,
            block_size,
            max_children,
            root_sequence,
            node_count,
            tree_start,
            tree_end,
            attribute_tree_offset,
        })
    }
}

/// The history tree storage engine: a time-ordered tree of interval
/// blocks. See the module-level docs on the crate for the overall
/// picture; this type implements growth, insertion, and query descent.
pub struct HistoryTree {
    io: BlockIo,
    block_size: u32,
    max_children: u32,
    provider_version: u32,
    tree_start: i64,
    tree_end: AtomicI64,
    root_sequence: AtomicU32,
    node_count: AtomicU32,
    attribute_tree_offset: AtomicU64,
    sequence_counter: AtomicU32,
    /// Root-to-leaf path of nodes currently open for insertion. Empty once
    /// the tree has been opened read-only from disk (no building will
    /// occur) or, transiently, is always non-empty during a build.
    latest_branch: RwLock<Vec<Arc<HistoryTreeNode>>>,
    /// Every node this tree has created in memory, so repeated lookups
    /// during a build don't force a round trip through disk I/O. Indexed
    /// by sequence number.
    owned_nodes: Mutex<HashMap<u32, Arc<HistoryTreeNode>>>,
    finished: AtomicBool,
    disposed: AtomicBool,
}

impl HistoryTree {
    /// Creates a new tree file per `config`, with a single empty root leaf.
    pub(crate) fn create(config: &Config) -> Result<Self> {
        let min_block_size = config.min_block_size();
        if config.block_size < min_block_size {
            return Err(Error::InvalidConfig(
                "block_size is too small to hold the largest possible interval",
            ));
        }
        if config.max_children < 1 {
            return Err(Error::InvalidConfig("max_children must be at least 1"));
        }

        let io = BlockIo::create(&config.path, TREE_HEADER_SIZE, config.block_size, config.max_children)?;

        let tree = Self {
            io,
            block_size: config.block_size,
            max_children: config.max_children,
            provider_version: config.provider_version,
            tree_start: config.start_time,
            tree_end: AtomicI64::new(config.start_time),
            root_sequence: AtomicU32::new(0),
            node_count: AtomicU32::new(1),
            attribute_tree_offset: AtomicU64::new(0),
            sequence_counter: AtomicU32::new(1),
            latest_branch: RwLock::new(Vec::new()),
            owned_nodes: Mutex::new(HashMap::new()),
            finished: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        };

        let root = Arc::new(HistoryTreeNode::new_leaf(0, -1, config.start_time, config.block_size));
        tree.register_node(root.clone());
        *tree.latest_branch.write().expect("branch lock poisoned") = vec![root];

        tree.write_header()?;

        Ok(tree)
    }

    /// Reopens an existing tree file for querying. Validates the header's
    /// magic, format version, and (if `expected_provider_version` is set)
    /// provider version.
    pub(crate) fn open(config: &Config) -> Result<Self> {
        let mut header_buf = vec![0u8; TREE_HEADER_SIZE as usize];
        {
            let mut f = std::fs::File::open(&config.path)?;
            f.read_exact(&mut header_buf)?;
        }
        let header = RawHeader::decode_from(&mut &header_buf[..])?;

        if header.provider_version != config.provider_version {
            return Err(Error::Corruption("tree file provider version does not match"));
        }

        let io = BlockIo::open(
            &config.path,
            TREE_HEADER_SIZE,
            header.block_size,
            header.max_children,
        )?;

        Ok(Self {
            io,
            block_size: header.block_size,
            max_children: header.max_children,
            provider_version: header.provider_version,
            tree_start: header.tree_start,
            tree_end: AtomicI64::new(header.tree_end),
            root_sequence: AtomicU32::new(header.root_sequence),
            node_count: AtomicU32::new(header.node_count),
            attribute_tree_offset: AtomicU64::new(header.attribute_tree_offset),
            sequence_counter: AtomicU32::new(header.node_count),
            latest_branch: RwLock::new(Vec::new()),
            owned_nodes: Mutex::new(HashMap::new()),
            finished: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
        })
    }

    fn check_disposed(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    fn check_time_range(&self, t: i64) -> Result<()> {
        let (start, end) = (self.tree_start, self.tree_end.load(Ordering::Acquire));
        if t < start || t > end {
            return Err(Error::TimeRangeError { requested: t, start, end });
        }
        Ok(())
    }

    fn next_sequence(&self) -> u32 {
        self.sequence_counter.fetch_add(1, Ordering::AcqRel)
    }

    fn register_node(&self, node: Arc<HistoryTreeNode>) {
        self.owned_nodes.lock().expect("owned node map poisoned").insert(node.sequence(), node);
        self.node_count.fetch_max(self.next_sequence_peek(), Ordering::AcqRel);
    }

    fn next_sequence_peek(&self) -> u32 {
        self.sequence_counter.load(Ordering::Acquire)
    }

    fn bump_tree_end(&self, candidate: i64) {
        self.tree_end.fetch_max(candidate, Ordering::AcqRel);
    }

    /// Returns the node with the given sequence number, consulting
    /// in-memory state before falling back to disk I/O.
    pub(crate) fn get_node(&self, sequence: u32) -> Result<Arc<HistoryTreeNode>> {
        self.check_disposed()?;
        if let Some(node) = self.owned_nodes.lock().expect("owned node map poisoned").get(&sequence) {
            return Ok(node.clone());
        }
        self.io.read_node(sequence).map_err(|e| if matches!(e, Error::Disposed) { Error::Disposed } else { e })
    }

    /// Formats a human-readable summary of a single node's header and
    /// interval list, for introspection tooling.
    pub fn describe_node(&self, sequence: u32) -> Result<String> {
        let node = self.get_node(sequence)?;
        let mut out = format!(
            "node {} [{}] parent={} start={} end={} intervals={}\n",
            node.sequence(),
            if node.is_core() { "core" } else { "leaf" },
            node.parent_sequence(),
            node.start(),
            node.end().map_or_else(|| "open".to_string(), |e| e.to_string()),
            node.interval_count(),
        );
        for iv in node.intervals() {
            out.push_str(&format!("  [{}, {}] quark={} value={:?}\n", iv.start, iv.end, iv.quark, iv.value));
        }
        for (child_seq, child_start) in node.children() {
            out.push_str(&format!("  child seq={child_seq} start={child_start}\n"));
        }
        Ok(out)
    }

    /// Lower bound of the tree's valid query range.
    #[must_use]
    pub fn get_start_time(&self) -> i64 {
        self.tree_start
    }

    /// Upper bound of the tree's valid query range.
    #[must_use]
    pub fn get_end_time(&self) -> i64 {
        self.tree_end.load(Ordering::Acquire)
    }

    /// Number of nodes allocated so far.
    #[must_use]
    pub fn node_count(&self) -> u32 {
        self.node_count.load(Ordering::Acquire)
    }

    /// Sequence number of the current root node.
    #[must_use]
    pub fn root_sequence(&self) -> u32 {
        self.root_sequence.load(Ordering::Acquire)
    }

    /// Configured node block size.
    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Configured branching factor of core nodes.
    #[must_use]
    pub fn max_children(&self) -> u32 {
        self.max_children
    }

    /// Opaque provider version checked on reopen.
    #[must_use]
    pub fn provider_version(&self) -> u32 {
        self.provider_version
    }

    /// Total size of the tree file so far.
    pub fn file_size(&self) -> Result<u64> {
        self.io.file_size()
    }

    /// Percentage of allocated block bytes actually used by interval data
    /// across every node this tree has written so far. The computed
    /// percentage is returned as-is; 0-100 is always valid output, and a
    /// value outside that range would indicate a bug in byte accounting,
    /// not a normal runtime condition.
    pub fn average_node_usage(&self) -> Result<f64> {
        self.check_disposed()?;
        let total_nodes = self.node_count.load(Ordering::Acquire);
        if total_nodes == 0 {
            return Ok(0.0);
        }

        let mut used = 0u64;
        for seq in 0..total_nodes {
            let node = self.get_node(seq)?;
            used += node.used_bytes() as u64;
        }

        let total_capacity = u64::from(total_nodes) * u64::from(self.block_size);
        #[allow(clippy::cast_precision_loss)]
        let percentage = (used as f64 / total_capacity as f64) * 100.0;

        assert!(
            (0.0..=100.0).contains(&percentage),
            "average node usage {percentage} outside [0, 100]: byte accounting is broken"
        );

        Ok(percentage)
    }

    /// Appends an interval to the tree. Must be called during build (i.e.
    /// before [`HistoryTree::finish_building`]).
    pub fn insert_past_state(&self, start: i64, end: i64, quark: i32, value: StateValue) -> Result<()> {
        self.insert_interval(Interval::new(start, end, quark, value))
    }

    pub(crate) fn insert_interval(&self, interval: Interval) -> Result<()> {
        self.check_disposed()?;
        if self.finished.load(Ordering::Acquire) {
            return Err(Error::Disposed);
        }
        if interval.start > interval.end || interval.start < self.tree_start {
            return Err(Error::TimeRangeError {
                requested: interval.start,
                start: self.tree_start,
                end: interval.end,
            });
        }
        let size = interval.encoded_size();
        if size > usize::from(u16::MAX) {
            return Err(Error::IntervalTooLarge(size));
        }

        loop {
            let leaf = {
                let branch = self.latest_branch.read().expect("branch lock poisoned");
                branch.last().expect("latest branch is never empty during a build").clone()
            };

            if leaf.try_append(interval.clone())? {
                self.bump_tree_end(interval.end);
                return Ok(());
            }

            self.split_latest_leaf(interval.end)?;
        }
    }

    /// Closes the current leaf (and, if necessary, any full ancestors) and
    /// opens a new leaf to receive further insertions.
    fn split_latest_leaf(&self, trigger_end: i64) -> Result<()> {
        let mut branch = self.latest_branch.write().expect("branch lock poisoned");
        let old_depth = branch.len();
        let old_root = branch.first().expect("branch is never empty").clone();

        let mut i = branch.len() - 1;
        let closed = branch[i].close(trigger_end);
        self.io.write_node(&branch[i]);
        branch[i].mark_on_disk();
        let mut closed_end = closed;

        loop {
            if i == 0 {
                let new_branch = self.grow_new_root(&old_root, old_depth, closed_end)?;
                *branch = new_branch;
                return Ok(());
            }

            let parent_idx = i - 1;
            if branch[parent_idx].child_count() < self.max_children as usize {
                let new_start = closed_end + 1;
                let sequence = self.next_sequence();
                let new_leaf = Arc::new(HistoryTreeNode::new_leaf(
                    sequence,
                    branch[parent_idx].sequence() as i32,
                    new_start,
                    self.block_size,
                ));
                branch[parent_idx].link_new_child(sequence, new_start)?;
                self.register_node(new_leaf.clone());

                branch.truncate(parent_idx + 1);
                branch.push(new_leaf);
                return Ok(());
            }

            let closed = branch[parent_idx].close(trigger_end);
            self.io.write_node(&branch[parent_idx]);
            branch[parent_idx].mark_on_disk();
            closed_end = closed;
            i = parent_idx;
        }
    }

    /// Allocates a new root one level above the current one: the old root
    /// becomes a child of the new root, and a fresh chain of core nodes
    /// plus a leaf is created down from the new root so the new latest
    /// branch has the same depth as before, plus one.
    fn grow_new_root(
        &self,
        old_root: &Arc<HistoryTreeNode>,
        old_depth: usize,
        closed_end: i64,
    ) -> Result<Vec<Arc<HistoryTreeNode>>> {
        let new_root_sequence = self.next_sequence();
        let new_root = Arc::new(HistoryTreeNode::new_core(
            new_root_sequence,
            -1,
            old_root.start(),
            self.block_size,
            self.max_children,
        ));
        old_root.set_parent_sequence(new_root_sequence as i32);
        // The old root was already persisted when it was closed above; its
        // parent link has since changed, so it must be rewritten.
        self.io.write_node(old_root);

        new_root.link_new_child(old_root.sequence(), old_root.start())?;
        self.register_node(new_root.clone());
        self.root_sequence.store(new_root_sequence, Ordering::Release);

        let mut chain = vec![new_root.clone()];
        let mut parent = new_root;
        let new_start = closed_end + 1;

        for _ in 0..old_depth.saturating_sub(1) {
            let sequence = self.next_sequence();
            let core = Arc::new(HistoryTreeNode::new_core(
                sequence,
                parent.sequence() as i32,
                new_start,
                self.block_size,
                self.max_children,
            ));
            parent.link_new_child(sequence, new_start)?;
            self.register_node(core.clone());
            chain.push(core.clone());
            parent = core;
        }

        let leaf_sequence = self.next_sequence();
        let leaf = Arc::new(HistoryTreeNode::new_leaf(
            leaf_sequence,
            parent.sequence() as i32,
            new_start,
            self.block_size,
        ));
        parent.link_new_child(leaf_sequence, new_start)?;
        self.register_node(leaf.clone());
        chain.push(leaf);

        Ok(chain)
    }

    /// Closes the tree at `max(end_time, current_end)`: walks the latest
    /// branch once, closing each still-open node.
    pub fn finish_building(&self, end_time: i64) -> Result<()> {
        self.check_disposed()?;
        if self.finished.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let final_end = self.get_end_time().max(end_time);
        self.bump_tree_end(final_end);

        let branch = self.latest_branch.read().expect("branch lock poisoned");
        for node in branch.iter() {
            node.close(final_end);
            self.io.write_node(node);
            node.mark_on_disk();
        }
        drop(branch);

        self.write_header()?;
        self.io.sync()?;
        Ok(())
    }

    fn write_header(&self) -> Result<()> {
        let header = RawHeader {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            provider_version: self.provider_version,
            block_size: self.block_size,
            max_children: self.max_children,
            root_sequence: self.root_sequence.load(Ordering::Acquire),
            node_count: self.node_count.load(Ordering::Acquire),
            tree_start: self.tree_start,
            tree_end: self.tree_end.load(Ordering::Acquire),
            attribute_tree_offset: self.attribute_tree_offset.load(Ordering::Acquire),
        };

        let mut buf = Vec::with_capacity(TREE_HEADER_SIZE as usize);
        header.encode_into(&mut buf)?;
        buf.resize(TREE_HEADER_SIZE as usize, 0);
        self.io.write_attribute_tree_blob(0, &buf)?;
        Ok(())
    }

    /// Fills `out[quark]` for every quark with an interval intersecting
    /// `t`. `out` must be pre-sized to the expected number of quarks;
    /// entries beyond its bounds are ignored.
    pub fn query_full(&self, t: i64, out: &mut [Option<Interval>]) -> Result<()> {
        self.check_disposed()?;
        self.check_time_range(t)?;

        let mut sequence = self.root_sequence();
        loop {
            let node = self.get_node(sequence)?;
            node.collect_full(t, out);

            match node.select_next_child(t) {
                Some(child) => sequence = child,
                None => break,
            }
        }
        Ok(())
    }

    /// Returns the interval intersecting `(t, quark)`, or `None` if there
    /// is no such interval.
    pub fn query_singular(&self, t: i64, quark: i32) -> Result<Option<Interval>> {
        self.check_disposed()?;
        self.check_time_range(t)?;

        let mut sequence = self.root_sequence();
        loop {
            let node = self.get_node(sequence)?;
            if let Some(interval) = node.get_relevant_interval(quark, t) {
                return Ok(Some(interval));
            }

            match node.select_next_child(t) {
                Some(child) => sequence = child,
                None => return Ok(None),
            }
        }
    }

    /// Populates `out[quark]` for each requested quark that has an
    /// intersecting interval at `t`.
    pub fn query_partial(&self, t: i64, quarks: &[i32], out: &mut HashMap<i32, Interval>) -> Result<()> {
        self.check_disposed()?;
        self.check_time_range(t)?;

        let mut remaining: HashSet<i32> = quarks.iter().copied().collect();
        if remaining.is_empty() {
            return Ok(());
        }

        let mut sequence = self.root_sequence();
        loop {
            let node = self.get_node(sequence)?;
            node.collect_partial(t, &mut remaining, out);
            if remaining.is_empty() {
                return Ok(());
            }

            match node.select_next_child(t) {
                Some(child) => sequence = child,
                None => return Ok(()),
            }
        }
    }

    /// File-offset slot where the opaque attribute-tree blob begins.
    #[must_use]
    pub fn attribute_tree_offset(&self) -> u64 {
        self.attribute_tree_offset.load(Ordering::Acquire)
    }

    /// Writes the attribute-tree blob, recording its offset in the header.
    /// The blob's contents are opaque to this crate.
    pub fn supply_attribute_tree_writer(&self, blob: &[u8]) -> Result<()> {
        let offset = self.io.file_size()?;
        self.io.write_attribute_tree_blob(offset, blob)?;
        self.attribute_tree_offset.store(offset, Ordering::Release);
        self.write_header()?;
        Ok(())
    }

    /// Reads back the attribute-tree blob of length `len`.
    pub fn supply_attribute_tree_reader(&self, len: usize) -> Result<Vec<u8>> {
        let offset = self.attribute_tree_offset();
        self.io.read_attribute_tree_blob(offset, len)
    }

    /// Path to the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.io.path()
    }

    /// Deletes the backing file and marks this tree disposed. An
    /// interrupted build (disposal before `finish_building`) must not
    /// leave a half-written file behind that could be mistakenly reopened.
    pub fn remove_files(&self) -> Result<()> {
        self.dispose();
        match std::fs::remove_file(self.path()) {
            Ok(()) | Err(_) if !self.path().exists() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Marks this tree disposed (subsequent public operations fail with
    /// [`Error::Disposed`]) and, if the build never reached
    /// `finish_building`, deletes the partially built file immediately
    /// rather than leaving that to `Drop`.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.io.dispose();
        self.delete_if_unfinished();
    }

    #[must_use]
    pub(crate) fn was_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn delete_if_unfinished(&self) {
        if self.was_finished() {
            return;
        }
        log::warn!(
            "history tree at {} disposed before finish_building; deleting partial file",
            self.path().display()
        );
        if let Err(e) = std::fs::remove_file(self.path()) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::error!("failed to delete partially built tree file: {e}");
            }
        }
    }
}

impl Drop for HistoryTree {
    fn drop(&mut self) {
        self.delete_if_unfinished();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn tiny_tree(dir: &Path, max_children: u32, block_size: u32) -> HistoryTree {
        let config = Config::new(dir.join("tree.ht")).block_size(block_size).max_children(max_children);
        HistoryTree::create(&config).unwrap()
    }

    #[test]
    fn single_interval_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tiny_tree(dir.path(), 4, 4096);
        tree.insert_past_state(0, 100, 1, StateValue::Long(42)).unwrap();
        tree.finish_building(100).unwrap();

        let result = tree.query_singular(50, 1).unwrap();
        assert_eq!(result.unwrap().value, StateValue::Long(42));
    }

    #[test]
    fn rejects_start_after_end() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tiny_tree(dir.path(), 4, 4096);
        let err = tree.insert_past_state(10, 5, 1, StateValue::Null).unwrap_err();
        assert!(matches!(err, Error::TimeRangeError { .. }));
    }

    #[test]
    fn query_outside_range_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tiny_tree(dir.path(), 4, 4096);
        tree.insert_past_state(0, 10, 1, StateValue::Null).unwrap();
        tree.finish_building(10).unwrap();

        assert!(matches!(
            tree.query_singular(-1, 1).unwrap_err(),
            Error::TimeRangeError { .. }
        ));
        assert!(matches!(
            tree.query_singular(11, 1).unwrap_err(),
            Error::TimeRangeError { .. }
        ));
        assert!(tree.query_singular(0, 1).is_ok());
        assert!(tree.query_singular(10, 1).is_ok());
    }

    #[test]
    fn forces_splits_and_root_growth() {
        // Tiny block size and branching factor so a modest number of
        // insertions forces both leaf splits and at least one new root.
        let dir = tempfile::tempdir().unwrap();
        let tree = tiny_tree(dir.path(), 2, 160);

        for t in 0..200i64 {
            tree.insert_past_state(t, t, (t % 5) as i32, StateValue::Long(t)).unwrap();
        }
        tree.finish_building(199).unwrap();

        assert!(tree.node_count() > 1);
        assert_eq!(tree.query_singular(150, 0).unwrap().unwrap().value, StateValue::Long(150));
    }

    #[test]
    fn partial_and_full_queries_agree() {
        let dir = tempfile::tempdir().unwrap();
        let tree = tiny_tree(dir.path(), 3, 512);

        for q in 0..10i32 {
            tree.insert_past_state(0, 1000, q, StateValue::Long(i64::from(q))).unwrap();
        }
        tree.finish_building(1000).unwrap();

        let mut full = vec![None; 10];
        tree.query_full(500, &mut full).unwrap();

        let mut partial = HashMap::new();
        tree.query_partial(500, &[2, 5, 9], &mut partial).unwrap();

        for q in [2, 5, 9] {
            assert_eq!(partial.get(&q), full[q as usize].as_ref());
        }
    }

    #[test]
    fn dropping_unfinished_tree_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.ht");
        {
            let config = Config::new(&path);
            let tree = HistoryTree::create(&config).unwrap();
            tree.insert_past_state(0, 10, 0, StateValue::Null).unwrap();
        }
        assert!(!path.exists());
    }
}
