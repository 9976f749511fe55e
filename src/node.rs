// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `HistoryTreeNode` and its two variants, Core and Leaf: a fixed-size
//! block holding a header plus a time-sorted list of intervals.

use crate::binary_search::partition_point;
use crate::coding::{Decode, Encode};
use crate::interval::Interval;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::RwLock;

const CORE_TAG: u8 = 1;
const LEAF_TAG: u8 = 2;

/// Size of the fields shared by both node variants: tag, start, end,
/// sequence, parent sequence, interval count.
const COMMON_HEADER_SIZE: usize = 1 + 8 + 8 + 4 + 4 + 4;

/// Size of the Core-specific header fields excluding the per-child arrays.
const CORE_FIXED_HEADER_SIZE: usize = 4 + 4; // extension_seq + child_count

/// Whether a node is an internal (Core) node with children, or a terminal
/// (Leaf) node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Internal node; carries a children array.
    Core,
    /// Terminal node; carries no children.
    Leaf,
}

struct CoreExtension {
    max_children: usize,
    children_seq: Vec<u32>,
    children_start: Vec<i64>,
}

struct NodeData {
    node_start: i64,
    node_end: Option<i64>,
    intervals: Vec<Interval>,
    /// Maximum end time observed across intervals appended to this node so
    /// far; used to compute the close end time.
    max_interval_end: i64,
    on_disk: bool,
}

/// One on-disk block: a header plus a time-sorted list of intervals, and
/// (for Core nodes) a children array.
pub struct HistoryTreeNode {
    sequence: u32,
    parent_sequence: AtomicI32,
    block_size: u32,
    kind: NodeKind,
    data: RwLock<NodeData>,
    core: Option<RwLock<CoreExtension>>,
}

impl HistoryTreeNode {
    /// Creates a new, empty, in-memory leaf node.
    #[must_use]
    pub fn new_leaf(sequence: u32, parent_sequence: i32, node_start: i64, block_size: u32) -> Self {
        Self {
            sequence,
            parent_sequence: AtomicI32::new(parent_sequence),
            block_size,
            kind: NodeKind::Leaf,
            data: RwLock::new(NodeData {
                node_start,
                node_end: None,
                intervals: Vec::new(),
                max_interval_end: i64::MIN,
                on_disk: false,
            }),
            core: None,
        }
    }

    /// Creates a new, empty, in-memory core node.
    #[must_use]
    pub fn new_core(
        sequence: u32,
        parent_sequence: i32,
        node_start: i64,
        block_size: u32,
        max_children: u32,
    ) -> Self {
        Self {
            sequence,
            parent_sequence: AtomicI32::new(parent_sequence),
            block_size,
            kind: NodeKind::Core,
            data: RwLock::new(NodeData {
                node_start,
                node_end: None,
                intervals: Vec::new(),
                max_interval_end: i64::MIN,
                on_disk: false,
            }),
            core: Some(RwLock::new(CoreExtension {
                max_children: max_children as usize,
                children_seq: Vec::new(),
                children_start: Vec::new(),
            })),
        }
    }

    /// This node's sequence number.
    #[must_use]
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// This node's parent's sequence number, or `-1` for the root.
    #[must_use]
    pub fn parent_sequence(&self) -> i32 {
        self.parent_sequence.load(Ordering::Acquire)
    }

    pub(crate) fn set_parent_sequence(&self, parent_sequence: i32) {
        self.parent_sequence.store(parent_sequence, Ordering::Release);
    }

    /// `true` if this is a Core (internal) node.
    #[must_use]
    pub fn is_core(&self) -> bool {
        self.kind == NodeKind::Core
    }

    /// This node's variant tag.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Inclusive lower bound of any interval this node may hold.
    #[must_use]
    pub fn start(&self) -> i64 {
        self.data.read().expect("node lock poisoned").node_start
    }

    /// Upper bound, fixed once the node is closed.
    #[must_use]
    pub fn end(&self) -> Option<i64> {
        self.data.read().expect("node lock poisoned").node_end
    }

    /// `true` once this node has been closed (and so is immutable).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.data.read().expect("node lock poisoned").node_end.is_some()
    }

    /// `true` once this node's block has been written to disk.
    #[must_use]
    pub fn is_on_disk(&self) -> bool {
        self.data.read().expect("node lock poisoned").on_disk
    }

    pub(crate) fn mark_on_disk(&self) {
        self.data.write().expect("node lock poisoned").on_disk = true;
    }

    /// Number of intervals currently stored in this node.
    #[must_use]
    pub fn interval_count(&self) -> usize {
        self.data.read().expect("node lock poisoned").intervals.len()
    }

    /// Copies out this node's intervals, oldest end time first.
    #[must_use]
    pub fn intervals(&self) -> Vec<Interval> {
        self.data.read().expect("node lock poisoned").intervals.clone()
    }

    /// Copies out this Core node's `(child sequence, child start time)`
    /// pairs, newest-linked last. Empty for a Leaf node.
    #[must_use]
    pub fn children(&self) -> Vec<(u32, i64)> {
        match &self.core {
            Some(core) => {
                let core = core.read().expect("core lock poisoned");
                core.children_seq.iter().copied().zip(core.children_start.iter().copied()).collect()
            }
            None => Vec::new(),
        }
    }

    fn variant_header_size(&self) -> usize {
        match &self.core {
            Some(core) => {
                let core = core.read().expect("core lock poisoned");
                CORE_FIXED_HEADER_SIZE + core.max_children * (4 + 8)
            }
            None => 0,
        }
    }

    fn header_size(&self) -> usize {
        COMMON_HEADER_SIZE + self.variant_header_size()
    }

    /// Bytes actually used by this node's header and interval data.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        let data = self.data.read().expect("node lock poisoned");
        self.header_size() + data.intervals.iter().map(Interval::encoded_size).sum::<usize>()
    }

    /// Free space remaining in this node's block.
    #[must_use]
    pub fn free_space(&self) -> usize {
        (self.block_size as usize).saturating_sub(self.used_bytes())
    }

    /// Attempts to append `interval` to this node, maintaining the
    /// end-time sort order by locating the insertion index scanning
    /// backward from the tail. Returns `false` without mutating the node
    /// if the interval does not fit in the remaining free space.
    pub fn try_append(&self, interval: Interval) -> Result<bool> {
        let size = interval.encoded_size();
        if size > usize::from(u16::MAX) {
            return Err(Error::IntervalTooLarge(size));
        }

        let mut data = self.data.write().expect("node lock poisoned");
        if data.on_disk {
            return Ok(false);
        }

        let used: usize = data.intervals.iter().map(Interval::encoded_size).sum();
        let free = (self.block_size as usize).saturating_sub(self.header_size() + used);
        if size > free {
            return Ok(false);
        }

        let mut idx = data.intervals.len();
        while idx > 0 && data.intervals[idx - 1].end > interval.end {
            idx -= 1;
        }

        data.max_interval_end = data.max_interval_end.max(interval.end);
        data.intervals.insert(idx, interval);
        Ok(true)
    }

    /// Closes this node: records its end time as the greater of its
    /// observed maximum interval end and `end_time`, and of any end time
    /// previously recorded (closing is idempotent). Returns the recorded
    /// end time.
    ///
    /// An empty node may end up with `end < start`; this is tolerated
    /// rather than rejected (the node is vacuous).
    pub fn close(&self, end_time: i64) -> i64 {
        let mut data = self.data.write().expect("node lock poisoned");
        let candidate = data.max_interval_end.max(end_time);
        let new_end = match data.node_end {
            Some(prev) => prev.max(candidate),
            None => candidate,
        };
        data.node_end = Some(new_end);
        new_end
    }

    /// Number of children currently linked to this Core node.
    ///
    /// # Panics
    /// Panics if called on a Leaf node.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.core
            .as_ref()
            .expect("child_count called on a leaf node")
            .read()
            .expect("core lock poisoned")
            .children_seq
            .len()
    }

    /// This Core node's configured branching factor.
    ///
    /// # Panics
    /// Panics if called on a Leaf node.
    #[must_use]
    pub fn max_children(&self) -> usize {
        self.core
            .as_ref()
            .expect("max_children called on a leaf node")
            .read()
            .expect("core lock poisoned")
            .max_children
    }

    /// `true` if this Core node already has `max_children` children.
    #[must_use]
    pub fn is_full_of_children(&self) -> bool {
        self.core.as_ref().is_some_and(|core| {
            let core = core.read().expect("core lock poisoned");
            core.children_seq.len() >= core.max_children
        })
    }

    /// Appends a new child to this Core node. Children are ordered by
    /// creation time, and `link_new_child` is always called with a start
    /// time `>=` the previous child's.
    ///
    /// # Errors
    /// Returns [`Error::Corruption`] if this node is already at
    /// `max_children`, or if called on a Leaf node.
    pub fn link_new_child(&self, child_sequence: u32, child_start: i64) -> Result<()> {
        let core = self
            .core
            .as_ref()
            .ok_or(Error::Corruption("link_new_child called on a leaf node"))?;
        let mut core = core.write().expect("core lock poisoned");
        if core.children_seq.len() >= core.max_children {
            return Err(Error::Corruption("core node exceeded max_children"));
        }
        core.children_seq.push(child_sequence);
        core.children_start.push(child_start);
        Ok(())
    }

    /// Selects the child whose interval of responsibility contains `t`:
    /// scans children newest to oldest and returns the first whose start
    /// time is `<= t`.
    #[must_use]
    pub fn select_next_child(&self, t: i64) -> Option<u32> {
        let core = self.core.as_ref()?.read().expect("core lock poisoned");
        (0..core.children_seq.len())
            .rev()
            .find(|&i| core.children_start[i] <= t)
            .map(|i| core.children_seq[i])
    }

    /// Returns the first interval in this node that intersects `t` and
    /// matches `quark`, located via a binary search on end time followed
    /// by a back-scan through any run of equal end times.
    #[must_use]
    pub fn get_relevant_interval(&self, quark: i32, t: i64) -> Option<Interval> {
        let data = self.data.read().expect("node lock poisoned");
        let idx = partition_point(&data.intervals, |iv| iv.end < t);
        data.intervals[idx..]
            .iter()
            .find(|iv| iv.quark == quark && iv.intersects(t))
            .cloned()
    }

    /// Writes, into `out[quark]`, every interval in this node that
    /// intersects `t`, for quarks within `out`'s bounds.
    pub fn collect_full(&self, t: i64, out: &mut [Option<Interval>]) {
        let data = self.data.read().expect("node lock poisoned");
        let idx = partition_point(&data.intervals, |iv| iv.end < t);
        for iv in &data.intervals[idx..] {
            if iv.start <= t {
                if let Some(slot) = usize::try_from(iv.quark).ok().and_then(|q| out.get_mut(q)) {
                    *slot = Some(iv.clone());
                }
            }
        }
    }

    /// Writes, into `out`, every interval in this node that intersects `t`
    /// and whose quark is still in `remaining`, removing matched quarks
    /// from `remaining` as it goes.
    pub fn collect_partial(
        &self,
        t: i64,
        remaining: &mut std::collections::HashSet<i32>,
        out: &mut std::collections::HashMap<i32, Interval>,
    ) {
        if remaining.is_empty() {
            return;
        }

        let data = self.data.read().expect("node lock poisoned");
        let idx = partition_point(&data.intervals, |iv| iv.end < t);
        for iv in &data.intervals[idx..] {
            if remaining.is_empty() {
                break;
            }
            if iv.start <= t && remaining.remove(&iv.quark) {
                out.insert(iv.quark, iv.clone());
            }
        }
    }

    /// Serializes this node's block (header, intervals, no padding).
    /// Callers pad the result to `block_size` before writing it out.
    pub fn encode_into<W: Write>(&self, writer: &mut W) -> Result<()> {
        let data = self.data.read().expect("node lock poisoned");

        let tag = match self.kind {
            NodeKind::Core => CORE_TAG,
            NodeKind::Leaf => LEAF_TAG,
        };
        writer.write_u8(tag)?;
        writer.write_i64::<LittleEndian>(data.node_start)?;
        writer.write_i64::<LittleEndian>(data.node_end.unwrap_or(0))?;
        #[allow(clippy::cast_possible_wrap)]
        writer.write_i32::<LittleEndian>(self.sequence as i32)?;
        writer.write_i32::<LittleEndian>(self.parent_sequence())?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        writer.write_i32::<LittleEndian>(data.intervals.len() as i32)?;

        if let Some(core) = &self.core {
            let core = core.read().expect("core lock poisoned");
            writer.write_i32::<LittleEndian>(-1)?; // extension_seq, reserved
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            writer.write_i32::<LittleEndian>(core.children_seq.len() as i32)?;

            for i in 0..core.max_children {
                #[allow(clippy::cast_possible_wrap)]
                let seq = core.children_seq.get(i).copied().unwrap_or(0) as i32;
                writer.write_i32::<LittleEndian>(seq)?;
            }
            for i in 0..core.max_children {
                let start = core.children_start.get(i).copied().unwrap_or(0);
                writer.write_i64::<LittleEndian>(start)?;
            }
        }

        for iv in &data.intervals {
            iv.encode_into(writer)?;
        }

        Ok(())
    }

    /// Deserializes a node's block. `max_children` must be the tree-wide
    /// configured branching factor (it is not itself stored per-node).
    pub fn decode_from<R: Read>(reader: &mut R, block_size: u32, max_children: u32) -> Result<Self> {
        let tag = reader.read_u8()?;
        let node_start = reader.read_i64::<LittleEndian>()?;
        let node_end_raw = reader.read_i64::<LittleEndian>()?;
        let sequence = reader.read_i32::<LittleEndian>()?;
        let parent_sequence = reader.read_i32::<LittleEndian>()?;
        let interval_count = reader.read_i32::<LittleEndian>()?;

        let kind = match tag {
            CORE_TAG => NodeKind::Core,
            LEAF_TAG => NodeKind::Leaf,
            _ => return Err(Error::Corruption("unrecognized node variant tag")),
        };

        let core = if kind == NodeKind::Core {
            let _extension_seq = reader.read_i32::<LittleEndian>()?;
            let child_count = reader.read_i32::<LittleEndian>()?;
            if child_count < 0 || child_count as u32 > max_children {
                return Err(Error::Corruption("core node child_count out of range"));
            }

            let mut children_seq = Vec::with_capacity(max_children as usize);
            for _ in 0..max_children {
                #[allow(clippy::cast_sign_loss)]
                children_seq.push(reader.read_i32::<LittleEndian>()? as u32);
            }
            let mut children_start = Vec::with_capacity(max_children as usize);
            for _ in 0..max_children {
                children_start.push(reader.read_i64::<LittleEndian>()?);
            }
            children_seq.truncate(child_count as usize);
            children_start.truncate(child_count as usize);

            Some(RwLock::new(CoreExtension {
                max_children: max_children as usize,
                children_seq,
                children_start,
            }))
        } else {
            None
        };

        if interval_count < 0 {
            return Err(Error::Corruption("node interval_count is negative"));
        }
        let mut intervals = Vec::with_capacity(interval_count as usize);
        for _ in 0..interval_count {
            intervals.push(Interval::decode_from(reader)?);
        }

        Ok(Self {
            #[allow(clippy::cast_sign_loss)]
            sequence: sequence as u32,
            parent_sequence: AtomicI32::new(parent_sequence),
            block_size,
            kind,
            data: RwLock::new(NodeData {
                node_start,
                node_end: if node_end_raw == 0 { None } else { Some(node_end_raw) },
                max_interval_end: if node_end_raw == 0 { i64::MIN } else { node_end_raw },
                intervals,
                on_disk: true,
            }),
            core,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StateValue;
    use test_log::test;

    #[test]
    fn append_respects_end_time_order() {
        let node = HistoryTreeNode::new_leaf(0, -1, 0, 4096);
        node.try_append(Interval::new(0, 30, 1, StateValue::Null)).unwrap();
        node.try_append(Interval::new(0, 10, 2, StateValue::Null)).unwrap();
        node.try_append(Interval::new(0, 20, 3, StateValue::Null)).unwrap();

        let ends: Vec<i64> = (0..node.interval_count())
            .map(|i| node.data.read().unwrap().intervals[i].end)
            .collect();
        assert_eq!(ends, vec![10, 20, 30]);
    }

    #[test]
    fn fails_to_append_past_capacity() {
        // Tiny block: header plus one small interval fits, a second doesn't.
        let node = HistoryTreeNode::new_leaf(0, -1, 0, 64);
        assert!(node.try_append(Interval::new(0, 1, 0, StateValue::Long(1))).unwrap());
        assert!(!node.try_append(Interval::new(0, 1, 1, StateValue::Long(1))).unwrap());
    }

    #[test]
    fn close_is_tolerant_of_empty_node_before_start() {
        let node = HistoryTreeNode::new_leaf(0, -1, 100, 4096);
        let end = node.close(5);
        assert_eq!(end, 5);
        assert!(node.start() > node.end().unwrap());
    }

    #[test]
    fn close_picks_max_of_observed_and_trigger() {
        let node = HistoryTreeNode::new_leaf(0, -1, 0, 4096);
        node.try_append(Interval::new(0, 50, 0, StateValue::Null)).unwrap();
        assert_eq!(node.close(10), 50);
    }

    #[test]
    fn select_next_child_prefers_newest_match() {
        let core = HistoryTreeNode::new_core(0, -1, 0, 4096, 4);
        core.link_new_child(1, 0).unwrap();
        core.link_new_child(2, 100).unwrap();
        core.link_new_child(3, 200).unwrap();

        assert_eq!(core.select_next_child(50), Some(1));
        assert_eq!(core.select_next_child(150), Some(2));
        assert_eq!(core.select_next_child(250), Some(3));
        assert_eq!(core.select_next_child(-1), None);
    }

    #[test]
    fn node_round_trip() {
        let core = HistoryTreeNode::new_core(7, 3, 0, 4096, 4);
        core.link_new_child(8, 0).unwrap();
        core.link_new_child(9, 500).unwrap();
        core.try_append(Interval::new(0, 200, 1, StateValue::String("hi".into())))
            .unwrap();
        core.close(1000);

        let mut buf = Vec::new();
        core.encode_into(&mut buf).unwrap();

        let decoded = HistoryTreeNode::decode_from(&mut &buf[..], 4096, 4).unwrap();
        assert_eq!(decoded.sequence(), 7);
        assert_eq!(decoded.parent_sequence(), 3);
        assert_eq!(decoded.end(), Some(1000));
        assert_eq!(decoded.child_count(), 2);
        assert_eq!(decoded.select_next_child(600), Some(9));
        assert_eq!(decoded.interval_count(), 1);
    }
}
