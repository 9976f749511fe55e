// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The backend facade: adapts the history tree to the narrow interface
//! consumed by the surrounding state system.

use crate::config::Config;
use crate::interval::Interval;
use crate::tree::HistoryTree;
use crate::value::StateValue;
use crate::Result;
use std::collections::HashMap;
use std::path::Path;

/// The narrow contract a state-history backend exposes to its caller.
/// Implemented by [`HistoryTreeBackend`] (synchronous) and
/// [`crate::threaded::ThreadedHistoryTreeBackend`] (queued).
pub trait Backend {
    /// State-system identifier passed in at creation. Opaque to this crate.
    fn get_ssid(&self) -> i32;

    /// Lower bound of the tree's valid range.
    fn get_start_time(&self) -> i64;

    /// Upper bound of the tree's valid range.
    fn get_end_time(&self) -> i64;

    /// Appends an interval. Must be called during build.
    fn insert_past_state(&self, start: i64, end: i64, quark: i32, value: StateValue) -> Result<()>;

    /// Closes the tree at `max(end_time, current_end)`.
    fn finish_building(&self, end_time: i64) -> Result<()>;

    /// Fills `out[quark]` for each quark with an interval intersecting `t`.
    fn do_query(&self, out: &mut [Option<Interval>], t: i64) -> Result<()>;

    /// Returns the interval intersecting `(t, quark)`, or `None`.
    fn do_singular_query(&self, t: i64, quark: i32) -> Result<Option<Interval>>;

    /// Populates `out[quark]` for each requested quark.
    fn do_partial_query(&self, t: i64, quarks: &[i32], out: &mut HashMap<i32, Interval>) -> Result<()>;

    /// Path to the backing file.
    fn path(&self) -> &Path;

    /// Deletes the backing file.
    fn remove_files(&self) -> Result<()>;

    /// Releases resources; an in-progress build is abandoned and its file
    /// deleted.
    fn dispose(&self);
}

/// Synchronous backend: every public call runs directly against the
/// [`HistoryTree`] on the caller's thread.
pub struct HistoryTreeBackend {
    ssid: i32,
    tree: HistoryTree,
}

impl HistoryTreeBackend {
    /// Creates a new backend and its backing tree file.
    pub fn create(ssid: i32, config: Config) -> Result<Self> {
        Ok(Self {
            ssid,
            tree: HistoryTree::create(&config)?,
        })
    }

    /// Opens an existing backend's tree file for querying.
    pub fn open(ssid: i32, config: Config) -> Result<Self> {
        Ok(Self {
            ssid,
            tree: HistoryTree::open(&config)?,
        })
    }

    /// Direct access to the underlying tree, for introspection (node
    /// count, average usage, and similar accessors that are not part of
    /// the narrow backend contract).
    #[must_use]
    pub fn tree(&self) -> &HistoryTree {
        &self.tree
    }

    /// Writes the attribute-tree blob and records its offset.
    pub fn supply_attribute_tree_writer(&self, blob: &[u8]) -> Result<()> {
        self.tree.supply_attribute_tree_writer(blob)
    }

    /// Reads back the attribute-tree blob.
    pub fn supply_attribute_tree_reader(&self, len: usize) -> Result<Vec<u8>> {
        self.tree.supply_attribute_tree_reader(len)
    }

    /// Byte offset of the attribute-tree blob slot.
    #[must_use]
    pub fn supply_attribute_tree_writer_file_position(&self) -> u64 {
        self.tree.attribute_tree_offset()
    }
}

impl Backend for HistoryTreeBackend {
    fn get_ssid(&self) -> i32 {
        self.ssid
    }

    fn get_start_time(&self) -> i64 {
        self.tree.get_start_time()
    }

    fn get_end_time(&self) -> i64 {
        self.tree.get_end_time()
    }

    fn insert_past_state(&self, start: i64, end: i64, quark: i32, value: StateValue) -> Result<()> {
        self.tree.insert_past_state(start, end, quark, value)
    }

    fn finish_building(&self, end_time: i64) -> Result<()> {
        self.tree.finish_building(end_time)
    }

    fn do_query(&self, out: &mut [Option<Interval>], t: i64) -> Result<()> {
        self.tree.query_full(t, out)
    }

    fn do_singular_query(&self, t: i64, quark: i32) -> Result<Option<Interval>> {
        self.tree.query_singular(t, quark)
    }

    fn do_partial_query(&self, t: i64, quarks: &[i32], out: &mut HashMap<i32, Interval>) -> Result<()> {
        self.tree.query_partial(t, quarks, out)
    }

    fn path(&self) -> &Path {
        self.tree.path()
    }

    fn remove_files(&self) -> Result<()> {
        self.tree.remove_files()
    }

    fn dispose(&self) {
        self.tree.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().join("tree.ht"));
        let backend = HistoryTreeBackend::create(7, config).unwrap();

        backend.insert_past_state(0, 100, 0, StateValue::Boolean(true)).unwrap();
        backend.finish_building(100).unwrap();

        assert_eq!(backend.get_ssid(), 7);
        assert_eq!(
            backend.do_singular_query(50, 0).unwrap().unwrap().value,
            StateValue::Boolean(true)
        );
    }
}
