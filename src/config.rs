// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Configuration recognized at tree creation.

use crate::backend::HistoryTreeBackend;
use crate::threaded::ThreadedHistoryTreeBackend;
use crate::tree::{HistoryTree, TREE_HEADER_SIZE};
use crate::Result;
use std::path::{Path, PathBuf};

/// Default block size: generous enough to hold a maximum-size interval
/// (a 64 KiB string payload) plus a Core node's header at the default
/// branching factor, and a multiple of 4096 for alignment with typical
/// filesystem block sizes.
pub const DEFAULT_BLOCK_SIZE: u32 = 1024 * 1024;

/// Default branching factor of Core nodes.
pub const DEFAULT_MAX_CHILDREN: u32 = 50;

/// Builder for opening or creating a [`HistoryTree`].
///
/// ```
/// # use history_tree::Config;
/// # let dir = tempfile::tempdir()?;
/// let tree = Config::new(dir.path().join("history.ht"))
///     .block_size(1024 * 1024)
///     .max_children(50)
///     .start_time(0)
///     .create()?;
/// # Ok::<(), history_tree::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) path: PathBuf,
    pub(crate) block_size: u32,
    pub(crate) max_children: u32,
    pub(crate) provider_version: u32,
    pub(crate) start_time: i64,
    pub(crate) queue_size: usize,
}

impl Config {
    /// Starts a new config for the tree file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_size: DEFAULT_BLOCK_SIZE,
            max_children: DEFAULT_MAX_CHILDREN,
            provider_version: 0,
            start_time: 0,
            queue_size: 0,
        }
    }

    /// Size of each node's block. Should be a multiple of 4096; must be
    /// large enough to hold one max-size interval plus the variant header.
    #[must_use]
    pub fn block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Branching factor of Core nodes.
    #[must_use]
    pub fn max_children(mut self, max_children: u32) -> Self {
        self.max_children = max_children;
        self
    }

    /// Opaque version checked on reopen; a mismatch causes
    /// [`Config::open`] to fail.
    #[must_use]
    pub fn provider_version(mut self, provider_version: u32) -> Self {
        self.provider_version = provider_version;
        self
    }

    /// Lower time bound of the tree. Intervals with `start < start_time`
    /// are rejected.
    #[must_use]
    pub fn start_time(mut self, start_time: i64) -> Self {
        self.start_time = start_time;
        self
    }

    /// Size of the threaded variant's bounded command queue. `0` disables
    /// the queue (synchronous writes on the caller's thread); any other
    /// value enables the bounded producer/consumer queue at that capacity.
    #[must_use]
    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub(crate) fn min_block_size(&self) -> u32 {
        const COMMON_HEADER: u32 = 1 + 8 + 8 + 4 + 4 + 4;
        const CORE_FIXED: u32 = 4 + 4;
        const MAX_INTERVAL: u32 = 1 + 8 + 8 + 4 + 2 + u16::MAX as u32 + 1;

        let core_variant = CORE_FIXED + self.max_children * (4 + 8);
        COMMON_HEADER + core_variant + MAX_INTERVAL
    }

    /// Path to the tree file this config describes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates a new tree file, ready to build.
    pub fn create(self) -> Result<HistoryTree> {
        HistoryTree::create(&self)
    }

    /// Opens an existing tree file for querying.
    pub fn open(self) -> Result<HistoryTree> {
        HistoryTree::open(&self)
    }

    /// Creates a new tree file and wraps it in a [`HistoryTreeBackend`]
    /// carrying the given state-system identifier.
    pub fn create_backend(self, ssid: i32) -> Result<HistoryTreeBackend> {
        HistoryTreeBackend::create(ssid, self)
    }

    /// Opens an existing tree file and wraps it in a [`HistoryTreeBackend`].
    pub fn open_backend(self, ssid: i32) -> Result<HistoryTreeBackend> {
        HistoryTreeBackend::open(ssid, self)
    }

    /// Creates a new tree file behind the threaded producer/consumer build
    /// wrapper.
    pub fn create_threaded_backend(self, ssid: i32) -> Result<ThreadedHistoryTreeBackend> {
        ThreadedHistoryTreeBackend::create(ssid, self)
    }
}

/// Size of the fixed-size file preamble preceding all node blocks.
#[must_use]
pub fn tree_header_size() -> u64 {
    TREE_HEADER_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn builder_overrides_defaults() {
        let config = Config::new("/tmp/whatever")
            .block_size(8192)
            .max_children(10)
            .provider_version(3)
            .start_time(100)
            .queue_size(64);

        assert_eq!(config.block_size, 8192);
        assert_eq!(config.max_children, 10);
        assert_eq!(config.provider_version, 3);
        assert_eq!(config.start_time, 100);
        assert_eq!(config.queue_size, 64);
    }

    #[test]
    fn create_rejects_undersized_block() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().join("t.ht")).block_size(64).max_children(4);
        let err = config.create().unwrap_err();
        assert!(matches!(err, crate::Error::InvalidConfig(_)));
    }
}
