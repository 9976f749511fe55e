// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Block I/O: owns the file handles, computes byte offsets from node
//! sequence numbers, and holds a small direct-mapped node cache.

use crate::node::HistoryTreeNode;
use crate::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Default node cache capacity: a power of two.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// A fixed-capacity, direct-mapped cache of recently touched nodes, indexed
/// by `sequence mod capacity`. Already-persisted nodes are immutable, so
/// an evicted slot is simply overwritten: no write-back is required.
struct NodeCache {
    slots: Mutex<Vec<Option<Arc<HistoryTreeNode>>>>,
}

impl NodeCache {
    fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "cache capacity must be a power of two");
        Self {
            slots: Mutex::new(vec![None; capacity]),
        }
    }

    fn get(&self, sequence: u32) -> Option<Arc<HistoryTreeNode>> {
        let slots = self.slots.lock().expect("cache lock poisoned");
        let idx = sequence as usize % slots.len();
        slots[idx]
            .as_ref()
            .filter(|n| n.sequence() == sequence)
            .cloned()
    }

    fn insert(&self, node: Arc<HistoryTreeNode>) {
        let mut slots = self.slots.lock().expect("cache lock poisoned");
        let idx = node.sequence() as usize % slots.len();
        slots[idx] = Some(node);
    }
}

/// Owns the tree file's read/write handles, the byte-offset arithmetic, and
/// the node cache. Reads and writes of the cache slot and channel
/// positions are serialized by a single lock per I/O object: reader/writer
/// contention is rare in practice (queries run after build, or against
/// already-closed subtrees during build), and a single lock keeps
/// positioning and I/O atomic.
pub(crate) struct BlockIo {
    path: PathBuf,
    read_file: Mutex<File>,
    write_file: Mutex<File>,
    header_size: u64,
    block_size: u32,
    max_children: u32,
    cache: NodeCache,
    disposed: AtomicBool,
}

impl BlockIo {
    pub(crate) fn create(path: &Path, header_size: u64, block_size: u32, max_children: u32) -> Result<Self> {
        let write_file = File::options().read(true).write(true).create(true).truncate(true).open(path)?;
        let read_file = File::open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            read_file: Mutex::new(read_file),
            write_file: Mutex::new(write_file),
            header_size,
            block_size,
            max_children,
            cache: NodeCache::new(DEFAULT_CACHE_CAPACITY),
            disposed: AtomicBool::new(false),
        })
    }

    pub(crate) fn open(path: &Path, header_size: u64, block_size: u32, max_children: u32) -> Result<Self> {
        let write_file = File::options().read(true).write(true).open(path)?;
        let read_file = File::open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            read_file: Mutex::new(read_file),
            write_file: Mutex::new(write_file),
            header_size,
            block_size,
            max_children,
            cache: NodeCache::new(DEFAULT_CACHE_CAPACITY),
            disposed: AtomicBool::new(false),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn block_size(&self) -> u32 {
        self.block_size
    }

    fn offset_of(&self, sequence: u32) -> u64 {
        self.header_size + u64::from(sequence) * u64::from(self.block_size)
    }

    fn check_disposed(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    /// Marks this I/O object disposed. A query descent that races with
    /// disposal observes this as [`Error::Disposed`].
    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Reads and deserializes the node at `sequence`, consulting the cache
    /// first.
    pub(crate) fn read_node(&self, sequence: u32) -> Result<Arc<HistoryTreeNode>> {
        self.check_disposed()?;

        if let Some(node) = self.cache.get(sequence) {
            return Ok(node);
        }

        let mut buf = vec![0u8; self.block_size as usize];
        {
            let mut file = self.read_file.lock().expect("I/O lock poisoned");
            self.check_disposed()?;
            file.seek(SeekFrom::Start(self.offset_of(sequence)))?;

            if let Err(e) = file.read_exact(&mut buf) {
                return Err(if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    Error::Corruption("short read while loading a node block")
                } else {
                    e.into()
                });
            }
        }

        let node = HistoryTreeNode::decode_from(&mut &buf[..], self.block_size, self.max_children)?;
        let node = Arc::new(node);
        self.cache.insert(node.clone());
        Ok(node)
    }

    /// Serializes `node` and writes its block. I/O errors here are logged
    /// and otherwise swallowed: the contract "node is now persisted" is
    /// best-effort at write time and only final at close time, since
    /// in-memory state remains authoritative until then.
    pub(crate) fn write_node(&self, node: &Arc<HistoryTreeNode>) {
        let mut buf = Vec::with_capacity(self.block_size as usize);
        if let Err(e) = node.encode_into(&mut buf) {
            log::error!("failed to serialize node {}: {e}", node.sequence());
            return;
        }
        if buf.len() > self.block_size as usize {
            log::error!(
                "node {} serialized to {} bytes, exceeding block size {}",
                node.sequence(),
                buf.len(),
                self.block_size
            );
            return;
        }
        buf.resize(self.block_size as usize, 0);

        let result = (|| -> std::io::Result<()> {
            let mut file = self.write_file.lock().expect("I/O lock poisoned");
            file.seek(SeekFrom::Start(self.offset_of(node.sequence())))?;
            file.write_all(&buf)
        })();

        if let Err(e) = result {
            log::error!("failed to write node {} to disk: {e}", node.sequence());
            return;
        }

        self.cache.insert(node.clone());
    }

    /// Flushes writes and seeks the write handle to the attribute-tree
    /// blob slot, writing `blob`.
    pub(crate) fn write_attribute_tree_blob(&self, offset: u64, blob: &[u8]) -> Result<()> {
        let mut file = self.write_file.lock().expect("I/O lock poisoned");
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(blob)?;
        file.flush()?;
        Ok(())
    }

    /// Reads `len` bytes of the attribute-tree blob starting at `offset`.
    pub(crate) fn read_attribute_tree_blob(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut file = self.read_file.lock().expect("I/O lock poisoned");
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn file_size(&self) -> Result<u64> {
        Ok(self.write_file.lock().expect("I/O lock poisoned").metadata()?.len())
    }

    pub(crate) fn sync(&self) -> Result<()> {
        self.write_file.lock().expect("I/O lock poisoned").sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;
    use crate::value::StateValue;
    use test_log::test;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.ht");
        let io = BlockIo::create(&path, 512, 4096, 4).unwrap();

        let node = Arc::new(HistoryTreeNode::new_leaf(0, -1, 0, 4096));
        node.try_append(Interval::new(0, 10, 1, StateValue::Integer(7))).unwrap();
        node.close(10);

        io.write_node(&node);
        let read_back = io.read_node(0).unwrap();
        assert_eq!(read_back.sequence(), 0);
        assert_eq!(read_back.end(), Some(10));
        assert_eq!(read_back.interval_count(), 1);
    }

    #[test]
    fn disposed_io_rejects_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.ht");
        let io = BlockIo::create(&path, 512, 4096, 4).unwrap();
        io.dispose();
        let err = io.read_node(0).unwrap_err();
        assert!(matches!(err, Error::Disposed));
    }

    #[test]
    fn cache_eviction_does_not_require_writeback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.ht");
        let io = BlockIo::create(&path, 512, 4096, 4).unwrap();

        // Fill more slots than the cache has capacity; every node must
        // still be independently readable from disk.
        for seq in 0..(DEFAULT_CACHE_CAPACITY as u32 + 5) {
            let node = Arc::new(HistoryTreeNode::new_leaf(seq, -1, 0, 4096));
            node.close(0);
            io.write_node(&node);
        }

        for seq in 0..(DEFAULT_CACHE_CAPACITY as u32 + 5) {
            let node = io.read_node(seq).unwrap();
            assert_eq!(node.sequence(), seq);
        }
    }
}
