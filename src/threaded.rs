// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The threaded build wrapper: a bounded producer/consumer queue that
//! decouples a producer submitting intervals from the disk writes they
//! trigger.

use crate::backend::Backend;
use crate::config::Config;
use crate::interval::Interval;
use crate::tree::HistoryTree;
use crate::value::StateValue;
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

enum Command {
    Insert(Interval),
    Finish(i64),
}

/// One-shot latch signalled once the consumer thread has performed the
/// final close, backing `wait_until_built`.
#[derive(Clone, Default)]
struct BuildLatch(Arc<(Mutex<bool>, Condvar)>);

impl BuildLatch {
    fn signal(&self) {
        let (done, cvar) = &*self.0;
        *done.lock().expect("latch lock poisoned") = true;
        cvar.notify_all();
    }

    fn wait(&self) {
        let (done, cvar) = &*self.0;
        let mut guard = done.lock().expect("latch lock poisoned");
        while !*guard {
            guard = cvar.wait(guard).expect("latch lock poisoned");
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let (done, cvar) = &*self.0;
        let guard = done.lock().expect("latch lock poisoned");
        if *guard {
            return true;
        }
        let (guard, _) = cvar.wait_timeout(guard, timeout).expect("latch lock poisoned");
        *guard
    }
}

/// Wraps a [`HistoryTree`] behind a bounded command queue: a single
/// consumer thread drains submitted intervals and performs the insertion
/// algorithm on the producer's behalf, so the producer never blocks on
/// disk I/O (only on a full queue, i.e. backpressure).
///
/// A `queue_size` of `0` disables the queue entirely: every call runs
/// synchronously on the caller's thread, same as [`HistoryTreeBackend`](crate::backend::HistoryTreeBackend).
pub struct ThreadedBackend {
    tree: Arc<HistoryTree>,
    sender: Mutex<Option<SyncSender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    latch: BuildLatch,
}

impl ThreadedBackend {
    pub(crate) fn new(config: Config) -> Result<Self> {
        let tree = Arc::new(HistoryTree::create(&config)?);

        if config.queue_size == 0 {
            return Ok(Self {
                tree,
                sender: Mutex::new(None),
                worker: Mutex::new(None),
                latch: BuildLatch::default(),
            });
        }

        let (tx, rx) = mpsc::sync_channel::<Command>(config.queue_size);
        let latch = BuildLatch::default();
        let worker_tree = tree.clone();
        let worker_latch = latch.clone();

        let worker = thread::Builder::new()
            .name("history-tree-build".into())
            .spawn(move || {
                for command in rx {
                    match command {
                        Command::Insert(interval) => {
                            if let Err(e) = worker_tree.insert_interval(interval) {
                                log::error!("threaded insert failed: {e}");
                            }
                        }
                        Command::Finish(end_time) => {
                            if let Err(e) = worker_tree.finish_building(end_time) {
                                log::error!("threaded finish_building failed: {e}");
                            }
                            break;
                        }
                    }
                }
                worker_latch.signal();
            })
            .expect("failed to spawn history tree build thread");

        Ok(Self {
            tree,
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            latch,
        })
    }

    /// Appends an interval. In queued mode this enqueues a command and
    /// returns immediately unless the queue is full (backpressure); in
    /// synchronous mode (`queue_size == 0`) it inserts directly.
    pub fn insert_past_state(&self, start: i64, end: i64, quark: i32, value: StateValue) -> Result<()> {
        let interval = Interval::new(start, end, quark, value);
        match self.sender.lock().expect("sender lock poisoned").as_ref() {
            Some(tx) => tx.send(Command::Insert(interval)).map_err(|_| Error::Disposed),
            None => self.tree.insert_interval(interval),
        }
    }

    /// Enqueues the end-of-input sentinel and blocks until the consumer
    /// thread has processed it (performed the final close).
    pub fn finish_building(&self, end_time: i64) -> Result<()> {
        let sender = self.sender.lock().expect("sender lock poisoned").clone();
        match sender {
            Some(tx) => {
                tx.send(Command::Finish(end_time)).map_err(|_| Error::Disposed)?;
                self.latch.wait();
                Ok(())
            }
            None => self.tree.finish_building(end_time),
        }
    }

    /// Blocks up to `timeout` for the build to finish; returns whether it
    /// did.
    #[must_use]
    pub fn wait_until_built(&self, timeout: Duration) -> bool {
        if self.sender.lock().expect("sender lock poisoned").is_none() {
            return self.tree.was_finished();
        }
        self.latch.wait_timeout(timeout)
    }

    /// Signals the consumer thread to stop (by closing the queue without a
    /// `Finish` command — dropping the sender ends the consumer's receive
    /// loop on its own), deletes the partially built file if the build had
    /// not completed, and joins the worker.
    pub fn dispose(&self) {
        self.sender.lock().expect("sender lock poisoned").take();
        if let Some(handle) = self.worker.lock().expect("worker lock poisoned").take() {
            let _ = handle.join();
        }
        self.tree.dispose();
    }

    #[must_use]
    pub(crate) fn tree(&self) -> &Arc<HistoryTree> {
        &self.tree
    }
}

impl Drop for ThreadedBackend {
    fn drop(&mut self) {
        self.sender.lock().expect("sender lock poisoned").take();
        if let Some(handle) = self.worker.lock().expect("worker lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

/// [`Backend`] implementation over the threaded build wrapper.
pub struct ThreadedHistoryTreeBackend {
    ssid: i32,
    inner: ThreadedBackend,
}

impl ThreadedHistoryTreeBackend {
    /// Creates a new threaded backend and its backing tree file.
    pub fn create(ssid: i32, config: Config) -> Result<Self> {
        Ok(Self {
            ssid,
            inner: ThreadedBackend::new(config)?,
        })
    }

    /// Blocks up to `timeout` for the build to finish; returns whether it
    /// did.
    #[must_use]
    pub fn wait_until_built(&self, timeout: Duration) -> bool {
        self.inner.wait_until_built(timeout)
    }
}

impl Backend for ThreadedHistoryTreeBackend {
    fn get_ssid(&self) -> i32 {
        self.ssid
    }

    fn get_start_time(&self) -> i64 {
        self.inner.tree().get_start_time()
    }

    fn get_end_time(&self) -> i64 {
        self.inner.tree().get_end_time()
    }

    fn insert_past_state(&self, start: i64, end: i64, quark: i32, value: StateValue) -> Result<()> {
        self.inner.insert_past_state(start, end, quark, value)
    }

    fn finish_building(&self, end_time: i64) -> Result<()> {
        self.inner.finish_building(end_time)
    }

    fn do_query(&self, out: &mut [Option<Interval>], t: i64) -> Result<()> {
        self.inner.tree().query_full(t, out)
    }

    fn do_singular_query(&self, t: i64, quark: i32) -> Result<Option<Interval>> {
        self.inner.tree().query_singular(t, quark)
    }

    fn do_partial_query(&self, t: i64, quarks: &[i32], out: &mut HashMap<i32, Interval>) -> Result<()> {
        self.inner.tree().query_partial(t, quarks, out)
    }

    fn path(&self) -> &Path {
        self.inner.tree().path()
    }

    fn remove_files(&self) -> Result<()> {
        self.inner.tree().remove_files()
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn synchronous_mode_matches_threaded_mode() {
        let dir = tempfile::tempdir().unwrap();

        let sync_config = Config::new(dir.path().join("sync.ht")).queue_size(0);
        let sync_backend = ThreadedHistoryTreeBackend::create(1, sync_config).unwrap();

        let queued_config = Config::new(dir.path().join("queued.ht")).queue_size(64);
        let queued_backend = ThreadedHistoryTreeBackend::create(1, queued_config).unwrap();

        for backend in [&sync_backend, &queued_backend] {
            for q in 0..20i32 {
                backend.insert_past_state(0, 1000, q, StateValue::Long(i64::from(q))).unwrap();
            }
            backend.finish_building(1000).unwrap();
        }

        assert!(queued_backend.wait_until_built(Duration::from_secs(5)));

        for q in 0..20i32 {
            assert_eq!(
                sync_backend.do_singular_query(500, q).unwrap(),
                queued_backend.do_singular_query(500, q).unwrap()
            );
        }
    }

    #[test]
    fn dispose_mid_build_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abandoned.ht");
        let config = Config::new(&path).queue_size(16);
        let backend = ThreadedHistoryTreeBackend::create(1, config).unwrap();

        backend.insert_past_state(0, 10, 0, StateValue::Null).unwrap();
        backend.dispose();

        assert!(!path.exists());
    }
}
