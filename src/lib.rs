// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A purpose-built, append-only, block-structured on-disk index of
//! interval-valued attribute history.
//!
//! ##### About
//!
//! A history tree stores, for each of many integer-identified attributes
//! (a "quark"), a sequence of non-overlapping time intervals, each carrying
//! a typed value that attribute held for that interval. It is built once,
//! left-to-right in time order, by a single writer; once built it supports
//! concurrent point-in-time queries from many readers, but no further
//! insertion, mutation, or deletion.
//!
//! This is not a general-purpose index: there is no random-key lookup, no
//! update-in-place, and no multi-writer concurrency. In exchange, it is
//! small and fast to build and query, and (unlike a B-tree or R-tree) grows
//! purely at its "latest" edge, never rebalancing already-written blocks.
//!
//! ```
//! # use history_tree::{Config, StateValue};
//! # let dir = tempfile::tempdir()?;
//! let tree = Config::new(dir.path().join("cpu0.ht")).create()?;
//!
//! tree.insert_past_state(0, 100, /* quark */ 0, StateValue::Integer(1))?;
//! tree.insert_past_state(101, 200, 0, StateValue::Integer(2))?;
//! tree.finish_building(200)?;
//!
//! let value = tree.query_singular(50, 0)?.unwrap();
//! assert_eq!(value.value, StateValue::Integer(1));
//! # Ok::<(), history_tree::Error>(())
//! ```
//!
//! ##### Backends
//!
//! [`HistoryTreeBackend`] runs every build and query call synchronously on
//! the caller's thread. [`ThreadedHistoryTreeBackend`] instead hands
//! submitted intervals to a bounded queue drained by a single dedicated
//! build thread, so a producer iterating a trace does not block on disk
//! I/O. Both implement the shared [`Backend`] trait.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]

mod backend;
mod binary_search;
mod coding;
mod config;
mod error;
mod interval;
mod io;
mod node;
mod threaded;
mod tree;
mod value;

pub use backend::{Backend, HistoryTreeBackend};
pub use config::{Config, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_CHILDREN};
pub use error::{Error, Result};
pub use interval::Interval;
pub use threaded::ThreadedHistoryTreeBackend;
pub use tree::HistoryTree;
pub use value::StateValue;
