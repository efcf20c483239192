//! # Proglog Core
//!
//! A segmented, append-only record log.
//!
//! Records are opaque byte strings. Each append receives the next
//! monotonically increasing 64-bit offset; any retained offset can be read
//! back by that offset. The log is split into segments that roll over when
//! they fill, and old segments can be truncated away.
//!
//! This crate provides:
//! - [`Store`] - length-prefixed record storage over a [`proglog_storage`] backend
//! - [`Index`] - fixed-width offset-to-position entries
//! - [`Segment`] - a store and index pair covering a contiguous offset range
//! - [`Log`] - the ordered list of segments with rollover and truncation
//!
//! ## Example
//!
//! ```rust,no_run
//! use proglog_core::{Config, Log};
//! use std::path::Path;
//!
//! let config = Config::new().max_store_bytes(64 * 1024 * 1024);
//! let log = Log::open(Path::new("data/log"), config)?;
//!
//! assert_eq!(log.append(b"hello world")?, 0);
//! assert_eq!(log.append(b"goodbye")?, 1);
//! assert_eq!(log.read(1)?, b"goodbye");
//! # Ok::<(), proglog_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
mod index;
mod log;
mod segment;
mod store;

pub use config::Config;
pub use dir::{index_path, store_path, LogDir, INDEX_EXTENSION, STORE_EXTENSION};
pub use error::{CoreError, CoreResult};
pub use index::{Index, IndexEntry, ENTRY_WIDTH, OFFSET_WIDTH, POSITION_WIDTH};
pub use log::{Log, LogReader};
pub use segment::Segment;
pub use store::{Store, LEN_WIDTH};
