//! # Proglog Storage
//!
//! Byte-level backends underneath the record store.
//!
//! A backend hands out byte positions for appended data and serves
//! positional reads. Record framing, offsets, indexes and segments all live
//! in `proglog_core`; nothing here interprets the bytes.
//!
//! - [`FileBackend`] buffers appends in front of a file and flushes before
//!   every read, so readers never miss a buffered record.
//! - [`InMemoryBackend`] keeps bytes on the heap for tests.
//!
//! ## Example
//!
//! ```rust
//! use proglog_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let at = backend.append(b"hello world").unwrap();
//! assert_eq!(backend.read_at(at + 6, 5).unwrap(), b"world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::{FileBackend, DEFAULT_BUFFER_CAPACITY};
pub use memory::InMemoryBackend;
