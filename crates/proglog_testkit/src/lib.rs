//! # Proglog Testkit
//!
//! Test utilities for proglog.
//!
//! This crate provides:
//! - Test fixtures and log helpers
//! - Property-based test generators using proptest
//! - Model-tracking integration harness
//! - Crash recovery scenarios
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use proglog_testkit::prelude::*;
//!
//! let test_log = TestLog::small();
//! for i in 0..5 {
//!     test_log.append(&record_for(i)).unwrap();
//! }
//! assert_eq!(test_log.segment_count(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
