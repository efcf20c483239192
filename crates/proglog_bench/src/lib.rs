//! Benchmarks for proglog.
//!
//! The benchmarks live under `benches/`; this crate only holds shared
//! helpers for them.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod utils;
