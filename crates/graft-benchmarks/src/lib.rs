//! Graft benchmarking suite
//!
//! Benchmarks for version compatibility checks, template merging and
//! peer dependency analysis against an in-memory registry.

pub mod common;

pub use common::*;
