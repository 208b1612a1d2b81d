//! # TD Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Config fixtures and game drivers
//! - Event recording
//! - Determinism test harness
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;
pub mod recorder;

/// Re-export proptest for convenience.
pub use proptest;
