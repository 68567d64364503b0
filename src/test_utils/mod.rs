//! Test utilities for code built on the storage layer
//!
//! Provides fault-injecting providers so routing, fallback and hydration can
//! be exercised without real backends.

pub mod mocks;

pub use mocks::FlakyProvider;
