//! Shared test utilities for pipeline, property and chaos tests.
//!
//! This module provides:
//! - Recording in-memory Store (source or target)
//! - Document and attachment builders
//! - Tracing setup for `RUST_LOG=debug cargo test`

#![allow(dead_code)]

pub mod mock_store;

pub use mock_store::*;

use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
