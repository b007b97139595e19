// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Run statistics.
//!
//! [`ResultAccumulator`] is shared by every pipeline stage. Each counter has
//! its own increment method that takes the lock for a single add, so stages
//! never hold it across an await. The orchestrator reads it once, after all
//! workers have stopped, via [`ResultAccumulator::finish()`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The outcome of one replication run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationResult {
    pub doc_write_failures: u64,
    pub docs_read: u64,
    pub docs_written: u64,
    pub end_time: DateTime<Utc>,
    pub missing_checked: u64,
    pub missing_found: u64,
    pub start_time: DateTime<Utc>,
}

impl ReplicationResult {
    /// Wall-clock time between start and end (zero if the clock went backwards).
    pub fn duration(&self) -> Duration {
        (self.end_time - self.start_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// True when no counter moved.
    pub fn is_noop(&self) -> bool {
        self.doc_write_failures == 0
            && self.docs_read == 0
            && self.docs_written == 0
            && self.missing_checked == 0
            && self.missing_found == 0
    }
}

/// Thread-safe counters for a run in progress.
#[derive(Debug)]
pub struct ResultAccumulator {
    inner: Mutex<ReplicationResult>,
}

impl ResultAccumulator {
    /// Start accumulating; `start_time` is stamped now.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ReplicationResult {
                start_time: Utc::now(),
                ..Default::default()
            }),
        }
    }

    pub fn read(&self) {
        self.inner.lock().docs_read += 1;
    }

    pub fn missing_checked(&self) {
        self.inner.lock().missing_checked += 1;
    }

    pub fn missing_found(&self) {
        self.inner.lock().missing_found += 1;
    }

    pub fn write_error(&self) {
        self.inner.lock().doc_write_failures += 1;
    }

    pub fn write(&self) {
        self.inner.lock().docs_written += 1;
    }

    /// Copy of the counters as they stand. `end_time` is left untouched.
    pub fn snapshot(&self) -> ReplicationResult {
        self.inner.lock().clone()
    }

    /// Stamp `end_time` and return the final counters.
    pub fn finish(&self) -> ReplicationResult {
        let mut guard = self.inner.lock();
        guard.end_time = Utc::now();
        guard.clone()
    }
}

impl Default for ResultAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
