//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Change feed throughput
//! - Revs-diff batching
//! - Document fetch and attachment decoding
//! - Document writes
//! - Run outcomes
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replication_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Histograms track distributions (duration, size)
//!
//! No recorder is installed here; the embedding process installs one.
//!
//! # Usage
//!
//! ```rust,no_run
//! use document_replicator::metrics;
//! use std::time::Duration;
//!
//! // In the diff batcher after a revs-diff call
//! metrics::record_revs_diff(10, Duration::from_millis(12));
//! ```

use metrics::{counter, histogram};
use std::time::Duration;

/// Record one row read from the changes feed.
pub fn record_change_read() {
    counter!("replication_changes_read_total").increment(1);
}

/// Record a revs-diff request and the number of documents it covered.
pub fn record_revs_diff(batch_size: usize, duration: Duration) {
    counter!("replication_revs_diff_requests_total").increment(1);
    histogram!("replication_revs_diff_batch_size").record(batch_size as f64);
    histogram!("replication_revs_diff_duration_seconds").record(duration.as_secs_f64());
}

/// Record missing revisions reported by the target.
pub fn record_missing_revisions(count: usize) {
    if count > 0 {
        counter!("replication_missing_revisions_total").increment(count as u64);
    }
}

/// Record a document revision fetched from the source.
pub fn record_doc_read(duration: Duration) {
    counter!("replication_docs_read_total").increment(1);
    histogram!("replication_doc_fetch_duration_seconds").record(duration.as_secs_f64());
}

/// Record an attachment body materialized by the fetcher.
///
/// `encoding` is the encoding it arrived in; `bytes` is the decoded size.
pub fn record_attachment_decoded(encoding: &str, bytes: usize) {
    let encoding = if encoding.is_empty() { "identity" } else { encoding };
    counter!("replication_attachments_decoded_total", "encoding" => encoding.to_string())
        .increment(1);
    counter!("replication_attachment_bytes_total").increment(bytes as u64);
}

/// Record a document written to the target.
pub fn record_doc_written() {
    counter!("replication_docs_written_total").increment(1);
}

/// Record a failed write.
pub fn record_doc_write_failure() {
    counter!("replication_doc_write_failures_total").increment(1);
}

/// Record a finished run.
///
/// `outcome` is one of `completed`, `failed`, `cancelled`.
pub fn record_run(outcome: &str, duration: Duration) {
    counter!("replication_runs_total", "outcome" => outcome.to_string()).increment(1);
    histogram!("replication_run_duration_seconds").record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: The metrics crate uses global state. With no recorder installed
    // these are no-ops; we only verify they don't panic on edge inputs.

    #[test]
    fn test_record_change_read() {
        record_change_read();
    }

    #[test]
    fn test_record_revs_diff() {
        record_revs_diff(10, Duration::from_millis(5));
        record_revs_diff(0, Duration::ZERO);
    }

    #[test]
    fn test_record_missing_revisions_zero() {
        record_missing_revisions(0);
        record_missing_revisions(3);
    }

    #[test]
    fn test_record_doc_read() {
        record_doc_read(Duration::from_millis(20));
    }

    #[test]
    fn test_record_attachment_decoded() {
        record_attachment_decoded("gzip", 1024);
        record_attachment_decoded("", 0);
        record_attachment_decoded("identity", 12);
    }

    #[test]
    fn test_record_writes() {
        record_doc_written();
        record_doc_write_failure();
    }

    #[test]
    fn test_record_run() {
        record_run("completed", Duration::from_secs(1));
        record_run("failed", Duration::ZERO);
        record_run("cancelled", Duration::from_millis(3));
    }
}
