//! Diff batcher: the second pipeline stage.
//!
//! Collects change rows with document-ID deduplication (latest wins) and
//! asks the target which revisions it is missing, one revs-diff request per
//! batch.
//!
//! # Design
//!
//! ```text
//! Change rows ──▶ DiffBatch ──┬──▶ size threshold reached
//!                             │    or upstream closed
//!                HashMap<id,  │
//!                  revs>      ▼
//!               (latest wins) revs_diff(target) ──▶ RevDiff rows ──▶ fetcher
//! ```
//!
//! Rows leave in whatever order the target answers. Document order inside a
//! batch is not preserved.

use crate::config::PipelineSettings;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::shutdown::or_cancel;
use crate::store::{Change, RevDiff, RevsDiffRequest, Store};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// Change rows waiting for a revs-diff request, keyed by document ID.
#[derive(Debug)]
pub struct DiffBatch {
    /// Leaf revisions per document (latest wins).
    pending: HashMap<String, Vec<String>>,
    /// Distinct documents that close a batch.
    max_size: usize,
}

impl DiffBatch {
    /// Create an empty batch. A `max_size` of zero is treated as one.
    pub fn new(max_size: usize) -> Self {
        Self {
            pending: HashMap::new(),
            max_size: max_size.max(1),
        }
    }

    /// Add a change row.
    ///
    /// If the document already has a pending row, the new one replaces it.
    pub fn add(&mut self, change: Change) {
        self.pending.insert(change.id, change.changes);
    }

    /// Check if the batch reached its size threshold.
    pub fn should_flush(&self) -> bool {
        self.pending.len() >= self.max_size
    }

    /// Number of distinct documents pending.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if batch is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain the batch into a revs-diff request body.
    pub fn take(&mut self) -> RevsDiffRequest {
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}

/// Batch change rows from `input` and stream the target's missing
/// revisions into `out`.
///
/// Returns once `input` closes and the final batch has been answered.
pub async fn read_diffs<T: Store + ?Sized>(
    target: &T,
    settings: &PipelineSettings,
    mut input: mpsc::Receiver<Change>,
    out: mpsc::Sender<RevDiff>,
    mut cancel: watch::Receiver<bool>,
) -> Result<()> {
    let mut batch = DiffBatch::new(settings.revs_diff_batch_size);
    let mut requests = 0usize;
    let mut upstream_open = true;

    while upstream_open {
        match or_cancel(&mut cancel, input.recv()).await? {
            Some(change) => batch.add(change),
            None => upstream_open = false,
        }

        if batch.should_flush() || (!upstream_open && !batch.is_empty()) {
            requests += 1;
            flush(target, batch.take(), &out, &mut cancel).await?;
        }
    }

    debug!(requests, "Changes drained");
    Ok(())
}

/// Issue one revs-diff request and forward every row of the answer.
async fn flush<T: Store + ?Sized>(
    target: &T,
    request: RevsDiffRequest,
    out: &mpsc::Sender<RevDiff>,
    cancel: &mut watch::Receiver<bool>,
) -> Result<()> {
    let batch_size = request.len();
    debug!(batch_size, "Requesting revs diff");

    let started = Instant::now();
    let mut rows = or_cancel(cancel, async { target.revs_diff(request).await })
        .await?
        .map_err(|e| ReplicationError::store("read revs diffs", e))?;
    metrics::record_revs_diff(batch_size, started.elapsed());

    while let Some(row) = or_cancel(cancel, rows.next()).await? {
        let diff = row.map_err(|e| ReplicationError::store("read revs diffs", e))?;
        if diff.id.is_empty() {
            return Err(ReplicationError::Protocol(
                "revs diff row without a document ID".to_string(),
            ));
        }
        trace!(doc_id = %diff.id, missing = diff.missing.len(), "Missing revisions");
        metrics::record_missing_revisions(diff.missing.len());

        or_cancel(cancel, out.send(diff))
            .await?
            .map_err(|_| ReplicationError::Cancelled)?;
    }
    Ok(())
}
