// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document writer: the last pipeline stage.
//!
//! Writes each document with `new_edits=false`, so the target stores the
//! source's revision as-is. The first failed write ends the run.

use crate::document::Document;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::result::ResultAccumulator;
use crate::shutdown::or_cancel;
use crate::store::{PutOptions, Store};
use tokio::sync::{mpsc, watch};
use tracing::{trace, warn};

/// Write every document from `input` to the target, in arrival order.
pub async fn store_docs<T: Store + ?Sized>(
    target: &T,
    results: &ResultAccumulator,
    mut input: mpsc::Receiver<Document>,
    mut cancel: watch::Receiver<bool>,
) -> Result<()> {
    while let Some(doc) = or_cancel(&mut cancel, input.recv()).await? {
        let doc_id = doc.id.clone();
        let rev = doc.rev.clone();

        let put = async { target.put(doc, PutOptions::replicated()).await };
        match or_cancel(&mut cancel, put).await? {
            Ok(stored) => {
                if stored != rev {
                    // new_edits=false should never mint a revision
                    warn!(doc_id = %doc_id, rev = %rev, stored = %stored, "Target reported a different revision");
                }
                results.write();
                metrics::record_doc_written();
                trace!(doc_id = %doc_id, rev = %rev, "Stored");
            }
            Err(e) => {
                results.write_error();
                metrics::record_doc_write_failure();
                return Err(ReplicationError::store(format!("store doc {}", doc_id), e));
            }
        }
    }
    Ok(())
}
