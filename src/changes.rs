// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change reader: the first pipeline stage.
//!
//! Opens a one-shot `style=all_docs` changes feed on the source and forwards
//! each row, in feed order, as a [`Change`]. The output channel closes when
//! this stage returns, which is how the diff batcher learns the feed is done.

use crate::config::ReplicationOptions;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::shutdown::or_cancel;
use crate::store::{Change, ChangesQuery, Store};
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// Stream the source's changes into `out`.
///
/// Returns `Ok(())` once the feed is exhausted.
pub async fn read_changes<S: Store + ?Sized>(
    source: &S,
    options: &ReplicationOptions,
    out: mpsc::Sender<Change>,
    mut cancel: watch::Receiver<bool>,
) -> Result<()> {
    let query = ChangesQuery::from_options(options);
    debug!(
        filter = ?query.filter,
        doc_ids = query.doc_ids.as_ref().map(|ids| ids.len()),
        "Opening changes feed"
    );

    let mut feed = or_cancel(&mut cancel, async { source.changes(query).await })
        .await?
        .map_err(|e| ReplicationError::store("open changes feed", e))?;

    let mut count = 0usize;
    loop {
        let row = match or_cancel(&mut cancel, feed.next()).await? {
            Some(row) => row.map_err(|e| ReplicationError::store("read changes feed", e))?,
            None => break,
        };
        trace!(doc_id = %row.id, revs = row.changes.len(), "Change");
        count += 1;
        metrics::record_change_read();

        // A closed channel means the next stage is gone; the run is over.
        or_cancel(&mut cancel, out.send(row))
            .await?
            .map_err(|_| ReplicationError::Cancelled)?;
    }

    debug!(count, "Changes feed exhausted");
    Ok(())
}
