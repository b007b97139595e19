// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cancellation signal plumbing.
//!
//! A run is cancelled through a `watch::Receiver<bool>`: once it reads
//! `true`, every stage unwinds at its next suspension point. Dropping the
//! sender without sending `true` does not cancel.

use crate::error::{ReplicationError, Result};
use std::future::Future;
use tokio::sync::watch;

/// Resolve once the signal reads `true`.
///
/// Never resolves if the sender goes away first.
pub async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Check the signal without waiting.
pub fn is_cancelled(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

/// Race `fut` against the signal. Cancellation wins ties.
///
/// `fut` is not polled once the signal reads `true`. Store calls go in an
/// `async` block so an implementation that works eagerly is never invoked.
pub(crate) async fn or_cancel<F: Future>(
    rx: &mut watch::Receiver<bool>,
    fut: F,
) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancelled(rx) => Err(ReplicationError::Cancelled),
        out = fut => Ok(out),
    }
}

/// A signal that never fires.
pub fn never() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    // Dropping the sender leaves the value at `false` for good.
    drop(tx);
    rx
}
