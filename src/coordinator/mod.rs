// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication coordinator.
//!
//! The orchestrator that ties together:
//! - Change reading via [`crate::changes::read_changes`]
//! - Revs-diff batching via [`crate::batch::read_diffs`]
//! - Document fetching via [`crate::fetch::read_docs`]
//! - Document writing via [`crate::writer::store_docs`]
//!
//! # Architecture
//!
//! ```text
//! source ──▶ changes ──[1]──▶ revs_diff ──[1]──▶ fetch ──[1]──▶ write ──▶ target
//!                                  │                 │             │
//!                                  └──── target      └── source    └── ResultAccumulator
//! ```
//!
//! Each stage is a task on a [`JoinSet`]; `[1]` marks an mpsc channel of
//! capacity one. A stage closes its output by returning, so downstream
//! stages see end-of-input instead of waiting forever.
//!
//! The first stage to fail trips a group cancellation signal that every
//! other stage races its channel operations and store calls against. The
//! caller's shutdown signal trips the same group signal.

mod types;

pub use types::ReplicationState;

use crate::batch;
use crate::changes;
use crate::config::{ReplicationConfig, ReplicationOptions};
use crate::error::{ReplicationError, ReplicationFailure, Result};
use crate::fetch;
use crate::metrics;
use crate::result::{ReplicationResult, ResultAccumulator};
use crate::shutdown::{cancelled, is_cancelled, or_cancel};
use crate::store::Store;
use crate::writer;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

/// Capacity of each inter-stage channel.
///
/// tokio has no rendezvous channel; one slot keeps a single item in flight
/// per hop.
const CHANNEL_CAPACITY: usize = 1;

/// Replicate `source` into `target` once.
///
/// Option sets are merged left to right. Shorthand for
/// [`Replicator::new`] followed by [`Replicator::run`].
///
/// # Example
///
/// ```rust,ignore
/// let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
/// let options = ReplicationOptions::default().with_copy_security(true);
/// match replicate(shutdown_rx, target, source, &[options]).await {
///     Ok(result) => println!("wrote {} docs", result.docs_written),
///     Err(failure) => eprintln!("{} after {} docs", failure, failure.result.docs_written),
/// }
/// ```
pub async fn replicate<T: Store, S: Store>(
    shutdown: watch::Receiver<bool>,
    target: T,
    source: S,
    options: &[ReplicationOptions],
) -> std::result::Result<ReplicationResult, ReplicationFailure> {
    let mut replicator = Replicator::new(target, source, ReplicationConfig::with_options(options));
    replicator.run(shutdown).await
}

/// One pull replication from `source` into `target`.
///
/// A replicator runs once. Its [`ReplicationState`] can be watched from
/// other tasks via [`state_receiver()`](Self::state_receiver).
pub struct Replicator<T: Store, S: Store> {
    /// Database being written
    target: Arc<T>,

    /// Database being read
    source: Arc<S>,

    config: ReplicationConfig,

    /// Run state (broadcast to watchers)
    state_tx: watch::Sender<ReplicationState>,

    /// Run state receiver (for internal use)
    state_rx: watch::Receiver<ReplicationState>,
}

impl<T: Store, S: Store> Replicator<T, S> {
    /// Create a replicator. Nothing is read until [`run()`](Self::run).
    pub fn new(target: T, source: S, config: ReplicationConfig) -> Self {
        Self::with_shared(Arc::new(target), Arc::new(source), config)
    }

    /// Create a replicator over stores the caller keeps handles to.
    pub fn with_shared(target: Arc<T>, source: Arc<S>, config: ReplicationConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(ReplicationState::Created);
        Self {
            target,
            source,
            config,
            state_tx,
            state_rx,
        }
    }

    /// Get the effective configuration.
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Get current run state.
    pub fn state(&self) -> ReplicationState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ReplicationState> {
        self.state_rx.clone()
    }

    fn set_state(&self, state: ReplicationState) {
        debug!(%state, "Replication state");
        let _ = self.state_tx.send(state);
    }

    /// Run the replication to completion.
    ///
    /// `shutdown` cancels the run once it reads `true`. On failure the
    /// returned [`ReplicationFailure`] carries the first error and the counts
    /// reached before it; both timestamps are always set.
    pub async fn run(
        &mut self,
        shutdown: watch::Receiver<bool>,
    ) -> std::result::Result<ReplicationResult, ReplicationFailure> {
        let results = Arc::new(ResultAccumulator::new());

        if self.state() != ReplicationState::Created {
            return Err(ReplicationFailure {
                result: results.finish(),
                error: ReplicationError::Config(format!(
                    "replicator already ran (state {})",
                    self.state()
                )),
            });
        }

        let started = Instant::now();
        info!(
            filter = ?self.config.options.filter,
            doc_ids = self.config.options.doc_ids.as_ref().map(|ids| ids.len()),
            copy_security = self.config.options.copy_security(),
            batch_size = self.config.settings.revs_diff_batch_size,
            "Starting replication"
        );

        let outcome = match self.config.validate() {
            Ok(()) => self.execute(&results, shutdown).await,
            Err(e) => Err(e),
        };
        let result = results.finish();

        match outcome {
            Ok(()) => {
                self.set_state(ReplicationState::Completed);
                metrics::record_run("completed", started.elapsed());
                info!(
                    docs_read = result.docs_read,
                    docs_written = result.docs_written,
                    missing_checked = result.missing_checked,
                    missing_found = result.missing_found,
                    duration_ms = result.duration().as_millis() as u64,
                    "Replication complete"
                );
                Ok(result)
            }
            Err(error) => {
                if error.is_cancelled() {
                    self.set_state(ReplicationState::Cancelled);
                    metrics::record_run("cancelled", started.elapsed());
                    info!(
                        docs_written = result.docs_written,
                        "Replication cancelled"
                    );
                } else {
                    self.set_state(ReplicationState::Failed);
                    metrics::record_run("failed", started.elapsed());
                    warn!(
                        error = %error,
                        docs_written = result.docs_written,
                        doc_write_failures = result.doc_write_failures,
                        "Replication failed"
                    );
                }
                Err(ReplicationFailure { result, error })
            }
        }
    }

    async fn execute(
        &self,
        results: &Arc<ResultAccumulator>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        if is_cancelled(&shutdown) {
            return Err(ReplicationError::Cancelled);
        }

        if self.config.options.copy_security() {
            self.set_state(ReplicationState::CopyingSecurity);
            self.copy_security(&mut shutdown).await?;
        }

        self.set_state(ReplicationState::Replicating);
        self.run_pipeline(results, shutdown).await
    }

    /// Overwrite the target's security object with the source's.
    async fn copy_security(&self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        let security = or_cancel(shutdown, async { self.source.security().await })
            .await?
            .map_err(|e| ReplicationError::store("read security", e))?;
        or_cancel(shutdown, async { self.target.set_security(security).await })
            .await?
            .map_err(|e| ReplicationError::store("set security", e))?;
        info!("Security object copied");
        Ok(())
    }

    /// Spawn the four stages and wait for all of them.
    async fn run_pipeline(
        &self,
        results: &Arc<ResultAccumulator>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let (group_tx, group_rx) = watch::channel(false);
        let (change_tx, change_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (diff_tx, diff_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (doc_tx, doc_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mut workers: JoinSet<(&'static str, Result<()>)> = JoinSet::new();

        {
            let source = Arc::clone(&self.source);
            let options = self.config.options.clone();
            let cancel = group_rx.clone();
            workers.spawn(
                async move {
                    let outcome = changes::read_changes(&*source, &options, change_tx, cancel).await;
                    ("changes", outcome)
                }
                .instrument(info_span!("changes")),
            );
        }
        {
            let target = Arc::clone(&self.target);
            let settings = self.config.settings.clone();
            let cancel = group_rx.clone();
            workers.spawn(
                async move {
                    let outcome =
                        batch::read_diffs(&*target, &settings, change_rx, diff_tx, cancel).await;
                    ("revs_diff", outcome)
                }
                .instrument(info_span!("revs_diff")),
            );
        }
        {
            let source = Arc::clone(&self.source);
            let results = Arc::clone(results);
            let cancel = group_rx.clone();
            workers.spawn(
                async move {
                    let outcome = fetch::read_docs(&*source, &results, diff_rx, doc_tx, cancel).await;
                    ("fetch", outcome)
                }
                .instrument(info_span!("fetch")),
            );
        }
        {
            let target = Arc::clone(&self.target);
            let results = Arc::clone(results);
            let cancel = group_rx;
            workers.spawn(
                async move {
                    let outcome = writer::store_docs(&*target, &results, doc_rx, cancel).await;
                    ("write", outcome)
                }
                .instrument(info_span!("write")),
            );
        }

        let mut first_error: Option<ReplicationError> = None;
        let mut caller_cancelled = false;

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut shutdown), if first_error.is_none() => {
                    info!("Cancellation requested");
                    caller_cancelled = true;
                    first_error = Some(ReplicationError::Cancelled);
                    let _ = group_tx.send(true);
                }
                joined = workers.join_next() => {
                    let Some(joined) = joined else { break };
                    let (stage, outcome) = match joined {
                        Ok(done) => done,
                        Err(e) => (
                            "worker",
                            Err(ReplicationError::Internal(format!("pipeline worker failed: {}", e))),
                        ),
                    };
                    match outcome {
                        Ok(()) => debug!(stage, "Stage finished"),
                        Err(error) => {
                            // A stage that saw its neighbour hang up reports Cancelled;
                            // the neighbour's own error is the one worth keeping.
                            let replace = match &first_error {
                                None => true,
                                Some(prev) => {
                                    prev.is_cancelled() && !caller_cancelled && !error.is_cancelled()
                                }
                            };
                            debug!(stage, error = %error, "Stage stopped");
                            if replace {
                                first_error = Some(error);
                                let _ = group_tx.send(true);
                            }
                        }
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
