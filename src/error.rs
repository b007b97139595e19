// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replicator.
//!
//! Every pipeline stage wraps the failure it observed with a short prefix
//! naming the stage (and the document ID where there is one) and returns it
//! as the run's terminal error. Nothing is retried here.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Store` (no status / 5xx) | Yes | Network errors, server failures |
//! | `Store` (4xx) | No | Malformed document, write conflict (409) |
//! | `Attachment` | No | Corrupt gzip body, unknown content encoding |
//! | `Protocol` | No | Store response did not have the expected shape |
//! | `Config` | No | Option map invalid |
//! | `Cancelled` | No | Caller cancelled the run |
//! | `Internal` | No | A worker panicked or was aborted |
//!
//! Retry policy belongs to whoever wraps [`replicate`](crate::replicate), or to
//! the Store's own transport. Use [`ReplicationError::is_retryable()`] to make
//! that call.

use crate::result::ReplicationResult;
use std::fmt;
use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Result type returned by [`Store`](crate::store::Store) implementations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Error reported by a document store.
///
/// `status` carries the HTTP-equivalent status code when the store has one,
/// so callers can tell a 5xx or dropped connection from a 4xx rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", render_store_error(*status, message))]
pub struct StoreError {
    pub status: Option<u16>,
    pub message: String,
}

fn render_store_error(status: Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("{} (status {})", message, code),
        None => message.to_string(),
    }
}

impl StoreError {
    /// Create an error with an HTTP-equivalent status.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a transport error with no status (connection reset, DNS, ...).
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Create a 409 write-conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, message)
    }

    /// Check if this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self.status {
            None => true,
            Some(code) => code >= 500,
        }
    }
}

/// Errors that can occur during replication.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// A store call failed.
    ///
    /// `context` names the step, e.g. `"open changes feed"` or
    /// `"store doc foo"`.
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },

    /// An attachment could not be materialized.
    #[error("read doc {doc_id}: attachment '{filename}': {message}")]
    Attachment {
        doc_id: String,
        filename: String,
        message: String,
    },

    /// A store response could not be decoded into the expected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid options or settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller cancelled the run.
    #[error("replication cancelled")]
    Cancelled,

    /// A pipeline worker panicked or was aborted.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Wrap a store error with the step that produced it.
    pub fn store(context: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            context: context.into(),
            source,
        }
    }

    /// HTTP-equivalent status of the underlying store error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Store { source, .. } => source.status,
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store { source, .. } => source.is_retryable(),
            Self::Attachment { .. } => false, // Corrupt at the source
            Self::Protocol(_) => false,
            Self::Config(_) => false,
            Self::Cancelled => false,
            Self::Internal(_) => false,
        }
    }

    /// Check if this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A failed run: the terminal error plus the counts gathered before it.
///
/// Displays as `error` and forwards its source, so an error chain prints
/// each message once.
#[derive(Debug)]
pub struct ReplicationFailure {
    /// Work completed before the failure. Both timestamps are set.
    pub result: ReplicationResult,
    /// The first error any stage returned.
    pub error: ReplicationError,
}

impl fmt::Display for ReplicationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for ReplicationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}

impl ReplicationFailure {
    pub fn into_parts(self) -> (ReplicationResult, ReplicationError) {
        (self.result, self.error)
    }
}
