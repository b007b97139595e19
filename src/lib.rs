//! # Document Replicator
//!
//! One-shot pull replication between two document databases, following the
//! CouchDB replication protocol.
//!
//! ## Architecture
//!
//! Given a source and a target [`Store`], the replicator works out which
//! leaf revisions the target lacks, fetches exactly those from the source
//! (history and attachments included) and writes them to the target with
//! `new_edits=false`, so the source's revision tree is reproduced as-is.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                          document-replicator                             │
//! │                                                                          │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌───────────┐  │
//! │  │ Change Reader│──►│ Diff Batcher │──►│ Doc Fetcher  │──►│ Doc Writer│  │
//! │  │ (_changes)   │   │ (_revs_diff) │   │ (GET + gzip) │   │ (PUT)     │  │
//! │  └──────────────┘   └──────────────┘   └──────────────┘   └───────────┘  │
//! │         │                  │                  │                 │        │
//! │         ▼                  ▼                  ▼                 ▼        │
//! │      source             target             source            target      │
//! │                                                                          │
//! │                    ResultAccumulator (shared counters)                   │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stages run concurrently, joined by single-slot channels. The first error
//! stops every stage; the caller gets that error plus the counts reached so
//! far.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use document_replicator::{replicate, ReplicationOptions};
//! use tokio::sync::watch;
//!
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//! let options = ReplicationOptions::default().with_filter("app/published");
//!
//! let result = replicate(shutdown_rx, target, source, &[options]).await?;
//! println!("{} documents written", result.docs_written);
//! ```

pub mod batch;
pub mod changes;
pub mod config;
pub mod coordinator;
pub mod document;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod result;
pub mod shutdown;
pub mod store;
pub mod writer;

// Re-exports for convenience
pub use config::{PipelineSettings, ReplicationConfig, ReplicationOptions};
pub use coordinator::{replicate, ReplicationState, Replicator};
pub use document::{Attachment, AttachmentBody, ContentEncoding, Document};
pub use error::{ReplicationError, ReplicationFailure, Result, StoreError, StoreResult};
pub use result::{ReplicationResult, ResultAccumulator};
pub use store::{Change, RevDiff, SecurityObject, Store};
