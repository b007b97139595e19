// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document store interface.
//!
//! The replicator speaks to both databases through [`Store`]. A store is
//! whatever client talks to one database (CouchDB over HTTP, a filesystem
//! layout, an in-memory fake); its transport, authentication and retries
//! live behind this trait.
//!
//! # Example
//!
//! ```rust,no_run
//! use document_replicator::error::StoreResult;
//! use document_replicator::store::{
//!     BoxFuture, Change, ChangeStream, ChangesQuery, GetOptions, PutOptions, RevDiff,
//!     RevDiffStream, RevsDiffRequest, SecurityObject, Store,
//! };
//! use document_replicator::Document;
//! use futures::stream;
//!
//! struct EmptyStore;
//!
//! impl Store for EmptyStore {
//!     fn changes(&self, _query: ChangesQuery) -> BoxFuture<'_, ChangeStream> {
//!         let feed: ChangeStream = Box::pin(stream::empty::<StoreResult<Change>>());
//!         Box::pin(async move { Ok(feed) })
//!     }
//!
//!     fn revs_diff(&self, _revs: RevsDiffRequest) -> BoxFuture<'_, RevDiffStream> {
//!         let rows: RevDiffStream = Box::pin(stream::empty::<StoreResult<RevDiff>>());
//!         Box::pin(async move { Ok(rows) })
//!     }
//!
//!     fn get(&self, doc_id: &str, opts: GetOptions) -> BoxFuture<'_, Document> {
//!         let doc = Document::new(doc_id, opts.rev);
//!         Box::pin(async move { Ok(doc) })
//!     }
//!
//!     fn put(&self, doc: Document, _opts: PutOptions) -> BoxFuture<'_, String> {
//!         Box::pin(async move { Ok(doc.rev) })
//!     }
//!
//!     fn security(&self) -> BoxFuture<'_, SecurityObject> {
//!         Box::pin(async { Ok(SecurityObject::default()) })
//!     }
//!
//!     fn set_security(&self, _sec: SecurityObject) -> BoxFuture<'_, ()> {
//!         Box::pin(async { Ok(()) })
//!     }
//! }
//! ```

use crate::config::ReplicationOptions;
use crate::document::Document;
use crate::error::StoreResult;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for boxed async store calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Change feed rows. An `Err` item ends the feed.
pub type ChangeStream = BoxStream<'static, StoreResult<Change>>;

/// Revs-diff response rows. An `Err` item ends the response.
pub type RevDiffStream = BoxStream<'static, StoreResult<RevDiff>>;

/// Revs-diff request body: document ID to the leaf revisions we hold.
pub type RevsDiffRequest = BTreeMap<String, Vec<String>>;

/// One change-feed row: a document and its current leaf revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub changes: Vec<String>,
}

impl Change {
    pub fn new<I, R>(id: impl Into<String>, revs: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            id: id.into(),
            changes: revs.into_iter().map(Into::into).collect(),
        }
    }
}

/// One revs-diff row: the revisions of `id` the target does not have.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevDiff {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub missing: Vec<String>,
    /// Carried through from the store; unused when fetching.
    #[serde(default)]
    pub possible_ancestors: Vec<String>,
}

impl RevDiff {
    pub fn missing<I, R>(id: impl Into<String>, revs: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            id: id.into(),
            missing: revs.into_iter().map(Into::into).collect(),
            possible_ancestors: Vec::new(),
        }
    }
}

/// Changes feed mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feed {
    /// One-shot: return what exists now and close.
    #[default]
    Normal,
}

/// Which revisions each change row lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangesStyle {
    /// Every leaf revision, conflicts included.
    #[default]
    AllDocs,
}

/// Parameters for opening a changes feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesQuery {
    pub feed: Feed,
    pub style: ChangesStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_ids: Option<Vec<String>>,
}

impl ChangesQuery {
    /// A `feed=normal&style=all_docs` query narrowed by `filter` / `doc_ids`.
    pub fn from_options(options: &ReplicationOptions) -> Self {
        Self {
            feed: Feed::Normal,
            style: ChangesStyle::AllDocs,
            filter: options.filter.clone(),
            doc_ids: options.doc_ids.clone(),
        }
    }
}

/// Parameters for fetching one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetOptions {
    pub rev: String,
    /// Include the `_revisions` history.
    pub revs: bool,
    /// Include attachment bodies.
    pub attachments: bool,
}

impl GetOptions {
    /// `rev=<rev>&revs=true&attachments=true`.
    pub fn for_replication(rev: impl Into<String>) -> Self {
        Self {
            rev: rev.into(),
            revs: true,
            attachments: true,
        }
    }
}

/// Parameters for writing a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutOptions {
    /// `false` stores the supplied `_rev` as-is instead of minting a new one.
    pub new_edits: bool,
}

impl PutOptions {
    /// `new_edits=false`.
    pub fn replicated() -> Self {
        Self { new_edits: false }
    }
}

impl Default for PutOptions {
    fn default() -> Self {
        Self { new_edits: true }
    }
}

/// A database security object (admins / members). Opaque to the replicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityObject(pub Value);

impl Default for SecurityObject {
    fn default() -> Self {
        SecurityObject(Value::Object(Default::default()))
    }
}

/// Operations the replicator needs from one database.
///
/// Calls may be dropped mid-flight when the run is cancelled; implementations
/// must tolerate that.
pub trait Store: Send + Sync + 'static {
    /// Open a changes feed.
    fn changes(&self, query: ChangesQuery) -> BoxFuture<'_, ChangeStream>;

    /// Ask which of the given revisions this database is missing.
    fn revs_diff(&self, revs: RevsDiffRequest) -> BoxFuture<'_, RevDiffStream>;

    /// Fetch one document revision.
    ///
    /// Attachments may come back as stubs or with a streamed, possibly
    /// gzip-encoded body.
    fn get(&self, doc_id: &str, opts: GetOptions) -> BoxFuture<'_, Document>;

    /// Write a document. Returns the stored revision.
    fn put(&self, doc: Document, opts: PutOptions) -> BoxFuture<'_, String>;

    /// Read the security object.
    fn security(&self) -> BoxFuture<'_, SecurityObject>;

    /// Overwrite the security object.
    fn set_security(&self, security: SecurityObject) -> BoxFuture<'_, ()>;
}

impl<T: Store + ?Sized> Store for Arc<T> {
    fn changes(&self, query: ChangesQuery) -> BoxFuture<'_, ChangeStream> {
        (**self).changes(query)
    }

    fn revs_diff(&self, revs: RevsDiffRequest) -> BoxFuture<'_, RevDiffStream> {
        (**self).revs_diff(revs)
    }

    fn get(&self, doc_id: &str, opts: GetOptions) -> BoxFuture<'_, Document> {
        (**self).get(doc_id, opts)
    }

    fn put(&self, doc: Document, opts: PutOptions) -> BoxFuture<'_, String> {
        (**self).put(doc, opts)
    }

    fn security(&self) -> BoxFuture<'_, SecurityObject> {
        (**self).security()
    }

    fn set_security(&self, security: SecurityObject) -> BoxFuture<'_, ()> {
        (**self).set_security(security)
    }
}
