//! Mock Store for testing.
//!
//! Serves as either side of a replication. As a source it hands out a
//! changes feed and documents (attachments streamed in chunks, optionally
//! gzip-encoded). As a target it answers revs-diff from the revisions it
//! holds and records every put.
//!
//! Failures can be injected per operation, and gets or puts can be made to
//! hang forever to exercise cancellation.

use bytes::Bytes;
use document_replicator::document::{Attachment, AttachmentBody, ContentEncoding, Document};
use document_replicator::store::{
    BoxFuture, Change, ChangeStream, ChangesQuery, GetOptions, PutOptions, RevDiff,
    RevDiffStream, RevsDiffRequest, SecurityObject, Store,
};
use document_replicator::{StoreError, StoreResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

/// gzip-compress `data`.
pub fn gzip(data: &[u8]) -> Bytes {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).expect("gzip write");
    Bytes::from(enc.finish().expect("gzip finish"))
}

/// An attachment as the source holds it.
#[derive(Debug, Clone)]
pub struct MockAttachment {
    pub content_type: String,
    /// Body as sent on the wire (compressed when `encoding` is gzip).
    pub raw: Bytes,
    pub encoding: ContentEncoding,
    pub stub: bool,
}

/// A document revision the source can serve.
#[derive(Debug, Clone)]
pub struct MockDoc {
    pub id: String,
    pub rev: String,
    pub data: Map<String, Value>,
    pub attachments: BTreeMap<String, MockAttachment>,
}

impl MockDoc {
    pub fn new(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: rev.into(),
            data: Map::new(),
            attachments: BTreeMap::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Plain attachment.
    pub fn attachment(mut self, filename: &str, content_type: &str, content: &[u8]) -> Self {
        self.attachments.insert(
            filename.to_string(),
            MockAttachment {
                content_type: content_type.to_string(),
                raw: Bytes::copy_from_slice(content),
                encoding: ContentEncoding::Identity,
                stub: false,
            },
        );
        self
    }

    /// Attachment sent gzip-encoded; `content` is the decoded form.
    pub fn gzip_attachment(mut self, filename: &str, content_type: &str, content: &[u8]) -> Self {
        self.attachments.insert(
            filename.to_string(),
            MockAttachment {
                content_type: content_type.to_string(),
                raw: gzip(content),
                encoding: ContentEncoding::Gzip,
                stub: false,
            },
        );
        self
    }

    /// Attachment sent with an arbitrary encoding and raw body.
    pub fn encoded_attachment(
        mut self,
        filename: &str,
        encoding: ContentEncoding,
        raw: &[u8],
    ) -> Self {
        self.attachments.insert(
            filename.to_string(),
            MockAttachment {
                content_type: "application/octet-stream".to_string(),
                raw: Bytes::copy_from_slice(raw),
                encoding,
                stub: false,
            },
        );
        self
    }

    fn to_document(&self) -> Document {
        let mut doc = Document::new(&self.id, &self.rev);
        doc.data = self.data.clone();
        for (filename, att) in &self.attachments {
            // Two chunks so the fetcher has to stitch them together.
            let split = att.raw.len() / 2;
            let chunks = vec![
                Ok::<_, StoreError>(att.raw.slice(..split)),
                Ok(att.raw.slice(split..)),
            ];
            doc.attachments.insert(
                filename.clone(),
                Attachment {
                    filename: filename.clone(),
                    content_type: att.content_type.clone(),
                    content: AttachmentBody::Stream(Box::pin(futures::stream::iter(chunks))),
                    content_encoding: att.encoding.clone(),
                    stub: att.stub,
                },
            );
        }
        doc
    }
}

/// A recorded put() call.
#[derive(Debug, Clone)]
pub struct PutCall {
    pub doc_id: String,
    pub rev: String,
    pub new_edits: bool,
    pub data: Map<String, Value>,
    /// filename -> (body, encoding, stub) as handed to the store
    pub attachments: BTreeMap<String, (Option<Bytes>, ContentEncoding, bool)>,
}

/// Mock implementation of Store that records all calls.
///
/// # Example
/// ```rust,ignore
/// let source = MockStore::new().with_doc(MockDoc::new("foo", "2-abc").field("foo", "bar"));
/// let target = Arc::new(MockStore::new());
///
/// replicate(never(), Arc::clone(&target), source, &[]).await.unwrap();
///
/// assert_eq!(target.puts().len(), 1);
/// ```
#[derive(Default)]
pub struct MockStore {
    /// Changes feed rows, in feed order
    feed: Mutex<Vec<Change>>,
    /// Revisions served by get(): (id, rev) -> doc
    docs: Mutex<HashMap<(String, String), MockDoc>>,
    /// Revisions this store already holds (answers revs_diff)
    held: Mutex<HashMap<String, HashSet<String>>>,
    security: Mutex<SecurityObject>,

    changes_error: Option<StoreError>,
    changes_mid_stream_error: Option<StoreError>,
    revs_diff_error: Option<StoreError>,
    get_error: Option<StoreError>,
    security_error: Option<StoreError>,
    set_security_error: Option<StoreError>,
    /// Document IDs whose put() fails with a conflict
    reject_puts: HashSet<String>,
    hang_gets: bool,
    hang_puts: bool,

    /// Recorded calls
    queries: Mutex<Vec<ChangesQuery>>,
    revs_diff_requests: Mutex<Vec<RevsDiffRequest>>,
    gets: Mutex<Vec<(String, GetOptions)>>,
    puts: Mutex<Vec<PutCall>>,
    set_security_calls: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `doc` and list it on the changes feed.
    ///
    /// A second revision of the same ID becomes another leaf on its row.
    pub fn with_doc(self, doc: MockDoc) -> Self {
        {
            let mut feed = self.feed.lock();
            match feed.iter_mut().find(|c| c.id == doc.id) {
                Some(row) => row.changes.push(doc.rev.clone()),
                None => feed.push(Change::new(doc.id.clone(), [doc.rev.clone()])),
            }
        }
        self.docs
            .lock()
            .insert((doc.id.clone(), doc.rev.clone()), doc);
        self
    }

    /// `n` plain documents `doc-000`, `doc-001`, ...
    pub fn with_numbered_docs(mut self, n: usize) -> Self {
        for i in 0..n {
            self = self.with_doc(MockDoc::new(format!("doc-{:03}", i), format!("1-{:03}", i)).field("n", i as u64));
        }
        self
    }

    /// Mark a revision as already present (this store as target).
    pub fn with_held_rev(self, id: &str, rev: &str) -> Self {
        self.held
            .lock()
            .entry(id.to_string())
            .or_default()
            .insert(rev.to_string());
        self
    }

    pub fn with_security(self, security: Value) -> Self {
        *self.security.lock() = SecurityObject(security);
        self
    }

    pub fn fail_changes(mut self, err: StoreError) -> Self {
        self.changes_error = Some(err);
        self
    }

    /// Feed yields every row, then this error.
    pub fn fail_changes_mid_stream(mut self, err: StoreError) -> Self {
        self.changes_mid_stream_error = Some(err);
        self
    }

    pub fn fail_revs_diff(mut self, err: StoreError) -> Self {
        self.revs_diff_error = Some(err);
        self
    }

    pub fn fail_gets(mut self, err: StoreError) -> Self {
        self.get_error = Some(err);
        self
    }

    pub fn fail_security(mut self, err: StoreError) -> Self {
        self.security_error = Some(err);
        self
    }

    pub fn fail_set_security(mut self, err: StoreError) -> Self {
        self.set_security_error = Some(err);
        self
    }

    pub fn reject_put(mut self, doc_id: &str) -> Self {
        self.reject_puts.insert(doc_id.to_string());
        self
    }

    pub fn hang_gets(mut self) -> Self {
        self.hang_gets = true;
        self
    }

    pub fn hang_puts(mut self) -> Self {
        self.hang_puts = true;
        self
    }

    // -------------------------------------------------------------------------
    // Assertions
    // -------------------------------------------------------------------------

    pub fn changes_calls(&self) -> usize {
        self.queries.lock().len()
    }

    pub fn queries(&self) -> Vec<ChangesQuery> {
        self.queries.lock().clone()
    }

    pub fn revs_diff_requests(&self) -> Vec<RevsDiffRequest> {
        self.revs_diff_requests.lock().clone()
    }

    /// Documents per revs-diff request, in call order.
    pub fn revs_diff_sizes(&self) -> Vec<usize> {
        self.revs_diff_requests.lock().iter().map(|r| r.len()).collect()
    }

    pub fn gets(&self) -> Vec<(String, GetOptions)> {
        self.gets.lock().clone()
    }

    pub fn puts(&self) -> Vec<PutCall> {
        self.puts.lock().clone()
    }

    pub fn security_value(&self) -> Value {
        self.security.lock().0.clone()
    }

    pub fn set_security_calls(&self) -> usize {
        self.set_security_calls.load(Ordering::SeqCst)
    }
}

impl Store for MockStore {
    fn changes(&self, query: ChangesQuery) -> BoxFuture<'_, ChangeStream> {
        let rows: Vec<Change> = {
            let feed = self.feed.lock();
            match &query.doc_ids {
                Some(ids) => feed.iter().filter(|c| ids.contains(&c.id)).cloned().collect(),
                None => feed.clone(),
            }
        };
        self.queries.lock().push(query);

        let result = match &self.changes_error {
            Some(e) => Err(e.clone()),
            None => {
                let mut items: Vec<StoreResult<Change>> = rows.into_iter().map(Ok).collect();
                if let Some(e) = &self.changes_mid_stream_error {
                    items.push(Err(e.clone()));
                }
                Ok(Box::pin(futures::stream::iter(items)) as ChangeStream)
            }
        };
        Box::pin(async move { result })
    }

    fn revs_diff(&self, revs: RevsDiffRequest) -> BoxFuture<'_, RevDiffStream> {
        self.revs_diff_requests.lock().push(revs.clone());

        let result = match &self.revs_diff_error {
            Some(e) => Err(e.clone()),
            None => {
                let held = self.held.lock();
                let rows: Vec<StoreResult<RevDiff>> = revs
                    .into_iter()
                    .filter_map(|(id, revs)| {
                        let missing: Vec<String> = revs
                            .into_iter()
                            .filter(|rev| !held.get(&id).is_some_and(|h| h.contains(rev)))
                            .collect();
                        if missing.is_empty() {
                            None
                        } else {
                            Some(Ok(RevDiff::missing(id, missing)))
                        }
                    })
                    .collect();
                Ok(Box::pin(futures::stream::iter(rows)) as RevDiffStream)
            }
        };
        Box::pin(async move { result })
    }

    fn get(&self, doc_id: &str, opts: GetOptions) -> BoxFuture<'_, Document> {
        let key = (doc_id.to_string(), opts.rev.clone());
        self.gets.lock().push((doc_id.to_string(), opts));

        if self.hang_gets {
            return Box::pin(futures::future::pending());
        }

        let result = match &self.get_error {
            Some(e) => Err(e.clone()),
            None => match self.docs.lock().get(&key) {
                Some(doc) => Ok(doc.to_document()),
                None => Err(StoreError::new(404, "missing")),
            },
        };
        Box::pin(async move { result })
    }

    fn put(&self, doc: Document, opts: PutOptions) -> BoxFuture<'_, String> {
        let attachments = doc
            .attachments
            .iter()
            .map(|(name, att)| {
                (
                    name.clone(),
                    (att.content.as_bytes().cloned(), att.content_encoding.clone(), att.stub),
                )
            })
            .collect();
        self.puts.lock().push(PutCall {
            doc_id: doc.id.clone(),
            rev: doc.rev.clone(),
            new_edits: opts.new_edits,
            data: doc.data.clone(),
            attachments,
        });

        if self.hang_puts {
            return Box::pin(futures::future::pending());
        }

        let result = if self.reject_puts.contains(&doc.id) {
            Err(StoreError::conflict("Document update conflict."))
        } else {
            self.held
                .lock()
                .entry(doc.id.clone())
                .or_default()
                .insert(doc.rev.clone());
            Ok(doc.rev)
        };
        Box::pin(async move { result })
    }

    fn security(&self) -> BoxFuture<'_, SecurityObject> {
        let result = match &self.security_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.security.lock().clone()),
        };
        Box::pin(async move { result })
    }

    fn set_security(&self, security: SecurityObject) -> BoxFuture<'_, ()> {
        self.set_security_calls.fetch_add(1, Ordering::SeqCst);
        let result = match &self.set_security_error {
            Some(e) => Err(e.clone()),
            None => {
                *self.security.lock() = security;
                Ok(())
            }
        };
        Box::pin(async move { result })
    }
}
