// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document fetcher: the third pipeline stage.
//!
//! For every revision the target is missing, fetch that exact revision from
//! the source with its revision history and attachment bodies. Attachments
//! are drained and decoded here, so a [`Document`] that leaves this stage
//! carries only plain, in-memory attachment bytes the writer can replay.
//!
//! # Attachment decoding
//!
//! | Content-Encoding | Handling |
//! |------------------|----------|
//! | (none) / `identity` | Bytes copied as-is |
//! | `gzip` | Decompressed (multi-member streams accepted) |
//! | anything else | Fails the run |

use crate::document::{Attachment, AttachmentBody, ContentEncoding, Document};
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::result::ResultAccumulator;
use crate::shutdown::or_cancel;
use crate::store::{GetOptions, RevDiff, Store};
use bytes::{Bytes, BytesMut};
use flate2::read::MultiGzDecoder;
use futures::StreamExt;
use std::io::{self, Read};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// Fetch every missing revision named on `input` and forward the decoded
/// documents to `out`.
pub async fn read_docs<S: Store + ?Sized>(
    source: &S,
    results: &ResultAccumulator,
    mut input: mpsc::Receiver<RevDiff>,
    out: mpsc::Sender<Document>,
    mut cancel: watch::Receiver<bool>,
) -> Result<()> {
    while let Some(diff) = or_cancel(&mut cancel, input.recv()).await? {
        for rev in &diff.missing {
            results.missing_checked();
            let doc = read_doc(source, &diff.id, rev, &mut cancel).await?;
            results.read();
            results.missing_found();

            or_cancel(&mut cancel, out.send(doc))
                .await?
                .map_err(|_| ReplicationError::Cancelled)?;
        }
    }
    Ok(())
}

/// Fetch one revision and materialize its attachments.
pub async fn read_doc<S: Store + ?Sized>(
    source: &S,
    doc_id: &str,
    rev: &str,
    cancel: &mut watch::Receiver<bool>,
) -> Result<Document> {
    let context = || format!("read doc {}", doc_id);
    let started = Instant::now();

    let fetch = async { source.get(doc_id, GetOptions::for_replication(rev)).await };
    let mut doc = or_cancel(cancel, fetch)
        .await?
        .map_err(|e| ReplicationError::store(context(), e))?;

    if doc.id.is_empty() {
        doc.id = doc_id.to_string();
    }
    if doc.rev.is_empty() {
        doc.rev = rev.to_string();
    }
    if doc.id != doc_id || doc.rev != rev {
        return Err(ReplicationError::Protocol(format!(
            "{}: asked for revision {} but got {} {}",
            context(),
            rev,
            doc.id,
            doc.rev
        )));
    }

    for attachment in doc.attachments.values_mut() {
        materialize(doc_id, attachment, cancel).await?;
    }

    metrics::record_doc_read(started.elapsed());
    trace!(
        doc_id = %doc.id,
        rev = %doc.rev,
        attachments = doc.attachments.len(),
        "Fetched revision"
    );
    Ok(doc)
}

/// Drain and decode one attachment in place.
///
/// Afterwards the body is [`AttachmentBody::Bytes`], the encoding is
/// identity and `stub` is cleared.
pub async fn materialize(
    doc_id: &str,
    attachment: &mut Attachment,
    cancel: &mut watch::Receiver<bool>,
) -> Result<()> {
    let attachment_error = |message: String| ReplicationError::Attachment {
        doc_id: doc_id.to_string(),
        filename: attachment.filename.clone(),
        message,
    };

    if let ContentEncoding::Other(encoding) = &attachment.content_encoding {
        return Err(attachment_error(format!("unknown encoding '{}'", encoding)));
    }

    let raw = match std::mem::take(&mut attachment.content) {
        AttachmentBody::Bytes(bytes) => bytes,
        AttachmentBody::Stream(mut chunks) => {
            let mut buf = BytesMut::new();
            while let Some(chunk) = or_cancel(cancel, chunks.next()).await? {
                let chunk = chunk.map_err(|e| {
                    ReplicationError::store(
                        format!("read doc {}: attachment '{}'", doc_id, attachment.filename),
                        e,
                    )
                })?;
                buf.extend_from_slice(&chunk);
            }
            buf.freeze()
        }
    };

    let decoded = decode_body(&attachment.content_encoding, raw)
        .map_err(|e| attachment_error(e.to_string()))?;

    debug!(
        doc_id,
        filename = %attachment.filename,
        encoding = %attachment.content_encoding,
        bytes = decoded.len(),
        "Attachment decoded"
    );
    metrics::record_attachment_decoded(attachment.content_encoding.as_str(), decoded.len());

    attachment.content = AttachmentBody::Bytes(decoded);
    attachment.content_encoding = ContentEncoding::Identity;
    attachment.stub = false;
    Ok(())
}

/// Decode a raw attachment body.
///
/// An empty body decodes to empty content whatever the encoding; stubs
/// arrive that way.
pub fn decode_body(encoding: &ContentEncoding, raw: Bytes) -> io::Result<Bytes> {
    match encoding {
        _ if raw.is_empty() => Ok(raw),
        ContentEncoding::Identity => Ok(raw),
        ContentEncoding::Gzip => {
            let mut decoded = Vec::with_capacity(raw.len().saturating_mul(2));
            MultiGzDecoder::new(raw.as_ref()).read_to_end(&mut decoded)?;
            Ok(Bytes::from(decoded))
        }
        ContentEncoding::Other(name) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unknown encoding '{}'", name),
        )),
    }
}
