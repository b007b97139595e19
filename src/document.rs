// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Documents and attachments as they travel through the pipeline.
//!
//! A [`Document`] serializes to the CouchDB JSON shape: `_id`, `_rev` and
//! `_attachments` sit next to the document's own fields, which are kept in
//! [`Document::data`].
//!
//! ```json
//! {
//!   "_id": "foo",
//!   "_rev": "2-7051cbe5c8faecd085a3fa619e6e6337",
//!   "_attachments": {
//!     "foo.txt": { "content_type": "text/plain", "data": "VGVzdGluZwo=" }
//!   },
//!   "foo": "bar"
//! }
//! ```
//!
//! Attachment bodies arrive from the source either already in memory or as a
//! stream of chunks, possibly gzip-encoded. The fetcher materializes every
//! body into [`AttachmentBody::Bytes`] before the document moves on.

use crate::error::StoreResult;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::de::{self, Deserializer};
use serde::ser::{self, SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Chunked attachment content as handed out by a store.
pub type ByteStream = BoxStream<'static, StoreResult<Bytes>>;

/// Content-Encoding of an attachment body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContentEncoding {
    /// No encoding; the bytes are the content.
    #[default]
    Identity,
    /// gzip-compressed.
    Gzip,
    /// Anything else. The fetcher refuses these.
    Other(String),
}

impl ContentEncoding {
    /// Parse a header value. Empty and `identity` both mean no encoding.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => ContentEncoding::Identity,
            "gzip" => ContentEncoding::Gzip,
            _ => ContentEncoding::Other(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentEncoding::Identity => "",
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Other(s) => s,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, ContentEncoding::Identity)
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attachment content.
pub enum AttachmentBody {
    /// Fully in memory.
    Bytes(Bytes),
    /// Not yet read.
    Stream(ByteStream),
}

impl AttachmentBody {
    /// The bytes, if the body has been materialized.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            AttachmentBody::Bytes(b) => Some(b),
            AttachmentBody::Stream(_) => None,
        }
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self, AttachmentBody::Bytes(_))
    }
}

impl Default for AttachmentBody {
    fn default() -> Self {
        AttachmentBody::Bytes(Bytes::new())
    }
}

impl fmt::Debug for AttachmentBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            AttachmentBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A file attached to a document.
#[derive(Debug, Default)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: AttachmentBody,
    pub content_encoding: ContentEncoding,
    /// Metadata only; the body was not sent.
    pub stub: bool,
}

impl Attachment {
    /// An in-memory, unencoded attachment.
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            content: AttachmentBody::Bytes(content.into()),
            content_encoding: ContentEncoding::Identity,
            stub: false,
        }
    }

    /// A metadata-only attachment.
    pub fn stub(filename: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            stub: true,
            ..Default::default()
        }
    }

    /// True once the body is decoded bytes that can be replayed verbatim.
    pub fn is_ready(&self) -> bool {
        !self.stub && self.content_encoding.is_identity() && self.content.is_materialized()
    }
}

/// Attachments keyed by filename.
pub type Attachments = BTreeMap<String, Attachment>;

/// Any document.
#[derive(Debug, Default)]
pub struct Document {
    pub id: String,
    pub rev: String,
    pub attachments: Attachments,
    /// All other top-level fields.
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: rev.into(),
            ..Default::default()
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Builder-style attachment setter; the map key is the attachment's filename.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments
            .insert(attachment.filename.clone(), attachment);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CouchDB JSON form
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Default)]
struct AttachmentJson {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    content_type: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    stub: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<String>,
}

impl Serialize for Attachment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoding = if self.content_encoding.is_identity() {
            None
        } else {
            Some(self.content_encoding.as_str().to_string())
        };
        let data = if self.stub {
            None
        } else {
            match &self.content {
                AttachmentBody::Bytes(b) => Some(BASE64.encode(b)),
                AttachmentBody::Stream(_) => {
                    return Err(ser::Error::custom(format!(
                        "attachment '{}' content has not been read",
                        self.filename
                    )))
                }
            }
        };
        AttachmentJson {
            content_type: self.content_type.clone(),
            stub: self.stub,
            data,
            encoding,
        }
        .serialize(serializer)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("_id", &self.id)?;
        map.serialize_entry("_rev", &self.rev)?;
        if !self.attachments.is_empty() {
            map.serialize_entry("_attachments", &self.attachments)?;
        }
        for (key, value) in &self.data {
            if matches!(key.as_str(), "_id" | "_rev" | "_attachments") {
                continue;
            }
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut data = Map::<String, Value>::deserialize(deserializer)?;

        let id = match data.remove("_id") {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(de::Error::custom(format!("_id must be a string, got {}", other)))
            }
            None => return Err(de::Error::missing_field("_id")),
        };
        let rev = match data.remove("_rev") {
            Some(Value::String(s)) => s,
            Some(other) => {
                return Err(de::Error::custom(format!("_rev must be a string, got {}", other)))
            }
            None => String::new(),
        };

        let mut attachments = Attachments::new();
        if let Some(raw) = data.remove("_attachments") {
            let parsed: BTreeMap<String, AttachmentJson> =
                serde_json::from_value(raw).map_err(de::Error::custom)?;
            for (filename, att) in parsed {
                let content = match att.data {
                    Some(encoded) => Bytes::from(BASE64.decode(encoded.as_bytes()).map_err(|e| {
                        de::Error::custom(format!("attachment '{}': {}", filename, e))
                    })?),
                    None => Bytes::new(),
                };
                attachments.insert(
                    filename.clone(),
                    Attachment {
                        filename,
                        content_type: att.content_type,
                        content: AttachmentBody::Bytes(content),
                        content_encoding: att
                            .encoding
                            .as_deref()
                            .map(ContentEncoding::parse)
                            .unwrap_or_default(),
                        stub: att.stub,
                    },
                );
            }
        }

        Ok(Document {
            id,
            rev,
            attachments,
            data,
        })
    }
}
