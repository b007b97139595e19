// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for a replication run.
//!
//! Callers hand [`replicate`](crate::replicate) one or more option maps;
//! they are merged left to right, later keys winning. The maps usually come
//! straight from a CLI or a JSON request body, so [`ReplicationOptions`]
//! deserializes from a plain object and ignores keys it does not know.
//!
//! # Recognized options
//!
//! | Key | Type | Meaning |
//! |-----|------|---------|
//! | `filter` | string | Source-side filter function, passed to the changes feed |
//! | `doc_ids` | array of string | Only replicate these documents |
//! | `copy_security` | bool | Copy the source's security object to the target first |
//!
//! `copy_security` overwrites the target's security object unconditionally;
//! security objects are not versioned.
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicationConfig
//! ├── options: ReplicationOptions   # filter / doc_ids / copy_security
//! └── settings: PipelineSettings
//!     └── revs_diff_batch_size      # documents per revs-diff request (10)
//! ```

use crate::error::{ReplicationError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Documents per revs-diff request.
pub const DEFAULT_REVS_DIFF_BATCH_SIZE: usize = 10;

/// Caller-facing replication options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationOptions {
    /// Name of a filter function on the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Explicit document allow-list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_ids: Option<Vec<String>>,

    /// Copy the security object before replicating documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_security: Option<bool>,
}

impl ReplicationOptions {
    /// Parse an option map.
    ///
    /// `null` is treated as an empty map.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => serde_json::from_value(value)
                .map_err(|e| ReplicationError::Config(format!("invalid replication options: {}", e))),
            other => Err(ReplicationError::Config(format!(
                "replication options must be an object, got {}",
                other
            ))),
        }
    }

    /// Merge option sets. Keys set in later sets override earlier ones;
    /// unset keys leave earlier values alone.
    pub fn merge(sets: &[ReplicationOptions]) -> Self {
        sets.iter().fold(Self::default(), |acc, next| acc.overlay(next))
    }

    /// `self` with every key set in `other` replaced.
    pub fn overlay(mut self, other: &ReplicationOptions) -> Self {
        if other.filter.is_some() {
            self.filter = other.filter.clone();
        }
        if other.doc_ids.is_some() {
            self.doc_ids = other.doc_ids.clone();
        }
        if other.copy_security.is_some() {
            self.copy_security = other.copy_security;
        }
        self
    }

    /// Whether the security object should be copied.
    pub fn copy_security(&self) -> bool {
        self.copy_security == Some(true)
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_doc_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.doc_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_copy_security(mut self, copy: bool) -> Self {
        self.copy_security = Some(copy);
        self
    }
}

/// Tunables for the pipeline itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Distinct documents per revs-diff request.
    #[serde(default = "default_revs_diff_batch_size")]
    pub revs_diff_batch_size: usize,
}

fn default_revs_diff_batch_size() -> usize {
    DEFAULT_REVS_DIFF_BATCH_SIZE
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            revs_diff_batch_size: DEFAULT_REVS_DIFF_BATCH_SIZE,
        }
    }
}

/// Everything a [`Replicator`](crate::Replicator) needs besides the two stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicationConfig {
    #[serde(default)]
    pub options: ReplicationOptions,
    #[serde(default)]
    pub settings: PipelineSettings,
}

impl ReplicationConfig {
    /// Config with the given option sets merged.
    pub fn with_options(sets: &[ReplicationOptions]) -> Self {
        Self {
            options: ReplicationOptions::merge(sets),
            settings: PipelineSettings::default(),
        }
    }

    /// Small batches so tests exercise batch boundaries with few documents.
    pub fn for_testing() -> Self {
        Self {
            options: ReplicationOptions::default(),
            settings: PipelineSettings {
                revs_diff_batch_size: 3,
            },
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.settings.revs_diff_batch_size == 0 {
            return Err(ReplicationError::Config(
                "revs_diff_batch_size must be at least 1".to_string(),
            ));
        }
        if let Some(ids) = &self.options.doc_ids {
            if ids.iter().any(|id| id.is_empty()) {
                return Err(ReplicationError::Config(
                    "doc_ids must not contain empty IDs".to_string(),
                ));
            }
        }
        Ok(())
    }
}
