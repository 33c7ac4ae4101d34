use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::utils;

/// Caller-supplied metadata fields merged into an entry on write.
pub type MetaOverrides = Map<String, Value>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

/// Timestamps plus free-form extension fields.
///
/// Extension fields are stored flat next to `created` and `modified` and are never validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created: now,
            modified: now,
            extra: Map::new(),
        }
    }

    /// Builds metadata for a file write.
    ///
    /// `created` comes from `overrides`, else from `previous`, else `now`.
    /// `modified` is always `now`. Extension fields of `previous` are kept and
    /// overridden key by key.
    pub fn merged(
        previous: Option<&Metadata>,
        overrides: Option<&MetaOverrides>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut extra = previous.map(|m| m.extra.clone()).unwrap_or_default();
        let mut created = previous.map(|m| m.created);

        if let Some(overrides) = overrides {
            for (key, value) in overrides {
                match key.as_str() {
                    "created" => {
                        if let Ok(ts) = serde_json::from_value::<DateTime<Utc>>(value.clone()) {
                            created = Some(ts);
                        }
                    }
                    "modified" => {}
                    _ => {
                        extra.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        Self {
            created: created.unwrap_or(now),
            modified: now,
            extra,
        }
    }
}

/// A file or directory record, keyed by its full path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    kind: EntryType,
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    metadata: Metadata,
}

impl Entry {
    pub fn file(path: impl Into<String>, content: Value, metadata: Metadata) -> Entry {
        Entry {
            kind: EntryType::File,
            path: path.into(),
            content: Some(content),
            metadata,
        }
    }

    pub fn directory(path: impl Into<String>, now: DateTime<Utc>) -> Entry {
        Entry {
            kind: EntryType::Directory,
            path: path.into(),
            content: None,
            metadata: Metadata::new(now),
        }
    }

    pub fn kind(&self) -> EntryType {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final path segment.
    pub fn name(&self) -> &str {
        utils::basename(&self.path)
    }

    /// File payload. Always `None` for directories.
    pub fn content(&self) -> Option<&Value> {
        self.content.as_ref()
    }

    /// File payload as text, if it is a JSON string.
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryType::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryType::Directory
    }

    pub(crate) fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub(crate) fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub(crate) fn from_json(json: &str) -> serde_json::Result<Entry> {
        serde_json::from_str(json)
    }
}
