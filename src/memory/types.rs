//! Core memory record definitions.
//!
//! A [`MemoryRecord`] is identified two ways: positionally as `mem-{i}` (its
//! index in the ordered sequence, which is also its key in the metadata table
//! and its row in the vector index) and stably by `uid`, which survives the
//! renumbering that follows a deletion.

use serde::{Deserialize, Serialize};

/// Prefix of positional memory ids.
pub const ID_PREFIX: &str = "mem-";

/// Well-known record sources.
pub mod sources {
    pub const AGENT_RESPONSE: &str = "agent_response";
    pub const USER_INPUT: &str = "user_input";
    pub const FILE_UPLOAD: &str = "file_upload";
}

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// The text payload.
    pub content: String,
    /// Provenance tag (e.g. `"agent_response"`, `"user_input"`, an ingestion-run id).
    pub source: String,
    /// Unix epoch seconds.
    pub timestamp: f64,
    /// Heuristic relevance in `[0.0, 1.0]`; a soft signal, never used for ranking.
    #[serde(default)]
    pub importance: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Stable id (UUID v7). Empty for records written before stable ids existed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    /// Free-form fields preserved from source data (`original_file`, `chunk_index`, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MemoryRecord {
    /// New record stamped with the current time and a fresh `uid`.
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            timestamp: now_epoch_secs(),
            importance: 0.0,
            tags: Vec::new(),
            uid: new_uid(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set a free-form provenance field.
    pub fn set_field(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.extra.insert(key.to_string(), value.into());
    }

    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    /// Assign a `uid` if the record has none. Returns `true` if one was assigned.
    pub fn ensure_uid(&mut self) -> bool {
        if self.uid.is_empty() {
            self.uid = new_uid();
            true
        } else {
            false
        }
    }
}

/// Positional id for the record at `index`.
pub fn memory_id(index: usize) -> String {
    format!("{ID_PREFIX}{index}")
}

/// Parse a positional id back to its index. Returns `None` for anything else.
pub fn parse_memory_id(id: &str) -> Option<usize> {
    id.strip_prefix(ID_PREFIX)?.parse().ok()
}

pub fn new_uid() -> String {
    uuid::Uuid::now_v7().to_string()
}

pub fn now_epoch_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
