//! Error taxonomy for the memory pipeline.
//!
//! Library code returns [`Result`]; the binary wraps these in `anyhow` at the
//! command boundary. "Not ready" is not an error: a cold store is
//! reported through [`crate::memory::store::StoreStatus`].

use std::path::PathBuf;

/// Errors produced by embedding, indexing, ingestion, and retrieval.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Missing credentials or model files, unknown backend, or a vector
    /// dimension that does not match the persisted index. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An embedding or rerank call failed (network, HTTP status, bad payload).
    #[error("backend error: {0}")]
    Backend(String),

    /// A source file, JSONL line, or index file could not be parsed.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl MemoryError {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

pub type Result<T, E = MemoryError> = std::result::Result<T, E>;
