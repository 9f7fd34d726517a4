//! Text-to-vector embedding backends.
//!
//! Provides the [`EmbeddingProvider`] trait with two implementations: a local
//! ONNX model (all-MiniLM-L6-v2, 384 dimensions) and a remote HTTP embedding
//! API (768 dimensions by default). The backend is chosen via
//! [`create_provider`] from configuration. Whichever backend built an index
//! must also embed the queries against it.

pub mod local;
pub mod remote;

use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, Result};

/// Number of dimensions produced by the local model (all-MiniLM-L6-v2).
pub const LOCAL_EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// All methods are synchronous; callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector of [`dimensions`](Self::dimensions) floats.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize;

    /// Identifier of the underlying model, for diagnostics.
    fn model_id(&self) -> &str;
}

/// Create an embedding provider from config.
///
/// `"local"` loads the ONNX model from `cache_dir` (run `mnemo model download`
/// first); `"remote"` requires an API key.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Box::new(provider))
        }
        "remote" => {
            let provider = remote::RemoteEmbeddingProvider::new(config)?;
            Ok(Box::new(provider))
        }
        other => Err(MemoryError::Configuration(format!(
            "unknown embedding provider: {other}. Supported: local, remote"
        ))),
    }
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
pub(crate) fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
