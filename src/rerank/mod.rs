//! Cross-encoder relevance scoring for the second retrieval stage.
//!
//! A [`Reranker`] scores `(query, passage)` pairs jointly. Scores are
//! higher-is-better relevance logits, not distances, and are only comparable
//! within one call.

pub mod cross_encoder;

use crate::config::RerankConfig;
use crate::error::Result;

/// Trait for scoring candidate passages against a query.
///
/// Synchronous like [`crate::embedding::EmbeddingProvider`].
pub trait Reranker: Send + Sync {
    /// Return one score per passage, in input order.
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;

    fn model_id(&self) -> &str;
}

/// Create the configured reranker, or `None` when reranking is disabled.
pub fn create_reranker(config: &RerankConfig) -> Result<Option<Box<dyn Reranker>>> {
    if !config.enabled {
        tracing::info!("reranking disabled; results will be ordered by vector distance");
        return Ok(None);
    }
    let reranker = cross_encoder::CrossEncoderReranker::new(config)?;
    Ok(Some(Box::new(reranker)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_reranker_is_none() {
        let config = RerankConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(create_reranker(&config).unwrap().is_none());
    }

    #[test]
    fn enabled_without_model_files_is_configuration_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = RerankConfig {
            enabled: true,
            cache_dir: tmp.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let err = create_reranker(&config).err().expect("model files missing");
        assert!(err.is_configuration());
    }
}
