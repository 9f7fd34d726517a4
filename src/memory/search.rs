use serde::Serialize;

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::store::MemoryStore;
use crate::memory::types::memory_id;
use crate::rerank::Reranker;

// ── Public types ──────────────────────────────────────────────────────────────

/// Retrieval knobs.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Candidates pulled from the vector index.
    pub initial_k: usize,
    /// Results returned after reranking.
    pub final_k: usize,
    /// Only candidates with this source are reranked.
    pub quality_source: String,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            initial_k: 20,
            final_k: 3,
            quality_source: crate::memory::types::sources::AGENT_RESPONSE.to_string(),
        }
    }
}

impl From<&crate::config::RetrievalConfig> for SearchParams {
    fn from(config: &crate::config::RetrievalConfig) -> Self {
        Self {
            initial_k: config.initial_k,
            final_k: config.final_k,
            quality_source: config.quality_source.clone(),
        }
    }
}

/// A single retrieval result.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub uid: String,
    pub content: String,
    pub source: String,
    pub timestamp: f64,
    /// Squared L2 distance from the query (lower is closer).
    pub faiss_score: f32,
    /// Cross-encoder relevance (higher is better). `None` for fallback results.
    pub rerank_score: Option<f32>,
    pub tags: Vec<String>,
}

// ── Search ────────────────────────────────────────────────────────────────────

/// Two-stage retrieval: vector recall, quality filter, cross-encoder rerank.
///
/// A cold or empty store yields `[]`. A query embedding whose dimension
/// differs from the index is a configuration error. When no candidate passes
/// the quality filter, the first `final_k` candidates are returned in
/// distance order with no rerank score. Without a reranker, filtered
/// candidates keep distance order.
pub fn try_semantic_search(
    store: &MemoryStore,
    provider: &dyn EmbeddingProvider,
    reranker: Option<&dyn Reranker>,
    query: &str,
    params: &SearchParams,
) -> Result<Vec<SearchHit>> {
    if !store.is_ready() {
        tracing::debug!(dir = %store.data_dir().display(), "store not ready; no results");
        return Ok(Vec::new());
    }
    let Some(index) = store.load_index()? else {
        return Ok(Vec::new());
    };
    if index.is_empty() || params.final_k == 0 {
        return Ok(Vec::new());
    }

    // 1. Embed query and check it fits the index
    let query_vec = provider.embed(query)?;
    if query_vec.len() != index.dim() {
        return Err(MemoryError::Configuration(format!(
            "query embedding has dimension {} but the index was built with {}; \
             configure the backend that built it or run `mnemo rebuild`",
            query_vec.len(),
            index.dim()
        )));
    }

    // 2. Vector recall
    let neighbours = index.search(&query_vec, params.initial_k)?;

    // 3. Hydrate through the metadata table
    let metadata = store.load_metadata()?;
    let mut candidates: Vec<SearchHit> = Vec::with_capacity(neighbours.len());
    for (position, distance) in neighbours {
        let id = memory_id(position);
        match metadata.get(&id) {
            Some(record) => candidates.push(SearchHit {
                id,
                uid: record.uid.clone(),
                content: record.content.clone(),
                source: record.source.clone(),
                timestamp: record.timestamp,
                faiss_score: distance,
                rerank_score: None,
                tags: record.tags.clone(),
            }),
            None => tracing::warn!(id = %id, "index position has no metadata entry; dropping"),
        }
    }
    tracing::debug!(query = %query, candidates = candidates.len(), "vector recall done");

    // 4. Quality filter, falling back to raw candidates
    let (mut pool, fallback): (Vec<SearchHit>, Vec<SearchHit>) = candidates
        .into_iter()
        .partition(|hit| hit.source == params.quality_source);
    if pool.is_empty() {
        tracing::debug!(
            quality_source = %params.quality_source,
            "no candidates passed the quality filter; returning raw candidates"
        );
        let mut raw = fallback;
        raw.truncate(params.final_k);
        return Ok(raw);
    }

    // 5. Rerank
    match reranker {
        Some(reranker) => {
            let passages: Vec<&str> = pool.iter().map(|h| h.content.as_str()).collect();
            let scores = reranker.score(query, &passages)?;
            if scores.len() != pool.len() {
                return Err(MemoryError::Backend(format!(
                    "reranker returned {} scores for {} passages",
                    scores.len(),
                    pool.len()
                )));
            }
            for (hit, score) in pool.iter_mut().zip(scores) {
                hit.rerank_score = Some(score);
            }
            // Stable: equal scores keep distance order.
            pool.sort_by(|a, b| {
                let a = a.rerank_score.unwrap_or(f32::NEG_INFINITY);
                let b = b.rerank_score.unwrap_or(f32::NEG_INFINITY);
                b.total_cmp(&a)
            });
        }
        None => tracing::debug!("no reranker configured; keeping distance order"),
    }

    pool.truncate(params.final_k);
    Ok(pool)
}

/// Fail-closed wrapper around [`try_semantic_search`]: any error is logged
/// and an empty result returned.
pub fn perform_semantic_search(
    store: &MemoryStore,
    provider: &dyn EmbeddingProvider,
    reranker: Option<&dyn Reranker>,
    query: &str,
    params: &SearchParams,
) -> Vec<SearchHit> {
    match try_semantic_search(store, provider, reranker, query, params) {
        Ok(hits) => hits,
        Err(e) => {
            tracing::error!(error = %e, query = %query, "semantic search failed");
            Vec::new()
        }
    }
}

/// Truncate content to `max_chars` characters, appending "..." if truncated.
pub fn truncate_preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((end, _)) => format!("{}...", &content[..end]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::index::FlatIndex;
    use crate::memory::types::MemoryRecord;
    use tempfile::TempDir;

    /// Maps a text to a fixed vector keyed by its first byte.
    struct FirstLetter;

    impl EmbeddingProvider for FirstLetter {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let b = text.bytes().next().unwrap_or(b'a');
            Ok(vec![(b - b'a') as f32, 0.0])
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "first-letter"
        }
    }

    /// Scores passages by length.
    struct ByLength;

    impl Reranker for ByLength {
        fn score(&self, _query: &str, passages: &[&str]) -> Result<Vec<f32>> {
            Ok(passages.iter().map(|p| p.len() as f32).collect())
        }

        fn model_id(&self) -> &str {
            "by-length"
        }
    }

    fn seeded(records: &[(&str, &str)]) -> (TempDir, MemoryStore) {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::new(tmp.path());
        let recs: Vec<MemoryRecord> = records
            .iter()
            .map(|(content, source)| MemoryRecord::new(*content, *source))
            .collect();
        let vectors: Vec<Vec<f32>> = records
            .iter()
            .map(|(c, _)| FirstLetter.embed(c).unwrap())
            .collect();
        store
            .write_all(recs, &FlatIndex::build(2, &vectors).unwrap())
            .unwrap();
        (tmp, store)
    }

    fn params(initial_k: usize, final_k: usize) -> SearchParams {
        SearchParams {
            initial_k,
            final_k,
            ..Default::default()
        }
    }

    #[test]
    fn cold_store_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::new(tmp.path());
        let hits = try_semantic_search(&store, &FirstLetter, Some(&ByLength), "a", &params(20, 3)).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn rerank_orders_filtered_pool() {
        let (_tmp, store) = seeded(&[
            ("a short", "agent_response"),
            ("a much longer passage", "agent_response"),
            ("a user said this long thing", "user_input"),
        ]);
        let hits = try_semantic_search(&store, &FirstLetter, Some(&ByLength), "a", &params(20, 3)).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "a much longer passage");
        assert_eq!(hits[0].id, "mem-1");
        assert!(hits.iter().all(|h| h.source == "agent_response"));
        assert!(hits[0].rerank_score.unwrap() >= hits[1].rerank_score.unwrap());
    }

    #[test]
    fn fallback_when_no_quality_candidates() {
        let (_tmp, store) = seeded(&[
            ("c far", "user_input"),
            ("a near", "user_input"),
            ("b middle", "file_upload"),
        ]);
        let hits = try_semantic_search(&store, &FirstLetter, Some(&ByLength), "a", &params(20, 2)).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["mem-1", "mem-2"]);
        assert!(hits.iter().all(|h| h.rerank_score.is_none()));
    }

    #[test]
    fn no_reranker_keeps_distance_order() {
        let (_tmp, store) = seeded(&[
            ("c far but long text", "agent_response"),
            ("a near", "agent_response"),
        ]);
        let hits = try_semantic_search(&store, &FirstLetter, None, "a", &params(20, 3)).unwrap();
        assert_eq!(hits[0].id, "mem-1");
        assert!(hits[0].rerank_score.is_none());
    }

    #[test]
    fn dimension_mismatch_is_error_but_fail_closed_returns_empty() {
        struct ThreeDim;
        impl EmbeddingProvider for ThreeDim {
            fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                Ok(vec![0.0; 3])
            }
            fn dimensions(&self) -> usize {
                3
            }
            fn model_id(&self) -> &str {
                "three"
            }
        }

        let (_tmp, store) = seeded(&[("a x", "agent_response")]);
        let err = try_semantic_search(&store, &ThreeDim, None, "a", &params(20, 3)).unwrap_err();
        assert!(err.is_configuration());
        assert!(perform_semantic_search(&store, &ThreeDim, None, "a", &params(20, 3)).is_empty());
    }

    #[test]
    fn final_k_larger_than_initial_k_returns_all_reranked() {
        let (_tmp, store) = seeded(&[
            ("a one", "agent_response"),
            ("b two", "agent_response"),
            ("c three", "agent_response"),
        ]);
        let hits = try_semantic_search(&store, &FirstLetter, Some(&ByLength), "a", &params(2, 10)).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_truncate_preview() {
        assert_eq!(truncate_preview("hello", 10), "hello");
        assert_eq!(truncate_preview("hello world", 5), "hello...");
        assert_eq!(truncate_preview("héllo", 2), "hé...");
    }
}
