#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use mnemo::config::MnemoConfig;
use mnemo::embedding::EmbeddingProvider;
use mnemo::error::{MemoryError, Result};
use mnemo::memory::index::FlatIndex;
use mnemo::memory::store::MemoryStore;
use mnemo::memory::types::MemoryRecord;
use mnemo::memory::MemoryService;
use mnemo::rerank::Reranker;
use tempfile::TempDir;

/// Lowercased alphanumeric words.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn fnv1a(word: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Deterministic bag-of-words embedder: each word bumps a hashed bucket, then
/// the vector is L2-normalized. Texts sharing words land close together.
pub struct HashEmbedder {
    dim: usize,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of texts embedded so far.
    pub fn texts_embedded(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut v = vec![0.0f32; self.dim];
        for w in words(text) {
            v[(fnv1a(&w) % self.dim as u64) as usize] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        "hash-bow"
    }
}

/// Fails on any text containing `marker`; otherwise delegates to [`HashEmbedder`].
pub struct FlakyEmbedder {
    inner: HashEmbedder,
    marker: String,
}

impl FlakyEmbedder {
    pub fn new(dim: usize, marker: &str) -> Self {
        Self {
            inner: HashEmbedder::new(dim),
            marker: marker.to_string(),
        }
    }
}

impl EmbeddingProvider for FlakyEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains(&self.marker) {
            return Err(MemoryError::Backend(format!("refusing '{}'", self.marker)));
        }
        self.inner.embed(text)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_id(&self) -> &str {
        "flaky"
    }
}

/// Fails every call.
pub struct DownEmbedder(pub usize);

impl EmbeddingProvider for DownEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(MemoryError::Backend("embedding service unavailable".into()))
    }

    fn dimensions(&self) -> usize {
        self.0
    }

    fn model_id(&self) -> &str {
        "down"
    }
}

/// Scores a passage by how many distinct query words it contains.
pub struct OverlapReranker;

impl Reranker for OverlapReranker {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        let query_words = words(query);
        Ok(passages
            .iter()
            .map(|p| {
                let passage_words = words(p);
                query_words
                    .iter()
                    .filter(|w| passage_words.contains(w))
                    .count() as f32
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        "word-overlap"
    }
}

/// Fails every call.
pub struct DownReranker;

impl Reranker for DownReranker {
    fn score(&self, _query: &str, _passages: &[&str]) -> Result<Vec<f32>> {
        Err(MemoryError::Backend("reranker unavailable".into()))
    }

    fn model_id(&self) -> &str {
        "down"
    }
}

/// A store in a fresh temp directory. Keep the `TempDir` alive for the test.
pub fn temp_store() -> (TempDir, MemoryStore) {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::new(tmp.path().join("extract"));
    (tmp, store)
}

/// Write `(content, source)` pairs straight to the store, embedded with `provider`.
pub fn seed(store: &MemoryStore, provider: &dyn EmbeddingProvider, records: &[(&str, &str)]) {
    let recs: Vec<MemoryRecord> = records
        .iter()
        .map(|(content, source)| MemoryRecord::new(*content, *source))
        .collect();
    let vectors: Vec<Vec<f32>> = records
        .iter()
        .map(|(content, _)| provider.embed(content).unwrap())
        .collect();
    let index = FlatIndex::build(provider.dimensions(), &vectors).unwrap();
    store.write_all(recs, &index).unwrap();
}

/// A service over a temp store with the hash embedder and overlap reranker.
pub fn test_service(dim: usize) -> (TempDir, MemoryService) {
    let (tmp, store) = temp_store();
    let service = MemoryService::new(
        store,
        Box::new(HashEmbedder::new(dim)),
        Some(Box::new(OverlapReranker)),
        &MnemoConfig::default(),
    );
    (tmp, service)
}

/// Names of the `*_backup_*` files in `dir`.
pub fn backup_files(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.contains("_backup_"))
        .collect();
    names.sort();
    names
}
