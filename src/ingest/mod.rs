//! Ingestion pipeline: source file → chunks → scored records → embeddings →
//! rebuilt store.
//!
//! Parsing happens entirely before any write, so a malformed source leaves the
//! store untouched. Individual chunks whose embedding fails are skipped and
//! counted rather than failing the run.

pub mod chunk;
pub mod importance;

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;

pub use chunk::{Chunk, ChunkParams, SourceFormat};

use crate::config::IngestionConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::memory::index::FlatIndex;
use crate::memory::store::MemoryStore;
use crate::memory::types::MemoryRecord;

/// Texts per `embed_batch` call.
pub const EMBED_BATCH_SIZE: usize = 32;

/// What happens to the memories already in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// Append new chunks after the existing records.
    #[default]
    Merge,
    /// Discard the existing records.
    Replace,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Overrides extension-based format detection.
    pub format_hint: Option<String>,
    pub chunk_size: usize,
    pub min_chunk_len: usize,
    pub filter_short: bool,
    pub max_chunk_bytes: usize,
    pub deduplicate: bool,
    pub merge: MergeMode,
    /// Source for chunks that don't carry their own.
    pub source: String,
    /// Tags prepended to every chunk's tags.
    pub base_tags: Vec<String>,
}

impl IngestOptions {
    pub fn from_config(config: &IngestionConfig) -> Self {
        Self {
            format_hint: None,
            chunk_size: config.chunk_size,
            min_chunk_len: config.min_chunk_len,
            filter_short: config.filter_short,
            max_chunk_bytes: config.max_chunk_bytes,
            deduplicate: config.deduplicate,
            merge: MergeMode::Merge,
            source: config.default_source.clone(),
            base_tags: Vec::new(),
        }
    }

    fn chunk_params(&self) -> ChunkParams {
        ChunkParams {
            chunk_size: self.chunk_size,
            min_chunk_len: self.min_chunk_len,
            filter_short: self.filter_short,
            max_chunk_bytes: self.max_chunk_bytes,
        }
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from_config(&IngestionConfig::default())
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct IngestSummary {
    /// New chunks after filtering and deduplication.
    pub chunks_created: usize,
    /// New chunks that were embedded and stored.
    pub embeddings_created: usize,
    /// Store size after the run.
    pub total_memories: usize,
    /// Chunks dropped because their embedding failed.
    pub chunks_skipped: usize,
    pub duplicates_removed: usize,
    /// Malformed JSONL lines.
    pub lines_skipped: usize,
    pub format: String,
}

/// Ingest a file from disk. The file name becomes the `original_file` field.
pub fn ingest_file(
    store: &MemoryStore,
    provider: &dyn EmbeddingProvider,
    path: &Path,
    opts: &IngestOptions,
) -> Result<IngestSummary> {
    let bytes = std::fs::read(path).map_err(|e| MemoryError::io(path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    ingest_bytes(store, provider, &name, &bytes, opts)
}

/// Ingest an in-memory source named `name` (used for format detection and
/// provenance).
pub fn ingest_bytes(
    store: &MemoryStore,
    provider: &dyn EmbeddingProvider,
    name: &str,
    bytes: &[u8],
    opts: &IngestOptions,
) -> Result<IngestSummary> {
    let requested = SourceFormat::detect(name, opts.format_hint.as_deref())?;
    let parsed = chunk::parse(bytes, requested, &opts.chunk_params())?;
    let format = parsed.format.unwrap_or(requested);
    tracing::info!(
        file = %name,
        format = %format,
        chunks = parsed.chunks.len(),
        lines_skipped = parsed.lines_skipped,
        "source parsed"
    );

    let (mut records, mut vectors) = match opts.merge {
        MergeMode::Replace => (Vec::new(), Vec::new()),
        MergeMode::Merge => existing_corpus(store, provider)?,
    };

    let mut seen: HashSet<String> = if opts.deduplicate {
        records.iter().map(|r| r.content.clone()).collect()
    } else {
        HashSet::new()
    };
    let mut duplicates_removed = 0;
    let mut fresh = Vec::with_capacity(parsed.chunks.len());
    for (i, chunk) in parsed.chunks.into_iter().enumerate() {
        if opts.deduplicate && !seen.insert(chunk.content.clone()) {
            duplicates_removed += 1;
            continue;
        }
        fresh.push(build_record(chunk, i, name, format, opts));
    }
    if duplicates_removed > 0 {
        tracing::info!(duplicates_removed, "duplicate chunks dropped");
    }

    let chunks_created = fresh.len();
    let (embedded, new_vectors, chunks_skipped) = embed_records(provider, fresh);
    let embeddings_created = embedded.len();

    let mut summary = IngestSummary {
        chunks_created,
        embeddings_created,
        total_memories: records.len() + embeddings_created,
        chunks_skipped,
        duplicates_removed,
        lines_skipped: parsed.lines_skipped,
        format: format.to_string(),
    };

    if opts.merge == MergeMode::Merge && embeddings_created == 0 && store.is_ready() {
        tracing::info!(file = %name, "nothing new to store; leaving store unchanged");
        return Ok(summary);
    }

    records.extend(embedded);
    vectors.extend(new_vectors);
    let index = FlatIndex::build(provider.dimensions(), &vectors)?;
    store.write_all(records, &index)?;
    summary.total_memories = index.len();

    tracing::info!(
        file = %name,
        created = summary.embeddings_created,
        skipped = summary.chunks_skipped,
        total = summary.total_memories,
        "ingestion complete"
    );
    Ok(summary)
}

/// Existing records paired with their vectors. Vectors come from the
/// persisted index when it matches the backend; a missing index means every
/// record is re-embedded.
fn existing_corpus(
    store: &MemoryStore,
    provider: &dyn EmbeddingProvider,
) -> Result<(Vec<MemoryRecord>, Vec<Vec<f32>>)> {
    let memories = store.load_memories()?;
    if memories.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }
    let records: Vec<MemoryRecord> = memories.as_ref().clone();

    match store.load_index()? {
        Some(index) => {
            if index.dim() != provider.dimensions() {
                return Err(MemoryError::Configuration(format!(
                    "existing index has dimension {} but backend '{}' produces {}; \
                     run `mnemo rebuild` or ingest with --replace",
                    index.dim(),
                    provider.model_id(),
                    provider.dimensions()
                )));
            }
            if index.len() != records.len() {
                return Err(MemoryError::Configuration(format!(
                    "store is inconsistent ({} memories, {} vectors); run `mnemo rebuild`",
                    records.len(),
                    index.len()
                )));
            }
            let vectors: Vec<Vec<f32>> = (0..index.len()).filter_map(|i| index.vector(i)).collect();
            tracing::debug!(reused = vectors.len(), "reusing existing vectors");
            Ok((records, vectors))
        }
        None => {
            tracing::warn!(
                memories = records.len(),
                "no vector index found; re-embedding existing memories"
            );
            let texts: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
            let vectors = embed_all(provider, &texts)?;
            Ok((records, vectors))
        }
    }
}

fn build_record(
    chunk: Chunk,
    chunk_index: usize,
    file_name: &str,
    format: SourceFormat,
    opts: &IngestOptions,
) -> MemoryRecord {
    let importance = importance::score_with_boost(&chunk.content, chunk.importance_boost);
    let source = chunk.source.unwrap_or_else(|| opts.source.clone());

    let mut tags = opts.base_tags.clone();
    tags.push(format.as_str().to_string());
    tags.extend(chunk.tags);
    tags.push(format!("file:{file_name}"));
    tags.push(format!("chunk:{chunk_index}"));

    let mut record = MemoryRecord::new(chunk.content, source)
        .with_importance(importance)
        .with_tags(tags);
    if let Some(ts) = chunk.timestamp {
        record = record.with_timestamp(ts);
    }
    record.extra = chunk.fields;
    record.set_field("original_file", file_name);
    record.set_field("chunk_index", chunk_index);
    record
}

/// Embed records in batches. A failed batch is retried one text at a time;
/// texts that still fail are dropped. Returns the surviving records, their
/// vectors, and the number dropped.
fn embed_records(
    provider: &dyn EmbeddingProvider,
    records: Vec<MemoryRecord>,
) -> (Vec<MemoryRecord>, Vec<Vec<f32>>, usize) {
    let mut kept = Vec::with_capacity(records.len());
    let mut vectors = Vec::with_capacity(records.len());
    let mut skipped = 0;

    let mut pending = records.into_iter().peekable();
    while pending.peek().is_some() {
        let batch: Vec<MemoryRecord> = pending.by_ref().take(EMBED_BATCH_SIZE).collect();
        let texts: Vec<&str> = batch.iter().map(|r| r.content.as_str()).collect();

        match provider.embed_batch(&texts) {
            Ok(batch_vectors) if batch_vectors.len() == batch.len() => {
                vectors.extend(batch_vectors);
                kept.extend(batch);
            }
            outcome => {
                if let Err(e) = outcome {
                    tracing::warn!(error = %e, size = batch.len(), "batch embedding failed; retrying individually");
                }
                for record in batch {
                    match provider.embed(&record.content) {
                        Ok(v) => {
                            vectors.push(v);
                            kept.push(record);
                        }
                        Err(e) => {
                            tracing::warn!(
                                chunk_index = ?record.field("chunk_index"),
                                error = %e,
                                "skipping chunk: embedding failed"
                            );
                            skipped += 1;
                        }
                    }
                }
            }
        }
    }
    (kept, vectors, skipped)
}

/// Embed every text or fail. Used when existing memories must be re-embedded
/// and dropping any of them is not acceptable.
pub(crate) fn embed_all(provider: &dyn EmbeddingProvider, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(EMBED_BATCH_SIZE) {
        let batch_vectors = provider.embed_batch(batch)?;
        if batch_vectors.len() != batch.len() {
            return Err(MemoryError::Backend(format!(
                "backend returned {} vectors for {} texts",
                batch_vectors.len(),
                batch.len()
            )));
        }
        vectors.extend(batch_vectors);
    }
    Ok(vectors)
}
