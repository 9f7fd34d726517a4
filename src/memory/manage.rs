//! Management operations over a populated store: delete, edit, cleanup,
//! rebuild, and statistics.
//!
//! Every mutation reads the current corpus, computes the replacement, and
//! hands it to [`MemoryStore::write_all`], which backs up before replacing
//! anything. Vectors of untouched records are carried over from the index.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use super::index::FlatIndex;
use super::search::truncate_preview;
use super::store::MemoryStore;
use super::types::{memory_id, parse_memory_id, MemoryRecord};
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::ingest::{embed_all, importance};

const PREVIEW_CHARS: usize = 80;

// ── Public types ──────────────────────────────────────────────────────────────

/// Result of a delete operation.
#[derive(Debug, Serialize)]
pub struct DeleteResult {
    /// `uid`s of the removed records.
    pub deleted: Vec<String>,
    /// Requested ids that matched nothing.
    pub not_found: Vec<String>,
    pub remaining: usize,
}

/// Which records [`cleanup`] should remove. Criteria combine with OR.
#[derive(Debug, Clone)]
pub struct CleanupCriteria {
    /// Remove records scored below this importance.
    pub min_importance: Option<f64>,
    /// Remove records with fewer characters than this.
    pub min_length: Option<usize>,
    /// Remove records from any of these sources.
    pub sources: Vec<String>,
    /// Remove exact-content duplicates, keeping the first occurrence.
    pub remove_duplicates: bool,
    /// Report candidates without deleting.
    pub dry_run: bool,
}

impl Default for CleanupCriteria {
    fn default() -> Self {
        Self {
            min_importance: None,
            min_length: None,
            sources: Vec::new(),
            remove_duplicates: false,
            dry_run: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CleanupCandidate {
    pub id: String,
    pub uid: String,
    pub reason: String,
    pub preview: String,
}

#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub candidates: Vec<CleanupCandidate>,
    pub deleted: usize,
    pub dry_run: bool,
    pub remaining: usize,
}

#[derive(Debug, Serialize)]
pub struct RebuildResult {
    pub memories: usize,
    pub dimension: usize,
    pub model: String,
}

/// Response from [`stats`].
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub system_ready: bool,
    pub total_memories: usize,
    pub by_source: BTreeMap<String, usize>,
    pub avg_importance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_dimension: Option<usize>,
    pub consistent: bool,
    /// Combined size of the three store files.
    pub data_bytes: u64,
}

// ── Operations ────────────────────────────────────────────────────────────────

/// Look up one record by `mem-{i}` or `uid`.
pub fn get_memory(store: &MemoryStore, id: &str) -> Result<Option<(String, MemoryRecord)>> {
    store.get(id)
}

/// Delete records by positional id or `uid`. Unknown ids are reported, not
/// errors. Remaining records are renumbered.
pub fn delete_memories(store: &MemoryStore, ids: &[String]) -> Result<DeleteResult> {
    if !store.is_ready() {
        return Ok(DeleteResult {
            deleted: Vec::new(),
            not_found: ids.to_vec(),
            remaining: 0,
        });
    }
    let (memories, index) = consistent_corpus(store)?;

    let mut remove = HashSet::new();
    let mut not_found = Vec::new();
    for id in ids {
        match resolve(&memories, id) {
            Some(position) => {
                remove.insert(position);
            }
            None => not_found.push(id.clone()),
        }
    }

    let deleted: Vec<String> = (0..memories.len())
        .filter(|p| remove.contains(p))
        .map(|p| memories[p].uid.clone())
        .collect();
    if remove.is_empty() {
        return Ok(DeleteResult {
            deleted,
            not_found,
            remaining: memories.len(),
        });
    }

    let remaining = retain(store, &memories, &index, |p| !remove.contains(&p))?;
    tracing::info!(deleted = deleted.len(), remaining, "memories deleted");
    Ok(DeleteResult {
        deleted,
        not_found,
        remaining,
    })
}

/// Replace one record's content, rescore its importance, and re-embed it.
/// Returns the updated record, or `None` if the id matched nothing.
pub fn edit_memory(
    store: &MemoryStore,
    provider: &dyn EmbeddingProvider,
    id: &str,
    new_content: &str,
) -> Result<Option<(String, MemoryRecord)>> {
    if new_content.trim().is_empty() {
        return Err(MemoryError::MalformedInput("memory content cannot be empty".into()));
    }
    if !store.is_ready() {
        return Ok(None);
    }
    let (memories, index) = consistent_corpus(store)?;
    let Some(position) = resolve(&memories, id) else {
        return Ok(None);
    };
    check_dimension(&index, provider)?;

    let vector = provider.embed(new_content)?;
    let mut vectors: Vec<Vec<f32>> = (0..index.len()).filter_map(|i| index.vector(i)).collect();
    vectors[position] = vector;

    let mut records = memories.as_ref().clone();
    let record = &mut records[position];
    record.content = new_content.to_string();
    record.importance = importance::score(new_content);
    let updated = record.clone();

    let rebuilt = FlatIndex::build(index.dim(), &vectors)?;
    store.write_all(records, &rebuilt)?;
    tracing::info!(id = %memory_id(position), uid = %updated.uid, "memory edited");
    Ok(Some((memory_id(position), updated)))
}

/// Find and (unless `dry_run`) remove records matching `criteria`.
pub fn cleanup(store: &MemoryStore, criteria: &CleanupCriteria) -> Result<CleanupResult> {
    if !store.is_ready() {
        return Ok(CleanupResult {
            candidates: Vec::new(),
            deleted: 0,
            dry_run: criteria.dry_run,
            remaining: 0,
        });
    }
    let memories = store.load_memories()?;

    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    let mut remove = HashSet::new();
    for (position, record) in memories.iter().enumerate() {
        let first_occurrence = seen.insert(record.content.as_str());
        let reason = if criteria.min_importance.is_some_and(|min| record.importance < min) {
            Some(format!("importance {:.2} below threshold", record.importance))
        } else if criteria
            .min_length
            .is_some_and(|min| record.content.chars().count() < min)
        {
            Some(format!("shorter than {} chars", criteria.min_length.unwrap_or_default()))
        } else if criteria.sources.iter().any(|s| s == &record.source) {
            Some(format!("source {}", record.source))
        } else if criteria.remove_duplicates && !first_occurrence {
            Some("duplicate content".to_string())
        } else {
            None
        };
        if let Some(reason) = reason {
            remove.insert(position);
            candidates.push(CleanupCandidate {
                id: memory_id(position),
                uid: record.uid.clone(),
                reason,
                preview: truncate_preview(&record.content, PREVIEW_CHARS),
            });
        }
    }

    if criteria.dry_run || remove.is_empty() {
        return Ok(CleanupResult {
            candidates,
            deleted: 0,
            dry_run: criteria.dry_run,
            remaining: memories.len(),
        });
    }

    let (memories, index) = consistent_corpus(store)?;
    let remaining = retain(store, &memories, &index, |p| !remove.contains(&p))?;
    tracing::info!(deleted = remove.len(), remaining, "cleanup applied");
    Ok(CleanupResult {
        deleted: remove.len(),
        candidates,
        dry_run: false,
        remaining,
    })
}

/// Re-embed every record with `provider` and rebuild the index. Needed after
/// switching embedding backends. Any embedding failure aborts the rebuild.
pub fn rebuild_index(store: &MemoryStore, provider: &dyn EmbeddingProvider) -> Result<RebuildResult> {
    let memories = store.load_memories()?;
    let texts: Vec<&str> = memories.iter().map(|r| r.content.as_str()).collect();
    tracing::info!(memories = texts.len(), model = %provider.model_id(), "rebuilding index");

    let vectors = embed_all(provider, &texts)?;
    let index = FlatIndex::build(provider.dimensions(), &vectors)?;
    store.write_all(memories.as_ref().clone(), &index)?;

    Ok(RebuildResult {
        memories: index.len(),
        dimension: index.dim(),
        model: provider.model_id().to_string(),
    })
}

/// Corpus statistics. A cold store reports zeros with `system_ready: false`.
pub fn stats(store: &MemoryStore) -> Result<StatsResponse> {
    let status = store.status()?;
    let memories = store.load_memories()?;

    let mut by_source = BTreeMap::new();
    for record in memories.iter() {
        *by_source.entry(record.source.clone()).or_insert(0) += 1;
    }
    let avg_importance = if memories.is_empty() {
        0.0
    } else {
        memories.iter().map(|r| r.importance).sum::<f64>() / memories.len() as f64
    };
    let oldest = memories.iter().map(|r| r.timestamp).reduce(f64::min);
    let newest = memories.iter().map(|r| r.timestamp).reduce(f64::max);

    let data_bytes = [store.memories_path(), store.metadata_path(), store.index_path()]
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .sum();

    Ok(StatsResponse {
        system_ready: status.system_ready,
        total_memories: memories.len(),
        by_source,
        avg_importance,
        oldest: oldest.and_then(format_timestamp),
        newest: newest.and_then(format_timestamp),
        index_dimension: status.dimension,
        consistent: status.consistent,
        data_bytes,
    })
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Records and index, refusing to proceed if their sizes disagree.
fn consistent_corpus(store: &MemoryStore) -> Result<(Arc<Vec<MemoryRecord>>, Arc<FlatIndex>)> {
    let memories = store.load_memories()?;
    let index = store.load_index()?.ok_or_else(|| {
        MemoryError::Configuration("vector index missing; run `mnemo rebuild`".into())
    })?;
    if index.len() != memories.len() {
        return Err(MemoryError::Configuration(format!(
            "store is inconsistent ({} memories, {} vectors); run `mnemo rebuild`",
            memories.len(),
            index.len()
        )));
    }
    Ok((memories, index))
}

fn check_dimension(index: &FlatIndex, provider: &dyn EmbeddingProvider) -> Result<()> {
    if index.dim() != provider.dimensions() {
        return Err(MemoryError::Configuration(format!(
            "index has dimension {} but backend '{}' produces {}; run `mnemo rebuild`",
            index.dim(),
            provider.model_id(),
            provider.dimensions()
        )));
    }
    Ok(())
}

/// Position of `id` (`mem-{i}` or `uid`) in `memories`.
fn resolve(memories: &[MemoryRecord], id: &str) -> Option<usize> {
    match parse_memory_id(id) {
        Some(position) => (position < memories.len()).then_some(position),
        None => memories.iter().position(|r| !r.uid.is_empty() && r.uid == id),
    }
}

/// Write back only the records (and vectors) whose position passes `keep`.
/// Returns the new store size.
fn retain(
    store: &MemoryStore,
    memories: &[MemoryRecord],
    index: &FlatIndex,
    keep: impl Fn(usize) -> bool,
) -> Result<usize> {
    let positions: Vec<usize> = (0..memories.len()).filter(|&p| keep(p)).collect();
    let records: Vec<MemoryRecord> = positions.iter().map(|&p| memories[p].clone()).collect();
    let kept = index.select(&positions)?;
    store.write_all(records, &kept)?;
    Ok(positions.len())
}

fn format_timestamp(secs: f64) -> Option<String> {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    chrono::DateTime::from_timestamp(whole as i64, nanos).map(|dt| dt.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded(contents: &[&str]) -> (TempDir, MemoryStore) {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::new(tmp.path());
        let records: Vec<MemoryRecord> = contents
            .iter()
            .map(|c| MemoryRecord::new(*c, "agent_response").with_importance(importance::score(c)))
            .collect();
        let vectors: Vec<Vec<f32>> = (0..contents.len()).map(|i| vec![i as f32, 0.0]).collect();
        store
            .write_all(records, &FlatIndex::build(2, &vectors).unwrap())
            .unwrap();
        (tmp, store)
    }

    #[test]
    fn delete_renumbers_and_keeps_vectors_aligned() {
        let (_tmp, store) = seeded(&["zero", "one", "two"]);
        let result = delete_memories(&store, &["mem-1".into(), "mem-9".into()]).unwrap();
        assert_eq!(result.deleted.len(), 1);
        assert_eq!(result.not_found, vec!["mem-9"]);
        assert_eq!(result.remaining, 2);

        let (_, record) = store.get("mem-1").unwrap().unwrap();
        assert_eq!(record.content, "two");
        let index = store.load_index().unwrap().unwrap();
        assert_eq!(index.vector(1).unwrap(), vec![2.0, 0.0]);
        assert!(store.status().unwrap().consistent);
    }

    #[test]
    fn delete_by_uid() {
        let (_tmp, store) = seeded(&["zero", "one"]);
        let (_, record) = store.get("mem-0").unwrap().unwrap();
        let result = delete_memories(&store, &[record.uid.clone()]).unwrap();
        assert_eq!(result.deleted, vec![record.uid]);
        assert_eq!(store.load_memories().unwrap()[0].content, "one");
    }

    #[test]
    fn cleanup_dry_run_changes_nothing() {
        let (_tmp, store) = seeded(&["dup", "dup", "a critical database note that matters"]);
        let criteria = CleanupCriteria {
            remove_duplicates: true,
            ..Default::default()
        };
        let result = cleanup(&store, &criteria).unwrap();
        assert!(result.dry_run);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].id, "mem-1");
        assert_eq!(store.load_memories().unwrap().len(), 3);
    }

    #[test]
    fn cleanup_applies_importance_threshold() {
        let (_tmp, store) = seeded(&["plain", "a critical database note that matters"]);
        let criteria = CleanupCriteria {
            min_importance: Some(0.4),
            dry_run: false,
            ..Default::default()
        };
        let result = cleanup(&store, &criteria).unwrap();
        assert_eq!(result.deleted, 1);
        assert_eq!(result.remaining, 1);
        assert_eq!(
            store.load_memories().unwrap()[0].content,
            "a critical database note that matters"
        );
    }

    #[test]
    fn stats_on_cold_store() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::new(tmp.path());
        let stats = stats(&store).unwrap();
        assert!(!stats.system_ready);
        assert_eq!(stats.total_memories, 0);
        assert!(stats.oldest.is_none());
    }

    #[test]
    fn stats_counts_sources() {
        let (_tmp, store) = seeded(&["a", "b"]);
        let stats = stats(&store).unwrap();
        assert_eq!(stats.by_source["agent_response"], 2);
        assert_eq!(stats.index_dimension, Some(2));
        assert!(stats.data_bytes > 0);
        assert!(stats.oldest.is_some());
    }

    #[test]
    fn format_timestamp_is_rfc3339() {
        assert_eq!(format_timestamp(0.0).unwrap(), "1970-01-01T00:00:00+00:00");
    }
}
