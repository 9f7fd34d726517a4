//! On-disk memory store: the ordered record sequence, the id-keyed metadata
//! table, and the vector index, plus the in-process cache over all three.
//!
//! The three files are the single source of truth. [`MemoryStore::write_all`]
//! is the only write path: it validates the size invariant, backs up the
//! current files, replaces each file via temp-file + rename, and invalidates
//! the cache. Writers are not coordinated with each other; at most one
//! process may write a data directory at a time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use super::index::FlatIndex;
use super::types::{memory_id, parse_memory_id, MemoryRecord};
use crate::error::{MemoryError, Result};

pub const MEMORIES_FILE: &str = "agent_memories.json";
pub const METADATA_FILE: &str = "memory_metadata.json";
pub const INDEX_FILE: &str = "faiss_index.bin";

/// Lazily populated copies of the three persisted structures.
///
/// Each field is filled on first read and dropped by [`StoreCache::clear`].
#[derive(Default)]
struct StoreCache {
    memories: Option<Arc<Vec<MemoryRecord>>>,
    metadata: Option<Arc<HashMap<String, MemoryRecord>>>,
    index: Option<Arc<FlatIndex>>,
}

impl StoreCache {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Readiness and consistency report. `system_ready == false` is the cold
/// state: not an error, callers should degrade to empty results.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoreStatus {
    pub system_ready: bool,
    pub total_memories: usize,
    pub metadata_entries: usize,
    pub index_vectors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
    /// `true` when all three sizes agree.
    pub consistent: bool,
}

/// Serializes records as a `"mem-{i}" -> record` object in sequence order.
struct OrderedTable<'a>(&'a [MemoryRecord]);

impl Serialize for OrderedTable<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().enumerate().map(|(i, r)| (memory_id(i), r)))
    }
}

pub struct MemoryStore {
    data_dir: PathBuf,
    cache: Mutex<StoreCache>,
}

impl MemoryStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache: Mutex::new(StoreCache::default()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn memories_path(&self) -> PathBuf {
        self.data_dir.join(MEMORIES_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join(METADATA_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(INDEX_FILE)
    }

    fn paths(&self) -> [PathBuf; 3] {
        [self.memories_path(), self.metadata_path(), self.index_path()]
    }

    /// A poisoned lock only means a reader panicked mid-fill; the cache is
    /// still either populated or empty, so recover it.
    fn cache(&self) -> MutexGuard<'_, StoreCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `true` iff the memories, metadata, and index files all exist.
    pub fn is_ready(&self) -> bool {
        self.paths().iter().all(|p| p.exists())
    }

    /// Drop every cached structure so the next read reflects disk state.
    pub fn invalidate(&self) {
        self.cache().clear();
        tracing::debug!(dir = %self.data_dir.display(), "memory cache invalidated");
    }

    /// The ordered record sequence. Empty if the file does not exist yet.
    pub fn load_memories(&self) -> Result<Arc<Vec<MemoryRecord>>> {
        if let Some(cached) = &self.cache().memories {
            return Ok(Arc::clone(cached));
        }
        let path = self.memories_path();
        let memories: Vec<MemoryRecord> = read_json_or_default(&path)?;
        tracing::debug!(count = memories.len(), path = %path.display(), "memories loaded");
        let memories = Arc::new(memories);
        self.cache().memories = Some(Arc::clone(&memories));
        Ok(memories)
    }

    /// The `mem-{i}` lookup table. Empty if the file does not exist yet.
    pub fn load_metadata(&self) -> Result<Arc<HashMap<String, MemoryRecord>>> {
        if let Some(cached) = &self.cache().metadata {
            return Ok(Arc::clone(cached));
        }
        let path = self.metadata_path();
        let metadata: HashMap<String, MemoryRecord> = read_json_or_default(&path)?;
        tracing::debug!(count = metadata.len(), path = %path.display(), "metadata loaded");
        let metadata = Arc::new(metadata);
        self.cache().metadata = Some(Arc::clone(&metadata));
        Ok(metadata)
    }

    /// The vector index, or `None` if the file does not exist yet.
    pub fn load_index(&self) -> Result<Option<Arc<FlatIndex>>> {
        if let Some(cached) = &self.cache().index {
            return Ok(Some(Arc::clone(cached)));
        }
        let path = self.index_path();
        if !path.exists() {
            return Ok(None);
        }
        let index = Arc::new(FlatIndex::load(&path)?);
        tracing::debug!(vectors = index.len(), dim = index.dim(), "index loaded");
        self.cache().index = Some(Arc::clone(&index));
        Ok(Some(index))
    }

    /// Look up a record by positional id (`mem-{i}`) or stable `uid`.
    /// Returns the record's current positional id alongside it.
    pub fn get(&self, id: &str) -> Result<Option<(String, MemoryRecord)>> {
        if parse_memory_id(id).is_some() {
            let metadata = self.load_metadata()?;
            return Ok(metadata.get(id).map(|r| (id.to_string(), r.clone())));
        }
        let memories = self.load_memories()?;
        Ok(memories
            .iter()
            .position(|r| !r.uid.is_empty() && r.uid == id)
            .map(|i| (memory_id(i), memories[i].clone())))
    }

    /// Report readiness and whether the three sizes agree.
    pub fn status(&self) -> Result<StoreStatus> {
        if !self.is_ready() {
            return Ok(StoreStatus {
                system_ready: false,
                total_memories: 0,
                metadata_entries: 0,
                index_vectors: 0,
                dimension: None,
                consistent: true,
            });
        }
        let memories = self.load_memories()?;
        let metadata = self.load_metadata()?;
        let index = self.load_index()?;
        let (index_vectors, dimension) = index
            .as_deref()
            .map(|i| (i.len(), Some(i.dim())))
            .unwrap_or((0, None));
        Ok(StoreStatus {
            system_ready: true,
            total_memories: memories.len(),
            metadata_entries: metadata.len(),
            index_vectors,
            dimension,
            consistent: memories.len() == metadata.len() && metadata.len() == index_vectors,
        })
    }

    /// Copy every existing store file to a `*_backup_{YYYYMMDD_HHMMSS}.*` sibling.
    ///
    /// If a backup with that stamp already exists (two writes in the same
    /// second), the stamp gets a `_1`, `_2`, ... suffix. Earlier backups are
    /// never overwritten.
    pub fn backup(&self) -> Result<Vec<PathBuf>> {
        let sources: Vec<PathBuf> = self.paths().into_iter().filter(|p| p.exists()).collect();
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let base = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut stamp = base.clone();
        let mut attempt = 0u32;
        while sources.iter().any(|p| backup_path(p, &stamp).exists()) {
            attempt += 1;
            stamp = format!("{base}_{attempt}");
        }

        let mut written = Vec::with_capacity(sources.len());
        for path in &sources {
            let target = backup_path(path, &stamp);
            std::fs::copy(path, &target).map_err(|e| MemoryError::io(&target, e))?;
            written.push(target);
        }
        tracing::info!(files = written.len(), stamp = %stamp, "store backed up");
        Ok(written)
    }

    /// Replace all three files with `records` and `index`.
    ///
    /// Order: invariant check → backup → temp-write + rename of each file →
    /// cache invalidation. A failed backup aborts before anything is written.
    /// Records without a `uid` are assigned one.
    pub fn write_all(&self, mut records: Vec<MemoryRecord>, index: &FlatIndex) -> Result<Vec<PathBuf>> {
        if records.len() != index.len() {
            return Err(MemoryError::Configuration(format!(
                "refusing to write {} memories with an index of {} vectors",
                records.len(),
                index.len()
            )));
        }
        for record in &mut records {
            record.ensure_uid();
        }

        std::fs::create_dir_all(&self.data_dir).map_err(|e| MemoryError::io(&self.data_dir, e))?;
        let backups = self.backup()?;

        let memories_json = serde_json::to_vec_pretty(&records)?;
        let metadata_json = serde_json::to_vec_pretty(&OrderedTable(&records))?;

        let index_tmp = tmp_path(&self.index_path());
        index.persist(&index_tmp)?;
        write_atomic(&self.memories_path(), &memories_json)?;
        write_atomic(&self.metadata_path(), &metadata_json)?;
        rename(&index_tmp, &self.index_path())?;

        self.invalidate();
        tracing::info!(
            memories = records.len(),
            dim = index.dim(),
            dir = %self.data_dir.display(),
            "memory store written"
        );
        Ok(backups)
    }
}

fn read_json_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = std::fs::read(path).map_err(|e| MemoryError::io(path, e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| MemoryError::MalformedInput(format!("{}: {e}", path.display())))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to).map_err(|e| MemoryError::io(to, e))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    std::fs::write(&tmp, bytes).map_err(|e| MemoryError::io(&tmp, e))?;
    rename(&tmp, path)
}

/// `dir/agent_memories.json` → `dir/agent_memories_backup_{stamp}.json`
pub fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_backup_{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}_backup_{stamp}"),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn records(n: usize) -> Vec<MemoryRecord> {
        (0..n)
            .map(|i| MemoryRecord::new(format!("memory number {i}"), "agent_response"))
            .collect()
    }

    fn index(n: usize) -> FlatIndex {
        let vectors: Vec<Vec<f32>> = (0..n).map(|i| vec![i as f32, 1.0]).collect();
        FlatIndex::build(2, &vectors).unwrap()
    }

    #[test]
    fn cold_store_is_not_ready() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::new(tmp.path());
        assert!(!store.is_ready());
        let status = store.status().unwrap();
        assert!(!status.system_ready);
        assert!(store.load_memories().unwrap().is_empty());
        assert!(store.load_index().unwrap().is_none());
    }

    #[test]
    fn write_all_keeps_three_structures_in_lockstep() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::new(tmp.path().join("extract"));
        store.write_all(records(3), &index(3)).unwrap();

        assert!(store.is_ready());
        let status = store.status().unwrap();
        assert!(status.consistent);
        assert_eq!(status.total_memories, 3);
        assert_eq!(status.metadata_entries, 3);
        assert_eq!(status.index_vectors, 3);
        assert_eq!(status.dimension, Some(2));

        let metadata = store.load_metadata().unwrap();
        assert_eq!(metadata["mem-2"].content, "memory number 2");
    }

    #[test]
    fn write_all_rejects_size_mismatch() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::new(tmp.path());
        let err = store.write_all(records(2), &index(3)).unwrap_err();
        assert!(err.is_configuration());
        assert!(!store.is_ready(), "nothing should be written");
    }

    #[test]
    fn cache_serves_stale_data_until_invalidated() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::new(tmp.path());
        store.write_all(records(2), &index(2)).unwrap();
        assert_eq!(store.load_memories().unwrap().len(), 2);

        // A second writer replaces the files behind this instance's back.
        let other = MemoryStore::new(tmp.path());
        other.write_all(records(4), &index(4)).unwrap();
        assert_eq!(store.load_memories().unwrap().len(), 2);

        store.invalidate();
        assert_eq!(store.load_memories().unwrap().len(), 4);
    }

    #[test]
    fn second_write_creates_backups() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::new(tmp.path());
        assert!(store.write_all(records(1), &index(1)).unwrap().is_empty());

        let backups = store.write_all(records(2), &index(2)).unwrap();
        assert_eq!(backups.len(), 3);
        for b in &backups {
            assert!(b.exists());
            assert!(b.file_name().unwrap().to_string_lossy().contains("_backup_"));
        }
    }

    #[test]
    fn get_by_positional_id_and_uid() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::new(tmp.path());
        store.write_all(records(3), &index(3)).unwrap();

        let (id, record) = store.get("mem-1").unwrap().unwrap();
        assert_eq!(id, "mem-1");
        let (id2, record2) = store.get(&record.uid).unwrap().unwrap();
        assert_eq!(id2, "mem-1");
        assert_eq!(record2.content, record.content);
        assert!(store.get("mem-9").unwrap().is_none());
    }

    #[test]
    fn empty_id_does_not_match_legacy_records() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(MEMORIES_FILE),
            r#"[{"content": "written before uids", "source": "agent_response", "timestamp": 1.0}]"#,
        )
        .unwrap();
        let store = MemoryStore::new(tmp.path());
        assert!(store.load_memories().unwrap()[0].uid.is_empty());
        assert!(store.get("").unwrap().is_none());
    }

    #[test]
    fn backups_in_the_same_second_do_not_overwrite() {
        let tmp = TempDir::new().unwrap();
        let store = MemoryStore::new(tmp.path());
        store.write_all(records(1), &index(1)).unwrap();

        let first = store.backup().unwrap();
        let second = store.backup().unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        for path in first.iter().chain(&second) {
            assert!(path.exists());
        }
        assert!(first.iter().all(|p| !second.contains(p)));
    }

    #[test]
    fn malformed_memories_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(MEMORIES_FILE), "not json").unwrap();
        let store = MemoryStore::new(tmp.path());
        let err = store.load_memories().unwrap_err();
        assert!(matches!(err, MemoryError::MalformedInput(_)));
    }

    #[test]
    fn backup_path_format() {
        let p = backup_path(Path::new("/x/faiss_index.bin"), "20260101_120000");
        assert_eq!(p, PathBuf::from("/x/faiss_index_backup_20260101_120000.bin"));
    }
}
