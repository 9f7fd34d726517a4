//! [`MemoryService`]: one handle owning the store, the embedding backend, and
//! the optional reranker, with every operation exposed as a method.
//!
//! All methods block (model inference, file I/O, and for the remote backend,
//! HTTP). Async callers should construct and use the service inside
//! `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};

use crate::config::MnemoConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::Result;
use crate::ingest::{self, IngestOptions, IngestSummary};
use crate::memory::manage::{
    self, CleanupCriteria, CleanupResult, DeleteResult, RebuildResult, StatsResponse,
};
use crate::memory::search::{self, SearchHit, SearchParams};
use crate::memory::store::{MemoryStore, StoreStatus};
use crate::memory::types::MemoryRecord;
use crate::rerank::{self, Reranker};

pub struct MemoryService {
    store: MemoryStore,
    provider: Box<dyn EmbeddingProvider>,
    reranker: Option<Box<dyn Reranker>>,
    search_params: SearchParams,
    ingest_options: IngestOptions,
}

impl MemoryService {
    /// Build the store, embedding backend, and reranker from config.
    pub fn open(config: &MnemoConfig) -> Result<Self> {
        let provider = embedding::create_provider(&config.embedding)?;
        let reranker = rerank::create_reranker(&config.rerank)?;
        tracing::info!(
            data_dir = %config.resolved_data_dir().display(),
            model = %provider.model_id(),
            dimensions = provider.dimensions(),
            reranker = reranker.as_ref().map(|r| r.model_id()).unwrap_or("none"),
            "memory service ready"
        );
        Ok(Self::new(
            MemoryStore::new(config.resolved_data_dir()),
            provider,
            reranker,
            config,
        ))
    }

    /// Assemble from parts. Used by tests and by callers with custom backends.
    pub fn new(
        store: MemoryStore,
        provider: Box<dyn EmbeddingProvider>,
        reranker: Option<Box<dyn Reranker>>,
        config: &MnemoConfig,
    ) -> Self {
        Self {
            store,
            provider,
            reranker,
            search_params: SearchParams::from(&config.retrieval),
            ingest_options: IngestOptions::from_config(&config.ingestion),
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    pub fn search_params(&self) -> &SearchParams {
        &self.search_params
    }

    /// Ingest options seeded from config; callers override per run.
    pub fn ingest_options(&self) -> IngestOptions {
        self.ingest_options.clone()
    }

    // ── Retrieval ────────────────────────────────────────────────────────────

    /// Fail-closed search with the configured parameters.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        self.search_with(query, &self.search_params)
    }

    /// Fail-closed search with explicit parameters.
    pub fn search_with(&self, query: &str, params: &SearchParams) -> Vec<SearchHit> {
        search::perform_semantic_search(
            &self.store,
            self.provider.as_ref(),
            self.reranker.as_deref(),
            query,
            params,
        )
    }

    /// Search with errors surfaced.
    pub fn try_search(&self, query: &str, params: &SearchParams) -> Result<Vec<SearchHit>> {
        search::try_semantic_search(
            &self.store,
            self.provider.as_ref(),
            self.reranker.as_deref(),
            query,
            params,
        )
    }

    // ── Ingestion ────────────────────────────────────────────────────────────

    pub fn ingest_file(&self, path: &Path, opts: &IngestOptions) -> Result<IngestSummary> {
        ingest::ingest_file(&self.store, self.provider.as_ref(), path, opts)
    }

    pub fn ingest_bytes(&self, name: &str, bytes: &[u8], opts: &IngestOptions) -> Result<IngestSummary> {
        ingest::ingest_bytes(&self.store, self.provider.as_ref(), name, bytes, opts)
    }

    // ── Management ───────────────────────────────────────────────────────────

    pub fn status(&self) -> Result<StoreStatus> {
        self.store.status()
    }

    pub fn stats(&self) -> Result<StatsResponse> {
        manage::stats(&self.store)
    }

    pub fn get_memory(&self, id: &str) -> Result<Option<(String, MemoryRecord)>> {
        manage::get_memory(&self.store, id)
    }

    pub fn delete_memories(&self, ids: &[String]) -> Result<DeleteResult> {
        manage::delete_memories(&self.store, ids)
    }

    pub fn edit_memory(&self, id: &str, new_content: &str) -> Result<Option<(String, MemoryRecord)>> {
        manage::edit_memory(&self.store, self.provider.as_ref(), id, new_content)
    }

    pub fn cleanup(&self, criteria: &CleanupCriteria) -> Result<CleanupResult> {
        manage::cleanup(&self.store, criteria)
    }

    pub fn rebuild_index(&self) -> Result<RebuildResult> {
        manage::rebuild_index(&self.store, self.provider.as_ref())
    }

    pub fn backup(&self) -> Result<Vec<PathBuf>> {
        self.store.backup()
    }

    /// Drop cached store state so the next read reflects disk.
    pub fn invalidate(&self) {
        self.store.invalidate();
    }
}
