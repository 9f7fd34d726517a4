//! Semantic memory retrieval over embedded text memories.
//!
//! mnemo ingests documents (plain text, JSON, JSONL, CSV, chat exports) into
//! scored, tagged memory records, embeds them, and answers queries with a
//! two-stage pipeline:
//!
//! 1. **Recall**: the query is embedded and the nearest memories are pulled
//!    from a flat squared-L2 vector index.
//! 2. **Rerank**: candidates from the trusted source are scored jointly with
//!    the query by a cross-encoder and the best few returned.
//!
//! # Storage
//!
//! Three files under the data directory (default `extract/`) are the single
//! source of truth and are always rewritten together:
//!
//! | File | Contents |
//! |------|----------|
//! | `agent_memories.json` | ordered record sequence |
//! | `memory_metadata.json` | `"mem-{i}"` → record lookup table |
//! | `faiss_index.bin` | one vector per record, in sequence order |
//!
//! Every write backs up the previous files first.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`error`]: The library error type
//! - [`embedding`]: Text-to-vector backends: local ONNX model or remote HTTP API
//! - [`rerank`]: Cross-encoder relevance scoring
//! - [`ingest`]: Source parsing, chunking, importance scoring, and embedding
//! - [`memory`]: Store, index, search, management, and the [`memory::MemoryService`] façade

pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod memory;
pub mod rerank;
