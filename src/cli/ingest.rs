//! CLI `ingest` command: chunk, embed, and store a source file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use mnemo::config::MnemoConfig;
use mnemo::ingest::MergeMode;

/// Per-run overrides from the command line.
pub struct IngestArgs {
    pub format: Option<String>,
    pub chunk_size: Option<usize>,
    pub replace: bool,
    pub dedup: bool,
    pub keep_short: bool,
    pub source: Option<String>,
    pub tags: Vec<String>,
}

pub async fn ingest(config: &MnemoConfig, file: &Path, args: IngestArgs) -> Result<()> {
    anyhow::ensure!(file.exists(), "file not found: {}", file.display());
    let file: PathBuf = file.to_path_buf();

    let pb = super::spinner(&format!("Ingesting {}...", file.display()));
    let result = super::with_service(config, move |service| {
        let mut opts = service.ingest_options();
        opts.format_hint = args.format;
        if let Some(size) = args.chunk_size {
            opts.chunk_size = size;
        }
        if args.replace {
            opts.merge = MergeMode::Replace;
        }
        opts.deduplicate |= args.dedup;
        if args.keep_short {
            opts.filter_short = false;
        }
        if let Some(source) = args.source {
            opts.source = source;
        }
        opts.base_tags = args.tags;

        service
            .ingest_file(&file, &opts)
            .with_context(|| format!("failed to ingest {}", file.display()))
    })
    .await;
    pb.finish_and_clear();
    let summary = result?;

    println!("Ingestion complete ({})", summary.format);
    println!("  Chunks created:      {}", summary.chunks_created);
    println!("  Embeddings created:  {}", summary.embeddings_created);
    println!("  Total memories:      {}", summary.total_memories);
    if summary.chunks_skipped > 0 {
        println!("  Skipped (embedding): {}", summary.chunks_skipped);
    }
    if summary.duplicates_removed > 0 {
        println!("  Duplicates removed:  {}", summary.duplicates_removed);
    }
    if summary.lines_skipped > 0 {
        println!("  Malformed lines:     {}", summary.lines_skipped);
    }
    Ok(())
}
