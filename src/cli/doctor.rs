//! CLI `doctor` command: check configuration, model files, and store health.

use anyhow::Result;

use mnemo::config::MnemoConfig;
use mnemo::embedding::LOCAL_EMBEDDING_DIM;

/// Print a health report. Never loads models, so it works on a broken setup.
pub fn doctor(config: &MnemoConfig) -> Result<()> {
    let store = super::open_store(config);
    let status = store.status();

    println!("Mnemo Health Report");
    println!("===================");
    println!();
    println!("Data directory:    {}", store.data_dir().display());

    let expected_dim = match config.embedding.provider.as_str() {
        "local" => Some(LOCAL_EMBEDDING_DIM),
        "remote" => Some(config.embedding.dimensions),
        _ => None,
    };

    println!();
    println!("Embedding backend:");
    println!("  Provider:        {}", config.embedding.provider);
    match config.embedding.provider.as_str() {
        "local" => {
            let dir = mnemo::config::expand_tilde(&config.embedding.cache_dir);
            println!("  Model:           {}", config.embedding.model);
            report_file("  model.onnx:     ", &dir.join("model.onnx"));
            report_file("  tokenizer.json: ", &dir.join("tokenizer.json"));
        }
        "remote" => {
            println!("  Model:           {}", config.embedding.remote_model);
            let has_key = config.embedding.api_key.is_some()
                || std::env::var("MNEMO_EMBEDDING_API_KEY").is_ok()
                || std::env::var("GEMINI_API_KEY").is_ok();
            println!(
                "  API key:         {}",
                if has_key { "configured" } else { "MISSING" }
            );
        }
        other => println!("  WARNING: unknown provider '{other}'. Supported: local, remote"),
    }

    println!();
    println!("Reranker:");
    if config.rerank.enabled {
        let dir = mnemo::config::expand_tilde(&config.rerank.cache_dir);
        println!("  Model:           {}", config.rerank.model);
        report_file("  model.onnx:     ", &dir.join("model.onnx"));
        report_file("  tokenizer.json: ", &dir.join("tokenizer.json"));
    } else {
        println!("  Disabled (results ordered by vector distance)");
    }

    println!();
    match status {
        Ok(status) if !status.system_ready => {
            println!("Store:             not initialized");
            println!("Run `mnemo ingest <file>` to create it.");
        }
        Ok(status) => {
            println!("Store:");
            println!("  Memories:        {}", status.total_memories);
            println!("  Metadata rows:   {}", status.metadata_entries);
            println!("  Index vectors:   {}", status.index_vectors);
            if let Some(dim) = status.dimension {
                println!("  Index dimension: {dim}");
                if expected_dim.is_some_and(|d| d != dim) {
                    println!(
                        "  WARNING: backend produces {} dimensions. Run `mnemo rebuild`.",
                        expected_dim.unwrap_or_default()
                    );
                }
            }
            if status.consistent {
                println!("Consistency check: PASSED");
            } else {
                println!("Consistency check: FAILED (sizes disagree)");
                println!();
                println!("Recovery steps:");
                println!("  1. Restore the latest *_backup_* files in the data directory, or");
                println!("  2. Run `mnemo rebuild` to regenerate the index from the memories file.");
            }
        }
        Err(e) => {
            println!("Store:             UNREADABLE ({e})");
            println!("Restore the latest *_backup_* files in the data directory.");
        }
    }

    Ok(())
}

fn report_file(label: &str, path: &std::path::Path) {
    if path.exists() {
        println!("{label}OK ({})", path.display());
    } else {
        println!("{label}MISSING. Run `mnemo model download`.");
    }
}
