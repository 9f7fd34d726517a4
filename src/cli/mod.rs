pub mod backup;
pub mod cleanup;
pub mod delete;
pub mod doctor;
pub mod edit;
pub mod ingest;
pub mod rebuild;
pub mod search;
pub mod show;
pub mod stats;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use mnemo::config::{EmbeddingConfig, MnemoConfig, RerankConfig};
use mnemo::memory::store::MemoryStore;
use mnemo::memory::MemoryService;

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";
const RERANK_MODEL_URL: &str =
    "https://huggingface.co/cross-encoder/ms-marco-MiniLM-L-6-v2/resolve/main/onnx/model.onnx";
const RERANK_TOKENIZER_URL: &str =
    "https://huggingface.co/cross-encoder/ms-marco-MiniLM-L-6-v2/resolve/main/tokenizer.json";

/// Download the embedding model and the cross-encoder to their cache directories.
pub async fn model_download(embedding: &EmbeddingConfig, rerank: &RerankConfig) -> Result<()> {
    let embed_dir = mnemo::config::expand_tilde(&embedding.cache_dir);
    download_pair(
        "embedding model",
        &embed_dir,
        MODEL_URL,
        TOKENIZER_URL,
    )
    .await?;

    if rerank.enabled {
        let rerank_dir = mnemo::config::expand_tilde(&rerank.cache_dir);
        download_pair(
            "cross-encoder",
            &rerank_dir,
            RERANK_MODEL_URL,
            RERANK_TOKENIZER_URL,
        )
        .await?;
    } else {
        println!("Reranking disabled; skipping cross-encoder download.");
    }

    println!("Model download complete. Ready for use.");
    Ok(())
}

async fn download_pair(label: &str, dir: &Path, model_url: &str, tokenizer_url: &str) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create cache dir: {}", dir.display()))?;

    for (url, name) in [(model_url, "model.onnx"), (tokenizer_url, "tokenizer.json")] {
        let dest = dir.join(name);
        if dest.exists() {
            println!("{label}: {name} already exists at {}", dest.display());
            continue;
        }
        println!("{label}: downloading {name}...");
        download_file(url, &dest).await?;
        println!("{label}: saved to {}", dest.display());
    }
    Ok(())
}

/// Download a file from a URL with progress bar. Uses atomic write (tmp + rename).
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk)
            .await
            .context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}

/// Open the full service on a blocking thread and run `f` there.
///
/// Model loading, inference, and the remote backend's blocking HTTP client all
/// have to stay off the async executor.
pub async fn with_service<T, F>(config: &MnemoConfig, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&MemoryService) -> Result<T> + Send + 'static,
{
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        let service = MemoryService::open(&config).context("failed to open memory service")?;
        f(&service)
    })
    .await
    .context("blocking task failed")?
}

/// Store handle for commands that never embed.
pub fn open_store(config: &MnemoConfig) -> MemoryStore {
    MemoryStore::new(config.resolved_data_dir())
}

/// Spinner shown while a blocking operation runs.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Unix seconds as local date-time for display.
pub fn format_epoch(secs: f64) -> String {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| format!("{secs}"))
}
