//! CLI `search` command: two-stage semantic search from the terminal.

use anyhow::Result;

use mnemo::config::MnemoConfig;
use mnemo::memory::search::{truncate_preview, SearchParams};

/// Run a search and print the hits, or emit them as JSON.
pub async fn search(
    config: &MnemoConfig,
    query: &str,
    initial_k: Option<usize>,
    final_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut params = SearchParams::from(&config.retrieval);
    if let Some(k) = initial_k {
        params.initial_k = k;
    }
    if let Some(k) = final_k {
        params.final_k = k;
    }

    let query_text = query.to_string();
    let hits = super::with_service(config, move |service| {
        service.try_search(&query_text, &params).map_err(Into::into)
    })
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let rerank = hit
            .rerank_score
            .map(|s| format!("{s:.4}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "  {}. {} [{}] (distance: {:.4}, rerank: {})",
            i + 1,
            hit.id,
            hit.source,
            hit.faiss_score,
            rerank,
        );
        println!("     {}", truncate_preview(&hit.content, 120));
        println!();
    }

    Ok(())
}
