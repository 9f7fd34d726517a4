//! CLI `rebuild` command: regenerate every embedding with the current backend.

use anyhow::Result;

use mnemo::config::MnemoConfig;

/// Re-embed all memories and rebuild the index. Needed after switching backends.
pub async fn rebuild(config: &MnemoConfig) -> Result<()> {
    let pb = super::spinner("Re-embedding memories...");
    let result = super::with_service(config, |service| {
        service.rebuild_index().map_err(Into::into)
    })
    .await;
    pb.finish_and_clear();
    let result = result?;

    println!(
        "Rebuilt index: {} memories, {} dimensions ({}).",
        result.memories, result.dimension, result.model
    );
    Ok(())
}
