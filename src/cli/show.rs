//! CLI `show` command: display full details for a single memory.

use anyhow::Result;

use mnemo::config::MnemoConfig;
use mnemo::memory::manage;

/// Show a single memory by `mem-{i}` or uid.
pub fn show(config: &MnemoConfig, id: &str, json: bool) -> Result<()> {
    let store = super::open_store(config);
    let Some((position_id, m)) = manage::get_memory(&store, id)? else {
        anyhow::bail!("memory not found: {id}");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&m)?);
        return Ok(());
    }

    println!("Memory: {position_id}");
    println!("{}", "=".repeat(50));
    if !m.uid.is_empty() {
        println!("  UID:            {}", m.uid);
    }
    println!("  Source:         {}", m.source);
    println!("  Created:        {}", super::format_epoch(m.timestamp));
    println!("  Importance:     {:.2}", m.importance);
    if !m.tags.is_empty() {
        println!("  Tags:           {}", m.tags.join(", "));
    }
    if !m.extra.is_empty() {
        println!("  Fields:         {}", serde_json::to_string_pretty(&m.extra)?);
    }
    println!();
    println!("Content:");
    println!("{}", m.content);

    Ok(())
}
