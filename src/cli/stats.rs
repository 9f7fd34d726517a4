use anyhow::Result;

use mnemo::config::MnemoConfig;
use mnemo::memory::manage;

/// Display memory statistics in the terminal.
pub fn stats(config: &MnemoConfig, json: bool) -> Result<()> {
    let store = super::open_store(config);
    let response = manage::stats(&store)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if !response.system_ready {
        println!("No memory store at {}.", store.data_dir().display());
        println!("Run `mnemo ingest <file>` to create one.");
        return Ok(());
    }

    println!("Memory Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total memories:      {}", response.total_memories);
    println!("  Avg importance:      {:.2}", response.avg_importance);
    if let Some(dim) = response.index_dimension {
        println!("  Index dimension:     {dim}");
    }
    println!("  Consistent:          {}", if response.consistent { "yes" } else { "NO" });
    println!();

    println!("By Source:");
    for (source, count) in &response.by_source {
        println!("  {:<20} {}", source, count);
    }
    println!();

    println!("Data size:             {}", super::format_bytes(response.data_bytes));
    if let Some(ref oldest) = response.oldest {
        println!("Oldest memory:         {oldest}");
    }
    if let Some(ref newest) = response.newest {
        println!("Newest memory:         {newest}");
    }

    Ok(())
}
