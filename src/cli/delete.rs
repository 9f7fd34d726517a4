use anyhow::Result;

use mnemo::config::MnemoConfig;
use mnemo::memory::manage;

/// Delete memories by `mem-{i}` or uid. The store is backed up first.
pub fn delete(config: &MnemoConfig, ids: &[String]) -> Result<()> {
    let store = super::open_store(config);
    let result = manage::delete_memories(&store, ids)?;

    for id in &result.not_found {
        println!("Not found: {id}");
    }
    if result.deleted.is_empty() {
        println!("Nothing deleted.");
    } else {
        println!(
            "Deleted {} memor{}; {} remaining. Remaining ids have been renumbered.",
            result.deleted.len(),
            if result.deleted.len() == 1 { "y" } else { "ies" },
            result.remaining
        );
    }
    Ok(())
}
