//! CLI `cleanup` command: find and remove low-value memories.

use anyhow::Result;

use mnemo::config::MnemoConfig;
use mnemo::memory::manage::{self, CleanupCriteria};

/// Report cleanup candidates; delete them only when `criteria.dry_run` is off.
pub fn cleanup(config: &MnemoConfig, criteria: CleanupCriteria) -> Result<()> {
    let no_criteria = criteria.min_importance.is_none()
        && criteria.min_length.is_none()
        && criteria.sources.is_empty()
        && !criteria.remove_duplicates;
    if no_criteria {
        println!("No cleanup criteria given. Use --min-importance, --min-length, --source or --duplicates.");
        return Ok(());
    }

    let store = super::open_store(config);
    let result = manage::cleanup(&store, &criteria)?;

    if result.candidates.is_empty() {
        println!("No memories match the cleanup criteria.");
        return Ok(());
    }

    println!("{} candidate(s):", result.candidates.len());
    for c in &result.candidates {
        println!("  {} ({}): {}", c.id, c.reason, c.preview);
    }
    println!();

    if result.dry_run {
        println!("Dry run. Re-run with --apply to delete.");
    } else {
        println!("Deleted {}; {} remaining.", result.deleted, result.remaining);
    }
    Ok(())
}
