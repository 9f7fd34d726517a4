use anyhow::Result;

use mnemo::config::MnemoConfig;

/// Copy the store files to timestamped backups.
pub fn backup(config: &MnemoConfig) -> Result<()> {
    let store = super::open_store(config);
    let written = store.backup()?;
    if written.is_empty() {
        println!("Nothing to back up in {}.", store.data_dir().display());
    } else {
        for path in &written {
            println!("Backed up to {}", path.display());
        }
    }
    Ok(())
}
