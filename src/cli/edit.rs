use anyhow::Result;

use mnemo::config::MnemoConfig;

/// Replace a memory's content and re-embed it.
pub async fn edit(config: &MnemoConfig, id: &str, content: &str) -> Result<()> {
    let (id_owned, content_owned) = (id.to_string(), content.to_string());
    let updated = super::with_service(config, move |service| {
        service.edit_memory(&id_owned, &content_owned).map_err(Into::into)
    })
    .await?;

    match updated {
        Some((position_id, record)) => {
            println!("Updated {position_id} (importance {:.2}).", record.importance);
            Ok(())
        }
        None => anyhow::bail!("memory not found: {id}"),
    }
}
