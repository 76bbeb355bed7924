//! Drop an entity's record so it is never processed

use crate::ipc::IpcClient;
use anyhow::Result;
use owo_colors::OwoColorize;
use quiesce_core::{EntityId, Settings, StateStore};

/// Goes through the daemon when it runs, since it holds the table open
pub async fn run(settings: &Settings, entity: String) -> Result<()> {
    match IpcClient::connect(&settings.socket_path()).await {
        Ok(mut client) => client.forget(&entity).await?,
        Err(_) => {
            let id = EntityId::new(entity.clone())?;
            crate::daemon::open_table(settings)?.remove(&id).await?;
        }
    }

    println!("{} Forgot {}", "✓".green(), entity.cyan());
    Ok(())
}
