//! Print the daemon's counters in Prometheus text format

use crate::ipc::IpcClient;
use anyhow::{Context, Result};
use quiesce_core::Settings;

pub async fn run(settings: &Settings) -> Result<()> {
    let mut client = IpcClient::connect(&settings.socket_path())
        .await
        .context("Daemon is not running")?;
    print!("{}", client.metrics().await?);
    Ok(())
}
