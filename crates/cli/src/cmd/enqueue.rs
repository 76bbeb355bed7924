//! Put change notifications on the daemon's queue

use crate::ipc::IpcClient;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use quiesce_core::Settings;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Enqueue `body`, or one message per non-empty stdin line
pub async fn run(settings: &Settings, body: Option<String>, stdin: bool) -> Result<()> {
    let mut client = IpcClient::connect(&settings.socket_path())
        .await
        .context("Daemon is not running (start it with `quiesce run`)")?;

    if !stdin {
        let body = body.context("Provide a message body or --stdin")?;
        let id = client.enqueue(body).await?;
        println!("{} Enqueued {}", "✓".green(), id.cyan());
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sent = 0usize;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        client.enqueue(line).await?;
        sent += 1;
    }
    println!("{} Enqueued {} messages", "✓".green(), sent);
    Ok(())
}
