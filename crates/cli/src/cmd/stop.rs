//! Stop a running daemon

use anyhow::Result;
use owo_colors::OwoColorize;
use quiesce_core::Settings;

pub async fn run(settings: &Settings) -> Result<()> {
    if crate::daemon::stop(&settings.socket_path()).await? {
        println!("{} Daemon stopped", "✓".green());
    } else {
        println!("{}", "Daemon is not running".dimmed());
    }
    Ok(())
}
