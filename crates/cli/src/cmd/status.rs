//! Show daemon status

use crate::ipc::IpcClient;
use crate::util;
use anyhow::Result;
use owo_colors::OwoColorize;
use quiesce_core::Settings;

pub async fn run(settings: &Settings) -> Result<()> {
    println!("{}", "Quiesce Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("State dir:     {}", settings.state_dir.display().to_string().cyan());

    print!("Daemon:        ");
    let status = match IpcClient::connect(&settings.socket_path()).await {
        Ok(mut client) => client.status().await.ok(),
        Err(_) => None,
    };

    let Some(status) = status else {
        println!("{}", "Not running".red());
        if let Some(owner) = crate::locks::ScannerLock::owner(&settings.locks_dir()) {
            println!("  Scanner lock held by pid {}", owner.pid);
        }
        println!();
        println!("Start with: quiesce run");
        return Ok(());
    };

    println!("{}", "Running ✓".green());
    println!("  PID:         {}", status.pid);
    println!("  Uptime:      {}", util::format_duration(status.uptime_secs));
    println!(
        "  Roles:       {}{}",
        if status.ingesting { "ingest " } else { "" },
        if status.scanning { "scan" } else { "" }
    );
    println!();

    println!("{}", "Pipeline".bold());
    println!("  Disposition:     {:?}", status.disposition);
    println!("  Write strategy:  {:?}", status.write_strategy);
    println!(
        "  Debounce window: {}",
        util::format_duration(status.debounce_window_secs)
    );
    println!(
        "  Continuous:      {}",
        util::format_duration(status.continuous_interval_secs)
    );
    println!();

    println!("{}", "Backlog".bold());
    println!("  Tracked entities:  {}", status.tracked_entities.to_string().yellow());
    println!("  Pending messages:  {}", status.pending_messages.to_string().yellow());

    Ok(())
}
