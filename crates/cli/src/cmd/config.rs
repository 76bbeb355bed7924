//! Show the effective configuration

use crate::settings::DEFAULT_CONFIG_FILE;
use anyhow::Result;
use owo_colors::OwoColorize;
use quiesce_core::Settings;
use std::path::Path;

fn location(path: Option<&Path>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => format!("{} (optional)", DEFAULT_CONFIG_FILE),
    }
}

fn path_or_unset(path: &Option<std::path::PathBuf>) -> String {
    match path {
        Some(path) => path.display().to_string(),
        None => "<unset>".red().to_string(),
    }
}

pub async fn run(settings: &Settings, path: Option<&Path>) -> Result<()> {
    println!("{}", "Effective Configuration".bold());
    println!(
        "{}: {} + QUIESCE_* environment\n",
        "Sources".dimmed(),
        location(path).dimmed()
    );

    println!("{}", "[locations]".yellow());
    println!("  {} = {}", "queue".cyan(), path_or_unset(&settings.queue));
    println!("  {} = {}", "table".cyan(), path_or_unset(&settings.table));
    println!("  {} = {}", "state_dir".cyan(), settings.state_dir.display());

    println!("\n{}", "[debounce]".yellow());
    println!(
        "  {} = {} {}",
        "debounce_window_secs".cyan(),
        settings.debounce_window_secs,
        format!("({}s)", settings.debounce_window_secs).dimmed()
    );
    println!(
        "  {} = {} {}",
        "continuous_interval_secs".cyan(),
        settings.continuous_interval_secs,
        format!("({} min)", settings.continuous_interval_secs / 60).dimmed()
    );
    println!("  {} = {}", "poll_interval_secs".cyan(), settings.poll_interval_secs);
    println!("  {} = {:?}", "disposition".cyan(), settings.disposition);
    println!("  {} = {:?}", "write_strategy".cyan(), settings.write_strategy);

    println!("\n{}", "[ingest]".yellow());
    println!("  {} = {}", "ingest_workers".cyan(), settings.ingest_workers);
    println!("  {} = {}", "receive_batch".cyan(), settings.receive_batch);
    println!("  {} = {}", "receive_wait_secs".cyan(), settings.receive_wait_secs);
    println!(
        "  {} = {}",
        "visibility_timeout_secs".cyan(),
        settings.visibility_timeout_secs
    );
    println!(
        "  {} = {}..{} ms",
        "backoff".cyan(),
        settings.backoff_initial_ms,
        settings.backoff_max_ms
    );

    println!("\n{}", "[processing]".yellow());
    println!(
        "  {} = {}",
        "process_command".cyan(),
        settings
            .process_command
            .as_deref()
            .unwrap_or("<log only>")
    );
    println!(
        "  {} = {}",
        "process_timeout_secs".cyan(),
        settings.process_timeout_secs
    );
    println!("  {} = {:?}", "metrics_sink".cyan(), settings.metrics_sink);

    println!();
    match settings.validate() {
        Ok(()) => println!("{} Configuration is valid", "✓".green()),
        Err(e) => println!("{} {}", "✗".red(), e),
    }
    Ok(())
}
