//! One-shot debounce pass without the daemon

use crate::locks::ScannerLock;
use crate::util;
use anyhow::{Context, Result};
use chrono::Utc;
use owo_colors::OwoColorize;
use quiesce_core::{Cutoffs, Settings, StateStore, SystemClock};
use std::sync::Arc;
use watcher::{ScanConfig, Scanner};

pub async fn run(settings: &Settings, dry_run: bool) -> Result<()> {
    settings.validate().context("Invalid configuration")?;
    let _lock = ScannerLock::acquire(&settings.locks_dir())?;
    let store = Arc::new(crate::daemon::open_table(settings)?);

    if dry_run {
        let cutoffs = Cutoffs::at(Utc::now(), &settings.windows()?);
        let eligible = store.scan(&cutoffs, settings.disposition).await?;
        if eligible.is_empty() {
            println!("{}", "Nothing eligible".dimmed());
            return Ok(());
        }
        println!("{} ({:?})", "Eligible entities".bold(), settings.disposition);
        for state in &eligible {
            util::display_entity(state, &cutoffs);
        }
        return Ok(());
    }

    let scanner = Scanner::new(
        store,
        crate::daemon::build_processor(settings)?,
        crate::daemon::build_metrics(settings)?,
        Arc::new(SystemClock),
        ScanConfig {
            windows: settings.windows()?,
            disposition: settings.disposition,
            poll_interval: settings.poll_interval(),
            backoff: settings.backoff(),
        },
    );
    let report = scanner.run_pass().await?;

    println!("{}", "Scan complete".bold());
    println!("  Eligible:   {}", report.eligible);
    println!("  Processed:  {}", report.processed.to_string().green());
    if report.retained > 0 {
        println!("  Retained:   {} (new events during processing)", report.retained);
    }
    if let Some(handle) = crate::telemetry::prometheus_handle() {
        println!();
        print!("{}", handle.render());
    }
    if report.failed > 0 {
        println!("  Failed:     {}", report.failed.to_string().red());
        anyhow::bail!("{} entities failed processing", report.failed);
    }
    Ok(())
}
