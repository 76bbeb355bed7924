//! List tracked entity records

use crate::ipc::IpcClient;
use crate::util;
use anyhow::Result;
use chrono::Utc;
use owo_colors::OwoColorize;
use quiesce_core::{Cutoffs, Settings, StateStore};

/// Ask the daemon when it runs; otherwise read the table directly
pub async fn run(settings: &Settings) -> Result<()> {
    let mut entities = match IpcClient::connect(&settings.socket_path()).await {
        Ok(mut client) => client.entities().await?,
        Err(_) => crate::daemon::open_table(settings)?.list().await?,
    };
    entities.sort_by(|a, b| a.last_event_time.cmp(&b.last_event_time));

    if entities.is_empty() {
        println!("{}", "No tracked entities".dimmed());
        return Ok(());
    }

    let cutoffs = Cutoffs::at(Utc::now(), &settings.windows()?);
    for state in &entities {
        util::display_entity(state, &cutoffs);
    }
    println!();
    println!("{} entities", entities.len().to_string().bold());
    Ok(())
}
