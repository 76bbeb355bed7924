//! Shared CLI formatting

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use quiesce_core::{Cutoffs, EntityState, Phase};

/// Format a timestamp relative to `now` ("2 minutes ago")
pub fn format_relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(at).num_seconds();
    if seconds < 0 {
        return "in the future".to_string();
    }

    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// Format a span of seconds compactly ("1h 5m", "45s")
pub fn format_duration(secs: u64) -> String {
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

pub fn phase_label(phase: Phase) -> String {
    match phase {
        Phase::Fresh => "fresh".yellow().to_string(),
        Phase::Quiesced => "quiesced".green().to_string(),
        Phase::Processed => "processed".cyan().to_string(),
        Phase::Stale => "stale".magenta().to_string(),
    }
}

/// One line per entity: id, phase, last event, last processed
pub fn display_entity(state: &EntityState, cutoffs: &Cutoffs) {
    let last_processed = state
        .last_processed_time
        .map(|t| format_relative_time(t, cutoffs.now))
        .unwrap_or_else(|| "never".to_string());

    println!(
        "{:<36} {:<10} {} {}",
        state.entity_id.as_str().yellow(),
        phase_label(cutoffs.phase(state)),
        format!("event {}", format_relative_time(state.last_event_time, cutoffs.now)).dimmed(),
        format!("processed {}", last_processed).dimmed()
    );
}
