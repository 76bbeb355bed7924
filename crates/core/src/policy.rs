//! Debounce timing rules
//!
//! An entity is observed through the store in one of four phases:
//!
//! ```text
//!   Fresh ──(debounce window elapses)──> Quiesced ──(processed)──> deleted          [drain]
//!                                            │
//!                                            └────(processed)──> Processed          [continuous]
//!                                                                   │  ▲
//!                                      (continuous interval elapses)│  │(processed)
//!                                                                   ▼  │
//!                                                                  Stale
//! ```
//!
//! Both cutoffs are inclusive: an entity is quiesced once
//! `now - last_event_time >= debounce_window`.

use crate::entity::EntityState;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the scanner does with an entity after processing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Delete the record; the entity starts fresh on its next event
    #[default]
    Drain,
    /// Keep the record and reprocess it every continuous interval
    Continuous,
}

/// How the ingestor resolves concurrent writes to the same entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStrategy {
    /// Every ingest overwrites `last_event_time`, even with an older receipt time
    LastWriteWins,
    /// `last_event_time` only moves forward
    #[default]
    AdvanceOnly,
}

/// Debounce window and continuous-reprocessing interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Windows {
    debounce_window: chrono::Duration,
    continuous_interval: chrono::Duration,
}

impl Windows {
    /// Both durations must be positive and representable as timestamps offsets
    pub fn new(debounce_window: Duration, continuous_interval: Duration) -> Result<Self> {
        Ok(Self {
            debounce_window: positive("debounce window", debounce_window)?,
            continuous_interval: positive("continuous interval", continuous_interval)?,
        })
    }

    pub fn debounce_window(&self) -> chrono::Duration {
        self.debounce_window
    }

    pub fn continuous_interval(&self) -> chrono::Duration {
        self.continuous_interval
    }
}

fn positive(name: &str, value: Duration) -> Result<chrono::Duration> {
    if value.is_zero() {
        return Err(Error::Config(format!("{} must be positive", name)));
    }
    chrono::Duration::from_std(value)
        .map_err(|_| Error::Config(format!("{} is out of range: {:?}", name, value)))
}

/// Per-entity phase as observed through the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Inside the debounce window, never processed
    Fresh,
    /// Debounce window elapsed, never processed
    Quiesced,
    /// Retained after processing, inside the continuous interval
    Processed,
    /// Retained after processing, continuous interval elapsed
    Stale,
}

/// Cutoff timestamps for one scan pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cutoffs {
    pub now: DateTime<Utc>,
    /// `now - debounce_window`
    pub debounce: DateTime<Utc>,
    /// `now - continuous_interval`
    pub continuous: DateTime<Utc>,
}

impl Cutoffs {
    pub fn at(now: DateTime<Utc>, windows: &Windows) -> Self {
        Self {
            now,
            debounce: now
                .checked_sub_signed(windows.debounce_window)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            continuous: now
                .checked_sub_signed(windows.continuous_interval)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Quiet for at least the debounce window
    pub fn is_quiesced(&self, state: &EntityState) -> bool {
        state.last_event_time <= self.debounce
    }

    /// Processed before, and the continuous interval has elapsed since
    pub fn is_stale(&self, state: &EntityState) -> bool {
        state
            .last_processed_time
            .map_or(false, |processed| processed <= self.continuous)
    }

    pub fn phase(&self, state: &EntityState) -> Phase {
        match state.last_processed_time {
            None if self.is_quiesced(state) => Phase::Quiesced,
            None => Phase::Fresh,
            Some(_) if self.is_stale(state) => Phase::Stale,
            Some(_) => Phase::Processed,
        }
    }

    /// Scan predicate
    ///
    /// Drain: quiesced. Continuous: quiesced and never processed, or stale.
    /// A new event does not reset `last_processed_time`, so a stale record
    /// stays eligible even while events keep arriving.
    pub fn is_eligible(&self, state: &EntityState, disposition: Disposition) -> bool {
        match disposition {
            Disposition::Drain => self.is_quiesced(state),
            Disposition::Continuous => matches!(self.phase(state), Phase::Quiesced | Phase::Stale),
        }
    }
}
