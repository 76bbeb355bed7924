//! Counter publishing
//!
//! Publishing is fire-and-forget: a failing sink is logged and never
//! interrupts ingestion or scanning.

use metrics::{counter, describe_counter};
use parking_lot::Mutex;
use quiesce_core::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Inbound messages stored as entity events
pub const EVENTS_INGESTED: &str = "quiesce_events_ingested_total";

/// Entities that completed a processing pass
pub const ENTITIES_PROCESSED: &str = "quiesce_entities_processed_total";

/// Malformed inbound messages dropped without retry
pub const MESSAGES_DISCARDED: &str = "quiesce_messages_discarded_total";

/// Processing attempts that failed and left state untouched
pub const PROCESSING_FAILURES: &str = "quiesce_processing_failures_total";

/// Destination for pipeline counters
pub trait MetricsSink: Send + Sync {
    fn publish(&self, name: &str, value: u64) -> Result<()>;
}

/// Publish and swallow failures
pub fn publish(sink: &dyn MetricsSink, name: &str, value: u64) {
    if let Err(e) = sink.publish(name, value) {
        warn!(metric = name, error = %e, "Failed to publish metric");
    }
}

/// Emits one structured log line per publish
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn publish(&self, name: &str, value: u64) -> Result<()> {
        info!(metric = name, value, "Published metric");
        Ok(())
    }
}

/// Forwards to the `metrics` facade; the host installs the exporter
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderSink;

impl RecorderSink {
    /// Register counter descriptions with the installed recorder
    pub fn register() -> Self {
        describe_counter!(EVENTS_INGESTED, "Inbound messages stored as entity events");
        describe_counter!(ENTITIES_PROCESSED, "Entities that completed a processing pass");
        describe_counter!(MESSAGES_DISCARDED, "Malformed inbound messages discarded");
        describe_counter!(PROCESSING_FAILURES, "Failed processing attempts");
        Self
    }
}

impl MetricsSink for RecorderSink {
    fn publish(&self, name: &str, value: u64) -> Result<()> {
        counter!(name.to_owned()).increment(value);
        debug!(metric = name, value, "Recorded metric");
        Ok(())
    }
}

/// Accumulates counters in memory (tests, status reporting)
#[derive(Debug, Default)]
pub struct MemorySink {
    counters: Mutex<HashMap<String, u64>>,
    failing: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every publish fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }
}

impl MetricsSink for MemorySink {
    fn publish(&self, name: &str, value: u64) -> Result<()> {
        if self.failing {
            return Err(Error::Metrics(format!("sink unavailable for {}", name)));
        }
        *self.counters.lock().entry(name.to_string()).or_insert(0) += value;
        Ok(())
    }
}
