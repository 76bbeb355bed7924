//! Daemon settings model and validation
//!
//! Loading (file + `QUIESCE_*` environment overlay) lives in the CLI; this
//! module owns the shape, the defaults and the valid ranges.

use crate::backoff::Backoff;
use crate::error::{Error, Result};
use crate::policy::{Disposition, Windows, WriteStrategy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Largest batch a single receive may request
pub const MAX_RECEIVE_BATCH: usize = 10;

/// Longest long-poll wait
pub const MAX_RECEIVE_WAIT_SECS: u64 = 20;

/// Upper bound for any window or interval (one year)
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Where published counters go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsSinkKind {
    /// Structured log line per publish
    #[default]
    Tracing,
    /// `metrics` facade (exporter installed by the host)
    Recorder,
}

/// Daemon settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Queue spool location (required)
    pub queue: Option<PathBuf>,
    /// State table location (required)
    pub table: Option<PathBuf>,

    #[serde(default = "default_debounce_window_secs")]
    pub debounce_window_secs: u64,
    #[serde(default = "default_continuous_interval_secs")]
    pub continuous_interval_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub disposition: Disposition,
    #[serde(default)]
    pub write_strategy: WriteStrategy,

    #[serde(default = "default_ingest_workers")]
    pub ingest_workers: usize,
    #[serde(default = "default_receive_batch")]
    pub receive_batch: usize,
    #[serde(default = "default_receive_wait_secs")]
    pub receive_wait_secs: u64,
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Lock files, control socket and logs
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub metrics_sink: MetricsSinkKind,

    /// Program run once per eligible entity (entity id as last argument)
    #[serde(default)]
    pub process_command: Option<String>,
    #[serde(default = "default_process_timeout_secs")]
    pub process_timeout_secs: u64,
}

fn default_debounce_window_secs() -> u64 {
    15
}

fn default_continuous_interval_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_ingest_workers() -> usize {
    1
}

fn default_receive_batch() -> usize {
    MAX_RECEIVE_BATCH
}

fn default_receive_wait_secs() -> u64 {
    MAX_RECEIVE_WAIT_SECS
}

fn default_visibility_timeout_secs() -> u64 {
    30
}

fn default_backoff_initial_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".quiesce")
}

fn default_process_timeout_secs() -> u64 {
    60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queue: None,
            table: None,
            debounce_window_secs: default_debounce_window_secs(),
            continuous_interval_secs: default_continuous_interval_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            disposition: Disposition::default(),
            write_strategy: WriteStrategy::default(),
            ingest_workers: default_ingest_workers(),
            receive_batch: default_receive_batch(),
            receive_wait_secs: default_receive_wait_secs(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            state_dir: default_state_dir(),
            metrics_sink: MetricsSinkKind::default(),
            process_command: None,
            process_timeout_secs: default_process_timeout_secs(),
        }
    }
}

impl Settings {
    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue.as_ref().map_or(true, |p| p.as_os_str().is_empty()) {
            return Err(Error::Config("queue is not set (QUIESCE_QUEUE)".to_string()));
        }
        if self.table.as_ref().map_or(true, |p| p.as_os_str().is_empty()) {
            return Err(Error::Config("table is not set (QUIESCE_TABLE)".to_string()));
        }
        if self.queue == self.table {
            return Err(Error::Config(
                "queue and table must be different locations".to_string(),
            ));
        }

        in_range("debounce_window_secs", self.debounce_window_secs, 1, MAX_WINDOW_SECS)?;
        in_range("continuous_interval_secs", self.continuous_interval_secs, 1, MAX_WINDOW_SECS)?;
        in_range("poll_interval_secs", self.poll_interval_secs, 1, MAX_WINDOW_SECS)?;
        in_range("visibility_timeout_secs", self.visibility_timeout_secs, 1, 12 * 60 * 60)?;
        in_range("receive_wait_secs", self.receive_wait_secs, 1, MAX_RECEIVE_WAIT_SECS)?;
        in_range("receive_batch", self.receive_batch as u64, 1, MAX_RECEIVE_BATCH as u64)?;
        in_range("ingest_workers", self.ingest_workers as u64, 1, 64)?;
        in_range("backoff_initial_ms", self.backoff_initial_ms, 1, self.backoff_max_ms.max(1))?;
        in_range("process_timeout_secs", self.process_timeout_secs, 1, MAX_WINDOW_SECS)?;

        if let Some(command) = &self.process_command {
            if command.trim().is_empty() {
                return Err(Error::Config("process_command is empty".to_string()));
            }
        }

        Ok(())
    }

    pub fn windows(&self) -> Result<Windows> {
        Windows::new(
            Duration::from_secs(self.debounce_window_secs),
            Duration::from_secs(self.continuous_interval_secs),
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn receive_wait(&self) -> Duration {
        Duration::from_secs(self.receive_wait_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.backoff_initial_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }

    /// Control socket path
    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.join("daemon.sock")
    }

    /// Lock directory
    pub fn locks_dir(&self) -> PathBuf {
        self.state_dir.join("locks")
    }
}

fn in_range(name: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        return Err(Error::Config(format!(
            "{} = {} is out of range ({}-{})",
            name, value, min, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Settings {
        Settings {
            queue: Some(PathBuf::from("/var/lib/quiesce/queue")),
            table: Some(PathBuf::from("/var/lib/quiesce/table")),
            ..Settings::default()
        }
    }

    #[test]
    fn test_defaults_with_locations_are_valid() {
        valid().validate().unwrap();
    }

    #[test]
    fn test_missing_locations_are_fatal() {
        let err = Settings::default().validate().unwrap_err();
        assert!(err.to_string().contains("queue is not set"));

        let mut settings = valid();
        settings.table = None;
        assert!(settings.validate().unwrap_err().to_string().contains("table is not set"));
    }

    #[test]
    fn test_shared_location_rejected() {
        let mut settings = valid();
        settings.table = settings.queue.clone();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_durations_rejected() {
        for mutate in [
            (|s: &mut Settings| s.debounce_window_secs = 0) as fn(&mut Settings),
            |s| s.continuous_interval_secs = 0,
            |s| s.poll_interval_secs = 0,
            |s| s.receive_wait_secs = 0,
            |s| s.visibility_timeout_secs = 0,
        ] {
            let mut settings = valid();
            mutate(&mut settings);
            assert!(matches!(settings.validate(), Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_receive_limits() {
        let mut settings = valid();
        settings.receive_batch = MAX_RECEIVE_BATCH + 1;
        assert!(settings.validate().is_err());

        let mut settings = valid();
        settings.receive_wait_secs = MAX_RECEIVE_WAIT_SECS + 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            queue = "q"
            table = "t"
            disposition = "continuous"
            continuous_interval_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(settings.disposition, Disposition::Continuous);
        assert_eq!(settings.continuous_interval_secs, 60);
        assert_eq!(settings.debounce_window_secs, 15);
        assert_eq!(settings.write_strategy, WriteStrategy::AdvanceOnly);
        assert_eq!(settings.receive_batch, 10);
        settings.validate().unwrap();
    }
}
