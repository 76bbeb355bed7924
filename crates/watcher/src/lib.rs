//! Debounce pipeline for entity change notifications
//!
//! This crate provides:
//! - Event ingestion (queue → state store), one task per worker
//! - Periodic debounce scanning with drain or continuous disposition
//! - Pluggable processing and metrics sinks
//! - A supervisor that runs everything under one cancellation token
//!
//! Tasks share no in-process state; all coordination goes through the
//! state store.

pub mod ingest;
pub mod metrics;
pub mod process;
pub mod reconcile;

pub use ingest::{IngestConfig, Ingestor, MessageOutcome};
pub use crate::metrics::{MemorySink, MetricsSink, RecorderSink, TracingSink};
pub use process::{CommandProcessor, LogProcessor, Processor};
pub use reconcile::{PassReport, ScanConfig, Scanner};

use quiesce_core::{Clock, MessageQueue, Settings, StateStore};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Collaborators shared by every pipeline task
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn StateStore>,
    pub queue: Arc<dyn MessageQueue>,
    pub processor: Arc<dyn Processor>,
    pub metrics: Arc<dyn MetricsSink>,
    pub clock: Arc<dyn Clock>,
}

/// Which tasks a pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roles {
    pub ingest: bool,
    pub scan: bool,
}

impl Default for Roles {
    fn default() -> Self {
        Self {
            ingest: true,
            scan: true,
        }
    }
}

/// Running ingest workers and scanner
pub struct Pipeline {
    tasks: JoinSet<()>,
    shutdown: CancellationToken,
}

impl Pipeline {
    /// Spawn `settings.ingest_workers` ingestors and one scanner
    pub fn spawn(
        services: Services,
        settings: &Settings,
        roles: Roles,
        shutdown: CancellationToken,
    ) -> quiesce_core::Result<Self> {
        settings.validate()?;
        let windows = settings.windows()?;
        let mut tasks = JoinSet::new();

        if roles.ingest {
            for worker in 0..settings.ingest_workers {
                let ingestor = Ingestor::new(
                    worker,
                    services.queue.clone(),
                    services.store.clone(),
                    services.metrics.clone(),
                    services.clock.clone(),
                    IngestConfig {
                        receive_batch: settings.receive_batch,
                        receive_wait: settings.receive_wait(),
                        write_strategy: settings.write_strategy,
                        backoff: settings.backoff(),
                    },
                );
                tasks.spawn(ingestor.run(shutdown.clone()));
            }
        }

        if roles.scan {
            let scanner = Scanner::new(
                services.store.clone(),
                services.processor.clone(),
                services.metrics.clone(),
                services.clock.clone(),
                ScanConfig {
                    windows,
                    disposition: settings.disposition,
                    poll_interval: settings.poll_interval(),
                    backoff: settings.backoff(),
                },
            );
            tasks.spawn(scanner.run(shutdown.clone()));
        }

        info!(
            ingest_workers = if roles.ingest { settings.ingest_workers } else { 0 },
            scanner = roles.scan,
            "Pipeline started"
        );

        Ok(Self { tasks, shutdown })
    }

    /// Token that stops every task
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wait for every task to exit (after the token is cancelled elsewhere)
    pub async fn wait(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Pipeline task ended abnormally");
            }
        }
        info!("Pipeline stopped");
    }

    /// Cancel and wait
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.wait().await;
    }
}
