//! Periodic debounce scanner
//!
//! Periodically scans the state store for entities that are quiet for the
//! debounce window (or overdue under the continuous policy), runs the
//! processing operation for each, and advances their state.

use crate::metrics::{self, MetricsSink};
use crate::process::Processor;
use quiesce_core::{
    Backoff, Clock, Cutoffs, Disposition, EntityState, Result, StateStore, Windows,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scanner tuning
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub windows: Windows,
    pub disposition: Disposition,
    /// Pause between passes
    pub poll_interval: Duration,
    /// Extra pause while scans keep failing
    pub backoff: Backoff,
}

/// Counts for one scan pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// Records matched by the scan predicate
    pub eligible: usize,
    /// Processed and state advanced
    pub processed: usize,
    /// Processing or state update failed; still eligible next pass
    pub failed: usize,
    /// Processed, but a newer event arrived meanwhile so the record was kept
    pub retained: usize,
}

/// How a processed entity's state was advanced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Drained,
    Rescheduled,
    /// Changed or vanished while processing
    Retained,
}

/// Periodic debounce scanner
///
/// Must run as a single instance per store: two scanners would both see the
/// same eligible entity and process it twice.
pub struct Scanner {
    store: Arc<dyn StateStore>,
    processor: Arc<dyn Processor>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    config: ScanConfig,
}

impl Scanner {
    pub fn new(
        store: Arc<dyn StateStore>,
        processor: Arc<dyn Processor>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
        config: ScanConfig,
    ) -> Self {
        Self {
            store,
            processor,
            metrics,
            clock,
            config,
        }
    }

    /// Run scan passes until `shutdown` fires
    ///
    /// Cancellation is only observed between passes: a pass in flight always
    /// finishes, so no entity is left processed-but-not-advanced.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            "Starting debounce scanner (poll interval: {:?}, policy: {:?})",
            self.config.poll_interval, self.config.disposition
        );

        while !shutdown.is_cancelled() {
            let pause = match self.run_pass().await {
                Ok(report) => {
                    self.config.backoff.reset();
                    if report.eligible > 0 {
                        info!(
                            eligible = report.eligible,
                            processed = report.processed,
                            failed = report.failed,
                            retained = report.retained,
                            "Scan pass complete"
                        );
                    } else {
                        debug!("Scan pass: no eligible entities");
                    }
                    self.config.poll_interval
                }
                Err(e) => {
                    let extra = self.config.backoff.next_delay();
                    warn!(error = %e, retry_in = ?(self.config.poll_interval + extra), "Scan pass failed");
                    self.config.poll_interval + extra
                }
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Debounce scanner stopped");
    }

    /// One pass over the store
    ///
    /// Fails only when the scan query itself fails; per-entity failures are
    /// logged and counted.
    pub async fn run_pass(&self) -> Result<PassReport> {
        // 1. Cutoffs for this pass
        let cutoffs = Cutoffs::at(self.clock.now(), &self.config.windows);

        // 2. Eligible records
        let eligible = self.store.scan(&cutoffs, self.config.disposition).await?;
        let mut report = PassReport {
            eligible: eligible.len(),
            ..PassReport::default()
        };

        // 3. Process each, advancing state only on success
        for state in &eligible {
            if let Err(e) = self.processor.process(&state.entity_id).await {
                warn!(entity = %state.entity_id, error = %e, "Processing failed; entity stays eligible");
                metrics::publish(self.metrics.as_ref(), metrics::PROCESSING_FAILURES, 1);
                report.failed += 1;
                continue;
            }

            match self.settle(state, &cutoffs).await {
                Ok(settled) => {
                    debug!(entity = %state.entity_id, ?settled, "Entity processed");
                    metrics::publish(self.metrics.as_ref(), metrics::ENTITIES_PROCESSED, 1);
                    if settled == Settled::Retained {
                        report.retained += 1;
                    } else {
                        report.processed += 1;
                    }
                }
                Err(e) => {
                    warn!(
                        entity = %state.entity_id,
                        error = %e,
                        "Processed but failed to advance state; entity stays eligible"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Apply the disposition to a processed entity
    async fn settle(&self, state: &EntityState, cutoffs: &Cutoffs) -> Result<Settled> {
        match self.config.disposition {
            Disposition::Drain => {
                // A newer event must not be swallowed by the delete
                if self.store.remove_if_unchanged(state).await? {
                    Ok(Settled::Drained)
                } else {
                    debug!(entity = %state.entity_id, "Entity changed during processing; kept for next window");
                    Ok(Settled::Retained)
                }
            }
            Disposition::Continuous => {
                if self.store.mark_processed(&state.entity_id, cutoffs.now).await? {
                    Ok(Settled::Rescheduled)
                } else {
                    Ok(Settled::Retained)
                }
            }
        }
    }
}
