//! Event ingestion: queue → state store
//!
//! Each worker long-polls the queue independently. A message is
//! acknowledged once its event is stored, or once it is known to be
//! unusable. A store failure leaves the message unacknowledged so the
//! queue redelivers it after the visibility timeout.

use crate::metrics::{self, MetricsSink};
use quiesce_core::{
    parse_change_notification, Backoff, Clock, MessageQueue, ReceivedMessage, StateStore,
    UpsertOutcome, WriteStrategy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Deliveries after which a message the store keeps rejecting is dropped
///
/// Only non-transient store errors count; an unavailable store retains the
/// message indefinitely.
pub const MAX_REJECTED_DELIVERIES: u32 = 5;

/// Ingestor tuning
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Messages requested per receive
    pub receive_batch: usize,
    /// Long-poll wait per receive
    pub receive_wait: Duration,
    pub write_strategy: WriteStrategy,
    /// Pause schedule after failed receives
    pub backoff: Backoff,
}

/// What happened to one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Event stored and message acknowledged
    Ingested(UpsertOutcome),
    /// Malformed or repeatedly rejected by the store; acknowledged
    Discarded,
    /// Store failed; left for redelivery
    Retained,
}

/// One ingestion worker
pub struct Ingestor {
    worker: usize,
    queue: Arc<dyn MessageQueue>,
    store: Arc<dyn StateStore>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(
        worker: usize,
        queue: Arc<dyn MessageQueue>,
        store: Arc<dyn StateStore>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
        config: IngestConfig,
    ) -> Self {
        Self {
            worker,
            queue,
            store,
            metrics,
            clock,
            config,
        }
    }

    /// Receive and handle batches until `shutdown` fires
    ///
    /// Cancellation is observed between batches and while waiting on the
    /// queue; a batch already received is always handled to completion.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(worker = self.worker, "Starting ingest worker");

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.queue.receive(self.config.receive_batch, self.config.receive_wait) => received,
            };

            match received {
                Ok(messages) => {
                    self.config.backoff.reset();
                    if messages.is_empty() {
                        debug!(worker = self.worker, "No messages received. Waiting for more...");
                        continue;
                    }
                    for message in &messages {
                        self.handle(message).await;
                    }
                }
                Err(e) => {
                    let delay = self.config.backoff.next_delay();
                    warn!(
                        worker = self.worker,
                        error = %e,
                        retry_in = ?delay,
                        failures = self.config.backoff.failures(),
                        "Failed to receive messages"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!(worker = self.worker, "Ingest worker stopped");
    }

    /// Handle one delivered message
    pub async fn handle(&self, message: &ReceivedMessage) -> MessageOutcome {
        let message_id = message.message_id();

        let entity = match parse_change_notification(&message.body) {
            Ok(entity) => entity,
            Err(e) => {
                error!(
                    worker = self.worker,
                    message_id = %message_id,
                    error = %e,
                    "Discarding malformed message"
                );
                metrics::publish(self.metrics.as_ref(), metrics::MESSAGES_DISCARDED, 1);
                self.ack(message).await;
                return MessageOutcome::Discarded;
            }
        };

        let received_at = self.clock.now();
        match self
            .store
            .upsert_event(&entity, received_at, self.config.write_strategy)
            .await
        {
            Ok(outcome) => {
                debug!(
                    worker = self.worker,
                    entity = %entity,
                    timestamp = %received_at.to_rfc3339(),
                    ?outcome,
                    "Stored entity event"
                );
                metrics::publish(self.metrics.as_ref(), metrics::EVENTS_INGESTED, 1);
                self.ack(message).await;
                MessageOutcome::Ingested(outcome)
            }
            Err(e) if e.is_transient() => {
                warn!(
                    worker = self.worker,
                    entity = %entity,
                    message_id = %message_id,
                    error = %e,
                    "Failed to store entity event; message left for redelivery"
                );
                MessageOutcome::Retained
            }
            Err(e) if message.receive_count >= MAX_REJECTED_DELIVERIES => {
                error!(
                    worker = self.worker,
                    entity = %entity,
                    message_id = %message_id,
                    receive_count = message.receive_count,
                    error = %e,
                    "Entity event rejected by the store on every delivery; discarding message"
                );
                metrics::publish(self.metrics.as_ref(), metrics::MESSAGES_DISCARDED, 1);
                self.ack(message).await;
                MessageOutcome::Discarded
            }
            Err(e) => {
                error!(
                    worker = self.worker,
                    entity = %entity,
                    message_id = %message_id,
                    receive_count = message.receive_count,
                    error = %e,
                    "Entity event rejected by the store"
                );
                MessageOutcome::Retained
            }
        }
    }

    async fn ack(&self, message: &ReceivedMessage) {
        // A lost ack means redelivery; the upsert is idempotent
        if let Err(e) = self.queue.ack(&message.receipt).await {
            warn!(
                worker = self.worker,
                receipt = %message.receipt,
                error = %e,
                "Failed to acknowledge message"
            );
        }
    }
}
