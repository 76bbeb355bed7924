//! Durable state store contract
//!
//! The store is a key-value table keyed by entity id. It is the only
//! shared mutable resource in the pipeline: ingestors and the scanner
//! coordinate exclusively through it.

use crate::entity::{EntityId, EntityState};
use crate::error::Result;
use crate::policy::{Cutoffs, Disposition, WriteStrategy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result of recording an event for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First event for the entity
    Created,
    /// `last_event_time` was overwritten
    Advanced,
    /// Older than the stored timestamp under `WriteStrategy::AdvanceOnly`
    Ignored,
}

/// Key-value table of `EntityState` records
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Record that `id` changed at `at`
    ///
    /// Creates the record if absent. Never modifies `last_processed_time`.
    async fn upsert_event(
        &self,
        id: &EntityId,
        at: DateTime<Utc>,
        strategy: WriteStrategy,
    ) -> Result<UpsertOutcome>;

    /// Point read
    async fn get(&self, id: &EntityId) -> Result<Option<EntityState>>;

    /// All records eligible under `disposition` at `cutoffs`
    async fn scan(&self, cutoffs: &Cutoffs, disposition: Disposition) -> Result<Vec<EntityState>>;

    /// Set `last_processed_time = at`, keeping the current `last_event_time`
    ///
    /// Returns `false` if the record no longer exists.
    async fn mark_processed(&self, id: &EntityId, at: DateTime<Utc>) -> Result<bool>;

    /// Delete the record only if it still equals `expected`
    ///
    /// Returns `false` when an event landed after `expected` was read.
    async fn remove_if_unchanged(&self, expected: &EntityState) -> Result<bool>;

    /// Unconditional point delete
    async fn remove(&self, id: &EntityId) -> Result<()>;

    /// Every record, ordered by entity id
    async fn list(&self) -> Result<Vec<EntityState>>;

    /// Number of tracked entities
    async fn count(&self) -> Result<usize>;
}

/// Apply `strategy` to an existing record
///
/// Shared by every store implementation so that the write rule lives in
/// one place.
pub fn apply_event(
    current: Option<&EntityState>,
    id: &EntityId,
    at: DateTime<Utc>,
    strategy: WriteStrategy,
) -> (Option<EntityState>, UpsertOutcome) {
    match current {
        None => (Some(EntityState::first_seen(id.clone(), at)), UpsertOutcome::Created),
        Some(existing) => {
            if strategy == WriteStrategy::AdvanceOnly && at <= existing.last_event_time {
                return (None, UpsertOutcome::Ignored);
            }
            let mut next = existing.clone();
            next.last_event_time = at;
            (Some(next), UpsertOutcome::Advanced)
        }
    }
}
