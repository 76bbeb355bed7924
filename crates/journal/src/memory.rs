//! In-memory state table and queue
//!
//! Same semantics as the sled-backed implementations, no persistence.
//! Used by tests and by dry-run tooling.

use crate::queue::{long_poll, now_ms, Envelope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use quiesce_core::store::apply_event;
use quiesce_core::{
    Cutoffs, Disposition, EntityId, EntityState, MessageId, MessageQueue, ReceiptHandle,
    ReceivedMessage, Result, StateStore, UpsertOutcome, WriteStrategy,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Notify;
use ulid::Generator;

/// In-memory entity state table
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entities: RwLock<BTreeMap<EntityId, EntityState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly (tests)
    pub fn insert(&self, state: EntityState) {
        self.entities.write().insert(state.entity_id.clone(), state);
    }

    /// Copy of every record, without going through the async trait
    pub fn snapshot(&self) -> Vec<EntityState> {
        self.entities.read().values().cloned().collect()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn upsert_event(
        &self,
        id: &EntityId,
        at: DateTime<Utc>,
        strategy: WriteStrategy,
    ) -> Result<UpsertOutcome> {
        let mut entities = self.entities.write();
        let (next, outcome) = apply_event(entities.get(id), id, at, strategy);
        if let Some(next) = next {
            entities.insert(id.clone(), next);
        }
        Ok(outcome)
    }

    async fn get(&self, id: &EntityId) -> Result<Option<EntityState>> {
        Ok(self.entities.read().get(id).cloned())
    }

    async fn scan(&self, cutoffs: &Cutoffs, disposition: Disposition) -> Result<Vec<EntityState>> {
        Ok(self
            .entities
            .read()
            .values()
            .filter(|state| cutoffs.is_eligible(state, disposition))
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, id: &EntityId, at: DateTime<Utc>) -> Result<bool> {
        match self.entities.write().get_mut(id) {
            Some(state) => {
                state.last_processed_time = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_if_unchanged(&self, expected: &EntityState) -> Result<bool> {
        let mut entities = self.entities.write();
        if entities.get(&expected.entity_id) != Some(expected) {
            return Ok(false);
        }
        entities.remove(&expected.entity_id);
        Ok(true)
    }

    async fn remove(&self, id: &EntityId) -> Result<()> {
        self.entities.write().remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<EntityState>> {
        Ok(self.snapshot())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entities.read().len())
    }
}

/// In-memory at-least-once queue
pub struct MemoryQueue {
    messages: Mutex<BTreeMap<MessageId, Envelope>>,
    ids: Mutex<Generator>,
    notify: Notify,
    visibility_timeout: Duration,
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            messages: Mutex::new(BTreeMap::new()),
            ids: Mutex::new(Generator::new()),
            notify: Notify::new(),
            visibility_timeout,
        }
    }

    fn claim_visible(&self, max: usize) -> Vec<ReceivedMessage> {
        let now = now_ms();
        let mut messages = self.messages.lock();
        let mut claimed = Vec::new();

        for (id, envelope) in messages.iter_mut() {
            if claimed.len() >= max {
                break;
            }
            if !envelope.is_visible(now) {
                continue;
            }
            *envelope = envelope.deliver(now, self.visibility_timeout);
            claimed.extend(envelope.received(*id));
        }
        claimed
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn send(&self, body: String) -> Result<MessageId> {
        let id = MessageId(self.ids.lock().generate().unwrap_or_else(|_| ulid::Ulid::new()));
        self.messages.lock().insert(id, Envelope::new(body));
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<ReceivedMessage>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        long_poll(&self.notify, wait, || Ok(self.claim_visible(max))).await
    }

    async fn ack(&self, receipt: &ReceiptHandle) -> Result<()> {
        let mut messages = self.messages.lock();
        let current = messages
            .get(&receipt.message_id)
            .map(|envelope| envelope.token == Some(receipt.token));
        if current == Some(true) {
            messages.remove(&receipt.message_id);
        }
        Ok(())
    }

    async fn pending(&self) -> Result<usize> {
        Ok(self.messages.lock().len())
    }
}
