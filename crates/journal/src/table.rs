//! Entity state table using sled

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiesce_core::store::apply_event;
use quiesce_core::{
    Cutoffs, Disposition, EntityId, EntityState, Error, Result, StateStore, UpsertOutcome,
    WriteStrategy,
};
use sled::{Db, IVec, Tree};
use std::path::Path;
use tracing::{debug, warn};

const ENTITIES_TREE: &str = "entities";

/// Durable state table keyed by entity id
///
/// Values are JSON `EntityState` records. Every read-modify-write goes
/// through `compare_and_swap`, so an ingest racing a scan on the same key
/// retries instead of clobbering the other writer.
pub struct SledStateStore {
    /// Sled database
    db: Db,
    /// entity_id -> EntityState
    entities: Tree,
}

impl SledStateStore {
    /// Open or create a table at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).map_err(Error::storage)?;
        let entities = db.open_tree(ENTITIES_TREE).map_err(Error::storage)?;
        Ok(Self { db, entities })
    }

    fn read(&self, id: &EntityId) -> Result<Option<(IVec, EntityState)>> {
        match self.entities.get(id.as_bytes()).map_err(Error::storage)? {
            Some(raw) => {
                let state = EntityState::from_json(&raw)?;
                Ok(Some((raw, state)))
            }
            None => Ok(None),
        }
    }

    /// Like `read`, but an undecodable record comes back as raw bytes only
    /// so the next write replaces it
    fn read_for_write(&self, id: &EntityId) -> Result<(Option<IVec>, Option<EntityState>)> {
        let Some(raw) = self.entities.get(id.as_bytes()).map_err(Error::storage)? else {
            return Ok((None, None));
        };
        match EntityState::from_json(&raw) {
            Ok(state) => Ok((Some(raw), Some(state))),
            Err(e) => {
                warn!(entity = %id, error = %e, "Replacing undecodable entity record");
                Ok((Some(raw), None))
            }
        }
    }

    /// Swap `current` for `next` under `id`; `false` if someone else wrote first
    fn swap(&self, id: &EntityId, current: Option<&IVec>, next: Option<&EntityState>) -> Result<bool> {
        let encoded = next.map(EntityState::to_json).transpose()?;
        let swapped = self
            .entities
            .compare_and_swap(id.as_bytes(), current, encoded)
            .map_err(Error::storage)?;
        Ok(swapped.is_ok())
    }

    async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(Error::storage)?;
        Ok(())
    }

    fn decode_all(&self) -> Result<Vec<EntityState>> {
        let mut records = Vec::new();
        for item in self.entities.iter() {
            let (key, value) = item.map_err(Error::storage)?;
            match EntityState::from_json(&value) {
                Ok(state) => records.push(state),
                Err(e) => warn!(
                    key = %String::from_utf8_lossy(&key),
                    error = %e,
                    "Skipping undecodable entity record"
                ),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn upsert_event(
        &self,
        id: &EntityId,
        at: DateTime<Utc>,
        strategy: WriteStrategy,
    ) -> Result<UpsertOutcome> {
        loop {
            let (raw, current) = self.read_for_write(id)?;
            let (next, outcome) = apply_event(current.as_ref(), id, at, strategy);

            let Some(next) = next else {
                return Ok(outcome);
            };

            if self.swap(id, raw.as_ref(), Some(&next))? {
                self.flush().await?;
                return Ok(outcome);
            }
            debug!(entity = %id, "Concurrent write on entity, retrying upsert");
        }
    }

    async fn get(&self, id: &EntityId) -> Result<Option<EntityState>> {
        Ok(self.read(id)?.map(|(_, state)| state))
    }

    async fn scan(&self, cutoffs: &Cutoffs, disposition: Disposition) -> Result<Vec<EntityState>> {
        Ok(self
            .decode_all()?
            .into_iter()
            .filter(|state| cutoffs.is_eligible(state, disposition))
            .collect())
    }

    async fn mark_processed(&self, id: &EntityId, at: DateTime<Utc>) -> Result<bool> {
        loop {
            let Some((raw, mut state)) = self.read(id)? else {
                return Ok(false);
            };
            state.last_processed_time = Some(at);

            if self.swap(id, Some(&raw), Some(&state))? {
                self.flush().await?;
                return Ok(true);
            }
            debug!(entity = %id, "Concurrent write on entity, retrying mark_processed");
        }
    }

    async fn remove_if_unchanged(&self, expected: &EntityState) -> Result<bool> {
        let id = &expected.entity_id;
        let Some((raw, current)) = self.read(id)? else {
            return Ok(false);
        };
        if &current != expected {
            return Ok(false);
        }

        let removed = self.swap(id, Some(&raw), None)?;
        if removed {
            self.flush().await?;
        }
        Ok(removed)
    }

    async fn remove(&self, id: &EntityId) -> Result<()> {
        self.entities.remove(id.as_bytes()).map_err(Error::storage)?;
        self.flush().await
    }

    async fn list(&self) -> Result<Vec<EntityState>> {
        self.decode_all()
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entities.len())
    }
}
