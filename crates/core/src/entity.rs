//! Entity identity and the per-entity state record

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque entity identifier, unique key of the state store
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Create an id, rejecting empty or whitespace-only values
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidEntityId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key bytes used by ordered stores
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for EntityId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One record per tracked entity
///
/// Serialized as JSON with RFC 3339 timestamps:
/// ```json
/// {"entity_id":"abc","last_event_time":"2026-01-01T00:00:00Z","last_processed_time":null}
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: EntityId,
    /// Receipt time of the most recent observed change
    pub last_event_time: DateTime<Utc>,
    /// Completion time of the most recent processing pass (`None` = never processed)
    #[serde(default)]
    pub last_processed_time: Option<DateTime<Utc>>,
}

impl EntityState {
    /// Record created by the first event for an entity
    pub fn first_seen(entity_id: EntityId, at: DateTime<Utc>) -> Self {
        Self {
            entity_id,
            last_event_time: at,
            last_processed_time: None,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
