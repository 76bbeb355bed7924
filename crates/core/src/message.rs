//! Inbound change notification payload

use crate::entity::EntityId;
use crate::error::{Error, Result};
use serde::Deserialize;

/// `{"Id": "<entity_id>", ...}`; every other field is ignored
#[derive(Debug, Deserialize)]
pub struct ChangeNotification {
    #[serde(rename = "Id")]
    pub id: String,
}

/// Extract the entity identity from a raw queue message body
///
/// Missing `Id`, a non-string `Id`, a blank `Id` or a body that is not a
/// JSON object are all `Error::MalformedMessage`: retrying cannot fix them.
pub fn parse_change_notification(body: &str) -> Result<EntityId> {
    let notification: ChangeNotification = serde_json::from_str(body)
        .map_err(|e| Error::MalformedMessage(e.to_string()))?;

    EntityId::new(notification.id)
        .map_err(|_| Error::MalformedMessage("message has a blank 'Id'".to_string()))
}
