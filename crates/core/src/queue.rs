//! Inbound queue contract (at-least-once delivery)

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use ulid::Ulid;

/// Queue-assigned message identifier (ULID, ordered by enqueue time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Ulid);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token proving a specific delivery of a message
///
/// A message redelivered after its visibility timeout gets a new token;
/// acknowledging with an older token does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle {
    pub message_id: MessageId,
    pub token: Ulid,
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.message_id, self.token)
    }
}

/// A message handed to a consumer
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub receipt: ReceiptHandle,
    pub body: String,
    /// 1 on first delivery
    pub receive_count: u32,
}

impl ReceivedMessage {
    pub fn message_id(&self) -> MessageId {
        self.receipt.message_id
    }
}

/// At-least-once message queue
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Enqueue a raw message body
    async fn send(&self, body: String) -> Result<MessageId>;

    /// Long-poll for up to `max` visible messages, waiting at most `wait`
    ///
    /// Returned messages stay hidden until acknowledged or until the
    /// visibility timeout expires.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<ReceivedMessage>>;

    /// Remove a delivered message
    async fn ack(&self, receipt: &ReceiptHandle) -> Result<()>;

    /// Messages not yet acknowledged (visible or in flight)
    async fn pending(&self) -> Result<usize>;
}
