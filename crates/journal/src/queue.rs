//! At-least-once queue spool using sled
//!
//! Messages are keyed by a monotonic ULID so the spool drains in enqueue
//! order. A receive hides a message for the visibility timeout and stamps
//! it with a fresh delivery token; only an ack carrying the current token
//! removes it. Messages that are received but never acknowledged become
//! visible again once the timeout expires, across restarts too.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use quiesce_core::{Error, MessageId, MessageQueue, ReceiptHandle, ReceivedMessage, Result};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};
use ulid::{Generator, Ulid};

const MESSAGES_TREE: &str = "messages";

/// How often a waiting receive re-checks for expired visibility timeouts
pub(crate) const RECHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Stored form of a queued message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Envelope {
    pub body: String,
    /// Unix milliseconds before which the message is hidden
    pub visible_at_ms: i64,
    pub receive_count: u32,
    /// Token of the latest delivery
    pub token: Option<Ulid>,
}

impl Envelope {
    pub fn new(body: String) -> Self {
        Self {
            body,
            visible_at_ms: 0,
            receive_count: 0,
            token: None,
        }
    }

    pub fn is_visible(&self, now_ms: i64) -> bool {
        self.visible_at_ms <= now_ms
    }

    /// Next delivery of this message
    pub fn deliver(&self, now_ms: i64, visibility_timeout: Duration) -> Self {
        Self {
            body: self.body.clone(),
            visible_at_ms: now_ms.saturating_add(visibility_timeout.as_millis() as i64),
            receive_count: self.receive_count.saturating_add(1),
            token: Some(Ulid::new()),
        }
    }

    pub fn received(&self, message_id: MessageId) -> Option<ReceivedMessage> {
        let token = self.token?;
        Some(ReceivedMessage {
            receipt: ReceiptHandle { message_id, token },
            body: self.body.clone(),
            receive_count: self.receive_count,
        })
    }

    fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(Error::queue)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(Error::queue)
    }
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Shared long-poll loop: claim, or wait for a send / recheck tick until `wait` expires
pub(crate) async fn long_poll<F>(notify: &Notify, wait: Duration, mut claim: F) -> Result<Vec<ReceivedMessage>>
where
    F: FnMut() -> Result<Vec<ReceivedMessage>>,
{
    let deadline = Instant::now() + wait;
    loop {
        // Register before claiming so a send in between is not missed
        let notified = notify.notified();

        let claimed = claim()?;
        if !claimed.is_empty() {
            return Ok(claimed);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(claimed);
        }
        let nap = (deadline - now).min(RECHECK_INTERVAL);
        let _ = tokio::time::timeout(nap, notified).await;
    }
}

/// Durable queue spool
pub struct SledQueue {
    /// Sled database
    db: Db,
    /// message ulid -> Envelope
    messages: Tree,
    /// Monotonic id source
    ids: Mutex<Generator>,
    /// Wakes long-polling receivers on send
    notify: Notify,
    visibility_timeout: Duration,
}

impl SledQueue {
    /// Open or create a spool at the given path
    pub fn open(path: &Path, visibility_timeout: Duration) -> Result<Self> {
        let db = sled::open(path).map_err(Error::queue)?;
        let messages = db.open_tree(MESSAGES_TREE).map_err(Error::queue)?;
        Ok(Self {
            db,
            messages,
            ids: Mutex::new(Generator::new()),
            notify: Notify::new(),
            visibility_timeout,
        })
    }

    fn next_id(&self) -> MessageId {
        let id = self.ids.lock().generate().unwrap_or_else(|_| Ulid::new());
        MessageId(id)
    }

    /// Claim up to `max` visible messages
    fn claim_visible(&self, max: usize) -> Result<Vec<ReceivedMessage>> {
        let now = now_ms();
        let mut claimed = Vec::new();

        for item in self.messages.iter() {
            if claimed.len() >= max {
                break;
            }
            let (key, raw) = item.map_err(Error::queue)?;
            let (message_id, envelope) = match decode_entry(&key, &raw) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        key = ?key.as_ref(),
                        error = %e,
                        "Skipping undecodable queue entry"
                    );
                    continue;
                }
            };
            if !envelope.is_visible(now) {
                continue;
            }

            let delivered = envelope.deliver(now, self.visibility_timeout);
            let swapped = self
                .messages
                .compare_and_swap(&key, Some(&raw), Some(delivered.encode()?))
                .map_err(Error::queue)?;
            if swapped.is_err() {
                // Claimed by a concurrent receiver
                continue;
            }

            claimed.extend(delivered.received(message_id));
        }

        Ok(claimed)
    }
}

fn decode_entry(key: &[u8], raw: &[u8]) -> Result<(MessageId, Envelope)> {
    let id = MessageId(Ulid::from_bytes(key_bytes(key)?));
    Ok((id, Envelope::decode(raw)?))
}

fn key_bytes(key: &[u8]) -> Result<[u8; 16]> {
    key.try_into()
        .map_err(|_| Error::queue(format!("corrupt message key ({} bytes)", key.len())))
}

#[async_trait]
impl MessageQueue for SledQueue {
    async fn send(&self, body: String) -> Result<MessageId> {
        let id = self.next_id();
        self.messages
            .insert(id.0.to_bytes(), Envelope::new(body).encode()?)
            .map_err(Error::queue)?;
        self.db.flush_async().await.map_err(Error::queue)?;

        self.notify.notify_waiters();
        debug!(message_id = %id, "Message enqueued");
        Ok(id)
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<ReceivedMessage>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        long_poll(&self.notify, wait, || self.claim_visible(max)).await
    }

    async fn ack(&self, receipt: &ReceiptHandle) -> Result<()> {
        let key = receipt.message_id.0.to_bytes();
        let Some(raw) = self.messages.get(key).map_err(Error::queue)? else {
            debug!(receipt = %receipt, "Ack for message already removed");
            return Ok(());
        };

        let envelope = Envelope::decode(&raw)?;
        if envelope.token != Some(receipt.token) {
            debug!(receipt = %receipt, "Ack with outdated receipt ignored");
            return Ok(());
        }

        let removed = self
            .messages
            .compare_and_swap(key, Some(&raw), None::<Vec<u8>>)
            .map_err(Error::queue)?;
        if removed.is_err() {
            debug!(receipt = %receipt, "Message redelivered before ack; ignored");
            return Ok(());
        }

        self.db.flush_async().await.map_err(Error::queue)?;
        Ok(())
    }

    async fn pending(&self) -> Result<usize> {
        Ok(self.messages.len())
    }
}
