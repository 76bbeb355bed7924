//! Core types for the quiesce debounce pipeline
//!
//! This crate provides:
//! - Entity state records and identifiers
//! - Debounce / continuous-reprocessing eligibility rules
//! - Settings model and validation
//! - Collaborator contracts for the state store and the inbound queue
//! - Clock and backoff utilities shared by the ingestor and scanner

pub mod backoff;
pub mod clock;
pub mod entity;
pub mod error;
pub mod message;
pub mod policy;
pub mod queue;
pub mod settings;
pub mod store;

// Re-exports
pub use backoff::Backoff;
pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{EntityId, EntityState};
pub use error::{Error, Result};
pub use message::{parse_change_notification, ChangeNotification};
pub use policy::{Cutoffs, Disposition, Phase, Windows, WriteStrategy};
pub use queue::{MessageId, MessageQueue, ReceiptHandle, ReceivedMessage};
pub use settings::{MetricsSinkKind, Settings};
pub use store::{StateStore, UpsertOutcome};
