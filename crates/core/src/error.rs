//! Error taxonomy shared by every pipeline component

use std::error::Error as StdError;

/// Boxed source error from an external collaborator
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the ingestor, scanner and their collaborators
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid settings. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Inbound message that can never be ingested (no usable `Id`).
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Entity identifier rejected at construction.
    #[error("invalid entity id: {0:?}")]
    InvalidEntityId(String),

    /// State store call failed; the next cycle retries.
    #[error("storage error: {0}")]
    Storage(#[source] BoxError),

    /// Queue call failed; the next cycle retries.
    #[error("queue error: {0}")]
    Queue(#[source] BoxError),

    /// The injected processing operation failed for an entity.
    #[error("processing failed for {entity}: {reason}")]
    Processing { entity: String, reason: String },

    /// Metrics sink rejected a publish.
    #[error("metrics publish failed: {0}")]
    Metrics(String),

    /// Record (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a state store failure
    pub fn storage(err: impl Into<BoxError>) -> Self {
        Self::Storage(err.into())
    }

    /// Wrap a queue failure
    pub fn queue(err: impl Into<BoxError>) -> Self {
        Self::Queue(err.into())
    }

    /// Build a processing failure for an entity
    pub fn processing(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Processing {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying on a later cycle can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Queue(_) | Self::Metrics(_))
    }
}
