//! Durable collaborators for the debounce pipeline
//!
//! This crate provides:
//! - Entity state table (sled embedded DB)
//! - At-least-once queue spool with visibility timeouts (sled embedded DB)
//! - In-memory doubles of both with identical semantics

pub mod memory;
pub mod queue;
pub mod table;

// Re-exports
pub use memory::{MemoryQueue, MemoryStateStore};
pub use queue::SledQueue;
pub use table::SledStateStore;
