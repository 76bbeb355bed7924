//! Workflow integration tests
//!
//! Complete workflows that exercise several commands against a real
//! daemon process.

pub mod daemon_lifecycle;
pub mod offline;
