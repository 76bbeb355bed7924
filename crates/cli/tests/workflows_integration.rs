//! Integration tests for the quiesce binary
//!
//! Each test gets its own state directory, queue and table, and drives the
//! real binary through its commands.

mod common;
mod workflows;
